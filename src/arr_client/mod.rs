//! Client-side access to the external library managers.
//!
//! The automation core only sees [`ManagerClient`]; concrete clients are built per server by a
//! [`ManagerClientFactory`].

mod http;

pub use http::{ArrClient, ArrHttp, HttpClientFactory};

use crate::credentials::CredentialError;
use crate::settings_store::{ItemKind, ManagedServer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

/// An item reported by a manager as missing or below its quality cutoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionItem {
    pub id: i64,
    pub title: String,
    pub kind: ItemKind,
}

/// Status reported by a successful connection test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub app_name: Option<String>,
    pub version: Option<String>,
}

/// The capability every manager exposes to the automation engine.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ManagerClient: Send + Sync {
    async fn list_missing(&self) -> Result<Vec<DetectionItem>, ClientError>;

    async fn list_cutoff_unmet(&self) -> Result<Vec<DetectionItem>, ClientError>;

    /// Ask the manager to search its indexers for one item.
    async fn trigger_search(&self, item_id: i64) -> Result<(), ClientError>;

    async fn test_connection(&self) -> Result<ConnectionInfo, ClientError>;
}

/// Builds a client for a configured server.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait ManagerClientFactory: Send + Sync {
    fn client_for(&self, server: &ManagedServer) -> Result<Arc<dyn ManagerClient>, ClientError>;
}
