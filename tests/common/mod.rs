//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{FakeManager, TestClient, TestServer, FAKE_API_KEY};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_create_server() {
//!     let server = TestServer::spawn().await;
//!     let manager = FakeManager::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let response = client
//!         .create_server("movies", &manager.base_url, FAKE_API_KEY, "radarr")
//!         .await;
//!     assert_eq!(response.status(), StatusCode::CREATED);
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
pub use client::TestClient;
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::FakeManager;
pub use server::TestServer;
