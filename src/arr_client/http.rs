//! reqwest adapter for the managers' public v3 HTTP API.

use super::{ClientError, ConnectionInfo, DetectionItem, ManagerClient, ManagerClientFactory};
use crate::credentials::CredentialCipher;
use crate::settings_store::{ItemKind, ManagedServer, ServerCategory};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WantedPage {
    #[serde(default)]
    total_records: usize,
    #[serde(default)]
    records: Vec<WantedRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WantedRecord {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    season_number: Option<i32>,
    #[serde(default)]
    episode_number: Option<i32>,
    #[serde(default)]
    series: Option<SeriesRef>,
}

#[derive(Debug, Deserialize)]
struct SeriesRef {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SystemStatus {
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

impl WantedRecord {
    fn into_item(self, kind: ItemKind) -> DetectionItem {
        let title = match (kind, self.series, self.season_number, self.episode_number) {
            (ItemKind::Episode, Some(series), Some(season), Some(episode)) => format!(
                "{} S{:02}E{:02}{}",
                series.title,
                season,
                episode,
                self.title
                    .map(|t| format!(" - {}", t))
                    .unwrap_or_default()
            ),
            _ => self.title.unwrap_or_else(|| format!("#{}", self.id)),
        };
        DetectionItem {
            id: self.id,
            title,
            kind,
        }
    }
}

/// Shared HTTP plumbing for one manager instance.
#[derive(Debug, Clone)]
pub struct ArrHttp {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: usize,
}

impl ArrHttp {
    pub fn new(
        base_url: &str,
        api_key: String,
        timeout: Duration,
        page_size: usize,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            page_size: page_size.max(1),
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            message: message.chars().take(200).collect(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Fetch every page of a `wanted` listing.
    async fn fetch_wanted(
        &self,
        path: &str,
        kind: ItemKind,
    ) -> Result<Vec<DetectionItem>, ClientError> {
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            let mut query = vec![
                ("page", page.to_string()),
                ("pageSize", self.page_size.to_string()),
                ("sortKey", "id".to_string()),
                ("sortDirection", "ascending".to_string()),
            ];
            if kind == ItemKind::Episode {
                query.push(("includeSeries", "true".to_string()));
            }

            let body: WantedPage = self.get_json(path, &query).await?;
            let received = body.records.len();
            items.extend(body.records.into_iter().map(|r| r.into_item(kind)));

            if received == 0 || items.len() >= body.total_records {
                break;
            }
            page += 1;
        }
        debug!("Fetched {} items from {}{}", items.len(), self.base_url, path);
        Ok(items)
    }

    async fn post_command(&self, body: serde_json::Value) -> Result<(), ClientError> {
        let url = format!("{}/api/v3/command", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }
}

/// Manager client, one variant per supported manager kind.
#[derive(Debug, Clone)]
pub enum ArrClient {
    Movie(ArrHttp),
    Episode(ArrHttp),
}

impl ArrClient {
    pub fn new(category: ServerCategory, http: ArrHttp) -> Self {
        match category {
            ServerCategory::MovieManager => ArrClient::Movie(http),
            ServerCategory::EpisodeManager => ArrClient::Episode(http),
        }
    }

    fn http(&self) -> &ArrHttp {
        match self {
            ArrClient::Movie(http) | ArrClient::Episode(http) => http,
        }
    }

    fn item_kind(&self) -> ItemKind {
        match self {
            ArrClient::Movie(_) => ItemKind::Movie,
            ArrClient::Episode(_) => ItemKind::Episode,
        }
    }
}

#[async_trait]
impl ManagerClient for ArrClient {
    async fn list_missing(&self) -> Result<Vec<DetectionItem>, ClientError> {
        self.http()
            .fetch_wanted("/api/v3/wanted/missing", self.item_kind())
            .await
    }

    async fn list_cutoff_unmet(&self) -> Result<Vec<DetectionItem>, ClientError> {
        self.http()
            .fetch_wanted("/api/v3/wanted/cutoff", self.item_kind())
            .await
    }

    async fn trigger_search(&self, item_id: i64) -> Result<(), ClientError> {
        let body = match self {
            ArrClient::Movie(_) => json!({ "name": "MoviesSearch", "movieIds": [item_id] }),
            ArrClient::Episode(_) => json!({ "name": "EpisodeSearch", "episodeIds": [item_id] }),
        };
        self.http().post_command(body).await
    }

    async fn test_connection(&self) -> Result<ConnectionInfo, ClientError> {
        let status: SystemStatus = self.http().get_json("/api/v3/system/status", &[]).await?;
        Ok(ConnectionInfo {
            app_name: status.app_name,
            version: status.version,
        })
    }
}

/// Builds [`ArrClient`]s, decrypting each server's API key on demand.
pub struct HttpClientFactory {
    cipher: CredentialCipher,
    timeout: Duration,
    page_size: usize,
}

impl HttpClientFactory {
    pub fn new(cipher: CredentialCipher, timeout: Duration, page_size: usize) -> Self {
        Self {
            cipher,
            timeout,
            page_size,
        }
    }
}

impl ManagerClientFactory for HttpClientFactory {
    fn client_for(&self, server: &ManagedServer) -> Result<Arc<dyn ManagerClient>, ClientError> {
        let api_key = self.cipher.decrypt(&server.encrypted_api_key)?;
        let http = ArrHttp::new(&server.base_url, api_key, self.timeout, self.page_size)?;
        Ok(Arc::new(ArrClient::new(server.category, http)))
    }
}
