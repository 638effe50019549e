//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per API endpoint.
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    async fn post(&self, path: &str) -> Response {
        self.client
            .post(self.url(path))
            .send()
            .await
            .expect("POST request failed")
    }

    async fn send_json(&self, method: reqwest::Method, path: &str, body: Value) -> Response {
        self.client
            .request(method, self.url(path))
            .json(&body)
            .send()
            .await
            .expect("JSON request failed")
    }

    // ========================================================================
    // Root
    // ========================================================================

    pub async fn get_home(&self) -> Response {
        self.get("/").await
    }

    pub async fn get_health(&self) -> Response {
        self.get("/health").await
    }

    // ========================================================================
    // Automation
    // ========================================================================

    pub async fn get_automation_status(&self) -> Response {
        self.get("/v1/automation/status").await
    }

    pub async fn start_automation(&self) -> Response {
        self.post("/v1/automation/start").await
    }

    pub async fn stop_automation(&self) -> Response {
        self.post("/v1/automation/stop").await
    }

    pub async fn trigger_cycle(&self) -> Response {
        self.post("/v1/automation/trigger").await
    }

    pub async fn update_schedule(&self, body: Value) -> Response {
        self.send_json(reqwest::Method::PUT, "/v1/automation/schedule", body)
            .await
    }

    pub async fn get_rate_limits(&self) -> Response {
        self.get("/v1/automation/rate-limits").await
    }

    pub async fn put_rate_limits(&self, body: Value) -> Response {
        self.send_json(reqwest::Method::PUT, "/v1/automation/rate-limits", body)
            .await
    }

    pub async fn get_last_cycle(&self) -> Response {
        self.get("/v1/automation/last-cycle").await
    }

    /// POST /v1/automation/detect with an optional raw query string
    pub async fn detect(&self, query: &str) -> Response {
        if query.is_empty() {
            self.post("/v1/automation/detect").await
        } else {
            self.post(&format!("/v1/automation/detect?{}", query)).await
        }
    }

    /// Polls the last-cycle endpoint until a cycle has been recorded.
    ///
    /// # Panics
    ///
    /// Panics if no cycle finishes within `CYCLE_TIMEOUT_MS`.
    pub async fn wait_for_last_cycle(&self) -> Value {
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(CYCLE_TIMEOUT_MS) {
            let response = self.get_last_cycle().await;
            if response.status().is_success() {
                return response.json().await.expect("Invalid last-cycle body");
            }
            tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
        }
        panic!("No cycle finished within {}ms", CYCLE_TIMEOUT_MS);
    }

    // ========================================================================
    // Managed Servers
    // ========================================================================

    pub async fn list_servers(&self) -> Response {
        self.get("/v1/servers").await
    }

    pub async fn get_server(&self, id: &str) -> Response {
        self.get(&format!("/v1/servers/{}", id)).await
    }

    pub async fn create_server(
        &self,
        name: &str,
        base_url: &str,
        api_key: &str,
        category: &str,
    ) -> Response {
        self.send_json(
            reqwest::Method::POST,
            "/v1/servers",
            json!({
                "name": name,
                "base_url": base_url,
                "api_key": api_key,
                "category": category,
            }),
        )
        .await
    }

    /// Creates a server and returns its id.
    ///
    /// # Panics
    ///
    /// Panics if the server is not created.
    pub async fn create_server_ok(
        &self,
        name: &str,
        base_url: &str,
        api_key: &str,
        category: &str,
    ) -> String {
        let response = self.create_server(name, base_url, api_key, category).await;
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let body: Value = response.json().await.expect("Invalid server body");
        body["id"].as_str().expect("Server id missing").to_string()
    }

    pub async fn update_server(&self, id: &str, body: Value) -> Response {
        self.send_json(reqwest::Method::PUT, &format!("/v1/servers/{}", id), body)
            .await
    }

    pub async fn delete_server(&self, id: &str) -> Response {
        self.client
            .delete(self.url(&format!("/v1/servers/{}", id)))
            .send()
            .await
            .expect("DELETE request failed")
    }

    pub async fn test_server(&self, id: &str) -> Response {
        self.post(&format!("/v1/servers/{}/test", id)).await
    }

    // ========================================================================
    // Activity Log
    // ========================================================================

    /// GET /v1/logs with an optional raw query string
    pub async fn query_logs(&self, query: &str) -> Response {
        if query.is_empty() {
            self.get("/v1/logs").await
        } else {
            self.get(&format!("/v1/logs?{}", query)).await
        }
    }
}
