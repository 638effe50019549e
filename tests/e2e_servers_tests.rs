//! End-to-end tests for managed server endpoints
//!
//! Tests CRUD, API key handling and connection tests.

mod common;

use common::{FakeManager, TestClient, TestServer, FAKE_API_KEY, FAKE_APP_NAME, FAKE_APP_VERSION};
use reqwest::StatusCode;
use serde_json::{json, Value};
use sweeparr::settings_store::SettingsStore;

#[tokio::test]
async fn test_create_and_fetch_server() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client
        .create_server("movies", "http://radarr.local:7878/", "secret", "radarr")
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let created: Value = response.json().await.unwrap();
    assert_eq!(created["name"], "movies");
    assert_eq!(created["base_url"], "http://radarr.local:7878");
    assert_eq!(created["category"], "movie_manager");
    assert_eq!(created["enabled"], true);
    assert!(created.get("api_key").is_none());
    assert!(created.get("encrypted_api_key").is_none());

    let id = created["id"].as_str().unwrap();
    let response = client.get_server(id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let fetched: Value = response.json().await.unwrap();
    assert_eq!(fetched, created);

    let listed: Value = client.list_servers().await.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_api_key_is_stored_encrypted() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let id = client
        .create_server_ok("movies", "http://radarr.local", "plain-secret", "radarr")
        .await;

    let stored = server
        .context
        .settings
        .get_server(&id)
        .unwrap()
        .expect("server should be stored");
    assert_ne!(stored.encrypted_api_key, "plain-secret");
    assert_eq!(
        server.context.cipher.decrypt(&stored.encrypted_api_key).unwrap(),
        "plain-secret"
    );
}

#[tokio::test]
async fn test_create_rejects_invalid_input() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client
        .create_server("movies", "http://radarr.local", "k", "lidarr")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .create_server("movies", "radarr.local", "k", "radarr")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .create_server("  ", "http://radarr.local", "k", "radarr")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_names_conflict() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    client
        .create_server_ok("movies", "http://a.local", "k", "radarr")
        .await;
    let response = client
        .create_server("movies", "http://b.local", "k", "sonarr")
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let other = client
        .create_server_ok("shows", "http://b.local", "k", "sonarr")
        .await;
    let response = client
        .update_server(&other, json!({ "name": "movies" }))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_partial_update_keeps_other_fields() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let id = client
        .create_server_ok("movies", "http://radarr.local", "k", "radarr")
        .await;

    let response = client
        .update_server(&id, json!({ "enabled": false, "base_url": "https://radarr.lan/" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["name"], "movies");
    assert_eq!(updated["enabled"], false);
    assert_eq!(updated["base_url"], "https://radarr.lan");
    assert_eq!(updated["category"], "movie_manager");

    let response = client
        .update_server("missing-id", json!({ "enabled": true }))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_server() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let id = client
        .create_server_ok("movies", "http://radarr.local", "k", "radarr")
        .await;

    let response = client.delete_server(&id).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client.get_server(&id).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.delete_server(&id).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_connection_test_reports_manager_info() {
    let server = TestServer::spawn().await;
    let manager = FakeManager::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let id = client
        .create_server_ok("movies", &manager.base_url, FAKE_API_KEY, "radarr")
        .await;

    let response = client.test_server(&id).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["app_name"], FAKE_APP_NAME);
    assert_eq!(body["version"], FAKE_APP_VERSION);
}

#[tokio::test]
async fn test_connection_test_with_rejected_key_is_bad_gateway() {
    let server = TestServer::spawn().await;
    let manager = FakeManager::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let id = client
        .create_server_ok("movies", &manager.base_url, "wrong-key", "radarr")
        .await;

    let response = client.test_server(&id).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("401"));

    let response = client.test_server("missing-id").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
