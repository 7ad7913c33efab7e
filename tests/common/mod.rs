//! Common test utilities for fetch-guard integration tests

#![allow(dead_code)]

use fetch_guard::{ArtifactStore, Config, FetchService, MemoryArtifactStore};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration that lets the pipeline reach `servers` and nothing else on loopback
pub fn config_for(servers: &[&MockServer]) -> Config {
    let mut config = Config::default();
    config.fetch.exempt_origins = servers.iter().map(|s| s.address().to_string()).collect();
    config.fetch.request_timeout = Duration::from_secs(10);
    config
}

/// A service over an in-memory store, returning both
pub fn service_with_store(config: Config) -> (FetchService, Arc<MemoryArtifactStore>) {
    let store = Arc::new(MemoryArtifactStore::new(config.artifacts.ttl));
    let dyn_store: Arc<dyn ArtifactStore> = store.clone();
    let service = FetchService::new(config, dyn_store).unwrap();
    (service, store)
}

/// Serve `body` at `route` with the given content type
pub async fn serve_file(server: &MockServer, route: &str, content_type: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", content_type)
                .set_body_bytes(body),
        )
        .mount(server)
        .await;
}

/// A server that fails the test if anything reaches it
pub async fn untouchable_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("internal"))
        .expect(0)
        .mount(&server)
        .await;
    server
}
