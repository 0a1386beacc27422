//! Integration tests for the stream relay server
//!
//! Each test starts the real router on an ephemeral port, relaying FLV files
//! from a temporary directory.
//!
//! Run with: cargo test -p relay-server --test integration_tests

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use relay_protocol::{ApiResponse, SessionData, SessionState};
use relay_server::config::Config;
use relay_server::relay::RelayService;
use reqwest::{Client, StatusCode};

/// Test server wrapper
struct TestServer {
    addr: std::net::SocketAddr,
    relay: Arc<RelayService>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    dir: tempfile::TempDir,
}

impl TestServer {
    async fn start() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;

        let mut config = Config::default();
        config.http.bind_address = "127.0.0.1:0".to_string();
        config.relay.media_host = dir.path().join("out").display().to_string();
        config.relay.setup_timeout_secs = 2;
        config.relay.io_timeout_secs = 2;

        let (router, relay) = relay_server::create_app(config)?;

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            relay,
            shutdown_tx: Some(shutdown_tx),
            dir,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn sink(&self, index: usize) -> String {
        self.dir.path().join("out").join(index.to_string()).display().to_string()
    }

    /// An FLV source whose second frame is due ten minutes after the first,
    /// so a relay of it keeps running until stopped
    fn long_source(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, flv_file(&[0, 600_000])).unwrap();
        path
    }

    async fn start_stream(&self, query: &[(&str, &str)]) -> (StatusCode, ApiResponse) {
        let response = Client::new()
            .get(self.url("/rest/api/v1/transform_stream"))
            .query(query)
            .send()
            .await
            .unwrap();
        (response.status(), response.json().await.unwrap())
    }

    async fn stop_stream(&self, source: &str) -> (StatusCode, ApiResponse) {
        let response = Client::new()
            .post(self.url("/rest/api/v1/stop"))
            .query(&[("url", source)])
            .send()
            .await
            .unwrap();
        (response.status(), response.json().await.unwrap())
    }

    async fn sessions(&self) -> Vec<SessionData> {
        let body: ApiResponse<Vec<SessionData>> = Client::new()
            .get(self.url("/rest/api/v1/sessions"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body.data.unwrap_or_default()
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.relay.shutdown().await;
    }
}

/// A video-only FLV file with one keyframe tag per timestamp (milliseconds)
fn flv_file(timestamps: &[u32]) -> Vec<u8> {
    let mut bytes = vec![b'F', b'L', b'V', 1, 0x01, 0, 0, 0, 9, 0, 0, 0, 0];
    let body = [0x12u8, 0xAA, 0xBB, 0xCC];
    for ts in timestamps {
        let size = body.len() as u32;
        bytes.push(9);
        bytes.extend_from_slice(&size.to_be_bytes()[1..]);
        bytes.extend_from_slice(&ts.to_be_bytes()[1..]);
        bytes.push((ts >> 24) as u8);
        bytes.extend_from_slice(&[0, 0, 0]);
        bytes.extend_from_slice(&body);
        bytes.extend_from_slice(&(11 + size).to_be_bytes());
    }
    bytes
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await.unwrap();

    let response = Client::new().get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");

    server.stop().await;
}

#[tokio::test]
async fn test_start_stop_lifecycle() {
    let server = TestServer::start().await.unwrap();
    let source = path_str(&server.long_source("camera.flv"));

    let (status, body) = server.start_stream(&[("url", &source)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.status, 200);
    assert_eq!(body.message, "successful");
    assert_eq!(body.data, Some(server.sink(0)));

    let sessions = server.sessions().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].source_url, source);
    assert_eq!(sessions[0].state, SessionState::Streaming);

    // Starting the same source again is idempotent
    let (_, again) = server.start_stream(&[("url", &source), ("auto-replay", "")]).await;
    assert_eq!(again.status, 200);
    assert_eq!(again.message, "relay already running");
    assert_eq!(again.data, Some(server.sink(0)));

    let (status, stopped) = server.stop_stream(&source).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped.status, 200);
    assert_eq!(stopped.message, "successful");
    assert!(server.sessions().await.is_empty());

    // The sink got a complete FLV header and the first frame
    let written = std::fs::read(server.sink(0)).unwrap();
    assert_eq!(&written[..3], b"FLV");
    assert_eq!(written.len(), 13 + 11 + 4 + 4);

    let (_, missing) = server.stop_stream(&source).await;
    assert_eq!(missing.status, 20001);
    assert_eq!(missing.message, "transform not exists");

    server.stop().await;
}

#[tokio::test]
async fn test_sinks_are_numbered_and_hints_respected() {
    let server = TestServer::start().await.unwrap();
    let first = path_str(&server.long_source("a.flv"));
    let second = path_str(&server.long_source("b.flv"));
    let hinted = path_str(&server.long_source("c.flv"));
    let custom = path_str(&server.dir.path().join("custom").join("c-out.flv"));

    let (_, a) = server.start_stream(&[("url", &first)]).await;
    let (_, c) = server.start_stream(&[("url", &hinted), ("output", &custom)]).await;
    let (_, b) = server.start_stream(&[("url", &second)]).await;

    assert_eq!(a.data, Some(server.sink(0)));
    assert_eq!(c.data, Some(custom.clone()));
    assert_eq!(b.data, Some(server.sink(1)));
    assert!(Path::new(&custom).exists());

    let sources: Vec<_> = server.sessions().await.into_iter().map(|s| s.source_url).collect();
    assert_eq!(sources, vec![first, second, hinted]);

    server.stop().await;
}

#[tokio::test]
async fn test_unreachable_source_fails_without_a_session() {
    let server = TestServer::start().await.unwrap();

    // Grab a free port and release it so nothing is listening there
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let source = format!("tcp://127.0.0.1:{}", port);

    let (status, body) = server.start_stream(&[("url", &source), ("auto-replay", "1")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.status, 20001);
    assert!(body.data.is_none());
    assert!(server.sessions().await.is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(server.sessions().await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_source_ending_before_streaming_is_reported() {
    let server = TestServer::start().await.unwrap();
    let empty = server.dir.path().join("empty.flv");
    std::fs::write(&empty, flv_file(&[])).unwrap();

    let (_, body) = server.start_stream(&[("url", &path_str(&empty))]).await;

    assert_eq!(body.status, 20001);
    assert!(body.message.contains("end of stream"));
    assert!(server.sessions().await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_missing_url_is_404() {
    let server = TestServer::start().await.unwrap();

    let (status, body) = server.start_stream(&[("auto-replay", "")]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.status, 404);
    assert_eq!(body.message, "url not find");

    let response = Client::new()
        .get(server.url("/rest/api/v1/stop"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_uri_and_unsupported_method() {
    let server = TestServer::start().await.unwrap();
    let client = Client::new();

    let response = client
        .get(server.url("/rest/api/v1/restart"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ApiResponse = response.json().await.unwrap();
    assert_eq!(body.status, 20001);
    assert_eq!(body.message, "request an unknown uri: /rest/api/v1/restart");

    let response = client
        .put(server.url("/rest/api/v1/stop"))
        .query(&[("url", "rtsp://cam")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    let body: ApiResponse = response.json().await.unwrap();
    assert_eq!(body.message, "unsupported method");

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_query_gets_the_error_envelope() {
    let server = TestServer::start().await.unwrap();

    let response = Client::new()
        .get(server.url("/rest/api/v1/transform_stream?url=a.flv&url=b.flv"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ApiResponse = response.json().await.unwrap();
    assert_eq!(body.status, 20001);
    assert!(body.message.contains("duplicate field"));
    assert!(body.data.is_none());

    let response = Client::new()
        .post(server.url("/rest/api/v1/stop?url=a.flv&url=b.flv"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ApiResponse = response.json().await.unwrap();
    assert_eq!(body.status, 20001);
    assert!(server.sessions().await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_default_config_builds_a_usable_app() {
    let (_router, relay) = relay_server::create_app(Config::default()).unwrap();
    relay.shutdown().await;

    let mut config = Config::default();
    config.relay.media_host = "rtmp://127.0.0.1/live".to_string();
    let err = relay_server::create_app(config).err().unwrap();
    assert!(err.to_string().contains("rtmp://127.0.0.1/live"));
}
