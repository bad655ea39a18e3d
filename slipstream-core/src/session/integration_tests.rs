//! End-to-end session flow over the simulated engine.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{SessionState, StreamError, StreamSessionController};
use crate::SlipstreamError;
use crate::config::SlipstreamConfig;
use crate::engine::{
    ContentDescriptor, FileEntry, PieceLayout, SimulatedSwarmConfig, SimulatedSwarmEngine,
    SwarmManifest,
};
use crate::server::StreamEndpoint;

const MAGNET: &str = "magnet:?xt=urn:btih:feedfacefeedfacefeedfacefeedfacefeedface&dn=feature";

fn descriptor() -> ContentDescriptor {
    ContentDescriptor::parse(MAGNET).unwrap()
}

fn fast_config(download_root: &Path) -> SlipstreamConfig {
    let mut config = SlipstreamConfig::default();
    config.storage.download_root = download_root.to_path_buf();
    config.server.min_ready_bytes = 256 * 1024;
    config.server.monitor_interval = Duration::from_millis(50);
    config.server.stable_checks_required = 2;
    config
}

fn movie_manifest() -> SwarmManifest {
    SwarmManifest {
        name: "feature".to_string(),
        files: vec![
            FileEntry {
                index: 0,
                name: "feature.mkv".to_string(),
                size_bytes: 2 * 1024 * 1024,
            },
            FileEntry {
                index: 1,
                name: "notes.txt".to_string(),
                size_bytes: 1_200,
            },
        ],
        layout: PieceLayout {
            total_pieces: 128,
            piece_size: 16 * 1024,
        },
    }
}

fn fast_sim_config() -> SimulatedSwarmConfig {
    SimulatedSwarmConfig {
        manifest: movie_manifest(),
        payload_file_index: 0,
        write_chunk_bytes: 256 * 1024,
        write_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

/// Minimal raw HTTP/1.1 GET against the endpoint, connection: close.
async fn http_get(endpoint: &StreamEndpoint, range: Option<&str>) -> (String, Vec<u8>) {
    let mut stream =
        tokio::net::TcpStream::connect((endpoint.local_address.as_str(), endpoint.port))
            .await
            .unwrap();

    let mut request = format!(
        "GET {} HTTP/1.1\r\nHost: {}:{}\r\n",
        endpoint.path, endpoint.local_address, endpoint.port
    );
    if let Some(range) = range {
        request.push_str(&format!("Range: {range}\r\n"));
    }
    request.push_str("Connection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();

    let split = response
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = String::from_utf8_lossy(&response[..split]).to_string();
    let body = response[split + 4..].to_vec();
    (head, body)
}

#[tokio::test]
async fn test_full_streaming_flow() {
    let root = tempfile::tempdir().unwrap();
    let controller = StreamSessionController::new(
        SimulatedSwarmEngine::new(fast_sim_config()),
        fast_config(root.path()),
    );

    let endpoint = controller.start_streaming(descriptor()).await.unwrap();
    assert_eq!(controller.session_state(), SessionState::Ready);
    assert!(endpoint.url().starts_with("http://127.0.0.1:"));

    // Startup flipped the engine into streaming posture.
    assert!(controller.engine().sequential_mode());
    assert!(controller.engine().priorities_pushed());
    assert!(controller.engine().resume_count() >= 1);

    // Stats come straight from the cache, no engine access.
    let stats = controller.connection_stats();
    assert!(stats.contains("Seeds:"), "unexpected stats: {stats}");

    // The server answers once the readiness monitor accepts the file;
    // until then it responds 503 with a retry hint.
    let mut attempts = 0;
    let body = loop {
        let (head, body) = http_get(&endpoint, Some("bytes=0-1023")).await;
        if head.starts_with("HTTP/1.1 206") {
            // hyper writes header names lowercase on the wire.
            assert!(head.to_ascii_lowercase().contains("content-range: bytes 0-1023/"));
            break body;
        }
        assert!(
            head.starts_with("HTTP/1.1 503"),
            "unexpected interim response: {head}"
        );
        attempts += 1;
        assert!(attempts < 100, "server never became ready");
        tokio::time::sleep(Duration::from_millis(100)).await;
    };
    assert_eq!(body.len(), 1024);

    controller.stop_streaming().await.unwrap();
    assert_eq!(controller.session_state(), SessionState::Idle);
    assert_eq!(controller.download_progress(), 0);
}

#[tokio::test]
async fn test_stop_removes_session_artifacts() {
    let root = tempfile::tempdir().unwrap();
    let controller = StreamSessionController::new(
        SimulatedSwarmEngine::new(fast_sim_config()),
        fast_config(root.path()),
    );

    controller.start_streaming(descriptor()).await.unwrap();
    let session_dir = root
        .path()
        .join("feedfacefeedfacefeedfacefeedfacefeedface");
    assert!(session_dir.exists());

    controller.stop_streaming().await.unwrap();
    assert!(!session_dir.exists());
}

#[tokio::test]
async fn test_stop_is_idempotent_without_session() {
    let root = tempfile::tempdir().unwrap();
    let controller = StreamSessionController::new(
        SimulatedSwarmEngine::new(fast_sim_config()),
        fast_config(root.path()),
    );

    assert!(controller.stop_streaming().await.is_ok());
    assert!(controller.stop_streaming().await.is_ok());
    assert_eq!(controller.session_state(), SessionState::Idle);
    assert_eq!(controller.download_progress(), 0);
    assert_eq!(controller.connection_stats(), "No active stream");
}

#[tokio::test]
async fn test_join_failure_fails_session() {
    let root = tempfile::tempdir().unwrap();
    let controller = StreamSessionController::new(
        SimulatedSwarmEngine::new(SimulatedSwarmConfig {
            fail_join: true,
            ..fast_sim_config()
        }),
        fast_config(root.path()),
    );

    let result = controller.start_streaming(descriptor()).await;
    assert!(matches!(
        result,
        Err(SlipstreamError::Stream(StreamError::EngineJoinFailed { .. }))
    ));
    assert_eq!(controller.session_state(), SessionState::Failed);

    // Failed is terminal for the session but not for the controller.
    controller.stop_streaming().await.unwrap();
    assert_eq!(controller.session_state(), SessionState::Idle);
}

#[tokio::test]
async fn test_metadata_failure_ends_wait_immediately() {
    let root = tempfile::tempdir().unwrap();
    let controller = StreamSessionController::new(
        SimulatedSwarmEngine::new(SimulatedSwarmConfig {
            fail_metadata: true,
            ..fast_sim_config()
        }),
        fast_config(root.path()),
    );

    let started = std::time::Instant::now();
    let result = controller.start_streaming(descriptor()).await;

    assert!(matches!(
        result,
        Err(SlipstreamError::Stream(StreamError::MetadataFailed { .. }))
    ));
    // Nothing close to the 120-second startup deadline.
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_fatal_error_fails_session() {
    let root = tempfile::tempdir().unwrap();
    let controller = StreamSessionController::new(
        SimulatedSwarmEngine::new(SimulatedSwarmConfig {
            fatal_after_join: true,
            ..fast_sim_config()
        }),
        fast_config(root.path()),
    );

    let result = controller.start_streaming(descriptor()).await;
    assert!(matches!(
        result,
        Err(SlipstreamError::Stream(StreamError::FatalTransferError { .. }))
    ));
    assert_eq!(controller.session_state(), SessionState::Failed);
}

#[tokio::test]
async fn test_manifest_without_media_is_no_eligible_file() {
    let root = tempfile::tempdir().unwrap();
    let controller = StreamSessionController::new(
        SimulatedSwarmEngine::new(SimulatedSwarmConfig {
            manifest: SwarmManifest {
                name: "docs".to_string(),
                files: vec![FileEntry {
                    index: 0,
                    name: "readme.txt".to_string(),
                    size_bytes: 9_000,
                }],
                layout: PieceLayout {
                    total_pieces: 2,
                    piece_size: 16 * 1024,
                },
            },
            payload_file_index: 0,
            ..fast_sim_config()
        }),
        fast_config(root.path()),
    );

    let result = controller.start_streaming(descriptor()).await;
    assert!(matches!(
        result,
        Err(SlipstreamError::Stream(StreamError::NoEligibleFile))
    ));
}

#[tokio::test]
async fn test_silent_swarm_times_out() {
    let root = tempfile::tempdir().unwrap();
    let mut config = fast_config(root.path());
    config.session.startup_deadline = Duration::from_millis(400);
    config.session.startup_poll_interval = Duration::from_millis(50);
    config.session.reannounce_interval = Duration::from_millis(100);

    let controller = StreamSessionController::new(
        SimulatedSwarmEngine::new(SimulatedSwarmConfig {
            // Metadata never arrives within the deadline.
            metadata_delay: Duration::from_secs(60),
            ..fast_sim_config()
        }),
        config,
    );

    let result = controller.start_streaming(descriptor()).await;
    assert!(matches!(
        result,
        Err(SlipstreamError::Stream(StreamError::StartupTimeout))
    ));
    assert_eq!(controller.session_state(), SessionState::Failed);
}

#[tokio::test]
async fn test_new_start_replaces_previous_session() {
    let root = tempfile::tempdir().unwrap();
    let controller = StreamSessionController::new(
        SimulatedSwarmEngine::new(fast_sim_config()),
        fast_config(root.path()),
    );

    let first = controller.start_streaming(descriptor()).await.unwrap();
    let second = controller.start_streaming(descriptor()).await.unwrap();

    assert_eq!(controller.session_state(), SessionState::Ready);
    // The first session's server is gone; its port can be rebound.
    tokio::time::sleep(Duration::from_millis(50)).await;
    if first.port != second.port {
        let rebound =
            tokio::net::TcpListener::bind((first.local_address.as_str(), first.port)).await;
        assert!(rebound.is_ok());
    }

    controller.stop_streaming().await.unwrap();
}
