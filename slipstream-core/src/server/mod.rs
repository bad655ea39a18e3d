//! Progressive media server
//!
//! Serves one target file over HTTP range requests while the download is
//! still appending to it. Bound to an ephemeral loopback port; serving is
//! gated by a background readiness monitor so an empty or too-short file is
//! never handed to a player.

pub mod range;
pub mod readiness;
pub mod routes;

use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use readiness::Readiness;

use crate::config::ServerConfig;

/// Errors from running the progressive media server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind streaming socket: {reason}")]
    Bind { reason: String },
}

/// Playable address handed to the caller once a session reaches Ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamEndpoint {
    pub local_address: String,
    pub port: u16,
    pub path: String,
}

impl StreamEndpoint {
    /// Full URL a player can open.
    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.local_address, self.port, self.path)
    }
}

impl fmt::Display for StreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// Range-capable HTTP server bound to one growing file.
///
/// At most one instance is live per session. Stopping closes the listening
/// socket synchronously and ends the readiness monitor.
pub struct ProgressiveMediaServer {
    endpoint: StreamEndpoint,
    shutdown: watch::Sender<bool>,
    server_task: JoinHandle<()>,
    monitor_task: JoinHandle<()>,
}

impl ProgressiveMediaServer {
    /// Binds an ephemeral loopback port and starts serving `file_path`.
    ///
    /// # Errors
    /// - `ServerError::Bind` - No ephemeral port could be opened
    pub async fn start(file_path: PathBuf, config: &ServerConfig) -> Result<Self, ServerError> {
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(|e| ServerError::Bind {
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            reason: e.to_string(),
        })?;

        let (readiness_tx, readiness_rx) = watch::channel(Readiness::Pending);
        let monitor_task = tokio::spawn(readiness::run_monitor(
            file_path.clone(),
            config.clone(),
            readiness_tx,
        ));

        let state = routes::MediaState {
            file_path,
            readiness: readiness_rx,
            ready_rechecks: config.request_ready_rechecks,
            recheck_interval: config.monitor_interval,
        };
        let app = routes::router(state);

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let server_task = tokio::spawn(async move {
            let shutdown_signal = async move {
                let _ = shutdown_rx.changed().await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal)
                .await
            {
                tracing::warn!("Media server terminated: {e}");
            }
        });

        let endpoint = StreamEndpoint {
            local_address: local_addr.ip().to_string(),
            port: local_addr.port(),
            path: "/media".to_string(),
        };
        tracing::info!("Media server listening at {endpoint}");

        Ok(Self {
            endpoint,
            shutdown,
            server_task,
            monitor_task,
        })
    }

    pub fn endpoint(&self) -> &StreamEndpoint {
        &self.endpoint
    }

    /// Closes the listening socket and stops the readiness monitor.
    /// Safe to call more than once.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
        self.server_task.abort();
        self.monitor_task.abort();
        tracing::debug!("Media server stopped at {}", self.endpoint);
    }
}

impl Drop for ProgressiveMediaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_binds_ephemeral_loopback_port() {
        let dir = tempfile::tempdir().unwrap();
        let server = ProgressiveMediaServer::start(
            dir.path().join("payload.mp4"),
            &ServerConfig::default(),
        )
        .await
        .unwrap();

        let endpoint = server.endpoint().clone();
        assert_eq!(endpoint.local_address, "127.0.0.1");
        assert_ne!(endpoint.port, 0);
        assert_eq!(endpoint.path, "/media");
        assert_eq!(
            endpoint.url(),
            format!("http://127.0.0.1:{}/media", endpoint.port)
        );

        server.stop();
    }

    #[tokio::test]
    async fn test_stop_releases_the_port() {
        let dir = tempfile::tempdir().unwrap();
        let server = ProgressiveMediaServer::start(
            dir.path().join("payload.mp4"),
            &ServerConfig::default(),
        )
        .await
        .unwrap();
        let port = server.endpoint().port;

        server.stop();
        // Give the runtime a beat to reap the aborted accept loop.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let rebound = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await;
        assert!(rebound.is_ok());
    }

    #[test]
    fn test_endpoint_serializes_for_api_consumers() {
        let endpoint = StreamEndpoint {
            local_address: "127.0.0.1".to_string(),
            port: 40_123,
            path: "/media".to_string(),
        };

        let value = serde_json::to_value(&endpoint).unwrap();
        assert_eq!(value["local_address"], "127.0.0.1");
        assert_eq!(value["port"], 40_123);
        assert_eq!(value["path"], "/media");
    }

    #[tokio::test]
    async fn test_double_stop_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let server = ProgressiveMediaServer::start(
            dir.path().join("payload.mp4"),
            &ServerConfig::default(),
        )
        .await
        .unwrap();

        server.stop();
        server.stop();
    }
}
