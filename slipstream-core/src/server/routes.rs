//! Request handling for the progressive media route.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use super::range::{ByteRange, RangeOutcome, content_type_for, resolve_range};
use super::readiness::Readiness;

const READ_CHUNK_BYTES: u64 = 64 * 1024;

/// Shared state for media request handlers.
#[derive(Clone)]
pub(crate) struct MediaState {
    pub file_path: PathBuf,
    pub readiness: watch::Receiver<Readiness>,
    /// Bounded number of flag re-checks before a pending request gives up.
    pub ready_rechecks: u32,
    pub recheck_interval: Duration,
}

pub(crate) fn router(state: MediaState) -> Router {
    Router::new()
        .route("/media", get(serve_media))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn serve_media(State(state): State<MediaState>, headers: HeaderMap) -> Response {
    handle_media_request(&state, &headers).await
}

/// Gates on the readiness flag, then serves the requested span.
pub(crate) async fn handle_media_request(state: &MediaState, headers: &HeaderMap) -> Response {
    match awaited_readiness(state).await {
        Readiness::Ready => {}
        Readiness::GaveUp => {
            return plain_response(StatusCode::NOT_FOUND, "media unavailable");
        }
        Readiness::Pending => {
            return not_ready_response();
        }
    }

    // Re-read the size on every request: the file grows underneath us.
    let current_size = match tokio::fs::metadata(&state.file_path).await {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            tracing::warn!(
                "Served file vanished: {}: {e}",
                state.file_path.display()
            );
            return plain_response(StatusCode::NOT_FOUND, "media unavailable");
        }
    };

    let range_header = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    match resolve_range(range_header, current_size) {
        RangeOutcome::Full => {
            let span = ByteRange {
                start: 0,
                end: current_size.saturating_sub(1),
            };
            match file_span_body(state, span).await {
                Ok(body) => media_response(state, StatusCode::OK, current_size, None, body),
                Err(e) => read_error_response(state, e),
            }
        }
        RangeOutcome::Partial(span) => match file_span_body(state, span).await {
            Ok(body) => media_response(
                state,
                StatusCode::PARTIAL_CONTENT,
                current_size,
                Some(span),
                body,
            ),
            Err(e) => read_error_response(state, e),
        },
        RangeOutcome::Unsatisfiable => Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{current_size}"))
            .body(Body::empty())
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
    }
}

/// Current readiness, with a short bounded wait while the monitor is still
/// deciding. Never an unbounded block: after the re-check budget the request
/// answers 503 and the client retries.
async fn awaited_readiness(state: &MediaState) -> Readiness {
    let mut rx = state.readiness.clone();
    let mut rechecks = 0;

    loop {
        match *rx.borrow_and_update() {
            Readiness::Pending => {}
            terminal => return terminal,
        }
        if rechecks >= state.ready_rechecks {
            return Readiness::Pending;
        }
        rechecks += 1;
        if tokio::time::timeout(state.recheck_interval, rx.changed())
            .await
            .is_ok_and(|changed| changed.is_err())
        {
            // Monitor dropped without a terminal state; treat as pending.
            return Readiness::Pending;
        }
    }
}

/// Streams exactly the requested span, reading in bounded chunks.
async fn file_span_body(state: &MediaState, span: ByteRange) -> std::io::Result<Body> {
    let mut file = tokio::fs::File::open(&state.file_path).await?;
    file.seek(SeekFrom::Start(span.start)).await?;

    let stream = futures::stream::try_unfold(
        (file, span.len()),
        |(mut file, remaining)| async move {
            if remaining == 0 {
                return Ok::<_, std::io::Error>(None);
            }
            let chunk_len = remaining.min(READ_CHUNK_BYTES) as usize;
            let mut buffer = vec![0u8; chunk_len];
            let mut filled = 0;
            while filled < chunk_len {
                let n = file.read(&mut buffer[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                return Ok(None);
            }
            buffer.truncate(filled);
            Ok(Some((Bytes::from(buffer), (file, remaining - filled as u64))))
        },
    );

    Ok(Body::from_stream(stream))
}

fn media_response(
    state: &MediaState,
    status: StatusCode,
    current_size: u64,
    span: Option<ByteRange>,
    body: Body,
) -> Response {
    let content_length = span.map(|s| s.len()).unwrap_or(current_size);

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type_for(&state.file_path))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, content_length.to_string())
        .header(header::CACHE_CONTROL, "no-cache");

    if let Some(span) = span {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{current_size}", span.start, span.end),
        );
    }

    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn not_ready_response() -> Response {
    Response::builder()
        .status(StatusCode::SERVICE_UNAVAILABLE)
        .header(header::RETRY_AFTER, "2")
        .body(Body::from("media not ready"))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn plain_response(status: StatusCode, message: &'static str) -> Response {
    Response::builder()
        .status(status)
        .body(Body::from(message))
        .unwrap_or_else(|_| status.into_response())
}

fn read_error_response(state: &MediaState, e: std::io::Error) -> Response {
    tracing::warn!(
        "Read failed while serving {}: {e}",
        state.file_path.display()
    );
    plain_response(StatusCode::INTERNAL_SERVER_ERROR, "read error")
}
