//! HTTP handler for the stream endpoint

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use tokio::sync::Semaphore;

use crate::pipeline::PipelineLauncher;
use crate::tuner::Tuner;

use super::config::ServerConfig;

/// Shared handler state
pub struct AppState<L: PipelineLauncher> {
    tuner: Tuner<L>,
    content_type: Arc<str>,
    limiter: Option<Arc<Semaphore>>,
    next_request_id: Arc<AtomicU64>,
}

impl<L: PipelineLauncher> Clone for AppState<L> {
    fn clone(&self) -> Self {
        Self {
            tuner: self.tuner.clone(),
            content_type: Arc::clone(&self.content_type),
            limiter: self.limiter.clone(),
            next_request_id: Arc::clone(&self.next_request_id),
        }
    }
}

/// Build the router serving `tuner` on the configured stream path
pub fn router<L: PipelineLauncher>(tuner: Tuner<L>, config: &ServerConfig) -> Router {
    let limiter = if config.max_listeners > 0 {
        Some(Arc::new(Semaphore::new(config.max_listeners)))
    } else {
        None
    };

    let state = AppState {
        tuner,
        content_type: Arc::from(config.content_type.as_str()),
        limiter,
        next_request_id: Arc::new(AtomicU64::new(1)),
    };

    Router::new()
        .route(&config.stream_path, get(stream_radio::<L>))
        .with_state(state)
}

fn unavailable(reason: String) -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, reason).into_response()
}

/// Attach a listener and stream its chunks as a chunked response body
async fn stream_radio<L: PipelineLauncher>(
    State(state): State<AppState<L>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let request_id = state.next_request_id.fetch_add(1, Ordering::Relaxed);

    let permit = match &state.limiter {
        Some(limiter) => match Arc::clone(limiter).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(peer = %peer, "Listener rejected: limit reached");
                return unavailable("listener limit reached".to_string());
            }
        },
        None => None,
    };

    let session = match state.tuner.attach().await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(
                request_id = request_id,
                peer = %peer,
                error = %e,
                "Listener rejected"
            );
            return unavailable(e.to_string());
        }
    };

    tracing::debug!(
        request_id = request_id,
        listener_id = session.id(),
        peer = %peer,
        "Streaming to listener"
    );

    let stream = session.into_stream().map(move |data| {
        // The permit is released when the body stream is dropped
        let _held = &permit;
        Ok::<_, Infallible>(data)
    });

    (
        [
            (header::CONTENT_TYPE, state.content_type.to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}
