//! HTTP receiver for host session reports
//!
//! Hosts send their session table to `/ingest/<host>`. Every request is
//! acknowledged with the literal body `Success`, whatever the payload looked
//! like; undecodable payloads are treated as an empty table.

use crate::data::{HostKey, SessionTable, UNKNOWN_HOST};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{StatusCode, Uri},
    routing::{any, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Path prefix for session reports
pub const INGEST_PREFIX: &str = "/ingest";

/// Acknowledgement body returned for every accepted request
pub const ACK_BODY: &str = "Success";

/// Receives decoded host reports
pub trait SessionSink: Send + Sync {
    fn sessions_updated(&self, host: HostKey, sessions: SessionTable);
}

impl SessionSink for crate::presence::SessionAggregator {
    fn sessions_updated(&self, host: HostKey, sessions: SessionTable) {
        self.update(host, sessions);
    }
}

/// Sends a plain text message to the configured channel
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, message: String) -> futures::future::BoxFuture<'_, Result<()>>;
}

#[derive(Clone)]
pub struct IngestState {
    pub sink: Arc<dyn SessionSink>,
    pub broadcaster: Option<Arc<dyn Broadcaster>>,
}

/// Extract the host key from a request path.
///
/// Uses the last non-empty segment after the ingest prefix, percent-decoded.
/// Falls back to [`UNKNOWN_HOST`] when there is none.
pub fn host_from_path(path: &str) -> HostKey {
    let rest = path.strip_prefix(INGEST_PREFIX).unwrap_or(path);

    rest.split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .map(|segment| match urlencoding::decode(segment) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => segment.to_string(),
        })
        .filter(|host| !host.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}

pub fn router(state: IngestState) -> Router {
    Router::new()
        .route("/ingest", any(ingest))
        .route("/ingest/", any(ingest))
        .route("/ingest/*host", any(ingest))
        .route("/broadcast", post(broadcast))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn ingest(State(state): State<IngestState>, uri: Uri, body: Bytes) -> &'static str {
    let host = host_from_path(uri.path());
    tracing::debug!("Received session data from {}: {}", host, String::from_utf8_lossy(&body));

    let sessions = SessionTable::from_json_or_empty(&body);
    state.sink.sessions_updated(host, sessions);

    ACK_BODY
}

async fn broadcast(
    State(state): State<IngestState>,
    body: String,
) -> Result<&'static str, (StatusCode, String)> {
    let Some(broadcaster) = state.broadcaster.as_ref() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Broadcasting is not available".to_string(),
        ));
    };

    let message = body.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message is empty".to_string()));
    }

    match broadcaster.broadcast(message.to_string()).await {
        Ok(()) => Ok(ACK_BODY),
        Err(e) => {
            tracing::warn!("Failed to broadcast message: {:#}", e);
            Err((StatusCode::BAD_GATEWAY, format!("{:#}", e)))
        }
    }
}

/// Serve the ingest API until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    state: IngestState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind ingest listener on {}", addr))?;
    tracing::info!("Listening for session data on http://{}{}/", addr, INGEST_PREFIX);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Ingest server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_last_segment() {
        assert_eq!(host_from_path("/ingest/headless-1"), "headless-1");
        assert_eq!(host_from_path("/ingest/eu/headless-2"), "headless-2");
        assert_eq!(host_from_path("/ingest/headless-1/"), "headless-1");
    }

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(host_from_path("/ingest/my%20host"), "my host");
    }

    #[test]
    fn missing_segment_falls_back_to_unknown() {
        assert_eq!(host_from_path("/ingest"), UNKNOWN_HOST);
        assert_eq!(host_from_path("/ingest/"), UNKNOWN_HOST);
        assert_eq!(host_from_path("/ingest//"), UNKNOWN_HOST);
        assert_eq!(host_from_path("/ingest/%20"), UNKNOWN_HOST);
    }
}
