//! HTTP webhook receivers.
//!
//! Handlers keep no state between requests apart from the shared
//! accumulator, which must accept concurrent writes.

pub mod kong;

use crate::accumulator::Accumulator;
use crate::config::KongConfig;
use axum::{body::Body, extract::State, http::StatusCode, routing::post, Router};
use chrono::Utc;
use kong::RequestEvent;
use std::sync::Arc;

/// POST endpoint for Kong http-log events.
#[derive(Debug, Clone)]
pub struct KongWebhook {
    path: String,
    max_body_bytes: usize,
}

/// Router state shared by every request to one endpoint.
#[derive(Clone)]
struct KongState {
    acc: Arc<dyn Accumulator>,
    max_body_bytes: usize,
}

impl KongWebhook {
    pub fn new(config: &KongConfig) -> Self {
        let path = if config.path.starts_with('/') {
            config.path.clone()
        } else {
            format!("/{}", config.path)
        };
        Self {
            path,
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Mount the handler on `router`. Every event is forwarded to `acc`.
    pub fn register(&self, router: Router, acc: Arc<dyn Accumulator>) -> Router {
        tracing::info!(
            path = %self.path(),
            max_body_bytes = self.max_body_bytes,
            "started kong webhook"
        );
        let state = KongState {
            acc,
            max_body_bytes: self.max_body_bytes,
        };
        router.route(self.path(), post(kong_event).with_state(state))
    }
}

/// 200 with an empty body once the event is handed to the accumulator,
/// 400 if the body is too large or can't be read or decoded.
async fn kong_event(State(state): State<KongState>, body: Body) -> StatusCode {
    // The body is consumed here whatever the outcome.
    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "failed to read kong webhook body");
            return StatusCode::BAD_REQUEST;
        }
    };

    let event = match RequestEvent::decode(&bytes) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(error = %e, "rejected kong webhook body");
            return StatusCode::BAD_REQUEST;
        }
    };

    state.acc.add_metric(event.to_metric(Utc::now()));
    StatusCode::OK
}
