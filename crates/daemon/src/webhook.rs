// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Webhook receiver.
//!
//! A single HTTP server whose whole routing table is the [`PathMatcher`]:
//! script subscriptions register `(method, pattern)` pairs, and any
//! request that matches one becomes a `webhook` bus event. Body JSON is
//! parsed best-effort; a non-JSON body is not an error, the `json` field
//! is just null.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use lume_core::{BusEvent, Value, ValueMap};
use lume_engine::EventBus;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("invalid path pattern '{0}'")]
    BadPattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A path pattern of literal segments and `{name}` captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a pattern like `/group/{id}/toggle`.
    pub fn parse(pattern: &str) -> Result<Self, WebhookError> {
        if !pattern.starts_with('/') {
            return Err(WebhookError::BadPattern(pattern.to_string()));
        }
        let mut segments = Vec::new();
        for part in pattern.trim_matches('/').split('/').filter(|p| !p.is_empty()) {
            if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if name.is_empty() {
                    return Err(WebhookError::BadPattern(pattern.to_string()));
                }
                segments.push(Segment::Param(name.to_string()));
            } else if part.contains(['{', '}']) {
                return Err(WebhookError::BadPattern(pattern.to_string()));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }
        Ok(Self { raw: pattern.to_string(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a concrete path, extracting captures. Segment counts must
    /// match exactly.
    pub fn match_path(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let parts: Vec<&str> =
            path.trim_matches('/').split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = BTreeMap::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }
        Some(params)
    }
}

/// Shared registry of webhook routes.
#[derive(Clone, Default)]
pub struct PathMatcher {
    routes: Arc<RwLock<Vec<(String, PathPattern)>>>,
}

impl PathMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, method: &str, pattern: PathPattern) {
        debug!(method, pattern = pattern.as_str(), "webhook route registered");
        self.routes.write().push((method.to_ascii_uppercase(), pattern));
    }

    /// First matching route's captures, if any.
    pub fn matches(&self, method: &str, path: &str) -> Option<BTreeMap<String, String>> {
        let method = method.to_ascii_uppercase();
        let routes = self.routes.read();
        routes
            .iter()
            .filter(|(m, _)| *m == method)
            .find_map(|(_, pattern)| pattern.match_path(path))
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}

struct ServerState {
    matcher: PathMatcher,
    bus: EventBus,
}

/// The webhook HTTP server.
pub struct WebhookServer {
    state: Arc<ServerState>,
}

impl WebhookServer {
    pub fn new(matcher: PathMatcher, bus: EventBus) -> Self {
        Self { state: Arc::new(ServerState { matcher, bus }) }
    }

    /// The whole HTTP surface; the supervisor merges the health routes
    /// in and serves the result.
    pub fn router(&self) -> Router {
        Router::new().fallback(handle).with_state(Arc::clone(&self.state))
    }
}

async fn handle(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let Some(path_params) = state.matcher.matches(method.as_str(), &path) else {
        debug!(%method, path, "no matching webhook");
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "no matching webhook"})),
        )
            .into_response();
    };

    let body_text = String::from_utf8_lossy(&body).to_string();
    // Parse failure is non-fatal: json stays null
    let json = serde_json::from_str::<serde_json::Value>(&body_text)
        .map(Value::from_json)
        .unwrap_or(Value::Null);

    let mut header_map = ValueMap::new();
    for (name, value) in &headers {
        if let Ok(text) = value.to_str() {
            header_map.insert(name.as_str().to_string(), text.into());
        }
    }

    let mut params_map = ValueMap::new();
    for (name, value) in &path_params {
        params_map.insert(name.clone(), value.as_str().into());
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let event_id = format!("webhook-{path}-{nanos}");

    let mut data = ValueMap::new();
    data.insert("method".into(), method.as_str().into());
    data.insert("path".into(), path.as_str().into());
    data.insert("body".into(), body_text.into());
    data.insert("json".into(), json);
    data.insert("headers".into(), Value::Map(header_map));
    data.insert("path_params".into(), Value::Map(params_map));
    data.insert("event_id".into(), event_id.as_str().into());

    if state.bus.publish(BusEvent::webhook(data)) == 0 {
        warn!(path, "webhook event had no subscribers or was dropped");
    }

    (StatusCode::OK, Json(serde_json::json!({"status": "accepted"}))).into_response()
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
