// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness endpoint

use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Instant;

/// Static component flags reported by `/healthz`.
#[derive(Debug, Clone)]
pub struct HealthInfo {
    pub sse_enabled: bool,
    pub webhook_enabled: bool,
    pub scheduler_enabled: bool,
    pub reconciler_enabled: bool,
}

struct HealthState {
    started: Instant,
    info: HealthInfo,
}

/// Routes merged onto the webhook listener by the supervisor.
pub fn router(info: HealthInfo) -> Router {
    let state = Arc::new(HealthState { started: Instant::now(), info });
    Router::new().route(
        "/healthz",
        get(move || {
            let state = Arc::clone(&state);
            async move {
                Json(serde_json::json!({
                    "status": "ok",
                    "uptime_secs": state.started.elapsed().as_secs(),
                    "components": {
                        "sse": state.info.sse_enabled,
                        "webhook": state.info.webhook_enabled,
                        "scheduler": state.info.scheduler_enabled,
                        "reconciler": state.info.reconciler_enabled,
                    },
                }))
            }
        }),
    )
}
