// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridge event stream: SSE framing, typed extraction, reconnect loop.
//!
//! The reader holds one long-lived `GET /eventstream/clip/v2` open and
//! turns stream items into bus events. Any I/O error or non-200 response
//! backs off exponentially and reconnects; a clean end of stream resets
//! the backoff. When `max_reconnects` is exceeded the error is fatal and
//! the supervisor shuts the process down.

use crate::hue::types::{EventEnvelope, EventItem};
use async_trait::async_trait;
use futures_util::StreamExt;
use lume_core::{BusEvent, Value, ValueMap};
use lume_engine::EventBus;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SseError {
    #[error("event stream connect failed: {0}")]
    Connect(String),
    #[error("event stream returned status {0}")]
    Status(u16),
    #[error("event stream read failed: {0}")]
    Read(String),
    #[error("maximum reconnect attempts exceeded")]
    MaxReconnectsExceeded,
}

/// Backoff policy for the reconnect loop.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// 0 means retry forever
    pub max_reconnects: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            max_reconnects: 0,
        }
    }
}

/// One attempt at holding the stream open. Returns `Ok` when the stream
/// ended cleanly or the token fired; `Err` triggers a backoff.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, cancel: &CancellationToken) -> Result<(), SseError>;
}

#[async_trait]
impl<T: StreamConnector + ?Sized> StreamConnector for std::sync::Arc<T> {
    async fn connect(&self, cancel: &CancellationToken) -> Result<(), SseError> {
        (**self).connect(cancel).await
    }
}

/// Reconnecting SSE reader over any connector.
pub struct SseReader<C: StreamConnector> {
    connector: C,
    config: ReconnectConfig,
}

impl<C: StreamConnector> SseReader<C> {
    pub fn new(connector: C, config: ReconnectConfig) -> Self {
        Self { connector, config }
    }

    /// Run until cancelled. The only error this returns is
    /// [`SseError::MaxReconnectsExceeded`]; everything else retries.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SseError> {
        let mut backoff = self.config.min_backoff;
        let mut retries: u32 = 0;
        info!("event stream reader started");
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match self.connector.connect(&cancel).await {
                Ok(()) => {
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    // Stream ended cleanly: start fresh
                    retries = 0;
                    backoff = self.config.min_backoff;
                    debug!("event stream ended cleanly, reconnecting");
                }
                Err(err) => {
                    retries += 1;
                    if self.config.max_reconnects > 0 && retries > self.config.max_reconnects {
                        warn!(retries, "event stream giving up");
                        return Err(SseError::MaxReconnectsExceeded);
                    }
                    warn!(error = %err, retries, backoff_ms = backoff.as_millis() as u64,
                        "event stream disconnected, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = Duration::from_secs_f64(
                        (backoff.as_secs_f64() * self.config.multiplier)
                            .min(self.config.max_backoff.as_secs_f64()),
                    );
                }
            }
        }
    }
}

/// Incremental SSE frame assembly.
///
/// Feed raw bytes in; completed event bodies come out. Lines starting
/// with `data:` accumulate into the body; a blank line terminates the
/// event; comment lines (`: hi` greeting) and other fields are ignored.
#[derive(Default)]
pub struct FrameParser {
    line_buf: String,
    data: String,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk; returns any event bodies completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut complete = Vec::new();
        self.line_buf.push_str(&String::from_utf8_lossy(chunk));
        while let Some(newline) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if !self.data.is_empty() {
                    complete.push(std::mem::take(&mut self.data));
                }
            } else if let Some(payload) = line.strip_prefix("data:") {
                self.data.push_str(payload.strip_prefix(' ').unwrap_or(payload));
            } else if line.starts_with(':') {
                // Comment, e.g. the ": hi" greeting
            } else {
                // Other SSE fields (event:, id:) are not used by the bridge
            }
        }
        complete
    }
}

/// Parse one completed frame body into bus events.
///
/// The body is a JSON array of envelopes, each carrying typed resource
/// updates. Unknown item types are skipped; a malformed body logs and
/// yields nothing.
pub fn parse_frame(body: &str) -> Vec<BusEvent> {
    let envelopes: Vec<EventEnvelope> = match serde_json::from_str(body) {
        Ok(envelopes) => envelopes,
        Err(err) => {
            warn!(error = %err, "malformed event stream frame, skipping");
            return Vec::new();
        }
    };
    let mut events = Vec::new();
    for envelope in envelopes {
        for item in &envelope.data {
            if let Some(event) = extract_item(item, &envelope.creationtime) {
                events.push(event);
            }
        }
    }
    events
}

fn extract_item(item: &EventItem, creationtime: &str) -> Option<BusEvent> {
    match item.item_type.as_str() {
        "button" => {
            let report = item.button.as_ref()?.button_report.as_ref()?;
            let event_id = format!("{}-{}", item.id, report.updated);
            Some(BusEvent::button(&item.id, &report.event, &event_id))
        }
        "relative_rotary" => {
            let last = item.relative_rotary.as_ref()?.last_event.as_ref()?;
            let rotation = last.rotation.as_ref()?;
            let event_id = format!("{}-{}", item.id, creationtime);
            Some(BusEvent::rotary(
                &item.id,
                &last.action,
                &rotation.direction,
                rotation.steps,
                rotation.duration,
                &event_id,
            ))
        }
        "zigbee_connectivity" => {
            let status = item.status.as_deref()?;
            let device_id = item.owner.as_ref().map(|o| o.rid.as_str()).unwrap_or(&item.id);
            Some(BusEvent::connectivity(device_id, status))
        }
        "light" | "grouped_light" => {
            let mut data = ValueMap::new();
            data.insert("resource_id".into(), item.id.as_str().into());
            data.insert("resource_type".into(), item.item_type.as_str().into());
            if let Some(on) = &item.on {
                data.insert("power".into(), on.on.into());
            }
            if let Some(dimming) = &item.dimming {
                data.insert("brightness".into(), dimming.brightness.into());
            }
            if let Some(ct) = item.color_temperature.as_ref().and_then(|c| c.mirek) {
                data.insert("color_temp_mirek".into(), Value::Int(ct as i64));
            }
            if let Some(xy) = item.color.as_ref().and_then(|c| c.xy.as_ref()) {
                data.insert("color_x".into(), xy.x.into());
                data.insert("color_y".into(), xy.y.into());
            }
            if let Some(owner) = &item.owner {
                data.insert("owner_rid".into(), owner.rid.as_str().into());
                data.insert("owner_rtype".into(), owner.rtype.as_str().into());
            }
            Some(BusEvent::light_change(data))
        }
        _ => None,
    }
}

/// Production connector: holds the HTTPS stream open and publishes
/// parsed events to the bus.
pub struct HttpConnector {
    client: reqwest::Client,
    url: String,
    app_key: String,
    bus: EventBus,
}

impl HttpConnector {
    pub fn new(client: reqwest::Client, url: String, app_key: String, bus: EventBus) -> Self {
        Self { client, url, app_key, bus }
    }
}

#[async_trait]
impl StreamConnector for HttpConnector {
    async fn connect(&self, cancel: &CancellationToken) -> Result<(), SseError> {
        let response = self
            .client
            .get(&self.url)
            .header("hue-application-key", &self.app_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|err| SseError::Connect(err.to_string()))?;
        let status = response.status();
        if status.as_u16() != 200 {
            return Err(SseError::Status(status.as_u16()));
        }
        info!("event stream connected");

        let mut parser = FrameParser::new();
        let mut stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                chunk = stream.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    for body in parser.push(&bytes) {
                        for event in parse_frame(&body) {
                            self.bus.publish(event);
                        }
                    }
                }
                Some(Err(err)) => return Err(SseError::Read(err.to_string())),
                None => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
