// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed pub/sub with a bounded, panic-isolated worker pool.
//!
//! Delivery is best-effort: a full queue or a closing bus drops the
//! event with a warning instead of blocking the publisher. High-rate
//! producers (rotary dials) are expected to sit behind a collector
//! middleware rather than lean on backpressure.

use lume_core::{BusEvent, EventType};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Subscriber callback. Handlers must not block; anything that needs the
/// interpreter submits work to the script host instead.
pub type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Worker pool sizing.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub workers: usize,
    pub queue_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { workers: 4, queue_size: 100 }
    }
}

struct WorkItem {
    event: BusEvent,
    handler: Handler,
}

/// The event bus. Cheap to clone; all clones share the same pool.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    handlers: RwLock<HashMap<EventType, Vec<Handler>>>,
    work_tx: Mutex<Option<mpsc::Sender<WorkItem>>>,
    closing: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBus {
    /// Create the bus and spawn its workers on the current runtime.
    pub fn new(config: BusConfig) -> Self {
        let (work_tx, work_rx) = mpsc::channel::<WorkItem>(config.queue_size.max(1));
        let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));

        let mut workers = Vec::with_capacity(config.workers.max(1));
        for worker_id in 0..config.workers.max(1) {
            let work_rx = Arc::clone(&work_rx);
            workers.push(tokio::spawn(async move {
                loop {
                    let item = { work_rx.lock().await.recv().await };
                    let Some(item) = item else { break };
                    let result = catch_unwind(AssertUnwindSafe(|| (item.handler)(&item.event)));
                    if let Err(panic) = result {
                        warn!(
                            worker_id,
                            event_type = %item.event.event_type,
                            "event handler panicked: {}",
                            panic_message(&panic)
                        );
                    }
                }
                debug!(worker_id, "bus worker exited");
            }));
        }

        Self {
            inner: Arc::new(BusInner {
                handlers: RwLock::new(HashMap::new()),
                work_tx: Mutex::new(Some(work_tx)),
                closing: AtomicBool::new(false),
                workers: Mutex::new(workers),
            }),
        }
    }

    /// Register a handler for an event type. Handlers for a type run in
    /// registration order, spread across workers.
    pub fn subscribe(&self, event_type: EventType, handler: Handler) {
        self.inner.handlers.write().entry(event_type).or_default().push(handler);
    }

    /// Publish an event to all subscribers of its type.
    ///
    /// Returns the number of handler invocations enqueued. Never blocks:
    /// enqueue failures (closing bus, full queue) drop with a warning.
    pub fn publish(&self, event: BusEvent) -> usize {
        if self.inner.closing.load(Ordering::Acquire) {
            warn!(event_type = %event.event_type, "bus closing, dropping event");
            return 0;
        }
        let handlers = {
            let map = self.inner.handlers.read();
            map.get(&event.event_type).cloned().unwrap_or_default()
        };
        if handlers.is_empty() {
            debug!(event_type = %event.event_type, "no subscribers");
            return 0;
        }

        let tx = {
            let guard = self.inner.work_tx.lock();
            guard.clone()
        };
        let Some(tx) = tx else {
            warn!(event_type = %event.event_type, "bus closed, dropping event");
            return 0;
        };

        let mut enqueued = 0;
        for handler in handlers {
            match tx.try_send(WorkItem { event: event.clone(), handler }) {
                Ok(()) => enqueued += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(event_type = %event.event_type, "bus queue full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(event_type = %event.event_type, "bus closed, dropping event");
                }
            }
        }
        enqueued
    }

    /// Stop accepting publishes and wait up to `timeout` for the workers
    /// to drain the queue.
    pub async fn close(&self, timeout: Duration) {
        self.inner.closing.store(true, Ordering::Release);
        // Dropping the sender lets workers drain remaining items and exit
        self.inner.work_tx.lock().take();
        let workers = std::mem::take(&mut *self.inner.workers.lock());
        let drain = async {
            for worker in workers {
                let _ = worker.await;
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("bus close timed out before workers drained");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
