// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-subscription event accumulators.
//!
//! A collector sits between the bus and a subscription's reducer and
//! decides when a batch is ready. Count and immediate collectors flush
//! inline on the publishing worker; quiet and interval collectors flush
//! from their timer task. The flush continuation receives the whole
//! batch and is expected to hand it to the script host.

use lume_core::BusEvent;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Batch continuation invoked on flush.
pub type FlushFn = Arc<dyn Fn(Vec<BusEvent>) + Send + Sync>;

/// Flush policy for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorSpec {
    /// Every event is its own batch, flushed synchronously
    Immediate,
    /// Flush when the buffer reaches `n` events
    Count(usize),
    /// Flush after this much silence since the last event
    Quiet(Duration),
    /// Flush once per window, armed by the first event in it
    Interval(Duration),
}

/// Accumulates events and flushes batches per its [`CollectorSpec`].
#[derive(Clone)]
pub struct Collector {
    inner: Arc<CollectorInner>,
}

struct CollectorInner {
    spec: CollectorSpec,
    on_flush: FlushFn,
    buf: Mutex<Vec<BusEvent>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Monotonic generation for quiet-timer resets: a sleeping timer
    /// only flushes if no newer event bumped the generation.
    generation: AtomicU64,
    closed: AtomicBool,
}

impl Collector {
    pub fn new(spec: CollectorSpec, on_flush: FlushFn) -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                spec,
                on_flush,
                buf: Mutex::new(Vec::new()),
                timer: Mutex::new(None),
                generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn immediate(on_flush: FlushFn) -> Self {
        Self::new(CollectorSpec::Immediate, on_flush)
    }

    pub fn count(n: usize, on_flush: FlushFn) -> Self {
        Self::new(CollectorSpec::Count(n.max(1)), on_flush)
    }

    pub fn quiet(window: Duration, on_flush: FlushFn) -> Self {
        Self::new(CollectorSpec::Quiet(window), on_flush)
    }

    pub fn interval(window: Duration, on_flush: FlushFn) -> Self {
        Self::new(CollectorSpec::Interval(window), on_flush)
    }

    /// Feed one event in. May flush inline (immediate/count) or arm a
    /// timer (quiet/interval); timer flushes run on a spawned task.
    pub fn push(&self, event: BusEvent) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        match self.inner.spec {
            CollectorSpec::Immediate => {
                (self.inner.on_flush)(vec![event]);
            }
            CollectorSpec::Count(n) => {
                let batch = {
                    let mut buf = self.inner.buf.lock();
                    buf.push(event);
                    if buf.len() >= n {
                        Some(std::mem::take(&mut *buf))
                    } else {
                        None
                    }
                };
                if let Some(batch) = batch {
                    (self.inner.on_flush)(batch);
                }
            }
            CollectorSpec::Quiet(window) => {
                self.inner.buf.lock().push(event);
                let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
                let inner = Arc::clone(&self.inner);
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(window).await;
                    if inner.closed.load(Ordering::Acquire) {
                        return;
                    }
                    // A newer event re-armed the window; let its timer flush
                    if inner.generation.load(Ordering::Acquire) != generation {
                        return;
                    }
                    let batch = std::mem::take(&mut *inner.buf.lock());
                    if !batch.is_empty() {
                        (inner.on_flush)(batch);
                    }
                });
                if let Some(old) = self.inner.timer.lock().replace(handle) {
                    old.abort();
                }
            }
            CollectorSpec::Interval(window) => {
                self.inner.buf.lock().push(event);
                let mut timer = self.inner.timer.lock();
                if timer.as_ref().is_some_and(|t| !t.is_finished()) {
                    return;
                }
                let inner = Arc::clone(&self.inner);
                *timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(window).await;
                    if inner.closed.load(Ordering::Acquire) {
                        return;
                    }
                    let batch = std::mem::take(&mut *inner.buf.lock());
                    if !batch.is_empty() {
                        (inner.on_flush)(batch);
                    }
                }));
            }
        }
    }

    /// Stop timers; buffered events are discarded.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.abort();
        }
        self.inner.buf.lock().clear();
    }
}

#[cfg(test)]
#[path = "collect_tests.rs"]
mod tests;
