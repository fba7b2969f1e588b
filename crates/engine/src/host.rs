// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The script host: one thread that runs all user code.
//!
//! Action bodies, reducers, and user callbacks all execute here, one at
//! a time. That single-writer discipline is what makes the interpreter
//! state and the read-modify-write desired-state updates safe without
//! further locking. Work arrives over a bounded queue; submission from
//! bus workers never blocks.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// A unit of work for the host thread.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("script host is closed")]
    Closed,
    #[error("work item was dropped before completing")]
    Dropped,
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub queue_size: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self { queue_size: 256 }
    }
}

/// Handle to the host thread, shared behind an `Arc`. `close` drains
/// the queue and joins the thread.
pub struct ScriptHost {
    tx: Mutex<Option<mpsc::Sender<Work>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ScriptHost {
    /// Spawn the host thread.
    pub fn start(config: HostConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<Work>(config.queue_size.max(1));
        let thread = std::thread::Builder::new()
            .name("script-host".to_string())
            .spawn(move || {
                while let Some(work) = rx.blocking_recv() {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(work)) {
                        let message = panic
                            .downcast_ref::<String>()
                            .map(String::as_str)
                            .or_else(|| panic.downcast_ref::<&str>().copied())
                            .unwrap_or("unknown panic");
                        warn!("script work panicked: {message}");
                    }
                }
                debug!("script host drained and exited");
            })
            .ok();

        Self { tx: Mutex::new(Some(tx)), thread: Mutex::new(thread) }
    }

    fn sender(&self) -> Option<mpsc::Sender<Work>> {
        self.tx.lock().clone()
    }

    /// Non-blocking submit; drops the work (returning `false`) when the
    /// host is closing or the queue is full.
    pub fn try_submit(&self, work: impl FnOnce() + Send + 'static) -> bool {
        let Some(tx) = self.sender() else {
            warn!("script host closed, dropping work");
            return false;
        };
        match tx.try_send(Box::new(work)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("script host queue full, dropping work");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("script host closed, dropping work");
                false
            }
        }
    }

    /// Guaranteed-unless-closed submit that still never blocks the
    /// caller: a full queue falls back to an async send on a spawned
    /// task. Used where correctness requires delivery (scheduler
    /// firings), from contexts that must not block (bus workers).
    pub fn enqueue(&self, work: impl FnOnce() + Send + 'static) -> bool {
        let Some(tx) = self.sender() else {
            warn!("script host closed, dropping work");
            return false;
        };
        match tx.try_send(Box::new(work)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(work)) => {
                tokio::spawn(async move {
                    if tx.send(work).await.is_err() {
                        warn!("script host closed before queued work was accepted");
                    }
                });
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("script host closed, dropping work");
                false
            }
        }
    }

    /// Run `f` on the host and await its result.
    pub async fn run_sync<R, F>(&self, f: F) -> Result<R, HostError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let Some(tx) = self.sender() else { return Err(HostError::Closed) };
        let (result_tx, result_rx) = oneshot::channel();
        let work: Work = Box::new(move || {
            let _ = result_tx.send(f());
        });
        tx.send(work).await.map_err(|_| HostError::Closed)?;
        result_rx.await.map_err(|_| HostError::Dropped)
    }

    /// Stop accepting work; the host thread drains the queue and exits.
    /// Blocks until the thread has finished.
    pub fn close(&self) {
        self.tx.lock().take();
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                warn!("script host thread terminated abnormally");
            }
        }
    }
}

impl Drop for ScriptHost {
    fn drop(&mut self) {
        self.tx.lock().take();
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
