// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The surface user scripts drive the daemon through.
//!
//! The embedded interpreter is a single-threaded guest; each binding
//! here is safe to call from its thread and routes any user callback
//! back onto the script host. Subscriptions wire bus events through a
//! collector and an optional reducer into an action invocation; the
//! reducer and the action body both run on the host.

use crate::webhook::{PathMatcher, PathPattern, WebhookError};
use lume_core::{BusEvent, Clock, EventType, Value};
use lume_engine::{
    ActionContext, Collector, CollectorSpec, EventBus, FlushFn, Invoker, InvokeError,
    InvokeParams, RequestMeta, ScheduleError, ScheduleSpec, Scheduler, ScriptHost,
    ClosestStrategy, Action, CaptureFn, ExecuteFn,
};
use lume_storage::{KvStore, MemoryKv, StorageError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Turns a batch of events into one action-argument value. Runs on the
/// script host.
pub type Reducer = Arc<dyn Fn(&[BusEvent]) -> Value + Send + Sync>;

/// One event-source subscription.
pub struct SubscriptionSpec {
    pub event_type: EventType,
    pub collector: CollectorSpec,
    /// Defaults to "first event's data becomes the arguments"
    pub reducer: Option<Reducer>,
    pub action: String,
    /// Use the batch's leading `event_id` as the idempotency key
    pub deduped: bool,
}

/// Everything a script can reach.
pub struct Bindings<C: Clock> {
    host: Arc<ScriptHost>,
    invoker: Arc<Invoker<C>>,
    scheduler: Arc<Scheduler<C>>,
    bus: EventBus,
    kv: KvStore,
    memory_kv: MemoryKv,
    matcher: PathMatcher,
    ctx_factory: Arc<dyn Fn() -> ActionContext + Send + Sync>,
    collectors: Mutex<Vec<Collector>>,
    clock: C,
}

impl<C: Clock> Bindings<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: Arc<ScriptHost>,
        invoker: Arc<Invoker<C>>,
        scheduler: Arc<Scheduler<C>>,
        bus: EventBus,
        kv: KvStore,
        memory_kv: MemoryKv,
        matcher: PathMatcher,
        ctx_factory: Arc<dyn Fn() -> ActionContext + Send + Sync>,
        clock: C,
    ) -> Self {
        Self {
            host,
            invoker,
            scheduler,
            bus,
            kv,
            memory_kv,
            matcher,
            ctx_factory,
            collectors: Mutex::new(Vec::new()),
            clock,
        }
    }

    // --- actions ---

    pub fn define_action(&self, name: &str, execute: ExecuteFn) -> Result<(), InvokeError> {
        self.invoker.registry().register(Action::new(name, execute))
    }

    pub fn define_stateful_action(
        &self,
        name: &str,
        capture: CaptureFn,
        execute: ExecuteFn,
    ) -> Result<(), InvokeError> {
        self.invoker.registry().register(Action::stateful(name, capture, execute))
    }

    /// Invoke an action immediately from script code (no dedupe key).
    pub fn invoke(&self, name: &str, args: &Value) -> Result<(), InvokeError> {
        let ctx = (self.ctx_factory)();
        self.invoker.invoke(&ctx, InvokeParams::manual(name, args))
    }

    // --- scheduling ---

    pub fn define_schedule(&self, spec: ScheduleSpec) -> Result<(), ScheduleError> {
        self.scheduler.define(spec)
    }

    pub fn disable_schedule(&self, id: &str) -> Result<bool, ScheduleError> {
        self.scheduler.disable(id)
    }

    pub fn run_closest(
        &self,
        tags: &[&str],
        strategy: ClosestStrategy,
    ) -> Result<Option<String>, ScheduleError> {
        self.scheduler.run_closest(tags, strategy)
    }

    // --- event subscriptions ---

    /// Wire an event source through a collector into an action.
    pub fn subscribe(&self, spec: SubscriptionSpec) {
        let host = Arc::clone(&self.host);
        let invoker = Arc::clone(&self.invoker);
        let ctx_factory = Arc::clone(&self.ctx_factory);
        let reducer = spec.reducer.clone();
        let action = spec.action.clone();
        let deduped = spec.deduped;
        let source = spec.event_type.as_str();

        let on_flush: FlushFn = Arc::new(move |batch: Vec<BusEvent>| {
            if batch.is_empty() {
                return;
            }
            let invoker = Arc::clone(&invoker);
            let ctx_factory = Arc::clone(&ctx_factory);
            let reducer = reducer.clone();
            let action = action.clone();
            host.enqueue(move || {
                let args = match &reducer {
                    Some(reduce) => reduce(&batch),
                    None => Value::Map(batch[0].data.clone()),
                };
                let key = if deduped {
                    batch[0].str_field("event_id").unwrap_or("").to_string()
                } else {
                    String::new()
                };
                let ctx = ctx_factory();
                let params = InvokeParams {
                    name: &action,
                    args: &args,
                    idempotency_key: &key,
                    source,
                    def_id: "",
                };
                if let Err(err) = invoker.invoke(&ctx, params) {
                    warn!(action, error = %err, "subscription action failed");
                }
            });
        });

        let collector = Collector::new(spec.collector, on_flush);
        let push = collector.clone();
        self.bus.subscribe(spec.event_type, Arc::new(move |event| push.push(event.clone())));
        self.collectors.lock().push(collector);
        debug!(event_type = %spec.event_type, action = spec.action, "subscription registered");
    }

    /// Route `(method, pattern)` webhooks to an action. Path captures
    /// and the JSON body merge into the action arguments; the webhook
    /// event id dedupes redelivery.
    pub fn on_webhook(
        &self,
        method: &str,
        pattern: &str,
        action: &str,
    ) -> Result<(), WebhookError> {
        let pattern = PathPattern::parse(pattern)?;
        self.matcher.register(method, pattern.clone());

        let host = Arc::clone(&self.host);
        let invoker = Arc::clone(&self.invoker);
        let ctx_factory = Arc::clone(&self.ctx_factory);
        let action = action.to_string();
        let method = method.to_ascii_uppercase();

        self.bus.subscribe(EventType::Webhook, Arc::new(move |event| {
            if event.str_field("method").unwrap_or("") != method {
                return;
            }
            let path = event.str_field("path").unwrap_or("");
            if pattern.match_path(path).is_none() {
                return;
            }
            let invoker = Arc::clone(&invoker);
            let ctx_factory = Arc::clone(&ctx_factory);
            let action = action.clone();
            let event = event.clone();
            host.enqueue(move || {
                // Body JSON is the base; path captures override
                let mut args = event
                    .get("json")
                    .cloned()
                    .unwrap_or(Value::Null)
                    .into_map();
                if let Some(params) = event.get("path_params").and_then(Value::as_map) {
                    for (name, value) in params {
                        args.insert(name.clone(), value.clone());
                    }
                }
                let args = Value::Map(args);
                let key = event.str_field("event_id").unwrap_or("").to_string();

                let ctx = ctx_factory().with_request(request_meta(&event));
                let params = InvokeParams {
                    name: &action,
                    args: &args,
                    idempotency_key: &key,
                    source: "webhook",
                    def_id: "",
                };
                if let Err(err) = invoker.invoke(&ctx, params) {
                    warn!(action, error = %err, "webhook action failed");
                }
            });
        }));
        Ok(())
    }

    /// Invoke schedule events through the host and the invoker. The
    /// occurrence id is the idempotency key, which makes each firing
    /// at-most-once across restarts.
    pub fn register_schedule_handler(&self) {
        let host = Arc::clone(&self.host);
        let invoker = Arc::clone(&self.invoker);
        let ctx_factory = Arc::clone(&self.ctx_factory);

        self.bus.subscribe(EventType::Schedule, Arc::new(move |event| {
            let action = event.str_field("action_name").unwrap_or("").to_string();
            if action.is_empty() {
                warn!("schedule event without action name");
                return;
            }
            let args = event.get("action_args").cloned().unwrap_or(Value::Null);
            let key = event.str_field("occurrence_id").unwrap_or("").to_string();
            let def_id = event.str_field("schedule_id").unwrap_or("").to_string();
            let source = event.str_field("source").unwrap_or("scheduler").to_string();

            let invoker = Arc::clone(&invoker);
            let ctx_factory = Arc::clone(&ctx_factory);
            host.enqueue(move || {
                let ctx = ctx_factory();
                let params = InvokeParams {
                    name: &action,
                    args: &args,
                    idempotency_key: &key,
                    source: &source,
                    def_id: &def_id,
                };
                if let Err(err) = invoker.invoke(&ctx, params) {
                    warn!(action, key, error = %err, "scheduled action failed");
                }
            });
        }));
    }

    // --- KV buckets ---

    pub fn kv_put(
        &self,
        bucket: &str,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        self.kv.put(bucket, key, value, ttl, self.clock.epoch_secs())
    }

    pub fn kv_get(&self, bucket: &str, key: &str) -> Result<Option<Value>, StorageError> {
        self.kv.get(bucket, key, self.clock.epoch_secs())
    }

    pub fn kv_delete(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        self.kv.delete(bucket, key)
    }

    pub fn kv_keys(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        self.kv.keys(bucket, self.clock.epoch_secs())
    }

    /// Non-durable variant of the KV bucket API.
    pub fn cache_put(&self, bucket: &str, key: &str, value: Value, ttl: Option<Duration>) {
        self.memory_kv.put(bucket, key, value, ttl, self.clock.epoch_secs());
    }

    pub fn cache_get(&self, bucket: &str, key: &str) -> Option<Value> {
        self.memory_kv.get(bucket, key, self.clock.epoch_secs())
    }

    // --- misc helpers ---

    /// Script logging, tagged so it is distinguishable from daemon logs.
    pub fn log(&self, level: &str, message: &str) {
        match level {
            "debug" => debug!(target: "script", "{message}"),
            "warn" => warn!(target: "script", "{message}"),
            "error" => error!(target: "script", "{message}"),
            _ => info!(target: "script", "{message}"),
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.epoch_secs()
    }

    /// The webhook route registry, shared with the HTTP server.
    pub fn matcher(&self) -> PathMatcher {
        self.matcher.clone()
    }

    /// Stop collector timers. Called during shutdown.
    pub fn close(&self) {
        for collector in self.collectors.lock().drain(..) {
            collector.close();
        }
    }
}

fn request_meta(event: &BusEvent) -> RequestMeta {
    let string_map = |value: Option<&Value>| -> BTreeMap<String, String> {
        value
            .and_then(Value::as_map)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    };
    RequestMeta {
        method: event.str_field("method").unwrap_or("").to_string(),
        path: event.str_field("path").unwrap_or("").to_string(),
        headers: string_map(event.get("headers")),
        path_params: string_map(event.get("path_params")),
    }
}

#[cfg(test)]
#[path = "bindings_tests.rs"]
mod tests;
