// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service construction and supervision.
//!
//! [`Services::start`] builds every component from the config and spawns
//! the long-running tasks under one root cancellation token. A fatal
//! signal (the SSE reader exceeding its reconnect budget) cancels the
//! root; shutdown then drains the script host, closes the bus with a
//! bounded timeout, and lets the database drop last.

use crate::bindings::Bindings;
use crate::config::Config;
use crate::health::{self, HealthInfo};
use crate::webhook::{PathMatcher, WebhookServer};
use lume_adapters::{
    Geocoder, GeocoderConfig, HttpConnector, HueClient, HueConfig, ReconnectConfig, SseError,
    SseReader,
};
use lume_core::{Kind, SystemClock};
use lume_engine::{
    ActionContext, ActionRegistry, AstroEvaluator, BusConfig, EventBus, Evaluator,
    FixedEvaluator, HostConfig, Invoker, GroupProvider, LightProvider, Orchestrator,
    OrchestratorConfig, Provider, ReconcileHandle, Scheduler, ScriptHost, SolarCalculator,
};
use lume_core::Clock;
use lume_storage::{Database, Geocache, KvStore, Ledger, MemoryKv, ResourceStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] lume_storage::StorageError),
    #[error("bridge client error: {0}")]
    Hue(#[from] lume_adapters::HueError),
    #[error("geocoder error: {0}")]
    Geo(#[from] lume_adapters::GeoError),
    #[error("invalid timezone '{0}'")]
    Timezone(String),
    #[error("schedule error: {0}")]
    Schedule(#[from] lume_engine::ScheduleError),
    #[error("binding webhook listener: {0}")]
    Listen(#[from] std::io::Error),
    #[error("event stream exceeded its reconnect budget")]
    MaxReconnectsExceeded,
}

/// Startup switches from the CLI.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Clear the resource-state table before starting
    pub reset_state: bool,
}

/// Handles to the running daemon.
pub struct Services {
    pub bindings: Arc<Bindings<SystemClock>>,
    pub cancel: CancellationToken,
    config: Config,
    bus: EventBus,
    host: Arc<ScriptHost>,
    tasks: Vec<JoinHandle<()>>,
    fatal_rx: tokio::sync::mpsc::Receiver<LifecycleError>,
    // Kept so the fatal channel never reads as closed when no component
    // holds a sender (e.g. SSE disabled)
    _fatal_tx: tokio::sync::mpsc::Sender<LifecycleError>,
}

impl Services {
    /// Build everything and spawn the background tasks.
    pub async fn start(config: Config, options: RunOptions) -> Result<Services, LifecycleError> {
        let cancel = CancellationToken::new();
        let clock = SystemClock;

        // Storage first: everything durable hangs off one database
        if let Some(parent) = config.database.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::open(&config.database.path)?;
        let ledger = Ledger::new(db.clone());
        let resources = ResourceStore::new(db.clone());
        let schedules = lume_storage::ScheduleStore::new(db.clone());
        let kv = KvStore::new(db.clone());
        let memory_kv = MemoryKv::new();
        let geocache = Geocache::new(db);

        if options.reset_state {
            let cleared = resources.clear(None)?;
            info!(cleared, "resource state reset");
        }

        let bus = EventBus::new(BusConfig {
            workers: config.events.bus.workers,
            queue_size: config.events.bus.queue_size,
        });
        let host = Arc::new(ScriptHost::start(HostConfig::default()));
        let registry = Arc::new(ActionRegistry::new());

        let hue = Arc::new(HueClient::new(&HueConfig {
            bridge: config.hue.bridge.clone(),
            token: config.hue.token.clone(),
            timeout: config.hue.timeout,
        })?);

        let evaluator = build_evaluator(&config, &geocache, clock.epoch_secs()).await?;

        // Orchestrator (or a detached handle when disabled)
        let groups = resources.typed(Kind::Group);
        let lights = resources.typed(Kind::Light);
        let (orchestrator, reconcile) = if config.reconciler.enabled {
            let providers: Vec<Arc<dyn Provider>> = vec![
                Arc::new(GroupProvider::new(groups.clone(), hue.clone())),
                Arc::new(LightProvider::new(lights.clone(), hue.clone())),
            ];
            let orchestrator = Arc::new(Orchestrator::new(
                OrchestratorConfig {
                    periodic_interval: (!config.reconciler.periodic_interval.is_zero())
                        .then_some(config.reconciler.periodic_interval),
                    debounce: config.reconciler.debounce,
                    rate_limit_rps: config.reconciler.rate_limit_rps,
                },
                providers,
            ));
            let handle = orchestrator.handle();
            (Some(orchestrator), handle)
        } else {
            (None, ReconcileHandle::detached())
        };

        let ctx_factory = context_factory(
            cancel.clone(),
            groups,
            lights,
            hue.clone(),
            reconcile.clone(),
            clock.clone(),
        );

        let invoker = Arc::new(Invoker::new(Arc::clone(&registry), ledger.clone(), clock.clone()));
        let scheduler = Arc::new(Scheduler::new(
            schedules,
            ledger.clone(),
            bus.clone(),
            evaluator,
            clock.clone(),
        ));

        let bindings = Arc::new(Bindings::new(
            Arc::clone(&host),
            Arc::clone(&invoker),
            Arc::clone(&scheduler),
            bus.clone(),
            kv.clone(),
            memory_kv.clone(),
            PathMatcher::new(),
            ctx_factory.clone(),
            clock.clone(),
        ));
        bindings.register_schedule_handler();

        // Boot recovery: replay interrupted stateful actions before the
        // scheduler considers misfires
        {
            let invoker = Arc::clone(&invoker);
            let ctx = ctx_factory();
            match host.run_sync(move || invoker.replay_orphans(&ctx)).await {
                Ok(Ok(replayed)) if replayed > 0 => info!(replayed, "orphaned actions replayed"),
                Ok(Ok(_)) => {}
                Ok(Err(err)) => warn!(error = %err, "orphan replay failed"),
                Err(err) => warn!(error = %err, "orphan replay not scheduled"),
            }
        }

        let mut tasks = Vec::new();
        let (fatal_tx, fatal_rx) = tokio::sync::mpsc::channel::<LifecycleError>(1);

        if config.events.scheduler.enabled {
            scheduler.recompute_all()?;
            scheduler.recover_misfires()?;
            let scheduler = Arc::clone(&scheduler);
            let token = cancel.clone();
            tasks.push(tokio::spawn(async move { scheduler.run(token).await }));
        }

        if let Some(orchestrator) = orchestrator {
            let token = cancel.clone();
            tasks.push(tokio::spawn(async move { orchestrator.run(token).await }));
        }

        if config.events.sse.enabled && !config.hue.bridge.is_empty() {
            let connector = HttpConnector::new(
                hue.http(),
                hue.eventstream_url().to_string(),
                hue.app_key().to_string(),
                bus.clone(),
            );
            let reader = SseReader::new(
                connector,
                ReconnectConfig {
                    min_backoff: config.events.sse.min_retry_backoff,
                    max_backoff: config.events.sse.max_retry_backoff,
                    multiplier: config.events.sse.retry_multiplier,
                    max_reconnects: config.events.sse.max_reconnects,
                },
            );
            let token = cancel.clone();
            let fatal = fatal_tx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(SseError::MaxReconnectsExceeded) = reader.run(token).await {
                    let _ = fatal.send(LifecycleError::MaxReconnectsExceeded).await;
                }
            }));
        }

        if config.events.webhook.enabled {
            let addr = format!("{}:{}", config.events.webhook.host, config.events.webhook.port);
            let listener = TcpListener::bind(&addr).await?;
            info!(addr, "webhook server listening");
            let server = WebhookServer::new(bindings.matcher(), bus.clone());
            let app = server.router().merge(health::router(HealthInfo {
                sse_enabled: config.events.sse.enabled,
                webhook_enabled: true,
                scheduler_enabled: config.events.scheduler.enabled,
                reconciler_enabled: config.reconciler.enabled,
            }));
            let token = cancel.clone();
            tasks.push(tokio::spawn(async move {
                let served = axum::serve(listener, app)
                    .with_graceful_shutdown(async move { token.cancelled().await })
                    .await;
                if let Err(err) = served {
                    warn!(error = %err, "webhook server exited");
                }
            }));
        }

        if config.ledger.enabled {
            let ledger = ledger.clone();
            let retention = config.ledger.retention_period;
            let interval = config.ledger.retention_interval;
            let token = cancel.clone();
            tasks.push(tokio::spawn(async move {
                retention_loop(ledger, retention, interval, token).await;
            }));
        }

        {
            let kv = kv.clone();
            let memory_kv = memory_kv.clone();
            let interval = config.kv.cleanup_interval;
            let token = cancel.clone();
            tasks.push(tokio::spawn(async move {
                kv_cleanup_loop(kv, memory_kv, interval, token).await;
            }));
        }

        info!("lume daemon started");
        Ok(Services { bindings, cancel, config, bus, host, tasks, fatal_rx, _fatal_tx: fatal_tx })
    }

    /// Block until shutdown is requested (signal) or a component turns
    /// fatal. Returns the fatal error, if any.
    pub async fn wait(&mut self) -> Option<LifecycleError> {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                None
            }
            fatal = self.fatal_rx.recv() => {
                if let Some(err) = &fatal {
                    warn!(error = %err, "fatal component error");
                }
                fatal
            }
            _ = self.cancel.cancelled() => None,
        }
    }

    /// Cancel everything and drain in order: host, bus, tasks, storage.
    pub async fn shutdown(self) {
        let timeout = self.config.shutdown_timeout;
        self.cancel.cancel();
        self.bindings.close();

        let host = Arc::clone(&self.host);
        let drained =
            tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || host.close()))
                .await;
        if drained.is_err() {
            warn!("script host did not drain within the shutdown timeout");
        }

        self.bus.close(timeout).await;

        for task in self.tasks {
            if tokio::time::timeout(timeout, task).await.is_err() {
                warn!("background task did not stop within the shutdown timeout");
            }
        }
        info!("lume daemon stopped");
    }
}

/// Full daemon lifecycle: start, wait, shutdown.
pub async fn run_daemon(config: Config, options: RunOptions) -> Result<(), LifecycleError> {
    let mut services = Services::start(config, options).await?;
    let fatal = services.wait().await;
    services.shutdown().await;
    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn build_evaluator(
    config: &Config,
    geocache: &Geocache,
    now: i64,
) -> Result<Arc<dyn Evaluator>, LifecycleError> {
    let geo = &config.events.scheduler.geo;
    let tz: chrono_tz::Tz =
        geo.timezone.parse().map_err(|_| LifecycleError::Timezone(geo.timezone.clone()))?;

    if !geo.enabled {
        return Ok(Arc::new(FixedEvaluator::new(tz)));
    }

    let (lat, lon) = match (geo.lat, geo.lon) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ if !geo.name.is_empty() => {
            let geocoder = Geocoder::new(
                GeocoderConfig {
                    timeout: geo.http_timeout,
                    use_cache: geo.use_cache,
                    ..Default::default()
                },
                Some(geocache.clone()),
            )?;
            match geocoder.resolve(&geo.name, now).await {
                Ok(entry) => (entry.latitude, entry.longitude),
                Err(err) => {
                    // Degrade to fixed-only: solar schedules will be
                    // rejected at define time instead of firing wrong
                    warn!(name = geo.name, error = %err,
                        "geocoding failed, solar expressions disabled");
                    return Ok(Arc::new(FixedEvaluator::new(tz)));
                }
            }
        }
        _ => {
            warn!("geo enabled without coordinates or name, solar expressions disabled");
            return Ok(Arc::new(FixedEvaluator::new(tz)));
        }
    };

    info!(lat, lon, tz = %tz, "solar evaluator configured");
    Ok(Arc::new(AstroEvaluator::new(lat, lon, tz, SolarCalculator::new())))
}

fn context_factory(
    cancel: CancellationToken,
    groups: lume_storage::TypedStore<lume_core::GroupDesired>,
    lights: lume_storage::TypedStore<lume_core::LightDesired>,
    hue: Arc<HueClient>,
    reconcile: ReconcileHandle,
    clock: SystemClock,
) -> Arc<dyn Fn() -> ActionContext + Send + Sync> {
    Arc::new(move || {
        let clock = clock.clone();
        ActionContext::new(
            cancel.child_token(),
            groups.clone(),
            lights.clone(),
            hue.clone(),
            reconcile.clone(),
            Arc::new(move || clock.epoch_secs()),
        )
    })
}

async fn retention_loop(
    ledger: Ledger,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
        let cutoff = chrono::Utc::now().timestamp() - retention.as_secs() as i64;
        match ledger.delete_older_than(cutoff) {
            Ok(0) => {}
            Ok(pruned) => info!(pruned, "ledger entries pruned"),
            Err(err) => warn!(error = %err, "ledger retention sweep failed"),
        }
    }
}

async fn kv_cleanup_loop(
    kv: KvStore,
    memory_kv: MemoryKv,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
        let now = chrono::Utc::now().timestamp();
        match kv.purge_expired(now) {
            Ok(0) => {}
            Ok(purged) => info!(purged, "expired kv entries purged"),
            Err(err) => warn!(error = %err, "kv cleanup sweep failed"),
        }
        memory_kv.purge_expired(now);
    }
}
