// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scripted resource: converges after `steps_left` steps, optionally
/// failing every load.
#[derive(Clone)]
struct FakeSpec {
    version: i64,
    steps_left: Arc<AtomicUsize>,
    fail_load: bool,
}

struct FakeResource {
    key: ResourceKey,
    spec: FakeSpec,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Resource for FakeResource {
    fn key(&self) -> ResourceKey {
        self.key.clone()
    }

    async fn load(&mut self) -> Result<(), ReconcileError> {
        self.log.lock().push(format!("load({})", self.key));
        if self.spec.fail_load {
            return Err(ReconcileError::Bridge("connection refused".into()));
        }
        Ok(())
    }

    fn needs_reconcile(&self) -> bool {
        self.spec.steps_left.load(Ordering::SeqCst) > 0
    }

    async fn reconcile_step(&mut self) -> Result<bool, ReconcileError> {
        let left = self.spec.steps_left.fetch_sub(1, Ordering::SeqCst) - 1;
        self.log.lock().push(format!("step({})", self.key));
        Ok(left == 0)
    }

    fn desired_version(&self) -> i64 {
        self.spec.version
    }
}

#[derive(Default)]
struct FakeProvider {
    resources: Mutex<HashMap<String, FakeSpec>>,
    log: Arc<Mutex<Vec<String>>>,
    list_calls: AtomicUsize,
}

impl FakeProvider {
    fn insert(&self, id: &str, version: i64, steps: usize) -> FakeSpec {
        let spec = FakeSpec {
            version,
            steps_left: Arc::new(AtomicUsize::new(steps)),
            fail_load: false,
        };
        self.resources.lock().insert(id.to_string(), spec.clone());
        spec
    }

    fn make(&self, id: &str, spec: FakeSpec) -> Box<dyn Resource> {
        Box::new(FakeResource {
            key: ResourceKey::group(id),
            spec,
            log: Arc::clone(&self.log),
        })
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn kind(&self) -> Kind {
        Kind::Group
    }

    fn list_dirty(
        &self,
        last_versions: &HashMap<String, i64>,
    ) -> Result<Vec<Box<dyn Resource>>, ReconcileError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let resources = self.resources.lock();
        Ok(resources
            .iter()
            .filter(|(id, spec)| spec.version > last_versions.get(*id).copied().unwrap_or(0))
            .map(|(id, spec)| self.make(id, spec.clone()))
            .collect())
    }

    fn get(&self, id: &str) -> Result<Box<dyn Resource>, ReconcileError> {
        let spec = self.resources.lock().get(id).cloned().unwrap_or(FakeSpec {
            version: 0,
            steps_left: Arc::new(AtomicUsize::new(0)),
            fail_load: false,
        });
        Ok(self.make(id, spec))
    }

    fn list_all_ids(&self) -> Result<Vec<String>, ReconcileError> {
        Ok(self.resources.lock().keys().cloned().collect())
    }

    fn clear_caches(&self) {}
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        periodic_interval: None,
        debounce: Duration::ZERO,
        rate_limit_rps: 0.0,
    }
}

#[tokio::test]
async fn converged_resource_is_not_revisited() {
    let provider = Arc::new(FakeProvider::default());
    provider.insert("a", 3, 1);
    let orch = Orchestrator::new(config(), vec![provider.clone()]);
    let cancel = CancellationToken::new();

    orch.reconcile_all(&cancel).await.unwrap();
    let first_pass = provider.log.lock().clone();
    assert_eq!(first_pass, vec!["load(group/a)", "step(group/a)"]);

    // Version was advanced; the next pass sees nothing dirty
    provider.log.lock().clear();
    orch.reconcile_all(&cancel).await.unwrap();
    assert!(provider.log.lock().is_empty());
}

#[tokio::test]
async fn already_converged_resource_advances_without_steps() {
    let provider = Arc::new(FakeProvider::default());
    provider.insert("a", 1, 0);
    let orch = Orchestrator::new(config(), vec![provider.clone()]);
    let cancel = CancellationToken::new();

    orch.reconcile_all(&cancel).await.unwrap();
    assert_eq!(*provider.log.lock(), vec!["load(group/a)"]);

    provider.log.lock().clear();
    orch.reconcile_all(&cancel).await.unwrap();
    assert!(provider.log.lock().is_empty(), "no PUT and no revisit when converged");
}

#[tokio::test]
async fn failed_resource_is_retried_next_pass() {
    let provider = Arc::new(FakeProvider::default());
    provider.insert("a", 1, 1);
    if let Some(spec) = provider.resources.lock().get_mut("a") {
        spec.fail_load = true;
    }

    let orch = Orchestrator::new(config(), vec![provider.clone()]);
    let cancel = CancellationToken::new();

    orch.reconcile_all(&cancel).await.unwrap();
    // Load failed; version must not advance
    provider.log.lock().clear();
    orch.reconcile_all(&cancel).await.unwrap();
    assert_eq!(*provider.log.lock(), vec!["load(group/a)"], "still dirty after failure");
}

#[tokio::test]
async fn failure_on_one_resource_does_not_abort_the_pass() {
    let provider = Arc::new(FakeProvider::default());
    provider.insert("bad", 1, 1);
    if let Some(spec) = provider.resources.lock().get_mut("bad") {
        spec.fail_load = true;
    }
    provider.insert("good", 1, 1);

    let orch = Orchestrator::new(config(), vec![provider.clone()]);
    orch.reconcile_all(&CancellationToken::new()).await.unwrap();

    let log = provider.log.lock();
    assert!(log.contains(&"step(group/good)".to_string()), "good resource still reconciled");
}

#[tokio::test]
async fn pending_resource_is_reconciled_even_when_clean() {
    let provider = Arc::new(FakeProvider::default());
    provider.insert("a", 1, 0);
    let orch = Orchestrator::new(config(), vec![provider.clone()]);
    let cancel = CancellationToken::new();

    // First pass marks it seen
    orch.reconcile_all(&cancel).await.unwrap();
    provider.log.lock().clear();

    // Explicit per-resource trigger forces a revisit despite the version
    orch.handle().trigger_resource(ResourceKey::group("a"));
    orch.reconcile_all(&cancel).await.unwrap();
    assert_eq!(*provider.log.lock(), vec!["load(group/a)"]);
}

#[tokio::test]
async fn multi_step_resource_runs_to_done_in_one_pass() {
    let provider = Arc::new(FakeProvider::default());
    provider.insert("fsm", 1, 3);
    let orch = Orchestrator::new(config(), vec![provider.clone()]);

    orch.reconcile_all(&CancellationToken::new()).await.unwrap();
    let steps =
        provider.log.lock().iter().filter(|l| l.starts_with("step")).count();
    assert_eq!(steps, 3);
}

#[tokio::test(start_paused = true)]
async fn triggers_within_debounce_collapse_into_one_pass() {
    let provider = Arc::new(FakeProvider::default());
    provider.insert("a", 1, 0);
    let orch = Arc::new(Orchestrator::new(
        OrchestratorConfig {
            periodic_interval: None,
            debounce: Duration::from_millis(100),
            rate_limit_rps: 0.0,
        },
        vec![provider.clone()],
    ));
    let handle = orch.handle();
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let runner = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run(run_cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.trigger();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.trigger();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.trigger();
    // Quiet long enough for the debounce to expire once
    tokio::time::sleep(Duration::from_millis(200)).await;

    cancel.cancel();
    runner.await.unwrap();
    assert_eq!(
        provider.list_calls.load(Ordering::SeqCst),
        1,
        "three rapid triggers collapse into one pass"
    );
}
