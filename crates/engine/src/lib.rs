// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lume-engine: the event-driven core of the lume daemon.
//!
//! Events from the bridge, webhooks, and the scheduler flow through the
//! [`bus`], get batched by [`collect`] middlewares, and land on the
//! single-threaded [`host`] where user actions run. Actions update
//! desired state through [`builders`]; the [`reconcile`] orchestrator
//! then drives the bridge until actual state converges.

pub mod builders;
pub mod bus;
pub mod collect;
pub mod evaluator;
pub mod host;
pub mod invoke;
pub mod reconcile;
pub mod registry;
pub mod sched;
pub mod solar;

pub use builders::{GroupStateBuilder, LightStateBuilder, PendingChanges, StagedChange};
pub use bus::{BusConfig, EventBus, Handler};
pub use collect::{Collector, CollectorSpec, FlushFn};
pub use evaluator::{AstroEvaluator, EvalError, Evaluator, FixedEvaluator};
pub use host::{HostConfig, HostError, ScriptHost};
pub use invoke::{ActionContext, ActualReader, InvokeError, InvokeParams, Invoker, RequestMeta};
pub use reconcile::{
    determine_group_action, GroupAction, GroupApplier, GroupProvider, GroupResource,
    LightApplier, LightProvider, LightResource, Orchestrator, OrchestratorConfig, Provider,
    RateLimiter, ReconcileError, ReconcileHandle, Resource,
};
pub use registry::{Action, ActionRegistry, CaptureFn, ExecuteFn};
pub use sched::{ClosestStrategy, ScheduleError, ScheduleSpec, Scheduler};
pub use solar::{SolarCalculator, SolarTimes};
