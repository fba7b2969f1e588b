// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lume-core: shared types for the lume lighting daemon

pub mod clock;
pub mod event;
pub mod ledger;
pub mod resource;
pub mod schedule;
pub mod timeexpr;
pub mod value;

pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{BusEvent, EventType};
pub use ledger::{LedgerEntry, LedgerEntryType};
pub use resource::{
    xy_within_tolerance, GroupActual, GroupDesired, Kind, LightActual, LightDesired, ResourceKey,
};
pub use schedule::{
    occurrence_id, parse_occurrence_id, MisfirePolicy, ScheduleDefinition, ScheduleOccurrence,
};
pub use timeexpr::{parse_duration, parse_time_expr, SolarBase, TimeExpr, TimeExprError};
pub use value::{Value, ValueMap};
