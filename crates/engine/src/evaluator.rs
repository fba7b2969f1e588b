// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Next/previous occurrence computation for time expressions.
//!
//! Two evaluators share one trait: [`FixedEvaluator`] handles wall-clock
//! expressions only and rejects solar ones (no geo configuration), while
//! [`AstroEvaluator`] adds solar bases through a [`SolarCalculator`].
//!
//! DST behavior for fixed expressions: a local time that does not exist
//! on a date (spring-forward gap) yields no occurrence that day; an
//! ambiguous local time (fall-back overlap) resolves to the earlier of
//! the two instants.

use crate::solar::SolarCalculator;
use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use lume_core::TimeExpr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("solar time expressions require geo configuration")]
    SolarUnsupported,
}

/// Computes occurrences of a [`TimeExpr`] in a fixed timezone.
pub trait Evaluator: Send + Sync {
    fn timezone(&self) -> Tz;

    /// The expression's instant on the given local date, if it exists.
    fn evaluate(&self, expr: &TimeExpr, date: NaiveDate)
        -> Result<Option<DateTime<Utc>>, EvalError>;

    /// How many consecutive days a scan may cover.
    fn scan_days(&self) -> u32;

    /// Smallest occurrence strictly after `after`.
    fn next(
        &self,
        expr: &TimeExpr,
        after: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, EvalError> {
        let tz = self.timezone();
        // Start one day back: an offset expression evaluated on the
        // previous date can still land after `after`.
        let start = after.with_timezone(&tz).date_naive() - Days::new(1);
        for i in 0..=(self.scan_days() as u64) {
            let date = start + Days::new(i);
            if let Some(t) = self.evaluate(expr, date)? {
                if t > after {
                    return Ok(Some(t));
                }
            }
        }
        Ok(None)
    }

    /// Largest occurrence strictly before `before`.
    fn prev(
        &self,
        expr: &TimeExpr,
        before: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, EvalError> {
        let tz = self.timezone();
        let start = before.with_timezone(&tz).date_naive() + Days::new(1);
        for i in 0..=(self.scan_days() as u64) {
            let date = start - Days::new(i);
            if let Some(t) = self.evaluate(expr, date)? {
                if t < before {
                    return Ok(Some(t));
                }
            }
        }
        Ok(None)
    }
}

/// Resolve a wall-clock time on a local date to an instant.
fn evaluate_fixed(tz: Tz, date: NaiveDate, hour: u8, minute: u8) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(hour as u32, minute as u32, 0)?;
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(t) => Some(t.with_timezone(&Utc)),
        // Fall-back overlap: take the earlier instant
        chrono::LocalResult::Ambiguous(earlier, _) => Some(earlier.with_timezone(&Utc)),
        // Spring-forward gap: the time does not exist on this date
        chrono::LocalResult::None => None,
    }
}

/// Fixed-only evaluator; never consults solar data.
#[derive(Clone)]
pub struct FixedEvaluator {
    tz: Tz,
}

impl FixedEvaluator {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Evaluator for FixedEvaluator {
    fn timezone(&self) -> Tz {
        self.tz
    }

    fn evaluate(
        &self,
        expr: &TimeExpr,
        date: NaiveDate,
    ) -> Result<Option<DateTime<Utc>>, EvalError> {
        match expr {
            TimeExpr::Fixed { hour, minute } => Ok(evaluate_fixed(self.tz, date, *hour, *minute)),
            TimeExpr::Solar { .. } => Err(EvalError::SolarUnsupported),
        }
    }

    fn scan_days(&self) -> u32 {
        // A fixed expression resolves within a day of the scan start,
        // except when a spring-forward gap swallows one candidate; two
        // days out covers that too.
        3
    }
}

/// Astronomical evaluator over a location.
#[derive(Clone)]
pub struct AstroEvaluator {
    tz: Tz,
    latitude: f64,
    longitude: f64,
    calc: SolarCalculator,
}

impl AstroEvaluator {
    pub fn new(latitude: f64, longitude: f64, tz: Tz, calc: SolarCalculator) -> Self {
        Self { tz, latitude, longitude, calc }
    }
}

impl Evaluator for AstroEvaluator {
    fn timezone(&self) -> Tz {
        self.tz
    }

    fn evaluate(
        &self,
        expr: &TimeExpr,
        date: NaiveDate,
    ) -> Result<Option<DateTime<Utc>>, EvalError> {
        match expr {
            TimeExpr::Fixed { hour, minute } => Ok(evaluate_fixed(self.tz, date, *hour, *minute)),
            TimeExpr::Solar { base, offset_secs } => {
                let times = self.calc.times(self.latitude, self.longitude, date, self.tz);
                Ok(times
                    .for_base(*base)
                    .map(|t| (t + chrono::Duration::seconds(*offset_secs)).with_timezone(&Utc)))
            }
        }
    }

    fn scan_days(&self) -> u32 {
        // A polar location can go months without an event; a full year
        // bounds the scan.
        366
    }
}

#[cfg(test)]
#[path = "evaluator_tests.rs"]
mod tests;
