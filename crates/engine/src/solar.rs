// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Solar event times from the NOAA solar position equations.
//!
//! Sunrise/sunset use the standard zenith of 90.833 degrees (accounts
//! for atmospheric refraction); dawn/dusk use civil twilight at 96
//! degrees (sun elevation -6). In polar conditions where an event does
//! not occur on a date, its slot is `None` and schedule evaluation
//! skips that day. Results are cached per (lat, lon, date, tz).

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use lume_core::SolarBase;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

/// Zenith angle for sunrise/sunset, degrees.
const ZENITH_OFFICIAL: f64 = 90.833;
/// Zenith angle for civil twilight (dawn/dusk), degrees.
const ZENITH_CIVIL: f64 = 96.0;

/// Solar event instants for one date at one location.
#[derive(Debug, Clone, PartialEq)]
pub struct SolarTimes {
    pub dawn: Option<DateTime<Tz>>,
    pub sunrise: Option<DateTime<Tz>>,
    pub noon: DateTime<Tz>,
    pub sunset: Option<DateTime<Tz>>,
    pub dusk: Option<DateTime<Tz>>,
    /// Solar midnight preceding the noon
    pub midnight: DateTime<Tz>,
}

impl SolarTimes {
    /// The instant for a schedule base, when it exists on this date.
    pub fn for_base(&self, base: SolarBase) -> Option<DateTime<Tz>> {
        match base {
            SolarBase::Dawn => self.dawn,
            SolarBase::Sunrise => self.sunrise,
            SolarBase::Noon => Some(self.noon),
            SolarBase::Sunset => self.sunset,
            SolarBase::Dusk => self.dusk,
        }
    }
}

#[derive(PartialEq, Eq, Hash)]
struct CacheKey {
    lat_bits: u64,
    lon_bits: u64,
    date: NaiveDate,
    tz: Tz,
}

/// Computes and caches solar times for a location.
#[derive(Clone, Default)]
pub struct SolarCalculator {
    cache: Arc<Mutex<HashMap<CacheKey, SolarTimes>>>,
}

impl SolarCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solar times for the local calendar date `date` in `tz`.
    pub fn times(&self, lat: f64, lon: f64, date: NaiveDate, tz: Tz) -> SolarTimes {
        let key = CacheKey { lat_bits: lat.to_bits(), lon_bits: lon.to_bits(), date, tz };
        if let Some(hit) = self.cache.lock().get(&key) {
            return hit.clone();
        }
        let times = compute_times(lat, lon, date, tz);
        self.cache.lock().insert(key, times.clone());
        times
    }
}

fn compute_times(lat: f64, lon: f64, date: NaiveDate, tz: Tz) -> SolarTimes {
    // Anchor on the UTC day containing this local date's civil noon so
    // extreme timezones still land on the right solar day.
    let civil_noon_utc = local_noon_utc(date, tz);
    let utc_date = civil_noon_utc.date_naive();

    let gamma = fractional_year(utc_date);
    let eqtime = equation_of_time_minutes(gamma);
    let decl = solar_declination(gamma);

    let noon_minutes = 720.0 - 4.0 * lon - eqtime;
    let noon_utc = utc_midnight(utc_date) + duration_minutes(noon_minutes);

    let official = hour_angle_degrees(lat, decl, ZENITH_OFFICIAL);
    let civil = hour_angle_degrees(lat, decl, ZENITH_CIVIL);

    let event = |ha: Option<f64>, sign: f64| {
        ha.map(|deg| {
            let minutes = 720.0 - 4.0 * (lon + sign * deg) - eqtime;
            (utc_midnight(utc_date) + duration_minutes(minutes)).with_timezone(&tz)
        })
    };

    SolarTimes {
        dawn: event(civil, 1.0),
        sunrise: event(official, 1.0),
        noon: noon_utc.with_timezone(&tz),
        sunset: event(official, -1.0),
        dusk: event(civil, -1.0),
        midnight: (noon_utc - Duration::hours(12)).with_timezone(&tz),
    }
}

/// Hour angle in degrees for the given zenith, `None` when the sun never
/// crosses it on this date (polar night or midnight sun).
fn hour_angle_degrees(lat: f64, decl: f64, zenith_deg: f64) -> Option<f64> {
    let lat_rad = lat.to_radians();
    let zenith_rad = zenith_deg.to_radians();
    let cos_ha =
        (zenith_rad.cos() - lat_rad.sin() * decl.sin()) / (lat_rad.cos() * decl.cos());
    if !(-1.0..=1.0).contains(&cos_ha) {
        return None;
    }
    Some(cos_ha.acos().to_degrees())
}

/// Fractional year in radians, evaluated at local solar noon.
fn fractional_year(date: NaiveDate) -> f64 {
    let day_of_year = date.ordinal() as f64;
    let days_in_year = if date.leap_year() { 366.0 } else { 365.0 };
    2.0 * PI / days_in_year * (day_of_year - 1.0)
}

/// NOAA equation of time, minutes.
fn equation_of_time_minutes(gamma: f64) -> f64 {
    229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin())
}

/// NOAA solar declination, radians.
fn solar_declination(gamma: f64) -> f64 {
    0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin()
}

fn local_noon_utc(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_hms_opt(12, 0, 0).unwrap_or_default();
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(t) | chrono::LocalResult::Ambiguous(t, _) => {
            t.with_timezone(&Utc)
        }
        // Noon inside a DST gap cannot happen in practice; fall back to
        // interpreting the naive time as UTC.
        chrono::LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}

fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

fn duration_minutes(minutes: f64) -> Duration {
    Duration::seconds((minutes * 60.0).round() as i64)
}

#[cfg(test)]
#[path = "solar_tests.rs"]
mod tests;
