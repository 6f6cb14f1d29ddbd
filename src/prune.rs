// planner/src/prune.rs

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use std::sync::Arc;

use crate::{
    clock::{Clock, SystemClock},
    date::{checked_shift, from_iso},
    model::{DayMap, PlannerDays},
};

pub const DEFAULT_MAX_AGE_DAYS: i64 = 365;

/// The "now" a prune is measured from.
#[derive(Clone, Debug)]
pub enum Reference {
    At(DateTime<FixedOffset>),
    Date(NaiveDate),
    /// `YYYY-MM-DD` (taken as a local date) or RFC 3339.
    Text(String),
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Reference {
    fn from(at: DateTime<Tz>) -> Self { Self::At(at.fixed_offset()) }
}
impl From<NaiveDate> for Reference {
    fn from(d: NaiveDate) -> Self { Self::Date(d) }
}
impl From<&str> for Reference {
    fn from(s: &str) -> Self { Self::Text(s.to_string()) }
}
impl From<String> for Reference {
    fn from(s: String) -> Self { Self::Text(s) }
}

impl Reference {
    /// Calendar date in the reference's own offset.
    pub fn local_date(&self) -> Option<NaiveDate> {
        match self {
            Self::At(at) => Some(at.date_naive()),
            Self::Date(d) => Some(*d),
            Self::Text(s) => from_iso(s).or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|at| at.date_naive())),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PruneOptions {
    pub max_age_days: Option<i64>,
    pub now: Option<Reference>,
}

impl PruneOptions {
    pub fn max_age_days(mut self, days: i64) -> Self { self.max_age_days = Some(days); self }
    pub fn now(mut self, now: impl Into<Reference>) -> Self { self.now = Some(now.into()); self }
}

/// Oldest date that survives: the local date of `now` minus the window.
/// Working on calendar dates keeps the boundary day regardless of offset.
/// `None` (prune nothing) when the window reaches past the calendar.
pub fn cutoff_date(now: &Reference, max_age_days: i64) -> Option<NaiveDate> {
    checked_shift(now.local_date()?, max_age_days.checked_neg()?)
}

/// Removes days strictly older than the cutoff. Keys that are not ISO dates
/// are left alone. Returns `days` itself (same `Arc`) when nothing goes.
pub fn prune_old_days(days: &PlannerDays, opts: PruneOptions) -> PlannerDays {
    let max_age = opts.max_age_days.unwrap_or(DEFAULT_MAX_AGE_DAYS);
    if max_age < 0 || days.is_empty() { return Arc::clone(days); }
    let now = opts.now.unwrap_or_else(|| Reference::At(SystemClock.now()));
    let Some(cutoff) = cutoff_date(&now, max_age) else { return Arc::clone(days) };

    let expired = |iso: &str| from_iso(iso).is_some_and(|d| d < cutoff);
    if !days.keys().any(|k| expired(k)) {
        return Arc::clone(days);
    }
    let kept: DayMap = days
        .iter()
        .filter(|(iso, _)| !expired(iso))
        .map(|(iso, day)| (iso.clone(), Arc::clone(day)))
        .collect();
    Arc::new(kept)
}
