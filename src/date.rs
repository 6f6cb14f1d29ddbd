// planner/src/date.rs

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::model::IsoDate;

pub fn to_iso(date: NaiveDate) -> IsoDate {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

/// Strict `YYYY-MM-DD`. Rejects anything chrono would otherwise accept
/// loosely (missing zero padding, trailing time, out-of-range parts).
pub fn from_iso(s: &str) -> Option<NaiveDate> {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' { return None; }
    if !b.iter().enumerate().all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit()) { return None; }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[5..7].parse().ok()?;
    let day: u32 = s[8..10].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `None` when the result falls outside chrono's calendar.
pub fn checked_shift(date: NaiveDate, n: i64) -> Option<NaiveDate> {
    if n >= 0 {
        date.checked_add_days(Days::new(n as u64))
    } else {
        date.checked_sub_days(Days::new(n.unsigned_abs()))
    }
}

/// Saturating at the input date; only for UI navigation where an
/// out-of-range step is meaningless.
pub fn add_days(date: NaiveDate, n: i64) -> NaiveDate { checked_shift(date, n).unwrap_or(date) }

/// Monday-start week containing `date`, as (monday, sunday).
pub fn week_range(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let back = date.weekday().num_days_from_monday() as i64;
    let start = add_days(date, -back);
    (start, add_days(start, 6))
}

/// Wall-clock instant of the next midnight in `now`'s offset.
pub fn next_local_midnight(now: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let tomorrow = add_days(now.date_naive(), 1);
    let midnight = tomorrow.and_time(NaiveTime::MIN);
    now.offset()
        .from_local_datetime(&midnight)
        .single()
        .unwrap_or_else(|| *now + chrono::Duration::days(1))
}

/// Like [`next_local_midnight`], but re-derived with the offset in force at
/// that midnight, so a DST change later today does not shift it by an hour.
pub fn next_midnight_in(now: &DateTime<FixedOffset>, offset_at: impl Fn(&DateTime<Utc>) -> FixedOffset) -> DateTime<FixedOffset> {
    let guess = next_local_midnight(now);
    let offset = offset_at(&guess.to_utc());
    if offset == *guess.offset() { return guess; }
    let midnight = add_days(now.date_naive(), 1).and_time(NaiveTime::MIN);
    offset.from_local_datetime(&midnight).single().unwrap_or(guess)
}
