// planner/src/focus.rs

use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{
    clock::Clock,
    date::{add_days, from_iso, to_iso, week_range},
    decode::FOCUS_PLACEHOLDER,
    event::{emit, EventSender, StoreEvent},
    model::IsoDate,
    persist::PersistenceGateway,
};

/// Seven Monday-start days around some date.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeekView {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<IsoDate>,
    today: IsoDate,
}

impl WeekView {
    /// Compares against the real current day, not the focus day.
    pub fn is_today(&self, day: &str) -> bool { day == self.today }
}

#[derive(Debug)]
struct Dates {
    today: IsoDate,
    focus: IsoDate,
}

struct Inner {
    clock: Arc<dyn Clock>,
    dates: RwLock<Dates>,
    events: EventSender,
    gateway: PersistenceGateway<IsoDate>,
}

impl Inner {
    fn set_focus(&self, iso: IsoDate) {
        {
            let mut d = self.dates.write();
            if d.focus == iso { return; }
            d.focus = iso.clone();
        }
        self.gateway.schedule(iso.clone());
        emit(&self.events, StoreEvent::FocusChanged(iso));
    }

    /// Re-reads the clock; on a new day moves both today and focus to it.
    fn roll(&self) -> bool {
        let now = to_iso(self.clock.today());
        {
            let mut d = self.dates.write();
            if d.today == now { return false; }
            d.today = now.clone();
        }
        info!(today = %now, "day rolled over");
        emit(&self.events, StoreEvent::TodayChanged(now.clone()));
        self.set_focus(now);
        true
    }
}

/// Tracks the current local day and the day the user is looking at. One
/// timer, armed for the next local midnight, keeps `today` current.
pub struct FocusTracker {
    inner: Arc<Inner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl FocusTracker {
    /// `stored` is the decoded persisted focus; missing or placeholder means today.
    pub fn new(clock: Arc<dyn Clock>, stored: Option<IsoDate>, gateway: PersistenceGateway<IsoDate>, events: EventSender) -> Self {
        let today = to_iso(clock.today());
        let focus = stored.filter(|f| f != FOCUS_PLACEHOLDER).unwrap_or_else(|| today.clone());
        let inner = Inner { clock, dates: RwLock::new(Dates { today, focus }), events, gateway };
        Self { inner: Arc::new(inner), timer: Mutex::new(None) }
    }

    pub fn today(&self) -> IsoDate { self.inner.dates.read().today.clone() }
    pub fn focus(&self) -> IsoDate { self.inner.dates.read().focus.clone() }

    /// Plain setter; callers pass valid ISO dates.
    pub fn set_focus(&self, iso: impl Into<IsoDate>) { self.inner.set_focus(iso.into()); }

    pub fn go_to_today(&self) { self.inner.set_focus(self.today()); }

    /// Moves focus by `n` days (negative goes back).
    pub fn shift_focus(&self, n: i64) {
        let base = from_iso(&self.focus()).unwrap_or_else(|| self.inner.clock.today());
        self.inner.set_focus(to_iso(add_days(base, n)));
    }

    pub fn is_today(&self, day: &str) -> bool { self.inner.dates.read().today == day }

    /// The week containing `iso`; an unparsable date falls back to today.
    pub fn week(&self, iso: &str) -> WeekView {
        let date = from_iso(iso).unwrap_or_else(|| self.inner.clock.today());
        let (start, end) = week_range(date);
        let days = (0..7).map(|i| to_iso(add_days(start, i))).collect();
        WeekView { start, end, days, today: self.today() }
    }

    /// Picks up a day change immediately, e.g. after the host resumes.
    pub fn refresh(&self) -> bool { self.inner.roll() }

    /// Arms the midnight timer. Needs a tokio runtime; without one the
    /// tracker only moves on `refresh()`.
    pub fn start(&self) {
        let mut timer = self.timer.lock();
        if timer.as_ref().is_some_and(|t| !t.is_finished()) { return; }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime; midnight timer not armed");
            return;
        };
        let inner = Arc::clone(&self.inner);
        *timer = Some(handle.spawn(async move {
            loop {
                let next = inner.clock.next_midnight();
                let delay = (next - inner.clock.now()).to_std().unwrap_or(Duration::ZERO);
                debug!(secs = delay.as_secs(), "midnight timer armed");
                tokio::time::sleep(delay).await;
                inner.roll();
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(t) = self.timer.lock().take() { t.abort(); }
    }

    pub fn timer_active(&self) -> bool { self.timer.lock().as_ref().is_some_and(|t| !t.is_finished()) }

    pub fn flush(&self) -> crate::error::Result<()> { self.inner.gateway.flush() }
}

impl Drop for FocusTracker {
    fn drop(&mut self) { self.stop(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::FixedClock, persist::log_persist_error, storage::{MemoryStorage, Storage}};

    fn tracker(clock: Arc<FixedClock>, stored: Option<&str>) -> (Arc<MemoryStorage>, FocusTracker) {
        let storage = Arc::new(MemoryStorage::new());
        let gw = PersistenceGateway::new(storage.clone(), "focus", Duration::ZERO, log_persist_error());
        (storage, FocusTracker::new(clock, stored.map(Into::into), gw, crate::event::channel()))
    }

    #[test]
    fn placeholder_focus_resolves_to_today() {
        let clock = Arc::new(FixedClock::at("2024-06-01T10:00:00+02:00"));
        let (_, t) = tracker(clock.clone(), Some(""));
        assert_eq!(t.focus(), "2024-06-01");
        let (_, t) = tracker(clock, Some("2024-05-20"));
        assert_eq!(t.focus(), "2024-05-20");
        assert_eq!(t.today(), "2024-06-01");
    }

    #[test]
    fn week_is_monday_based_and_checks_today() {
        let clock = Arc::new(FixedClock::at("2024-06-01T10:00:00+00:00"));
        let (_, t) = tracker(clock, None);
        t.set_focus("2024-05-20");
        let w = t.week("2024-05-30");
        assert_eq!(w.days.first().map(String::as_str), Some("2024-05-27"));
        assert_eq!(w.days.last().map(String::as_str), Some("2024-06-02"));
        assert!(w.is_today("2024-06-01"));
        assert!(!w.is_today("2024-05-20"));
    }

    #[test]
    fn refresh_moves_today_and_focus_and_persists() {
        let clock = Arc::new(FixedClock::at("2024-06-01T23:59:00+00:00"));
        let (storage, t) = tracker(clock.clone(), None);
        assert!(!t.refresh());
        clock.advance(chrono::Duration::minutes(2));
        assert!(t.refresh());
        assert_eq!(t.today(), "2024-06-02");
        assert_eq!(t.focus(), "2024-06-02");
        assert_eq!(storage.get("focus").unwrap().as_deref(), Some("\"2024-06-02\""));
    }

    /// Central European time around the 2024 spring-forward switch.
    struct SpringForwardClock {
        start: chrono::DateTime<chrono::Utc>,
        anchor: tokio::time::Instant,
    }

    impl Clock for SpringForwardClock {
        fn now(&self) -> chrono::DateTime<chrono::FixedOffset> {
            let at = self.start + chrono::Duration::from_std(self.anchor.elapsed()).unwrap();
            at.with_timezone(&self.offset_at(&at))
        }

        fn offset_at(&self, at: &chrono::DateTime<chrono::Utc>) -> chrono::FixedOffset {
            let switch = chrono::DateTime::parse_from_rfc3339("2024-03-31T01:00:00Z").unwrap().to_utc();
            let hours = if *at < switch { 1 } else { 2 };
            chrono::FixedOffset::east_opt(hours * 3600).unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_at_midnight_after_an_offset_change() {
        let start = chrono::DateTime::parse_from_rfc3339("2024-03-31T00:30:00Z").unwrap().to_utc();
        let clock = Arc::new(SpringForwardClock { start, anchor: tokio::time::Instant::now() });
        let storage = Arc::new(MemoryStorage::new());
        let gw = PersistenceGateway::new(storage, "focus", Duration::ZERO, log_persist_error());
        let t = FocusTracker::new(clock, None, gw, crate::event::channel());
        assert_eq!(t.today(), "2024-03-31");
        t.start();

        // Local midnight is 22:00 UTC once summer time is in force.
        tokio::time::sleep(Duration::from_secs(21 * 3600 + 30 * 60 + 1)).await;
        assert_eq!(t.today(), "2024-04-01");
        assert_eq!(t.focus(), "2024-04-01");
        t.stop();
    }

    #[test]
    fn shift_focus_walks_days() {
        let clock = Arc::new(FixedClock::at("2024-03-01T08:00:00+00:00"));
        let (_, t) = tracker(clock, None);
        t.shift_focus(-1);
        assert_eq!(t.focus(), "2024-02-29");
        t.go_to_today();
        assert_eq!(t.focus(), "2024-03-01");
    }
}
