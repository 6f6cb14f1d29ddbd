// planner/src/store.rs

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{
    clock::{Clock, SystemClock},
    config::{Config, DEFAULT_DEBOUNCE_MS, DEFAULT_NAMESPACE},
    day_ops,
    decode::{decode_focus, decode_planner_days, decode_selection, parse_raw, sanitize_reminder},
    error::Result,
    event::{self, emit, EventSender, StoreEvent},
    focus::{FocusTracker, WeekView},
    index::{Applied, DaysUpdate},
    legacy::{migrate_legacy, migrate_prefixes},
    model::{uid, DayRecord, IsoDate, PlannerDays, Project, Reminder, Selection, SelectionMap, Task, TaskIndex},
    persist::{log_persist_error, PersistErrorHook, PersistenceGateway},
    prune::{prune_old_days, PruneOptions, DEFAULT_MAX_AGE_DAYS},
    selection::{cleanup_selections, select_project, select_task},
    storage::{FileStorage, Storage},
};

pub const DAYS_KEY: &str = "planner:days";
pub const FOCUS_KEY: &str = "planner:focus";
pub const SELECTED_KEY: &str = "planner:selected";

#[derive(Clone)]
pub struct StoreOptions {
    /// Prepended to the day, focus and selection keys.
    pub namespace: String,
    pub debounce: Duration,
    pub max_age_days: i64,
    pub on_persist_error: PersistErrorHook,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            on_persist_error: log_persist_error(),
        }
    }
}

impl StoreOptions {
    pub fn namespace(mut self, ns: impl Into<String>) -> Self { self.namespace = ns.into(); self }
    pub fn debounce(mut self, d: Duration) -> Self { self.debounce = d; self }
    pub fn max_age_days(mut self, days: i64) -> Self { self.max_age_days = days; self }
    pub fn on_persist_error(mut self, hook: PersistErrorHook) -> Self { self.on_persist_error = hook; self }
}

impl From<&Config> for StoreOptions {
    fn from(cfg: &Config) -> Self {
        Self::default()
            .namespace(cfg.storage.namespace.clone())
            .debounce(cfg.debounce())
            .max_age_days(i64::from(cfg.retention.max_age_days))
    }
}

struct State {
    days: PlannerDays,
    selected: SelectionMap,
}

/// The object application code talks to. One per mounted app; dropping it
/// stops the midnight timer and flushes pending writes.
pub struct PlannerStore {
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    days_gw: PersistenceGateway<PlannerDays>,
    selected_gw: PersistenceGateway<SelectionMap>,
    tracker: FocusTracker,
    events: EventSender,
    max_age_days: i64,
    on_error: PersistErrorHook,
}

fn gateway<T: Serialize + Send + Sync + 'static>(storage: &Arc<dyn Storage>, key: &str, opts: &StoreOptions) -> PersistenceGateway<T> {
    PersistenceGateway::new(Arc::clone(storage), key, opts.debounce, Arc::clone(&opts.on_persist_error))
}

fn read(storage: &dyn Storage, key: &str) -> Result<Value> {
    Ok(parse_raw(key, storage.get(key)?.as_deref()))
}

impl PlannerStore {
    /// Loads persisted state (moving keys left under an old prefix first),
    /// migrates legacy lists into the focus day, prunes expired days and arms
    /// the midnight timer when inside a tokio runtime.
    pub fn open(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, opts: StoreOptions) -> Result<Self> {
        let key = |k: &str| format!("{}{}", opts.namespace, k);
        let (days_key, focus_key, selected_key) = (key(DAYS_KEY), key(FOCUS_KEY), key(SELECTED_KEY));
        let events = event::channel();
        migrate_prefixes(&*storage, &opts.namespace, &[DAYS_KEY, FOCUS_KEY, SELECTED_KEY]);

        let stored_focus = decode_focus(&read(&*storage, &focus_key)?);
        let tracker = FocusTracker::new(Arc::clone(&clock), stored_focus, gateway(&storage, &focus_key, &opts), events.clone());
        let days_gw = gateway(&storage, &days_key, &opts);
        let selected_gw = gateway(&storage, &selected_key, &opts);

        let loaded = decode_planner_days(&read(&*storage, &days_key)?);
        let migrated = migrate_legacy(&*storage, &loaded, &tracker.focus(), clock.now_ms(), |d| days_gw.write_now(Arc::clone(d)))?;
        let prune = PruneOptions::default().max_age_days(opts.max_age_days).now(clock.now());
        let days = prune_old_days(&migrated, prune);
        if !Arc::ptr_eq(&days, &migrated) {
            info!(before = migrated.len(), after = days.len(), "pruned expired days on load");
            days_gw.schedule(Arc::clone(&days));
        }

        let raw_selected = decode_selection(&read(&*storage, &selected_key)?);
        let selected = match cleanup_selections(&raw_selected, &days) {
            Some(cleaned) => {
                selected_gw.schedule(cleaned.clone());
                cleaned
            }
            None => raw_selected,
        };

        tracker.start();
        debug!(days = days.len(), focus = %tracker.focus(), "planner store opened");
        Ok(Self {
            clock,
            state: Mutex::new(State { days, selected }),
            days_gw,
            selected_gw,
            tracker,
            events,
            max_age_days: opts.max_age_days,
            on_error: opts.on_persist_error,
        })
    }

    /// File-backed store using the configured directory, or the platform
    /// data dir, and the host clock.
    pub fn open_configured(config: &Config) -> Result<Self> {
        let dir = match &config.storage.dir {
            Some(dir) => dir.clone(),
            None => FileStorage::default_dir()?,
        };
        Self::open(Arc::new(FileStorage::new(dir)), Arc::new(SystemClock), StoreOptions::from(config))
    }

    // ---- reads ---------------------------------------------------------

    pub fn days(&self) -> PlannerDays { Arc::clone(&self.state.lock().days) }

    /// The record for `iso`, or an empty one when nothing is recorded.
    pub fn day(&self, iso: &str) -> Arc<DayRecord> {
        self.state.lock().days.get(iso).cloned().unwrap_or_default()
    }

    pub fn tasks_by_id(&self, iso: &str) -> Arc<TaskIndex> { Arc::clone(&self.day(iso).tasks_by_id) }

    pub fn today(&self) -> IsoDate { self.tracker.today() }
    pub fn focus(&self) -> IsoDate { self.tracker.focus() }
    pub fn is_today(&self, day: &str) -> bool { self.tracker.is_today(day) }
    pub fn week(&self, iso: &str) -> WeekView { self.tracker.week(iso) }

    pub fn set_focus(&self, iso: impl Into<IsoDate>) { self.tracker.set_focus(iso); }
    pub fn go_to_today(&self) { self.tracker.go_to_today(); }
    pub fn shift_focus(&self, n: i64) { self.tracker.shift_focus(n); }

    /// Re-checks the clock now; returns whether the day rolled over.
    pub fn refresh_today(&self) -> bool { self.tracker.refresh() }
    pub fn timer_active(&self) -> bool { self.tracker.timer_active() }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> { self.events.subscribe() }

    // ---- updates -------------------------------------------------------

    fn prune_options(&self) -> PruneOptions {
        PruneOptions::default().max_age_days(self.max_age_days).now(self.clock.now())
    }

    // `f` runs under the state lock and must not call back into the store.
    fn commit(&self, f: impl FnOnce(&PlannerDays) -> Option<DaysUpdate>) -> PlannerDays {
        let (days, changed, selected) = {
            let mut st = self.state.lock();
            let Some(update) = f(&st.days) else { return Arc::clone(&st.days) };
            let Applied { days, changed } = update.apply(&st.days);
            let days = prune_old_days(&days, self.prune_options());
            if Arc::ptr_eq(&days, &st.days) { return days; }
            st.days = Arc::clone(&days);
            let selected = cleanup_selections(&st.selected, &days);
            if let Some(s) = &selected { st.selected = s.clone(); }
            (days, changed, selected)
        };
        self.days_gw.schedule(Arc::clone(&days));
        if let Some(s) = selected {
            self.selected_gw.schedule(s);
            emit(&self.events, StoreEvent::SelectionChanged);
        }
        emit(&self.events, StoreEvent::DaysChanged { changed });
        days
    }

    /// Low-level update. `f` returns either a full map (trusted as already
    /// indexed) or `(map, changed_days)`, in which case exactly those days
    /// are reindexed. The result is pruned and persisted. `f` must not call
    /// back into the store.
    pub fn set_days<U: Into<DaysUpdate>>(&self, f: impl FnOnce(&PlannerDays) -> U) -> PlannerDays {
        self.commit(|prev| Some(f(prev).into()))
    }

    /// Runs a per-day reducer on `iso` (an empty record if absent). `None`
    /// from `f` leaves everything untouched. A day left with nothing in it
    /// is removed. Returns whether anything changed.
    pub fn upsert_day(&self, iso: &str, f: impl FnOnce(&DayRecord) -> Option<DayRecord>) -> bool {
        let mut touched = false;
        self.commit(|prev| {
            let empty = DayRecord::default();
            let next = f(prev.get(iso).map(|d| &**d).unwrap_or(&empty))?;
            let mut map = (**prev).clone();
            if next.is_blank() {
                map.remove(iso)?;
            } else {
                map.insert(iso.to_string(), Arc::new(next));
            }
            touched = true;
            Some(DaysUpdate::from((map, vec![iso.to_string()])))
        });
        touched
    }

    /// Mutators bound to one explicit day.
    pub fn day_scope(&self, iso: impl Into<IsoDate>) -> DayScope<'_> { DayScope { store: self, iso: iso.into() } }

    fn focused(&self) -> DayScope<'_> { self.day_scope(self.focus()) }

    pub fn add_project(&self, name: &str) -> Option<String> { self.focused().add_project(name) }
    pub fn add_task(&self, title: &str, project_id: Option<&str>) -> Option<String> { self.focused().add_task(title, project_id) }
    pub fn toggle_task(&self, id: &str) -> bool { self.focused().toggle_task(id) }
    pub fn toggle_project(&self, id: &str) -> bool { self.focused().toggle_project(id) }
    pub fn rename_project(&self, id: &str, name: &str) -> bool { self.focused().rename_project(id, name) }
    pub fn rename_task(&self, id: &str, title: &str) -> bool { self.focused().rename_task(id, title) }
    pub fn remove_project(&self, id: &str) -> bool { self.focused().remove_project(id) }
    pub fn remove_task(&self, id: &str) -> bool { self.focused().remove_task(id) }
    pub fn update_task_reminder(&self, id: &str, reminder: Option<Reminder>) -> bool { self.focused().update_task_reminder(id, reminder) }
    pub fn set_task_images(&self, id: &str, images: Vec<String>) -> bool { self.focused().set_task_images(id, images) }
    pub fn set_notes(&self, notes: &str) -> bool { self.focused().set_notes(notes) }
    pub fn set_day_focus(&self, text: &str) -> bool { self.focused().set_focus_text(text) }

    // ---- selection -----------------------------------------------------

    pub fn selection(&self, iso: &str) -> Selection { self.state.lock().selected.get(iso).cloned().unwrap_or_default() }

    pub fn selected_project(&self) -> Option<Project> {
        let focus = self.focus();
        let pid = self.selection(&focus).project_id?;
        self.day(&focus).project(&pid).cloned()
    }

    pub fn selected_task(&self) -> Option<Arc<Task>> {
        let focus = self.focus();
        let tid = self.selection(&focus).task_id?;
        self.day(&focus).task(&tid).cloned()
    }

    fn update_selection(&self, f: impl FnOnce(&State) -> Option<SelectionMap>) -> bool {
        let next = {
            let mut st = self.state.lock();
            let Some(next) = f(&*st) else { return false };
            st.selected = next.clone();
            next
        };
        self.selected_gw.schedule(next);
        emit(&self.events, StoreEvent::SelectionChanged);
        true
    }

    /// Selects a project on the focus day; `None` clears the selection.
    pub fn select_project(&self, id: Option<&str>) -> bool {
        let focus = self.focus();
        self.update_selection(|st| select_project(&st.selected, &focus, id))
    }

    /// Selects a task (and its project) on the focus day; `None` clears both.
    pub fn select_task(&self, id: Option<&str>) -> bool {
        let focus = self.focus();
        self.update_selection(|st| select_task(&st.selected, st.days.get(&focus).map(|d| &**d), &focus, id))
    }

    // ---- lifecycle -----------------------------------------------------

    /// Writes every pending value now. All gateways are drained even if one fails.
    pub fn flush(&self) -> Result<()> {
        let days = self.days_gw.flush();
        let selected = self.selected_gw.flush();
        let focus = self.tracker.flush();
        days.and(selected).and(focus)
    }

    /// Stops the midnight timer and flushes.
    pub fn close(&self) -> Result<()> {
        self.tracker.stop();
        self.flush()
    }
}

impl Drop for PlannerStore {
    fn drop(&mut self) {
        self.tracker.stop();
        if let Err(e) = self.flush() { (self.on_error)(&e); }
    }
}

/// Per-day mutators. Each returns `None`/`false` when it changed nothing.
pub struct DayScope<'a> {
    store: &'a PlannerStore,
    iso: IsoDate,
}

impl DayScope<'_> {
    pub fn iso(&self) -> &str { &self.iso }
    pub fn record(&self) -> Arc<DayRecord> { self.store.day(&self.iso) }

    fn apply(&self, f: impl FnOnce(&DayRecord) -> Option<DayRecord>) -> bool { self.store.upsert_day(&self.iso, f) }

    /// Id of the new project. `None` for a blank name, or when the day is
    /// past the retention window and was pruned in the same update.
    pub fn add_project(&self, name: &str) -> Option<String> {
        let id = uid("proj");
        let now = self.store.clock.now_ms();
        let added = self.apply(|d| day_ops::add_project(d, &id, name, now));
        (added && self.record().project(&id).is_some()).then_some(id)
    }

    /// Same contract as [`DayScope::add_project`].
    pub fn add_task(&self, title: &str, project_id: Option<&str>) -> Option<String> {
        let id = uid("task");
        let now = self.store.clock.now_ms();
        let added = self.apply(|d| day_ops::add_task(d, &id, title, project_id, now));
        (added && self.record().task(&id).is_some()).then_some(id)
    }

    pub fn toggle_task(&self, id: &str) -> bool { self.apply(|d| day_ops::toggle_task(d, id)) }
    pub fn toggle_project(&self, id: &str) -> bool { self.apply(|d| day_ops::toggle_project(d, id)) }
    pub fn rename_project(&self, id: &str, name: &str) -> bool { self.apply(|d| day_ops::rename_project(d, id, name)) }
    pub fn rename_task(&self, id: &str, title: &str) -> bool { self.apply(|d| day_ops::rename_task(d, id, title)) }
    pub fn remove_project(&self, id: &str) -> bool { self.apply(|d| day_ops::remove_project(d, id)) }
    pub fn remove_task(&self, id: &str) -> bool { self.apply(|d| day_ops::remove_task(d, id)) }

    /// Attaches, replaces or (with `None`) removes a reminder. Invalid
    /// fields are stripped first.
    pub fn update_task_reminder(&self, id: &str, reminder: Option<Reminder>) -> bool {
        let reminder = reminder.as_ref().and_then(sanitize_reminder);
        self.apply(|d| day_ops::set_task_reminder(d, id, reminder))
    }

    pub fn set_task_images(&self, id: &str, images: Vec<String>) -> bool { self.apply(|d| day_ops::set_task_images(d, id, images)) }
    pub fn set_notes(&self, notes: &str) -> bool { self.apply(|d| day_ops::set_notes(d, notes)) }
    pub fn set_focus_text(&self, text: &str) -> bool { self.apply(|d| day_ops::set_focus_text(d, text)) }
}
