// planner/src/legacy.rs
//
// Older builds kept one flat project list and one flat task list instead of
// the day map. They are folded into a single day once, then deleted. Even
// older builds stored everything under a different key prefix.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    decode::{decode_images, decode_reminder, parse_raw},
    error::Result,
    index::DaysUpdate,
    model::{IsoDate, PlannerDays, Project, Task},
    storage::Storage,
};

pub const LEGACY_PROJECTS_KEY: &str = "planner:projects";
pub const LEGACY_TASKS_KEY: &str = "planner:tasks";

/// Namespaces used by older builds, oldest first.
pub const OLD_PREFIXES: [&str; 2] = ["13lr:", "noxis-planner:"];

/// Moves `names` from any old namespace into `namespace`. An existing value
/// under the new key wins; the old key is removed either way. Storage
/// failures are logged and leave that key for the next start. Returns how
/// many values were copied.
pub fn migrate_prefixes(storage: &dyn Storage, namespace: &str, names: &[&str]) -> usize {
    let mut copied = 0;
    for name in names {
        let new_key = format!("{namespace}{name}");
        for prefix in OLD_PREFIXES.iter().filter(|p| **p != namespace) {
            let old_key = format!("{prefix}{name}");
            match move_key(storage, &old_key, &new_key) {
                Ok(true) => {
                    info!(from = %old_key, to = %new_key, "moved value from old storage prefix");
                    copied += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(key = %old_key, error = %e, "old storage key not migrated"),
            }
        }
    }
    copied
}

fn move_key(storage: &dyn Storage, old_key: &str, new_key: &str) -> Result<bool> {
    let Some(value) = storage.get(old_key)? else { return Ok(false) };
    let copy = storage.get(new_key)?.is_none();
    if copy { storage.set(new_key, &value)?; }
    storage.remove(old_key)?;
    Ok(copy)
}

#[derive(Clone, Debug, Default)]
pub struct LegacySnapshot {
    pub projects: Option<Vec<Project>>,
    pub tasks: Option<Vec<Task>>,
}

impl LegacySnapshot {
    pub fn is_empty(&self) -> bool { self.projects.is_none() && self.tasks.is_none() }

    /// Keys whose content was read and should be deleted after a merge.
    pub fn migrated_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.projects.is_some() { keys.push(LEGACY_PROJECTS_KEY); }
        if self.tasks.is_some() { keys.push(LEGACY_TASKS_KEY); }
        keys
    }
}

// Legacy items only need an id; everything else falls back to a default.
fn relaxed_id(obj: &Map<String, Value>) -> Option<String> {
    obj.get("id")?.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn relaxed_millis(obj: &Map<String, Value>, fallback: i64) -> i64 {
    obj.get("createdAt")
        .and_then(Value::as_f64)
        .filter(|f| f.is_finite())
        .map(|f| f as i64)
        .unwrap_or(fallback)
}

fn text(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn relaxed_project(v: &Value, now_ms: i64) -> Option<Project> {
    let obj = v.as_object()?;
    Some(Project {
        id: relaxed_id(obj)?,
        name: text(obj, "name"),
        done: obj.get("done").and_then(Value::as_bool).unwrap_or(false),
        created_at: relaxed_millis(obj, now_ms),
    })
}

fn relaxed_task(v: &Value, now_ms: i64) -> Option<Task> {
    let obj = v.as_object()?;
    Some(Task {
        id: relaxed_id(obj)?,
        title: text(obj, "title"),
        done: obj.get("done").and_then(Value::as_bool).unwrap_or(false),
        project_id: obj.get("projectId").and_then(Value::as_str).map(str::to_string),
        created_at: relaxed_millis(obj, now_ms),
        images: decode_images(obj.get("images")),
        reminder: obj.get("reminder").and_then(decode_reminder),
    })
}

fn read_list<T>(storage: &dyn Storage, key: &str, item: impl Fn(&Value) -> Option<T>) -> Option<Vec<T>> {
    let raw = match storage.get(key) {
        Ok(raw) => raw?,
        Err(e) => {
            warn!(key, error = %e, "legacy key unreadable; skipping");
            return None;
        }
    };
    match parse_raw(key, Some(&raw)) {
        Value::Array(items) => Some(items.iter().filter_map(item).collect()),
        _ => {
            warn!(key, "legacy key is not a list; skipping");
            None
        }
    }
}

pub fn read_legacy(storage: &dyn Storage, now_ms: i64) -> LegacySnapshot {
    LegacySnapshot {
        projects: read_list(storage, LEGACY_PROJECTS_KEY, |v| relaxed_project(v, now_ms)),
        tasks: read_list(storage, LEGACY_TASKS_KEY, |v| relaxed_task(v, now_ms)),
    }
}

/// Appends the snapshot's items to `iso`'s record, skipping ids the day
/// already holds. Produces a patch for exactly that day.
pub fn merge_legacy(days: &PlannerDays, iso: &IsoDate, snapshot: &LegacySnapshot) -> DaysUpdate {
    let mut day = days.get(iso).map(|d| (**d).clone()).unwrap_or_default();
    for p in snapshot.projects.iter().flatten() {
        if day.project(&p.id).is_none() { day.projects.push(p.clone()); }
    }
    for t in snapshot.tasks.iter().flatten() {
        if !day.tasks.iter().any(|x| x.id == t.id) { day.tasks.push(Arc::new(t.clone())); }
    }
    let mut next = (**days).clone();
    next.insert(iso.clone(), Arc::new(day));
    DaysUpdate::from((next, vec![iso.clone()]))
}

/// Runs the one-time migration. `persist` must durably write the merged
/// map; the legacy keys are deleted only after it succeeds.
pub fn migrate_legacy(
    storage: &dyn Storage,
    days: &PlannerDays,
    iso: &IsoDate,
    now_ms: i64,
    persist: impl FnOnce(&PlannerDays) -> Result<()>,
) -> Result<PlannerDays> {
    let snapshot = read_legacy(storage, now_ms);
    if snapshot.is_empty() { return Ok(Arc::clone(days)); }
    let merged = merge_legacy(days, iso, &snapshot).apply(days).days;
    persist(&merged)?;
    for key in snapshot.migrated_keys() {
        storage.remove(key)?;
    }
    info!(
        day = %iso,
        projects = snapshot.projects.as_ref().map_or(0, Vec::len),
        tasks = snapshot.tasks.as_ref().map_or(0, Vec::len),
        "migrated legacy planner lists"
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn folds_legacy_lists_into_one_day_and_deletes_keys() {
        let s = MemoryStorage::new();
        s.set(LEGACY_PROJECTS_KEY, r#"[{"id":"p1","name":"Legacy"}, {"name":"no id"}]"#).unwrap();
        s.set(LEGACY_TASKS_KEY, r#"[{"id":"t1","projectId":"p1"}]"#).unwrap();
        let mut written = None;
        let out = migrate_legacy(&s, &PlannerDays::default(), &"2024-06-01".to_string(), 5, |d| {
            written = Some(Arc::clone(d));
            Ok(())
        })
        .unwrap();
        let day = &out["2024-06-01"];
        assert_eq!(day.projects.len(), 1);
        assert_eq!(day.projects[0].name, "Legacy");
        assert_eq!(day.tasks[0].created_at, 5);
        assert_eq!(day.tasks_by_project.get("p1").unwrap(), &vec!["t1".to_string()]);
        assert!(Arc::ptr_eq(&written.unwrap(), &out));
        assert_eq!(s.get(LEGACY_PROJECTS_KEY).unwrap(), None);
        assert_eq!(s.get(LEGACY_TASKS_KEY).unwrap(), None);
    }

    #[test]
    fn no_legacy_keys_is_a_no_op() {
        let s = MemoryStorage::new();
        let days = PlannerDays::default();
        let out = migrate_legacy(&s, &days, &"2024-06-01".to_string(), 0, |_| panic!("no write expected")).unwrap();
        assert!(Arc::ptr_eq(&out, &days));
    }

    #[test]
    fn unparsable_key_is_skipped_and_left_in_place() {
        let s = MemoryStorage::new();
        s.set(LEGACY_PROJECTS_KEY, "{broken").unwrap();
        s.set(LEGACY_TASKS_KEY, r#"[{"id":"t1","title":"Old","done":true}]"#).unwrap();
        let out = migrate_legacy(&s, &PlannerDays::default(), &"2024-06-01".to_string(), 0, |_| Ok(())).unwrap();
        assert_eq!(out["2024-06-01"].done_count, 1);
        assert!(s.get(LEGACY_PROJECTS_KEY).unwrap().is_some());
        assert_eq!(s.get(LEGACY_TASKS_KEY).unwrap(), None);
    }

    #[test]
    fn old_prefixes_move_into_the_namespace() {
        let s = MemoryStorage::new();
        s.set("13lr:planner:days", "old").unwrap();
        s.set("noxis-planner:planner:focus", "\"2024-05-01\"").unwrap();
        s.set("13lr:planner:selected", "stale").unwrap();
        s.set("ns:planner:selected", "current").unwrap();
        s.set("13lr:unrelated", "keep").unwrap();

        let copied = migrate_prefixes(&s, "ns:", &["planner:days", "planner:focus", "planner:selected"]);
        assert_eq!(copied, 2);
        assert_eq!(s.get("ns:planner:days").unwrap().as_deref(), Some("old"));
        assert_eq!(s.get("ns:planner:focus").unwrap().as_deref(), Some("\"2024-05-01\""));
        assert_eq!(s.get("ns:planner:selected").unwrap().as_deref(), Some("current"));
        assert_eq!(s.get("13lr:planner:selected").unwrap(), None);
        assert_eq!(s.get("13lr:unrelated").unwrap().as_deref(), Some("keep"));
        assert_eq!(migrate_prefixes(&s, "ns:", &["planner:days"]), 0);
    }

    #[test]
    fn the_current_namespace_is_never_treated_as_old() {
        let s = MemoryStorage::new();
        s.set("noxis-planner:planner:days", "live").unwrap();
        assert_eq!(migrate_prefixes(&s, "noxis-planner:", &["planner:days"]), 0);
        assert_eq!(s.get("noxis-planner:planner:days").unwrap().as_deref(), Some("live"));
    }

    #[test]
    fn existing_ids_are_not_duplicated() {
        let s = MemoryStorage::new();
        s.set(LEGACY_TASKS_KEY, r#"[{"id":"t1","title":"dup"}]"#).unwrap();
        let first = migrate_legacy(&s, &PlannerDays::default(), &"d".to_string(), 0, |_| Ok(())).unwrap();
        s.set(LEGACY_TASKS_KEY, r#"[{"id":"t1","title":"dup"}]"#).unwrap();
        let second = migrate_legacy(&s, &first, &"d".to_string(), 0, |_| Ok(())).unwrap();
        assert_eq!(second["d"].tasks.len(), 1);
    }
}
