// planner/src/decode.rs
//
// The single trust boundary for persisted data. Nothing here fails: bad
// items are dropped, repairable fields are repaired, and derived fields are
// always recomputed from the task lists.

use regex::Regex;
use serde_json::{Map, Value};
use std::{collections::HashSet, sync::{Arc, LazyLock}};
use tracing::warn;

use crate::{
    date::from_iso,
    model::{DayMap, DayRecord, IsoDate, PlannerDays, Project, Reminder, Selection, SelectionMap, Task},
};

static TIME_24H: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:[01]\d|2[0-3]):[0-5]\d$").unwrap());

pub const MAX_LEAD_MINUTES: u32 = 24 * 60;

/// Empty string stored as focus means "not chosen yet".
pub const FOCUS_PLACEHOLDER: &str = "";

/// Parses a raw storage payload. Unparsable text reads as `Null`.
pub fn parse_raw(key: &str, raw: Option<&str>) -> Value {
    let Some(text) = raw.filter(|t| !t.is_empty()) else { return Value::Null };
    serde_json::from_str(text).unwrap_or_else(|e| {
        warn!(key, error = %e, "ignoring unparsable storage payload");
        Value::Null
    })
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> { obj.get(key)?.as_str() }
fn bool_field(obj: &Map<String, Value>, key: &str) -> Option<bool> { obj.get(key)?.as_bool() }

/// Any JSON number, as epoch milliseconds.
fn millis_field(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    let n = obj.get(key)?.as_number()?;
    n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

pub(crate) fn decode_images(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::Array(items)) => items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect(),
        _ => Vec::new(),
    }
}

pub fn decode_project(v: &Value) -> Option<Project> {
    let obj = v.as_object()?;
    Some(Project {
        id: str_field(obj, "id")?.to_string(),
        name: str_field(obj, "name")?.to_string(),
        done: bool_field(obj, "done")?,
        created_at: millis_field(obj, "createdAt")?,
    })
}

pub fn decode_task(v: &Value) -> Option<Task> {
    let obj = v.as_object()?;
    Some(Task {
        id: str_field(obj, "id")?.to_string(),
        title: str_field(obj, "title")?.to_string(),
        done: bool_field(obj, "done")?,
        created_at: millis_field(obj, "createdAt")?,
        project_id: str_field(obj, "projectId").map(str::to_string),
        images: decode_images(obj.get("images")),
        reminder: obj.get("reminder").and_then(decode_reminder),
    })
}

pub fn decode_reminder(v: &Value) -> Option<Reminder> {
    let obj = v.as_object()?;
    let lead = obj.get("leadMinutes").and_then(Value::as_f64);
    sanitize_parts(
        bool_field(obj, "enabled"),
        str_field(obj, "reminderId"),
        str_field(obj, "time"),
        lead,
    )
}

/// Normalizes a reminder built by callers with the same rules applied to
/// persisted ones.
pub fn sanitize_reminder(r: &Reminder) -> Option<Reminder> {
    sanitize_parts(Some(r.enabled), r.reminder_id.as_deref(), r.time.as_deref(), r.lead_minutes.map(f64::from))
}

fn sanitize_parts(enabled: Option<bool>, reminder_id: Option<&str>, time: Option<&str>, lead: Option<f64>) -> Option<Reminder> {
    let reminder_id = reminder_id.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    let time = time.filter(|t| TIME_24H.is_match(t)).map(str::to_string);
    let lead_minutes = lead
        .filter(|l| l.is_finite() && *l >= 0.0)
        .map(|l| (l.round() as u32).min(MAX_LEAD_MINUTES));
    let enabled = enabled.unwrap_or(reminder_id.is_some() || time.is_some() || lead_minutes.is_some());
    if !enabled && reminder_id.is_none() && time.is_none() && lead_minutes.is_none() {
        return None;
    }
    Some(Reminder { enabled, reminder_id, time, lead_minutes })
}

fn decode_list<T>(v: Option<&Value>, item: fn(&Value) -> Option<T>) -> Vec<T> {
    match v {
        Some(Value::Array(items)) => items.iter().filter_map(item).collect(),
        _ => Vec::new(),
    }
}

// Ids are unique within a day; the first occurrence wins.
fn dedupe<T>(items: Vec<T>, id: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|i| seen.insert(id(i).to_string())).collect()
}

fn decode_day(v: &Value) -> Option<DayRecord> {
    let obj = v.as_object()?;
    let projects = dedupe(decode_list(obj.get("projects"), decode_project), |p| &p.id);
    let tasks = dedupe(decode_list(obj.get("tasks"), decode_task), |t| &t.id).into_iter().map(Arc::new).collect();
    let mut day = DayRecord::new(projects, tasks);
    day.focus = str_field(obj, "focus").map(str::to_string);
    day.notes = str_field(obj, "notes").map(str::to_string);
    (!day.is_blank()).then_some(day)
}

/// Decodes anything into a day map; non-objects become an empty map.
pub fn decode_planner_days(raw: &Value) -> PlannerDays {
    let Some(obj) = raw.as_object() else { return PlannerDays::default() };
    let days: DayMap = obj
        .iter()
        .filter_map(|(iso, day)| Some((iso.clone(), Arc::new(decode_day(day)?))))
        .collect();
    Arc::new(days)
}

/// `None` when the stored value is not a usable focus.
pub fn decode_focus(raw: &Value) -> Option<IsoDate> {
    let s = raw.as_str()?;
    (s == FOCUS_PLACEHOLDER || from_iso(s).is_some()).then(|| s.to_string())
}

pub fn decode_selection(raw: &Value) -> SelectionMap {
    let Some(obj) = raw.as_object() else { return SelectionMap::new() };
    obj.iter()
        .filter_map(|(iso, v)| {
            let o = v.as_object()?;
            let sel = Selection {
                project_id: str_field(o, "projectId").filter(|s| !s.is_empty()).map(str::to_string),
                task_id: str_field(o, "taskId").filter(|s| !s.is_empty()).map(str::to_string),
            };
            (!sel.is_empty()).then(|| (iso.clone(), sel))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_objects_decode_to_empty() {
        for raw in [json!(null), json!([]), json!("str"), json!(42), json!(true)] {
            assert!(decode_planner_days(&raw).is_empty());
        }
    }

    #[test]
    fn drops_bad_items_and_keeps_good_ones() {
        let raw = json!({
            "2024-01-01": {
                "projects": [
                    {"id": "p1", "name": "Home", "done": false, "createdAt": 1},
                    {"id": "p2", "name": 7, "done": false, "createdAt": 1},
                    "nope"
                ],
                "tasks": [
                    {"id": "t1", "title": "A", "done": true, "createdAt": 2, "projectId": "p1", "images": ["x", 3, null, "y"]},
                    {"id": "t2", "title": "B", "done": false, "createdAt": 3, "projectId": 9},
                    {"id": "t3", "title": "C", "done": "no", "createdAt": 3}
                ],
                "tasksById": {"bogus": {}},
                "doneCount": 99,
                "totalCount": 99,
                "focus": 5,
                "notes": "n"
            },
            "2024-01-02": "garbage",
            "2024-01-03": {"projects": "nope", "tasks": []}
        });
        let days = decode_planner_days(&raw);
        assert_eq!(days.len(), 1);
        let day = &days["2024-01-01"];
        assert_eq!(day.projects.len(), 1);
        assert_eq!(day.tasks.len(), 2);
        assert_eq!(day.tasks[0].images, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(day.tasks[1].project_id, None);
        assert!(!day.tasks_by_id.contains_key("bogus"));
        assert_eq!((day.done_count, day.total_count), (1, 2));
        assert_eq!(day.focus, None);
        assert_eq!(day.notes.as_deref(), Some("n"));
        assert_eq!(day.tasks_by_project.get("p1").unwrap(), &vec!["t1".to_string()]);
    }

    #[test]
    fn duplicate_ids_keep_the_first_entry() {
        let raw = json!({"2024-01-01": {"tasks": [
            {"id": "t", "title": "first", "done": false, "createdAt": 1},
            {"id": "t", "title": "second", "done": true, "createdAt": 2}
        ]}});
        let days = decode_planner_days(&raw);
        let day = &days["2024-01-01"];
        assert_eq!(day.tasks.len(), 1);
        assert_eq!(day.task("t").unwrap().title, "first");
    }

    #[test]
    fn reminders_are_sanitized() {
        let r = decode_reminder(&json!({"reminderId": "  r1 ", "time": "25:00", "leadMinutes": 3000.4})).unwrap();
        assert!(r.enabled);
        assert_eq!(r.reminder_id.as_deref(), Some("r1"));
        assert_eq!(r.time, None);
        assert_eq!(r.lead_minutes, Some(MAX_LEAD_MINUTES));

        assert!(decode_reminder(&json!({"enabled": false})).is_none());
        assert!(decode_reminder(&json!({"leadMinutes": -5})).is_none());
        let off = decode_reminder(&json!({"enabled": false, "time": "07:30"})).unwrap();
        assert!(!off.enabled);
        assert_eq!(off.time.as_deref(), Some("07:30"));
    }

    #[test]
    fn focus_accepts_iso_or_placeholder() {
        assert_eq!(decode_focus(&json!("2024-02-29")).as_deref(), Some("2024-02-29"));
        assert_eq!(decode_focus(&json!("")).as_deref(), Some(""));
        assert!(decode_focus(&json!("2024-13-40")).is_none());
        assert!(decode_focus(&json!(20240101)).is_none());
    }

    #[test]
    fn selection_drops_empty_and_malformed_entries() {
        let sel = decode_selection(&json!({
            "2024-01-01": {"projectId": "p1", "taskId": 4},
            "2024-01-02": {},
            "2024-01-03": "x"
        }));
        assert_eq!(sel.len(), 1);
        assert_eq!(sel["2024-01-01"].project_id.as_deref(), Some("p1"));
        assert_eq!(sel["2024-01-01"].task_id, None);
    }

    #[test]
    fn parse_raw_tolerates_garbage() {
        assert_eq!(parse_raw("k", Some("{not json")), Value::Null);
        assert_eq!(parse_raw("k", None), Value::Null);
        assert_eq!(parse_raw("k", Some("[1]")), json!([1]));
    }
}
