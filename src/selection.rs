// planner/src/selection.rs

use crate::model::{DayMap, DayRecord, Selection, SelectionMap};

/// Selects `project_id` on `iso`, dropping any task selection. `None` or an
/// empty id clears the day's selection entirely. Returns `None` when the
/// map would not change.
pub fn select_project(map: &SelectionMap, iso: &str, project_id: Option<&str>) -> Option<SelectionMap> {
    let next = project_id
        .filter(|p| !p.is_empty())
        .map(|p| Selection { project_id: Some(p.into()), task_id: None });
    replace(map, iso, next)
}

/// Selects a task and, implicitly, its project. Clearing drops both.
pub fn select_task(map: &SelectionMap, day: Option<&DayRecord>, iso: &str, task_id: Option<&str>) -> Option<SelectionMap> {
    let next = task_id.filter(|t| !t.is_empty()).map(|t| Selection {
        project_id: day
            .and_then(|d| d.tasks.iter().find(|x| x.id == t))
            .and_then(|x| x.project_id.clone()),
        task_id: Some(t.into()),
    });
    replace(map, iso, next)
}

fn replace(map: &SelectionMap, iso: &str, next: Option<Selection>) -> Option<SelectionMap> {
    if map.get(iso) == next.as_ref() { return None; }
    let mut out = map.clone();
    match next {
        Some(sel) => { out.insert(iso.into(), sel); }
        None => { out.remove(iso); }
    }
    Some(out)
}

fn still_valid(sel: &Selection, day: Option<&DayRecord>) -> bool {
    let Some(day) = day else { return false };
    if sel.is_empty() { return false; }
    if let Some(pid) = &sel.project_id {
        if day.project(pid).is_none() { return false; }
    }
    if let Some(tid) = &sel.task_id {
        if day.task(tid).is_none() && !day.tasks.iter().any(|t| &t.id == tid) { return false; }
    }
    true
}

/// Drops selections that point at days, projects or tasks that no longer
/// exist. `None` when everything is still valid.
pub fn cleanup_selections(map: &SelectionMap, days: &DayMap) -> Option<SelectionMap> {
    let stale: Vec<&String> = map
        .iter()
        .filter(|(iso, sel)| !still_valid(sel, days.get(*iso).map(|d| &**d)))
        .map(|(iso, _)| iso)
        .collect();
    if stale.is_empty() { return None; }
    let mut out = map.clone();
    for iso in stale { out.remove(iso); }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{day_ops, index::reindex_day};
    use std::sync::Arc;

    fn day() -> DayRecord {
        let d = day_ops::add_project(&DayRecord::default(), "p1", "Work", 0).unwrap();
        reindex_day(&day_ops::add_task(&d, "t1", "Ship", Some("p1"), 0).unwrap())
    }

    #[test]
    fn selecting_a_task_selects_its_project() {
        let d = day();
        let m = select_task(&SelectionMap::new(), Some(&d), "2024-01-01", Some("t1")).unwrap();
        assert_eq!(m["2024-01-01"].project_id.as_deref(), Some("p1"));
        let m = select_project(&m, "2024-01-01", Some("p1")).unwrap();
        assert_eq!(m["2024-01-01"].task_id, None);
        assert!(select_project(&m, "2024-01-01", Some("p1")).is_none());
        let m = select_project(&m, "2024-01-01", None).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn cleanup_drops_stale_entries_once() {
        let mut days = DayMap::new();
        days.insert("2024-01-01".into(), Arc::new(day()));
        let mut m = SelectionMap::new();
        m.insert("2024-01-01".into(), Selection { project_id: Some("p1".into()), task_id: Some("t1".into()) });
        m.insert("2024-01-02".into(), Selection { project_id: Some("p9".into()), task_id: None });
        m.insert("2024-01-03".into(), Selection::default());
        let cleaned = cleanup_selections(&m, &days).unwrap();
        assert_eq!(cleaned.keys().collect::<Vec<_>>(), vec!["2024-01-01"]);
        assert!(cleanup_selections(&cleaned, &days).is_none());

        let gone = reindex_day(&day_ops::remove_task(&days["2024-01-01"], "t1").unwrap());
        days.insert("2024-01-01".into(), Arc::new(gone));
        assert!(cleanup_selections(&cleaned, &days).unwrap().is_empty());
    }
}
