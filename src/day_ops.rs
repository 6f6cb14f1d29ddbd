// planner/src/day_ops.rs
//
// Pure per-day reducers. Each returns `None` when the call changes nothing
// (blank text, unknown id, same value), so callers can skip the write. The
// returned record is not reindexed; the store patches indices afterwards.

use std::sync::Arc;

use crate::model::{DayRecord, Project, Reminder, Task};

fn trimmed(s: &str) -> Option<&str> { Some(s.trim()).filter(|t| !t.is_empty()) }

fn map_task(day: &DayRecord, id: &str, f: impl FnOnce(&Task) -> Option<Task>) -> Option<DayRecord> {
    let pos = day.tasks.iter().position(|t| t.id == id)?;
    let next = f(&day.tasks[pos])?;
    let mut tasks = day.tasks.clone();
    tasks[pos] = Arc::new(next);
    Some(DayRecord { tasks, ..day.clone() })
}

fn map_project(day: &DayRecord, id: &str, f: impl FnOnce(&Project) -> Option<Project>) -> Option<DayRecord> {
    let pos = day.projects.iter().position(|p| p.id == id)?;
    let next = f(&day.projects[pos])?;
    let mut projects = day.projects.clone();
    projects[pos] = next;
    Some(DayRecord { projects, ..day.clone() })
}

pub fn add_project(day: &DayRecord, id: &str, name: &str, now_ms: i64) -> Option<DayRecord> {
    let name = trimmed(name)?;
    let mut next = day.clone();
    next.projects.push(Project { id: id.into(), name: name.into(), done: false, created_at: now_ms });
    Some(next)
}

pub fn rename_project(day: &DayRecord, id: &str, name: &str) -> Option<DayRecord> {
    let name = trimmed(name)?;
    map_project(day, id, |p| (p.name != name).then(|| Project { name: name.into(), ..p.clone() }))
}

/// Flips the project and sets every task of the project to the same state.
pub fn toggle_project(day: &DayRecord, id: &str) -> Option<DayRecord> {
    let mut next = map_project(day, id, |p| Some(Project { done: !p.done, ..p.clone() }))?;
    let done = next.project(id).map(|p| p.done)?;
    for task in next.tasks.iter_mut() {
        if task.project_id.as_deref() == Some(id) && task.done != done {
            *task = Arc::new(Task { done, ..(**task).clone() });
        }
    }
    Some(next)
}

/// Tasks of the removed project keep their now-dangling `project_id`.
pub fn remove_project(day: &DayRecord, id: &str) -> Option<DayRecord> {
    day.project(id)?;
    let mut next = day.clone();
    next.projects.retain(|p| p.id != id);
    Some(next)
}

pub fn add_task(day: &DayRecord, id: &str, title: &str, project_id: Option<&str>, now_ms: i64) -> Option<DayRecord> {
    let title = trimmed(title)?;
    let mut next = day.clone();
    next.tasks.push(Arc::new(Task {
        id: id.into(),
        title: title.into(),
        done: false,
        project_id: project_id.filter(|p| !p.is_empty()).map(Into::into),
        created_at: now_ms,
        images: Vec::new(),
        reminder: None,
    }));
    Some(next)
}

pub fn rename_task(day: &DayRecord, id: &str, title: &str) -> Option<DayRecord> {
    let title = trimmed(title)?;
    map_task(day, id, |t| (t.title != title).then(|| Task { title: title.into(), ..t.clone() }))
}

pub fn toggle_task(day: &DayRecord, id: &str) -> Option<DayRecord> {
    map_task(day, id, |t| Some(Task { done: !t.done, ..t.clone() }))
}

pub fn remove_task(day: &DayRecord, id: &str) -> Option<DayRecord> {
    day.tasks.iter().find(|t| t.id == id)?;
    let mut next = day.clone();
    next.tasks.retain(|t| t.id != id);
    Some(next)
}

pub fn set_task_reminder(day: &DayRecord, id: &str, reminder: Option<Reminder>) -> Option<DayRecord> {
    map_task(day, id, |t| (t.reminder != reminder).then(|| Task { reminder, ..t.clone() }))
}

pub fn set_task_images(day: &DayRecord, id: &str, images: Vec<String>) -> Option<DayRecord> {
    map_task(day, id, |t| (t.images != images).then(|| Task { images, ..t.clone() }))
}

pub fn set_notes(day: &DayRecord, notes: &str) -> Option<DayRecord> {
    (day.notes.as_deref() != Some(notes)).then(|| DayRecord { notes: Some(notes.into()), ..day.clone() })
}

pub fn set_focus_text(day: &DayRecord, focus: &str) -> Option<DayRecord> {
    (day.focus.as_deref() != Some(focus)).then(|| DayRecord { focus: Some(focus.into()), ..day.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::reindex_day;

    fn seeded() -> DayRecord {
        let d = add_project(&DayRecord::default(), "p1", "Home", 1).unwrap();
        let d = add_task(&d, "t1", "Sweep", Some("p1"), 2).unwrap();
        let d = add_task(&d, "t2", "Mop", Some("p1"), 3).unwrap();
        reindex_day(&add_task(&d, "t3", "Read", None, 4).unwrap())
    }

    #[test]
    fn blank_and_unknown_inputs_are_no_ops() {
        let d = seeded();
        assert!(add_project(&d, "x", "   ", 0).is_none());
        assert!(add_task(&d, "x", "", None, 0).is_none());
        assert!(rename_task(&d, "t1", "  ").is_none());
        assert!(rename_task(&d, "nope", "x").is_none());
        assert!(toggle_task(&d, "nope").is_none());
        assert!(remove_project(&d, "nope").is_none());
        assert!(rename_project(&d, "p1", "Home").is_none());
    }

    #[test]
    fn toggle_project_cascades_to_its_tasks() {
        let d = reindex_day(&toggle_project(&seeded(), "p1").unwrap());
        assert!(d.project("p1").unwrap().done);
        assert!(d.project_tasks("p1").all(|t| t.done));
        assert!(!d.task("t3").unwrap().done);
        let back = reindex_day(&toggle_project(&d, "p1").unwrap());
        assert!(back.project_tasks("p1").all(|t| !t.done));
    }

    #[test]
    fn untouched_tasks_keep_their_arc() {
        let d = seeded();
        let next = toggle_task(&d, "t1").unwrap();
        assert!(!Arc::ptr_eq(&next.tasks[0], &d.tasks[0]));
        assert!(Arc::ptr_eq(&next.tasks[1], &d.tasks[1]));
    }

    #[test]
    fn removing_a_project_orphans_its_tasks() {
        let d = reindex_day(&remove_project(&seeded(), "p1").unwrap());
        assert!(d.projects.is_empty());
        assert_eq!(d.task("t1").unwrap().project_id.as_deref(), Some("p1"));
    }

    #[test]
    fn names_are_trimmed() {
        let d = add_task(&DayRecord::default(), "t", "  Call mom  ", None, 0).unwrap();
        assert_eq!(d.tasks[0].title, "Call mom");
    }
}
