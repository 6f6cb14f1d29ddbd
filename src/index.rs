// planner/src/index.rs

use std::{collections::BTreeSet, sync::Arc};

use crate::model::{DayMap, DayRecord, IsoDate, PlannerDays, ProjectIndex, Task, TaskIndex};

pub fn build_task_lookups(tasks: &[Arc<Task>]) -> (TaskIndex, ProjectIndex) {
    let mut by_id = TaskIndex::new();
    let mut by_project = ProjectIndex::new();
    for task in tasks {
        by_id.insert(task.id.clone(), Arc::clone(task));
        if let Some(pid) = task.project_id.as_deref().filter(|p| !p.is_empty()) {
            by_project.entry(pid.to_string()).or_default().push(task.id.clone());
        }
    }
    (by_id, by_project)
}

/// (done, total) over tasks.
pub fn count_tasks(tasks: &[Arc<Task>]) -> (usize, usize) {
    (tasks.iter().filter(|t| t.done).count(), tasks.len())
}

fn same_task_index(a: &TaskIndex, b: &TaskIndex) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| ka == kb && Arc::ptr_eq(va, vb))
}

/// Recomputes a day's derived fields. Index maps whose content did not
/// change keep their previous `Arc`.
pub fn reindex_day(day: &DayRecord) -> DayRecord {
    let (by_id, by_project) = build_task_lookups(&day.tasks);
    let (done_count, total_count) = count_tasks(&day.tasks);
    let tasks_by_id = if same_task_index(&day.tasks_by_id, &by_id) { Arc::clone(&day.tasks_by_id) } else { Arc::new(by_id) };
    let tasks_by_project = if *day.tasks_by_project == by_project { Arc::clone(&day.tasks_by_project) } else { Arc::new(by_project) };
    DayRecord { tasks_by_id, tasks_by_project, done_count, total_count, ..day.clone() }
}

fn is_fresh(day: &DayRecord, fresh: &DayRecord) -> bool {
    Arc::ptr_eq(&day.tasks_by_id, &fresh.tasks_by_id)
        && Arc::ptr_eq(&day.tasks_by_project, &fresh.tasks_by_project)
        && day.done_count == fresh.done_count
        && day.total_count == fresh.total_count
}

/// Reindexes exactly the listed days. Every other entry, and every listed
/// day whose indices were already current, keeps its `Arc`. Returns `days`
/// itself when nothing needed rebuilding.
pub fn reindex(days: &PlannerDays, changed: &[IsoDate]) -> PlannerDays {
    let mut next: Option<DayMap> = None;
    for iso in changed {
        let Some(day) = days.get(iso) else { continue };
        let fresh = reindex_day(day);
        if is_fresh(day, &fresh) { continue; }
        next.get_or_insert_with(|| (**days).clone()).insert(iso.clone(), Arc::new(fresh));
    }
    next.map(Arc::new).unwrap_or_else(|| Arc::clone(days))
}

/// What a mutator hands to the store.
#[derive(Clone, Debug)]
pub enum DaysUpdate {
    /// A map whose indices are already trusted (e.g. decoder output).
    Replace(PlannerDays),
    /// A new map plus the days the mutator touched.
    Patch { days: PlannerDays, changed: Vec<IsoDate> },
}

impl From<PlannerDays> for DaysUpdate {
    fn from(days: PlannerDays) -> Self { Self::Replace(days) }
}

impl From<DayMap> for DaysUpdate {
    fn from(days: DayMap) -> Self { Self::Replace(Arc::new(days)) }
}

impl From<(PlannerDays, Vec<IsoDate>)> for DaysUpdate {
    fn from((days, changed): (PlannerDays, Vec<IsoDate>)) -> Self { Self::Patch { days, changed } }
}

impl From<(DayMap, Vec<IsoDate>)> for DaysUpdate {
    fn from((days, changed): (DayMap, Vec<IsoDate>)) -> Self { Self::Patch { days: Arc::new(days), changed } }
}

/// Result of resolving an update against the previous version.
#[derive(Clone, Debug)]
pub struct Applied {
    pub days: PlannerDays,
    /// `None` for a wholesale replacement.
    pub changed: Option<Vec<IsoDate>>,
}

impl DaysUpdate {
    /// Reindexes the touched days that actually differ from `prev`.
    pub fn apply(self, prev: &PlannerDays) -> Applied {
        match self {
            Self::Replace(days) => Applied { days, changed: None },
            Self::Patch { days, changed } => {
                let mut seen = BTreeSet::new();
                let changed: Vec<IsoDate> = changed
                    .into_iter()
                    .filter(|iso| seen.insert(iso.clone()))
                    .filter(|iso| match (prev.get(iso), days.get(iso)) {
                        (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
                        (None, None) => false,
                        _ => true,
                    })
                    .collect();
                let days = reindex(&days, &changed);
                Applied { days, changed: Some(changed) }
            }
        }
    }
}
