// planner/src/model.rs

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

/// `YYYY-MM-DD` in the user's local calendar.
pub type IsoDate = String;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,        // HH:MM, 24h
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_minutes: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub created_at: i64,             // epoch ms
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder: Option<Reminder>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub done: bool,
    pub created_at: i64,
}

pub type TaskIndex = BTreeMap<String, Arc<Task>>;
pub type ProjectIndex = BTreeMap<String, Vec<String>>;

/// Everything recorded for one calendar day.
///
/// `tasks_by_id` holds the same `Arc`s as `tasks`; `tasks_by_project` lists
/// task ids per project in task order. Both, along with the counts, are
/// derived and only ever rebuilt by [`crate::index`]. They are not written
/// to storage.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRecord {
    pub projects: Vec<Project>,
    pub tasks: Vec<Arc<Task>>,
    #[serde(skip)]
    pub tasks_by_id: Arc<TaskIndex>,
    #[serde(skip)]
    pub tasks_by_project: Arc<ProjectIndex>,
    pub done_count: usize,
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl DayRecord {
    /// Builds a fully indexed record.
    pub fn new(projects: Vec<Project>, tasks: Vec<Arc<Task>>) -> Self {
        crate::index::reindex_day(&Self { projects, tasks, ..Self::default() })
    }

    pub fn task(&self, id: &str) -> Option<&Arc<Task>> { self.tasks_by_id.get(id) }
    pub fn project(&self, id: &str) -> Option<&Project> { self.projects.iter().find(|p| p.id == id) }

    pub fn project_tasks(&self, project_id: &str) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks_by_project
            .get(project_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.tasks_by_id.get(id))
    }

    /// A day with nothing worth persisting.
    pub fn is_blank(&self) -> bool {
        self.projects.is_empty() && self.tasks.is_empty() && self.focus.is_none() && self.notes.is_none()
    }
}

pub type DayMap = BTreeMap<IsoDate, Arc<DayRecord>>;

/// The persisted aggregate. Versions are immutable: every change produces a
/// new outer `Arc` and new `Arc<DayRecord>`s only for days that changed.
pub type PlannerDays = Arc<DayMap>;

/// One selected project and/or task for a day.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Selection {
    pub fn is_empty(&self) -> bool { self.project_id.is_none() && self.task_id.is_none() }
}

pub type SelectionMap = BTreeMap<IsoDate, Selection>;

/// Short prefixed id, e.g. `task_3f2a9c0d41be77aa`.
pub fn uid(prefix: &str) -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &raw[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_is_prefixed_and_unique() {
        let a = uid("task");
        let b = uid("task");
        assert!(a.starts_with("task_"));
        assert_eq!(a.len(), "task_".len() + 16);
        assert_ne!(a, b);
    }

    #[test]
    fn serialized_day_omits_indices() {
        let task = Arc::new(Task {
            id: "t1".into(), title: "Write".into(), done: true, project_id: Some("p1".into()),
            created_at: 1, images: vec![], reminder: None,
        });
        let day = DayRecord::new(vec![], vec![task]);
        let v = serde_json::to_value(&day).unwrap();
        assert!(v.get("tasksById").is_none());
        assert!(v.get("tasksByProject").is_none());
        assert_eq!(v["doneCount"], 1);
        assert_eq!(v["tasks"][0]["projectId"], "p1");
        assert!(v.get("focus").is_none());
    }
}
