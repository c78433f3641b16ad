use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::project::ProjectId;

pub type TaskId = u64;
pub type UserId = u64;

/// Board column a task sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];

    /// Wire name (`todo`, `in_progress`, `done`)
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    /// Parse a status name. Accepts the board's column keys
    /// (`inprogress`, `completed`) as well as the wire names.
    pub fn parse_status(s: &str) -> Option<TaskStatus> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" | "to-do" | "to_do" => Some(TaskStatus::Todo),
            "in_progress" | "inprogress" | "in-progress" | "active" => Some(TaskStatus::InProgress),
            "done" | "completed" => Some(TaskStatus::Done),
            _ => None,
        }
    }

    /// A terminal status triggers the "work done" audit entry.
    pub fn is_terminal(self) -> bool {
        self == TaskStatus::Done
    }

    /// Partial credit used by the progress math.
    pub fn weight(self) -> f64 {
        match self {
            TaskStatus::Todo => 0.0,
            TaskStatus::InProgress => 0.5,
            TaskStatus::Done => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Todo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Done => "Done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse_priority(s: &str) -> Option<Priority> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account on the backend (task assignees, activity authors)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl User {
    /// `first last`, trimmed; empty when neither is set
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Full name if known, otherwise the username
    pub fn display_name(&self) -> String {
        let name = self.full_name();
        if name.is_empty() {
            self.username.clone()
        } else {
            name
        }
    }
}

/// A task as returned by `GET /api/tasks/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub story_points: u32,
    /// `yyyy-mm-dd`
    #[serde(default)]
    pub start_date: Option<String>,
    /// `yyyy-mm-dd`
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub project: Option<ProjectId>,
    #[serde(default)]
    pub assignee: Option<User>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId, title: impl Into<String>) -> Self {
        Task {
            id,
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            story_points: 0,
            start_date: None,
            due_date: None,
            project: None,
            assignee: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// The date the calendar files this task under: due date, else start date.
    pub fn calendar_date(&self) -> Option<&str> {
        self.due_date.as_deref().or(self.start_date.as_deref())
    }
}

/// Body of `POST /api/tasks/`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub story_points: u32,
    pub start_date: Option<String>,
    pub due_date: Option<String>,
    pub project_id: Option<ProjectId>,
    pub assignee_id: Option<UserId>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        TaskDraft {
            title: title.into(),
            story_points: 1,
            ..Default::default()
        }
    }
}

/// Body of `PATCH /api/tasks/{id}/`. Absent fields are left alone;
/// `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_points: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Option<ProjectId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Option<UserId>>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        TaskPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    /// Apply the locally-representable fields to a cached task.
    ///
    /// Assignee changes only carry an id, so a changed assignee is cleared
    /// here and filled in from the server's response.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(points) = self.story_points {
            task.story_points = points;
        }
        if let Some(start) = &self.start_date {
            task.start_date = start.clone();
        }
        if let Some(due) = &self.due_date {
            task.due_date = due.clone();
        }
        if let Some(project) = self.project_id {
            task.project = project;
        }
        if let Some(assignee) = self.assignee_id
            && task.assignee.as_ref().map(|u| u.id) != assignee
        {
            task.assignee = None;
        }
    }
}

/// Inline task fields whose edits are debounced before persisting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskField {
    StoryPoints,
    Title,
    Description,
}

impl fmt::Display for TaskField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskField::StoryPoints => write!(f, "story_points"),
            TaskField::Title => write!(f, "title"),
            TaskField::Description => write!(f, "description"),
        }
    }
}

/// A single inline edit with its new value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
    StoryPoints(u32),
    Title(String),
    Description(String),
}

impl FieldEdit {
    pub fn field(&self) -> TaskField {
        match self {
            FieldEdit::StoryPoints(_) => TaskField::StoryPoints,
            FieldEdit::Title(_) => TaskField::Title,
            FieldEdit::Description(_) => TaskField::Description,
        }
    }

    /// Read the current value of `field` from a task
    pub fn current(task: &Task, field: TaskField) -> FieldEdit {
        match field {
            TaskField::StoryPoints => FieldEdit::StoryPoints(task.story_points),
            TaskField::Title => FieldEdit::Title(task.title.clone()),
            TaskField::Description => FieldEdit::Description(task.description.clone()),
        }
    }

    pub fn apply_to(&self, task: &mut Task) {
        match self {
            FieldEdit::StoryPoints(points) => task.story_points = *points,
            FieldEdit::Title(title) => task.title = title.clone(),
            FieldEdit::Description(text) => task.description = text.clone(),
        }
    }

    pub fn to_patch(&self) -> TaskPatch {
        let mut patch = TaskPatch::default();
        match self {
            FieldEdit::StoryPoints(points) => patch.story_points = Some(*points),
            FieldEdit::Title(title) => patch.title = Some(title.clone()),
            FieldEdit::Description(text) => patch.description = Some(text.clone()),
        }
        patch
    }
}

impl fmt::Display for FieldEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldEdit::StoryPoints(points) => write!(f, "{}", points),
            FieldEdit::Title(title) => write!(f, "{}", title),
            FieldEdit::Description(text) => write!(f, "{}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_accepts_board_keys() {
        assert_eq!(TaskStatus::parse_status("inprogress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse_status("In_Progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse_status("completed"), Some(TaskStatus::Done));
        assert_eq!(TaskStatus::parse_status("blocked"), None);
    }

    #[test]
    fn task_deserializes_with_missing_optional_fields() {
        let task: Task = serde_json::from_str(r#"{"id": 7, "title": "Write docs"}"#).unwrap();
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.story_points, 0);
        assert!(task.assignee.is_none());
    }

    #[test]
    fn task_deserializes_server_shape() {
        let json = r#"{
            "id": 3, "title": "Ship", "description": "", "status": "in_progress",
            "assignee": {"id": 2, "username": "ana", "first_name": "Ana", "last_name": "Ruiz", "email": "ana@x.com"},
            "project": 5, "priority": "high", "story_points": 8,
            "start_date": "2025-01-02", "due_date": null,
            "created_at": "2025-01-01T10:00:00Z", "updated_at": "2025-01-01T10:00:00Z"
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.project, Some(5));
        assert_eq!(task.calendar_date(), Some("2025-01-02"));
        assert_eq!(task.assignee.unwrap().full_name(), "Ana Ruiz");
    }

    #[test]
    fn patch_serializes_only_present_fields() {
        let patch = TaskPatch {
            story_points: Some(5),
            due_date: Some(None),
            ..Default::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, serde_json::json!({"story_points": 5, "due_date": null}));
    }

    #[test]
    fn patch_apply_clears_changed_assignee() {
        let mut task = Task::new(1, "t");
        task.assignee = Some(User {
            id: 4,
            username: "bo".into(),
            ..Default::default()
        });
        TaskPatch {
            assignee_id: Some(Some(4)),
            ..Default::default()
        }
        .apply_to(&mut task);
        assert!(task.assignee.is_some());

        TaskPatch {
            assignee_id: Some(Some(9)),
            ..Default::default()
        }
        .apply_to(&mut task);
        assert!(task.assignee.is_none());
    }

    #[test]
    fn field_edit_round_trips_through_task() {
        let mut task = Task::new(1, "old");
        let prior = FieldEdit::current(&task, TaskField::Title);
        FieldEdit::Title("new".into()).apply_to(&mut task);
        assert_eq!(task.title, "new");
        prior.apply_to(&mut task);
        assert_eq!(task.title, "old");
    }
}
