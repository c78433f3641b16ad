use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{TaskId, User, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Comment,
    StatusChange,
    Assignment,
    WorkDone,
    View,
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityType::Comment => "comment",
            ActivityType::StatusChange => "status_change",
            ActivityType::Assignment => "assignment",
            ActivityType::WorkDone => "work_done",
            ActivityType::View => "view",
        };
        f.write_str(s)
    }
}

/// The slice of a task embedded in an activity that we care about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: TaskId,
    pub title: String,
}

/// An audit-trail entry as returned by `GET /api/activities/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub message: String,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub task: Option<TaskRef>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body of `POST /api/activities/`. The server fills in the current user
/// when `user_id` is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewActivity {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl NewActivity {
    pub fn new(kind: ActivityType, message: impl Into<String>) -> Self {
        NewActivity {
            kind,
            message: message.into(),
            task_id: None,
            user_id: None,
        }
    }

    pub fn work_done(message: impl Into<String>) -> Self {
        NewActivity::new(ActivityType::WorkDone, message)
    }

    pub fn view(page: &str) -> Self {
        NewActivity::new(ActivityType::View, format!("Viewed {} page", page))
    }

    pub fn for_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

/// Which recent-activity feed an item came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecentKind {
    Work,
    View,
}

/// A row of the "Recent" panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentItem {
    pub id: u64,
    pub kind: RecentKind,
    /// Task title when the activity references a task, otherwise the message
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub task: Option<TaskRef>,
}

impl RecentItem {
    pub fn from_activity(activity: Activity) -> Self {
        let kind = match activity.kind {
            ActivityType::View => RecentKind::View,
            _ => RecentKind::Work,
        };
        let title = activity
            .task
            .as_ref()
            .map(|t| t.title.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| activity.message.clone());
        RecentItem {
            id: activity.id,
            kind,
            title,
            message: activity.message,
            created_at: activity.created_at,
            task: activity.task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_activity_omits_absent_refs() {
        let body = serde_json::to_value(NewActivity::work_done("Created project Apollo")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"type": "work_done", "message": "Created project Apollo"})
        );
        let body = serde_json::to_value(NewActivity::work_done("x").for_task(9)).unwrap();
        assert_eq!(body["task_id"], 9);
    }

    #[test]
    fn activity_ignores_extra_task_fields() {
        let json = r#"{"id": 1, "type": "work_done", "message": "Marked task as done",
            "user": {"id": 1, "username": "ana"},
            "task": {"id": 4, "title": "Ship", "status": "done", "due_date": null},
            "created_at": "2025-02-01T09:00:00Z"}"#;
        let activity: Activity = serde_json::from_str(json).unwrap();
        assert_eq!(activity.task.as_ref().map(|t| t.id), Some(4));
        let item = RecentItem::from_activity(activity);
        assert_eq!(item.kind, RecentKind::Work);
        assert_eq!(item.title, "Ship");
    }

    #[test]
    fn recent_item_falls_back_to_message() {
        let activity = Activity {
            id: 2,
            kind: ActivityType::View,
            message: "Viewed Projects page".into(),
            user: None,
            task: None,
            created_at: None,
        };
        let item = RecentItem::from_activity(activity);
        assert_eq!(item.kind, RecentKind::View);
        assert_eq!(item.title, "Viewed Projects page");
    }
}
