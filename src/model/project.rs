use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProjectId = u64;

/// Project lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProjectStatus {
    #[default]
    Active,
    Completed,
    #[serde(rename = "On Hold")]
    OnHold,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Active => "Active",
            ProjectStatus::Completed => "Completed",
            ProjectStatus::OnHold => "On Hold",
        }
    }

    pub fn parse_status(s: &str) -> Option<ProjectStatus> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], " ").as_str() {
            "active" => Some(ProjectStatus::Active),
            "completed" | "complete" | "done" => Some(ProjectStatus::Completed),
            "on hold" | "onhold" | "hold" => Some(ProjectStatus::OnHold),
            _ => None,
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Project priority. Capitalized on the wire, unlike task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProjectPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl ProjectPriority {
    pub fn parse_priority(s: &str) -> Option<ProjectPriority> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(ProjectPriority::High),
            "medium" => Some(ProjectPriority::Medium),
            "low" => Some(ProjectPriority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for ProjectPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectPriority::High => write!(f, "High"),
            ProjectPriority::Medium => write!(f, "Medium"),
            ProjectPriority::Low => write!(f, "Low"),
        }
    }
}

/// One `{name, email}` entry of a project's free-form team list.
/// Neither field is validated by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// A project as returned by `GET /api/projects/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub priority: ProjectPriority,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub team: Vec<TeamEntry>,
    /// Percentage 0..=100 computed by the server from the project's tasks
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn new(id: ProjectId, name: impl Into<String>) -> Self {
        Project {
            id,
            name: name.into(),
            description: String::new(),
            status: ProjectStatus::Active,
            priority: ProjectPriority::Medium,
            category: String::new(),
            start_date: None,
            due_date: None,
            starred: false,
            team: Vec::new(),
            progress: 0.0,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Body of `POST /api/projects/`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectDraft {
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub priority: ProjectPriority,
    pub category: String,
    pub start_date: Option<String>,
    pub due_date: Option<String>,
    pub starred: bool,
    pub team: Vec<TeamEntry>,
}

impl ProjectDraft {
    pub fn new(name: impl Into<String>) -> Self {
        ProjectDraft {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Body of `PATCH /api/projects/{id}/`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<ProjectPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<Vec<TeamEntry>>,
}

impl ProjectPatch {
    pub fn status(status: ProjectStatus) -> Self {
        ProjectPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn starred(starred: bool) -> Self {
        ProjectPatch {
            starred: Some(starred),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, project: &mut Project) {
        if let Some(name) = &self.name {
            project.name = name.clone();
        }
        if let Some(description) = &self.description {
            project.description = description.clone();
        }
        if let Some(status) = self.status {
            project.status = status;
        }
        if let Some(priority) = self.priority {
            project.priority = priority;
        }
        if let Some(category) = &self.category {
            project.category = category.clone();
        }
        if let Some(start) = &self.start_date {
            project.start_date = start.clone();
        }
        if let Some(due) = &self.due_date {
            project.due_date = due.clone();
        }
        if let Some(starred) = self.starred {
            project.starred = starred;
        }
        if let Some(team) = &self.team {
            project.team = team.clone();
        }
    }
}
