use std::fmt;

use serde::{Deserialize, Serialize};

use super::project::ProjectId;

pub type MemberId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    Employee,
    #[serde(rename = "Scrum Master")]
    ScrumMaster,
    Manager,
}

impl Role {
    pub fn parse_role(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], " ").as_str() {
            "employee" => Some(Role::Employee),
            "scrum master" | "scrummaster" => Some(Role::ScrumMaster),
            "manager" => Some(Role::Manager),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Employee => write!(f, "Employee"),
            Role::ScrumMaster => write!(f, "Scrum Master"),
            Role::Manager => write!(f, "Manager"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemberStatus {
    #[default]
    Active,
    Inactive,
}

/// A roster entry as returned by `GET /api/team-members/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: MemberId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub project: Option<ProjectId>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub status: MemberStatus,
    /// Stored counters; stale unless recomputed from live tasks
    #[serde(default)]
    pub total_tasks: u32,
    #[serde(default)]
    pub completed_tasks: u32,
}

impl TeamMember {
    pub fn new(id: MemberId, name: impl Into<String>, email: impl Into<String>) -> Self {
        TeamMember {
            id,
            name: name.into(),
            email: email.into(),
            role: Role::Employee,
            department: String::new(),
            project: None,
            project_name: None,
            status: MemberStatus::Active,
            total_tasks: 0,
            completed_tasks: 0,
        }
    }

    /// The project this member is associated with, by name: the linked
    /// project's name if the server sent it, otherwise the department.
    pub fn project_label(&self) -> &str {
        match self.project_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.department,
        }
    }
}

/// Body of `POST /api/team-members/`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemberDraft {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    pub status: MemberStatus,
    pub total_tasks: u32,
    pub completed_tasks: u32,
}

/// Body of `PATCH /api/team-members/{id}/`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemberPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Option<ProjectId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MemberStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tasks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_tasks: Option<u32>,
}

impl MemberPatch {
    pub fn apply_to(&self, member: &mut TeamMember) {
        if let Some(name) = &self.name {
            member.name = name.clone();
        }
        if let Some(email) = &self.email {
            member.email = email.clone();
        }
        if let Some(role) = self.role {
            member.role = role;
        }
        if let Some(department) = &self.department {
            member.department = department.clone();
        }
        if let Some(project) = self.project_id {
            if member.project != project {
                member.project_name = None;
            }
            member.project = project;
        }
        if let Some(status) = self.status {
            member.status = status;
        }
        if let Some(total) = self.total_tasks {
            member.total_tasks = total;
        }
        if let Some(completed) = self.completed_tasks {
            member.completed_tasks = completed;
        }
    }
}
