//! Access to the task/project backend.
//!
//! [`RemoteStore`] is the seam between the reconciler and the network:
//! [`http::HttpStore`] talks to the real REST API, [`memory::MemoryStore`]
//! keeps everything in process (offline mode and tests).

pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::model::{
    Activity, MemberDraft, MemberId, MemberPatch, NewActivity, Project, ProjectDraft, ProjectId,
    ProjectPatch, RecentItem, Task, TaskDraft, TaskId, TaskPatch, TeamMember, User,
};

/// Error type for remote calls
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("not authenticated: run `tb login` first")]
    NotAuthenticated,
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: u64 },
    #[error("request failed ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// True for an expired or missing token. Views report this
    /// separately from generic failures.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::NotAuthenticated)
    }
}

/// Filters for `GET /api/projects/`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectQuery {
    pub search: Option<String>,
    pub starred_only: bool,
}

impl ProjectQuery {
    pub fn all() -> Self {
        ProjectQuery::default()
    }

    pub fn starred() -> Self {
        ProjectQuery {
            search: None,
            starred_only: true,
        }
    }
}

/// The backend's recent-activity feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecentFeed {
    /// `work_done` activities
    Work,
    /// `view` activities
    Views,
    /// Both, filtered by a query
    Search,
}

/// CRUD surface of the backend that the client depends on.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<Task>, ApiError>;
    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError>;
    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ApiError>;
    async fn delete_task(&self, id: TaskId) -> Result<(), ApiError>;

    async fn list_projects(&self, query: &ProjectQuery) -> Result<Vec<Project>, ApiError>;
    async fn create_project(&self, draft: &ProjectDraft) -> Result<Project, ApiError>;
    async fn update_project(&self, id: ProjectId, patch: &ProjectPatch)
    -> Result<Project, ApiError>;
    async fn delete_project(&self, id: ProjectId) -> Result<(), ApiError>;

    async fn list_members(&self) -> Result<Vec<TeamMember>, ApiError>;
    async fn create_member(&self, draft: &MemberDraft) -> Result<TeamMember, ApiError>;
    async fn update_member(&self, id: MemberId, patch: &MemberPatch)
    -> Result<TeamMember, ApiError>;
    async fn delete_member(&self, id: MemberId) -> Result<(), ApiError>;

    async fn list_users(&self) -> Result<Vec<User>, ApiError>;

    async fn create_activity(&self, activity: &NewActivity) -> Result<Activity, ApiError>;
    async fn recent(&self, feed: RecentFeed, query: Option<&str>)
    -> Result<Vec<RecentItem>, ApiError>;
}
