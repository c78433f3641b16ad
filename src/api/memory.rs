use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;

use super::{ApiError, ProjectQuery, RecentFeed, RemoteStore};
use crate::model::{
    Activity, ActivityType, MemberDraft, MemberId, MemberPatch, NewActivity, Project,
    ProjectDraft, ProjectId, ProjectPatch, ProjectStatus, RecentItem, Task, TaskDraft, TaskId,
    TaskPatch, TaskRef, TeamMember, User,
};
use crate::ops::progress;

/// Backend operations, for failure injection and call inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListTasks,
    CreateTask,
    UpdateTask,
    DeleteTask,
    ListProjects,
    CreateProject,
    UpdateProject,
    DeleteProject,
    ListMembers,
    CreateMember,
    UpdateMember,
    DeleteMember,
    ListUsers,
    CreateActivity,
    Recent,
}

/// One call the store received
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub endpoint: Endpoint,
    pub id: Option<u64>,
    pub body: serde_json::Value,
}

#[derive(Debug, Default)]
struct State {
    tasks: IndexMap<TaskId, Task>,
    projects: IndexMap<ProjectId, Project>,
    members: IndexMap<MemberId, TeamMember>,
    users: IndexMap<u64, User>,
    activities: Vec<Activity>,
    next_id: u64,
    current_user: Option<u64>,
    signed_out: bool,
    /// Serve stored project statuses without deriving them from progress
    stored_status: bool,
    failures: HashMap<Endpoint, ApiError>,
    calls: Vec<RecordedCall>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record<B: Serialize>(&mut self, endpoint: Endpoint, id: Option<u64>, body: &B) {
        let body = serde_json::to_value(body).unwrap_or(serde_json::Value::Null);
        self.calls.push(RecordedCall { endpoint, id, body });
    }

    fn check(&self, endpoint: Endpoint) -> Result<(), ApiError> {
        if self.signed_out {
            return Err(ApiError::NotAuthenticated);
        }
        match self.failures.get(&endpoint) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn user(&self, id: Option<u64>) -> Option<User> {
        id.and_then(|id| self.users.get(&id).cloned())
    }

    /// Server-side view of a project: progress derived from its tasks when
    /// it has any, and status surfaced the way the backend serializer does.
    fn present(&self, project: &Project) -> Project {
        let mut out = project.clone();
        let tasks: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.project == Some(project.id))
            .collect();
        if let Some(weighted) = progress::weighted_progress(&tasks) {
            out.progress = (weighted.percent * 100.0).round() / 100.0;
        }
        if self.stored_status {
            return out;
        }
        if out.progress >= 100.0 {
            out.status = ProjectStatus::Completed;
        } else if out.status == ProjectStatus::Completed {
            out.status = ProjectStatus::Active;
        }
        out
    }

    fn precheck(&mut self, endpoint: Endpoint, id: Option<u64>) -> Result<(), ApiError> {
        self.check(endpoint)?;
        if let Some(id) = id {
            let exists = match endpoint {
                Endpoint::UpdateTask | Endpoint::DeleteTask => self.tasks.contains_key(&id),
                Endpoint::UpdateProject | Endpoint::DeleteProject => {
                    self.projects.contains_key(&id)
                }
                Endpoint::UpdateMember | Endpoint::DeleteMember => self.members.contains_key(&id),
                _ => true,
            };
            if !exists {
                let resource = match endpoint {
                    Endpoint::UpdateTask | Endpoint::DeleteTask => "task",
                    Endpoint::UpdateProject | Endpoint::DeleteProject => "project",
                    _ => "team member",
                };
                return Err(ApiError::NotFound { resource, id });
            }
        }
        Ok(())
    }
}

/// In-process [`RemoteStore`] that behaves like the REST backend.
///
/// Every call is recorded; any endpoint can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a task as-is, keeping its id.
    pub fn seed_task(&self, task: Task) {
        let mut state = self.lock();
        state.next_id = state.next_id.max(task.id);
        state.tasks.insert(task.id, task);
    }

    pub fn seed_project(&self, project: Project) {
        let mut state = self.lock();
        state.next_id = state.next_id.max(project.id);
        state.projects.insert(project.id, project);
    }

    pub fn seed_member(&self, member: TeamMember) {
        let mut state = self.lock();
        state.next_id = state.next_id.max(member.id);
        state.members.insert(member.id, member);
    }

    pub fn seed_user(&self, user: User) {
        let mut state = self.lock();
        state.next_id = state.next_id.max(user.id);
        state.users.insert(user.id, user);
    }

    /// Attribute new activities to this user, as the backend does for the
    /// token's owner.
    pub fn set_current_user(&self, id: u64) {
        self.lock().current_user = Some(id);
    }

    /// Make every call fail as if the token had expired.
    pub fn sign_out(&self) {
        self.lock().signed_out = true;
    }

    /// Report each project's stored status as-is, like a backend that does
    /// not derive status from progress on read.
    pub fn serve_stored_status(&self) {
        self.lock().stored_status = true;
    }

    /// Make `endpoint` fail with `err` until [`MemoryStore::clear_failures`].
    pub fn fail(&self, endpoint: Endpoint, err: ApiError) {
        self.lock().failures.insert(endpoint, err);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// All calls received so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, endpoint: Endpoint) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .cloned()
            .collect()
    }

    /// Server-side copy of a task.
    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.lock().tasks.get(&id).cloned()
    }

    pub fn project(&self, id: ProjectId) -> Option<Project> {
        let state = self.lock();
        state.projects.get(&id).map(|p| state.present(p))
    }

    pub fn activities(&self) -> Vec<Activity> {
        self.lock().activities.clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_tasks(&self) -> Result<Vec<Task>, ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::ListTasks, None, &());
        state.check(Endpoint::ListTasks)?;
        Ok(state.tasks.values().cloned().collect())
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::CreateTask, None, draft);
        state.check(Endpoint::CreateTask)?;
        let id = state.next_id();
        let now = Utc::now();
        let task = Task {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            status: draft.status,
            priority: draft.priority,
            story_points: draft.story_points,
            start_date: draft.start_date.clone(),
            due_date: draft.due_date.clone(),
            project: draft.project_id,
            assignee: state.user(draft.assignee_id),
            created_at: Some(now),
            updated_at: Some(now),
        };
        state.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::UpdateTask, Some(id), patch);
        state.precheck(Endpoint::UpdateTask, Some(id))?;
        let assignee = patch.assignee_id.map(|id| state.user(id));
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or(ApiError::NotFound { resource: "task", id })?;
        patch.apply_to(task);
        if let Some(assignee) = assignee {
            task.assignee = assignee;
        }
        task.updated_at = Some(Utc::now());
        Ok(task.clone())
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::DeleteTask, Some(id), &());
        state.precheck(Endpoint::DeleteTask, Some(id))?;
        state.tasks.shift_remove(&id);
        Ok(())
    }

    async fn list_projects(&self, query: &ProjectQuery) -> Result<Vec<Project>, ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::ListProjects, None, &query.search);
        state.check(Endpoint::ListProjects)?;
        let needle = query.search.as_deref().map(str::to_lowercase);
        Ok(state
            .projects
            .values()
            .filter(|p| !query.starred_only || p.starred)
            .filter(|p| match &needle {
                Some(n) => {
                    p.name.to_lowercase().contains(n) || p.description.to_lowercase().contains(n)
                }
                None => true,
            })
            .map(|p| state.present(p))
            .collect())
    }

    async fn create_project(&self, draft: &ProjectDraft) -> Result<Project, ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::CreateProject, None, draft);
        state.check(Endpoint::CreateProject)?;
        let id = state.next_id();
        let now = Utc::now();
        let project = Project {
            id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            status: draft.status,
            priority: draft.priority,
            category: draft.category.clone(),
            start_date: draft.start_date.clone(),
            due_date: draft.due_date.clone(),
            starred: draft.starred,
            team: draft.team.clone(),
            progress: 0.0,
            created_at: Some(now),
            updated_at: Some(now),
        };
        state.projects.insert(id, project.clone());
        Ok(state.present(&project))
    }

    async fn update_project(
        &self,
        id: ProjectId,
        patch: &ProjectPatch,
    ) -> Result<Project, ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::UpdateProject, Some(id), patch);
        state.precheck(Endpoint::UpdateProject, Some(id))?;
        let current = state
            .projects
            .get(&id)
            .map(|p| state.present(p))
            .ok_or(ApiError::NotFound { resource: "project", id })?;
        if patch.status == Some(ProjectStatus::Completed) && current.progress < 100.0 {
            return Err(ApiError::Status {
                status: 400,
                body: r#"{"status":["Cannot set status to 'Completed' until progress reaches 100%."]}"#
                    .to_string(),
            });
        }
        let project = state
            .projects
            .get_mut(&id)
            .ok_or(ApiError::NotFound { resource: "project", id })?;
        patch.apply_to(project);
        project.updated_at = Some(Utc::now());
        let project = project.clone();
        Ok(state.present(&project))
    }

    async fn delete_project(&self, id: ProjectId) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::DeleteProject, Some(id), &());
        state.precheck(Endpoint::DeleteProject, Some(id))?;
        state.projects.shift_remove(&id);
        Ok(())
    }

    async fn list_members(&self) -> Result<Vec<TeamMember>, ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::ListMembers, None, &());
        state.check(Endpoint::ListMembers)?;
        Ok(state.members.values().cloned().collect())
    }

    async fn create_member(&self, draft: &MemberDraft) -> Result<TeamMember, ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::CreateMember, None, draft);
        state.check(Endpoint::CreateMember)?;
        let email = draft.email.to_lowercase();
        if state.members.values().any(|m| m.email.to_lowercase() == email) {
            return Err(ApiError::Status {
                status: 400,
                body: r#"{"email":["team member with this email already exists."]}"#.to_string(),
            });
        }
        let id = state.next_id();
        let project_name = draft
            .project_id
            .and_then(|pid| state.projects.get(&pid))
            .map(|p| p.name.clone());
        let member = TeamMember {
            id,
            name: draft.name.clone(),
            email: draft.email.clone(),
            role: draft.role,
            department: draft.department.clone(),
            project: draft.project_id,
            project_name,
            status: draft.status,
            total_tasks: draft.total_tasks,
            completed_tasks: draft.completed_tasks,
        };
        state.members.insert(id, member.clone());
        Ok(member)
    }

    async fn update_member(
        &self,
        id: MemberId,
        patch: &MemberPatch,
    ) -> Result<TeamMember, ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::UpdateMember, Some(id), patch);
        state.precheck(Endpoint::UpdateMember, Some(id))?;
        let project_name = patch
            .project_id
            .flatten()
            .and_then(|pid| state.projects.get(&pid))
            .map(|p| p.name.clone());
        let member = state
            .members
            .get_mut(&id)
            .ok_or(ApiError::NotFound { resource: "team member", id })?;
        patch.apply_to(member);
        if patch.project_id.is_some() {
            member.project_name = project_name;
        }
        Ok(member.clone())
    }

    async fn delete_member(&self, id: MemberId) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::DeleteMember, Some(id), &());
        state.precheck(Endpoint::DeleteMember, Some(id))?;
        state.members.shift_remove(&id);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::ListUsers, None, &());
        state.check(Endpoint::ListUsers)?;
        Ok(state.users.values().cloned().collect())
    }

    async fn create_activity(&self, activity: &NewActivity) -> Result<Activity, ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::CreateActivity, activity.task_id, activity);
        state.check(Endpoint::CreateActivity)?;
        let id = state.next_id();
        let user = state.user(activity.user_id.or(state.current_user));
        let task = activity
            .task_id
            .and_then(|tid| state.tasks.get(&tid))
            .map(|t| TaskRef {
                id: t.id,
                title: t.title.clone(),
            });
        let created = Activity {
            id,
            kind: activity.kind,
            message: activity.message.clone(),
            user,
            task,
            created_at: Some(Utc::now()),
        };
        state.activities.push(created.clone());
        Ok(created)
    }

    async fn recent(
        &self,
        feed: RecentFeed,
        query: Option<&str>,
    ) -> Result<Vec<RecentItem>, ApiError> {
        let mut state = self.lock();
        state.record(Endpoint::Recent, None, &query);
        state.check(Endpoint::Recent)?;
        let needle = query.map(str::to_lowercase).filter(|q| !q.is_empty());
        let items = state
            .activities
            .iter()
            .rev()
            .filter(|a| match feed {
                RecentFeed::Work => a.kind == ActivityType::WorkDone,
                RecentFeed::Views => a.kind == ActivityType::View,
                RecentFeed::Search => {
                    matches!(a.kind, ActivityType::WorkDone | ActivityType::View)
                }
            })
            .filter(|a| match &needle {
                Some(n) => {
                    a.message.to_lowercase().contains(n)
                        || a.task.as_ref().is_some_and(|t| t.title.to_lowercase().contains(n))
                        || a.user.as_ref().is_some_and(|u| u.username.to_lowercase().contains(n))
                }
                None => true,
            })
            .cloned()
            .map(RecentItem::from_activity)
            .collect();
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskStatus;

    #[tokio::test]
    async fn records_calls_and_injects_failures() {
        let store = MemoryStore::new();
        store.seed_task(Task::new(1, "Write docs"));
        store.fail(Endpoint::UpdateTask, ApiError::Transport("offline".into()));

        let err = store
            .update_task(1, &TaskPatch::status(TaskStatus::Done))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Transport("offline".into()));
        assert_eq!(store.task(1).unwrap().status, TaskStatus::Todo);

        let calls = store.calls_to(Endpoint::UpdateTask);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body, serde_json::json!({"status": "done"}));

        store.clear_failures();
        store
            .update_task(1, &TaskPatch::status(TaskStatus::Done))
            .await
            .unwrap();
        assert_eq!(store.task(1).unwrap().status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn project_progress_comes_from_tasks() {
        let store = MemoryStore::new();
        store.seed_project(Project::new(10, "Apollo"));
        let mut a = Task::new(1, "a");
        a.project = Some(10);
        a.story_points = 3;
        a.status = TaskStatus::Done;
        let mut b = Task::new(2, "b");
        b.project = Some(10);
        b.story_points = 1;
        store.seed_task(a);
        store.seed_task(b);

        let project = store.project(10).unwrap();
        assert_eq!(project.progress, 75.0);
        assert_eq!(project.status, ProjectStatus::Active);

        store
            .update_task(2, &TaskPatch::status(TaskStatus::Done))
            .await
            .unwrap();
        let project = store.project(10).unwrap();
        assert_eq!(project.progress, 100.0);
        assert_eq!(project.status, ProjectStatus::Completed);
    }

    #[tokio::test]
    async fn rejects_completed_below_full_progress() {
        let store = MemoryStore::new();
        store.seed_project(Project::new(3, "Gemini"));
        let err = store
            .update_project(3, &ProjectPatch::status(ProjectStatus::Completed))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn signed_out_store_rejects_everything() {
        let store = MemoryStore::new();
        store.sign_out();
        assert_eq!(store.list_members().await, Err(ApiError::NotAuthenticated));
        assert_eq!(
            store.list_projects(&ProjectQuery::all()).await.unwrap_err(),
            ApiError::NotAuthenticated
        );
    }

    #[tokio::test]
    async fn recent_feeds_split_by_kind_newest_first() {
        let store = MemoryStore::new();
        store.seed_task(Task::new(1, "Ship release"));
        store
            .create_activity(&NewActivity::work_done("Marked task as done").for_task(1))
            .await
            .unwrap();
        store
            .create_activity(&NewActivity::view("Projects"))
            .await
            .unwrap();
        store
            .create_activity(&NewActivity::work_done("Created project Apollo"))
            .await
            .unwrap();

        let work = store.recent(RecentFeed::Work, None).await.unwrap();
        let titles: Vec<&str> = work.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Created project Apollo", "Ship release"]);

        let views = store.recent(RecentFeed::Views, None).await.unwrap();
        assert_eq!(views.len(), 1);

        let found = store.recent(RecentFeed::Search, Some("ship")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].task.as_ref().map(|t| t.id), Some(1));
    }
}
