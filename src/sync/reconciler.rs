//! Optimistic writes against the remote store.
//!
//! Every mutation is applied to the local cache first, then sent. On
//! failure the touched fields go back to the values captured before the
//! write, the lost edit is journaled, and the error is returned. Side
//! effects (activity log entries, invalidation broadcasts) run only after
//! the primary write succeeds and never fail it.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ProjectQuery, RemoteStore};
use crate::io::recovery::{RecoveryCategory, RecoveryEntry, log_recovery};
use crate::model::{
    FieldEdit, MemberDraft, MemberId, MemberPatch, NewActivity, Project, ProjectDraft, ProjectId,
    ProjectPatch, ProjectStatus, Task, TaskDraft, TaskField, TaskId, TaskPatch, TaskStatus,
    TeamMember,
};
use crate::sync::bus::{Event, Notifier};
use crate::sync::cache::EntityCache;
use crate::sync::coalesce::{Coalescer, Flush};
use crate::sync::policy::{self, PolicyError};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("{kind} {id} is not loaded")]
    NotCached { kind: &'static str, id: u64 },
}

impl SyncError {
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Api(e) if e.is_auth())
    }
}

/// A debounced edit the server refused
#[derive(Debug, Clone, PartialEq)]
pub struct FlushFailure {
    pub task_id: TaskId,
    pub edit: FieldEdit,
    pub error: ApiError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushOutcome {
    /// Remote calls that succeeded
    pub flushed: usize,
    pub failed: Vec<FlushFailure>,
}

impl FlushOutcome {
    fn merge(&mut self, other: FlushOutcome) {
        self.flushed += other.flushed;
        self.failed.extend(other.failed);
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

type EditKey = (TaskId, TaskField);

const INLINE_FIELDS: [TaskField; 3] = [TaskField::StoryPoints, TaskField::Title, TaskField::Description];

pub struct Reconciler {
    store: Arc<dyn RemoteStore>,
    notifier: Notifier,
    tasks: EntityCache<Task>,
    projects: EntityCache<Project>,
    members: EntityCache<TeamMember>,
    pending: Coalescer<EditKey, FieldEdit>,
    side_effects: JoinSet<()>,
    /// Projects the sweep has already logged an activity for
    auto_completed: HashSet<ProjectId>,
    recovery_dir: Option<PathBuf>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RemoteStore>, notifier: Notifier) -> Self {
        Reconciler {
            store,
            notifier,
            tasks: EntityCache::new(),
            projects: EntityCache::new(),
            members: EntityCache::new(),
            pending: Coalescer::new(DEFAULT_DEBOUNCE),
            side_effects: JoinSet::new(),
            auto_completed: HashSet::new(),
            recovery_dir: None,
        }
    }

    /// Trailing window for inline edits. Only call before staging any.
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.pending = Coalescer::new(window);
        self
    }

    /// Journal rolled-back edits under `dir`.
    pub fn with_recovery_dir(mut self, dir: PathBuf) -> Self {
        self.recovery_dir = Some(dir);
        self
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn tasks(&self) -> &EntityCache<Task> {
        &self.tasks
    }

    pub fn projects(&self) -> &EntityCache<Project> {
        &self.projects
    }

    pub fn members(&self) -> &EntityCache<TeamMember> {
        &self.members
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.get(id)
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Replace the task cache with the server's list. Edits still waiting
    /// in the debounce window are laid back on top.
    pub async fn load_tasks(&mut self) -> Result<(), SyncError> {
        let tasks = self.store.list_tasks().await?;
        self.tasks.replace_all(tasks);
        let queued: Vec<(TaskId, FieldEdit)> = self
            .pending
            .iter()
            .map(|(&(id, _), edit)| (id, edit.clone()))
            .collect();
        for (id, edit) in queued {
            self.tasks.update(id, |t| edit.apply_to(t));
        }
        Ok(())
    }

    pub async fn load_projects(&mut self) -> Result<(), SyncError> {
        let projects = self.store.list_projects(&ProjectQuery::all()).await?;
        self.projects.replace_all(projects);
        Ok(())
    }

    pub async fn load_members(&mut self) -> Result<(), SyncError> {
        let members = self.store.list_members().await?;
        self.members.replace_all(members);
        Ok(())
    }

    pub async fn load_all(&mut self) -> Result<(), SyncError> {
        self.load_tasks().await?;
        self.load_projects().await?;
        self.load_members().await
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Drag-and-drop between board columns.
    pub async fn move_task(&mut self, id: TaskId, status: TaskStatus) -> Result<(), SyncError> {
        let prior = self
            .tasks
            .update(id, |t| t.status = status)
            .ok_or(SyncError::NotCached { kind: "task", id })?;
        if prior.status == status {
            return Ok(());
        }

        if let Err(e) = self.store.update_task(id, &TaskPatch::status(status)).await {
            self.tasks.update(id, |t| t.status = prior.status);
            warn!(task = id, from = %prior.status, to = %status, error = %e, "move rolled back");
            self.journal(
                RecoveryEntry::new(RecoveryCategory::Rollback, format!("move task {}", id))
                    .field("Task", format!("{} ({})", id, prior.title))
                    .field("Requested", status)
                    .field("Restored", prior.status)
                    .field("Error", &e),
            );
            return Err(e.into());
        }

        if status.is_terminal() {
            self.log_activity(NewActivity::work_done("Marked task as done").for_task(id));
        }
        self.recompute_projects(prior.project.into_iter().collect()).await;
        self.publish_task_change();
        Ok(())
    }

    /// Create a task. Not optimistic: the id comes from the server.
    pub async fn create_task(&mut self, draft: TaskDraft) -> Result<Task, SyncError> {
        let task = self.store.create_task(&draft).await?;
        self.tasks.upsert(task.clone());
        self.log_activity(
            NewActivity::work_done(format!("Created task {}", task.title)).for_task(task.id),
        );
        self.recompute_projects(task.project.into_iter().collect()).await;
        self.publish_task_change();
        Ok(task)
    }

    /// Save the edit form: every field in `patch` at once.
    pub async fn save_task(&mut self, id: TaskId, patch: TaskPatch) -> Result<Task, SyncError> {
        let prior = self
            .tasks
            .update(id, |t| patch.apply_to(t))
            .ok_or(SyncError::NotCached { kind: "task", id })?;
        if patch.is_empty() {
            return Ok(prior);
        }

        match self.store.update_task(id, &patch).await {
            Ok(saved) => {
                let touched: Vec<ProjectId> =
                    prior.project.into_iter().chain(saved.project).collect();
                self.tasks.upsert(saved);
                self.reapply_pending(id);
                let became_done = patch.status.is_some_and(TaskStatus::is_terminal)
                    && !prior.status.is_terminal();
                if became_done {
                    self.log_activity(NewActivity::work_done("Updated task as done").for_task(id));
                }
                self.recompute_projects(touched).await;
                self.publish_task_change();
                Ok(self.tasks.get(id).cloned().unwrap_or(prior))
            }
            Err(e) => {
                self.tasks.upsert(prior.clone());
                self.reapply_pending(id);
                warn!(task = id, error = %e, "edit rolled back");
                self.journal(
                    RecoveryEntry::new(RecoveryCategory::Rollback, format!("edit task {}", id))
                        .field("Task", format!("{} ({})", id, prior.title))
                        .field("Error", &e)
                        .body(to_json_body(&patch)),
                );
                Err(e.into())
            }
        }
    }

    /// Remove a task, restoring it in place if the server refuses.
    pub async fn delete_task(&mut self, id: TaskId) -> Result<(), SyncError> {
        let (index, task) = self
            .tasks
            .remove(id)
            .ok_or(SyncError::NotCached { kind: "task", id })?;

        if let Err(e) = self.store.delete_task(id).await {
            warn!(task = id, error = %e, "delete rolled back");
            self.journal(
                RecoveryEntry::new(RecoveryCategory::Rollback, format!("delete task {}", id))
                    .field("Task", format!("{} ({})", id, task.title))
                    .field("Error", &e),
            );
            self.tasks.restore_at(index, task);
            return Err(e.into());
        }

        for field in INLINE_FIELDS {
            if let Some(dropped) = self.pending.discard(&(id, field)) {
                self.journal(
                    RecoveryEntry::new(
                        RecoveryCategory::Discarded,
                        format!("{} edit on deleted task {}", field, id),
                    )
                    .field("Value", &dropped.value),
                );
            }
        }
        self.recompute_projects(task.project.into_iter().collect()).await;
        self.publish_task_change();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Debounced inline edits
    // -----------------------------------------------------------------------

    /// Apply an inline edit locally and queue it. The remote call happens
    /// once the key has been quiet for the debounce window.
    pub fn stage_edit_at(&mut self, id: TaskId, edit: FieldEdit, now: Instant) -> Result<(), SyncError> {
        let field = edit.field();
        let prior = self
            .tasks
            .update(id, |t| edit.apply_to(t))
            .ok_or(SyncError::NotCached { kind: "task", id })?;
        self.pending
            .stage((id, field), edit, FieldEdit::current(&prior, field), now);
        Ok(())
    }

    pub fn stage_edit(&mut self, id: TaskId, edit: FieldEdit) -> Result<(), SyncError> {
        self.stage_edit_at(id, edit, clock_now())
    }

    /// The board's story-point spinner.
    pub fn stage_story_points(&mut self, id: TaskId, points: u32) -> Result<(), SyncError> {
        self.stage_edit(id, FieldEdit::StoryPoints(points))
    }

    pub fn has_pending_edits(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn next_flush_deadline(&self) -> Option<Instant> {
        self.pending.next_deadline()
    }

    /// Send every burst whose window has closed by `now`.
    pub async fn flush_due(&mut self, now: Instant) -> FlushOutcome {
        let due = self.pending.take_due(now);
        self.flush(due).await
    }

    /// Send everything still queued, ignoring deadlines.
    pub async fn flush_all(&mut self) -> FlushOutcome {
        let all = self.pending.take_all();
        self.flush(all).await
    }

    /// Sleep until each deadline and flush, until nothing is queued.
    pub async fn run_pending_flushes(&mut self) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();
        while let Some(deadline) = self.pending.next_deadline() {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            let due = self.flush_due(clock_now()).await;
            outcome.merge(due);
        }
        outcome
    }

    async fn flush(&mut self, bursts: Vec<Flush<EditKey, FieldEdit>>) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();
        let mut touched = Vec::new();
        for burst in bursts {
            let (id, field) = burst.key;
            if !self.tasks.contains(id) {
                continue;
            }
            debug!(task = id, %field, edits = burst.edits, "flushing inline edit");
            match self.store.update_task(id, &burst.value.to_patch()).await {
                Ok(saved) => {
                    outcome.flushed += 1;
                    touched.extend(saved.project);
                }
                Err(e) => {
                    self.tasks.update(id, |t| burst.prior.apply_to(t));
                    warn!(task = id, %field, error = %e, "inline edit rolled back");
                    self.journal(
                        RecoveryEntry::new(
                            RecoveryCategory::Rollback,
                            format!("{} edit on task {}", field, id),
                        )
                        .field("Value", &burst.value)
                        .field("Restored", &burst.prior)
                        .field("Error", &e),
                    );
                    outcome.failed.push(FlushFailure {
                        task_id: id,
                        edit: burst.value,
                        error: e,
                    });
                }
            }
        }
        if outcome.flushed > 0 {
            self.recompute_projects(touched).await;
            self.publish_task_change();
        }
        outcome
    }

    /// Lay queued edits for `id` back over a freshly replaced entity.
    fn reapply_pending(&mut self, id: TaskId) {
        for field in INLINE_FIELDS {
            if let Some(edit) = self.pending.pending_value(&(id, field)).cloned() {
                self.tasks.update(id, |t| edit.apply_to(t));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// A new project has no tasks, so asking for Completed is refused
    /// before anything is sent.
    pub async fn create_project(&mut self, mut draft: ProjectDraft) -> Result<Project, SyncError> {
        draft.status = policy::resolve_project_status(draft.status, 0.0)?;
        let project = self.store.create_project(&draft).await?;
        self.projects.upsert(project.clone());
        self.log_activity(NewActivity::work_done(format!(
            "Created project {}",
            project.name
        )));
        self.notifier.publish(Event::ProjectsChanged);
        Ok(project)
    }

    /// Save the project form. The status sent is whatever the completion
    /// rule resolves, so a project at 100% is always saved as Completed.
    pub async fn save_project(
        &mut self,
        id: ProjectId,
        mut patch: ProjectPatch,
    ) -> Result<Project, SyncError> {
        let current = self
            .projects
            .get(id)
            .ok_or(SyncError::NotCached { kind: "project", id })?;
        let requested = patch.status.unwrap_or(current.status);
        let resolved = policy::resolve_project_status(requested, current.progress)?;
        if patch.status.is_some() || resolved != current.status {
            patch.status = Some(resolved);
        }

        let prior = self
            .projects
            .update(id, |p| patch.apply_to(p))
            .ok_or(SyncError::NotCached { kind: "project", id })?;
        match self.store.update_project(id, &patch).await {
            Ok(saved) => {
                self.projects.upsert(saved.clone());
                self.notifier.publish(Event::ProjectsChanged);
                Ok(saved)
            }
            Err(e) => {
                self.projects.upsert(prior);
                warn!(project = id, error = %e, "project edit rolled back");
                self.journal(
                    RecoveryEntry::new(RecoveryCategory::Rollback, format!("edit project {}", id))
                        .field("Error", &e)
                        .body(to_json_body(&patch)),
                );
                Err(e.into())
            }
        }
    }

    /// Flip the star. Returns the new value.
    pub async fn toggle_star(&mut self, id: ProjectId) -> Result<bool, SyncError> {
        let prior = self
            .projects
            .update(id, |p| p.starred = !p.starred)
            .ok_or(SyncError::NotCached { kind: "project", id })?;
        let starred = !prior.starred;

        if let Err(e) = self
            .store
            .update_project(id, &ProjectPatch::starred(starred))
            .await
        {
            self.projects.update(id, |p| p.starred = prior.starred);
            warn!(project = id, error = %e, "star toggle rolled back");
            self.journal(
                RecoveryEntry::new(RecoveryCategory::Rollback, format!("star project {}", id))
                    .field("Requested", starred)
                    .field("Error", &e),
            );
            return Err(e.into());
        }
        self.notifier.publish(Event::ProjectsChanged);
        Ok(starred)
    }

    pub async fn delete_project(&mut self, id: ProjectId) -> Result<(), SyncError> {
        let (index, project) = self
            .projects
            .remove(id)
            .ok_or(SyncError::NotCached { kind: "project", id })?;
        if let Err(e) = self.store.delete_project(id).await {
            warn!(project = id, error = %e, "delete rolled back");
            self.journal(
                RecoveryEntry::new(RecoveryCategory::Rollback, format!("delete project {}", id))
                    .field("Project", &project.name)
                    .field("Error", &e),
            );
            self.projects.restore_at(index, project);
            return Err(e.into());
        }
        self.notifier.publish(Event::ProjectsChanged);
        self.notifier.publish(Event::TeamChanged);
        Ok(())
    }

    /// Patch every cached project at 100% that is not yet Completed.
    /// Failures are logged and skipped. Returns the ids that were completed.
    pub async fn auto_complete_projects(&mut self) -> Vec<ProjectId> {
        let due: Vec<ProjectId> = self
            .projects
            .iter()
            .filter(|p| policy::needs_auto_complete(p))
            .map(|p| p.id)
            .collect();

        let mut completed = Vec::new();
        for id in due {
            if self.complete_project(id).await {
                completed.push(id);
            }
        }
        if !completed.is_empty() {
            self.notifier.publish(Event::ProjectsChanged);
        }
        completed
    }

    async fn complete_project(&mut self, id: ProjectId) -> bool {
        let patch = ProjectPatch::status(ProjectStatus::Completed);
        match self.store.update_project(id, &patch).await {
            Ok(saved) => {
                let name = saved.name.clone();
                self.projects.upsert(saved);
                if self.auto_completed.insert(id) {
                    info!(project = id, "auto-completed");
                    self.log_activity(NewActivity::work_done(format!(
                        "Project {} auto-completed at 100%",
                        name
                    )));
                }
                true
            }
            Err(e) => {
                debug!(project = id, error = %e, "auto-complete skipped");
                false
            }
        }
    }

    /// Project progress is derived from tasks on the server, so a task write
    /// leaves cached projects stale. Re-read them and complete any touched
    /// project that reached 100%. Skipped when no projects are cached.
    async fn recompute_projects(&mut self, mut touched: Vec<ProjectId>) {
        if touched.is_empty() || self.projects.is_empty() {
            return;
        }
        match self.store.list_projects(&ProjectQuery::all()).await {
            Ok(projects) => self.projects.replace_all(projects),
            Err(e) => {
                debug!(error = %e, "project refresh after task write failed");
                return;
            }
        }
        touched.sort_unstable();
        touched.dedup();
        for id in touched {
            if self.projects.get(id).is_some_and(policy::needs_auto_complete) {
                self.complete_project(id).await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Team members
    // -----------------------------------------------------------------------

    pub async fn create_member(&mut self, draft: MemberDraft) -> Result<TeamMember, SyncError> {
        let member = self.store.create_member(&draft).await?;
        self.members.upsert(member.clone());
        self.notifier.publish(Event::TeamChanged);
        Ok(member)
    }

    pub async fn save_member(
        &mut self,
        id: MemberId,
        patch: MemberPatch,
    ) -> Result<TeamMember, SyncError> {
        let prior = self
            .members
            .update(id, |m| patch.apply_to(m))
            .ok_or(SyncError::NotCached { kind: "team member", id })?;
        match self.store.update_member(id, &patch).await {
            Ok(saved) => {
                self.members.upsert(saved.clone());
                self.notifier.publish(Event::TeamChanged);
                Ok(saved)
            }
            Err(e) => {
                self.members.upsert(prior);
                warn!(member = id, error = %e, "member edit rolled back");
                self.journal(
                    RecoveryEntry::new(RecoveryCategory::Rollback, format!("edit member {}", id))
                        .field("Error", &e)
                        .body(to_json_body(&patch)),
                );
                Err(e.into())
            }
        }
    }

    pub async fn delete_member(&mut self, id: MemberId) -> Result<(), SyncError> {
        let (index, member) = self
            .members
            .remove(id)
            .ok_or(SyncError::NotCached { kind: "team member", id })?;
        if let Err(e) = self.store.delete_member(id).await {
            warn!(member = id, error = %e, "delete rolled back");
            self.journal(
                RecoveryEntry::new(RecoveryCategory::Rollback, format!("delete member {}", id))
                    .field("Member", format!("{} <{}>", member.name, member.email))
                    .field("Error", &e),
            );
            self.members.restore_at(index, member);
            return Err(e.into());
        }
        self.notifier.publish(Event::TeamChanged);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Side effects
    // -----------------------------------------------------------------------

    /// Log a page view. Best effort.
    pub fn record_view(&mut self, page: &str) {
        self.log_activity(NewActivity::view(page));
    }

    /// Wait for every outstanding activity write.
    pub async fn settle(&mut self) {
        while let Some(joined) = self.side_effects.join_next().await {
            if let Err(e) = joined {
                debug!(error = %e, "side effect task aborted");
            }
        }
    }

    /// Fire-and-forget activity write; announces the Recent feed on success.
    fn log_activity(&mut self, activity: NewActivity) {
        while self.side_effects.try_join_next().is_some() {}
        let store = Arc::clone(&self.store);
        let notifier = self.notifier.clone();
        self.side_effects.spawn(async move {
            match store.create_activity(&activity).await {
                Ok(_) => {
                    notifier.publish(Event::RecentChanged);
                }
                Err(e) => debug!(kind = %activity.kind, error = %e, "activity not recorded"),
            }
        });
    }

    fn publish_task_change(&self) {
        self.notifier.publish(Event::TasksChanged);
        self.notifier.publish(Event::ProjectsChanged);
        self.notifier.publish(Event::TeamChanged);
    }

    fn journal(&self, entry: RecoveryEntry) {
        if let Some(dir) = &self.recovery_dir {
            log_recovery(dir, entry);
        }
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                pending = self.pending.len(),
                "dropping reconciler with unsent inline edits"
            );
        }
    }
}

/// The runtime's clock as a std instant; follows tokio's paused clock in tests.
fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn to_json_body<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}
