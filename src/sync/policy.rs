//! The project completion rule: a project at 100% progress is Completed,
//! and Completed cannot be chosen below 100%. Every create and edit path
//! goes through [`resolve_project_status`].

use crate::model::{Project, ProjectStatus};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("cannot mark a project completed at {progress}% progress")]
    CompletedBeforeDone { progress: f64 },
}

/// Progress is server-computed and may be fractional; anything at or past
/// 100 counts as done.
pub fn is_fully_progressed(progress: f64) -> bool {
    progress >= 100.0
}

/// The status a save should send, given the user's choice and the
/// project's current progress.
pub fn resolve_project_status(
    requested: ProjectStatus,
    progress: f64,
) -> Result<ProjectStatus, PolicyError> {
    if is_fully_progressed(progress) {
        return Ok(ProjectStatus::Completed);
    }
    if requested == ProjectStatus::Completed {
        return Err(PolicyError::CompletedBeforeDone { progress });
    }
    Ok(requested)
}

/// Status for display and stats: 100% reads as Completed, On Hold is kept,
/// anything else is Active.
pub fn computed_status(project: &Project) -> ProjectStatus {
    if is_fully_progressed(project.progress) {
        ProjectStatus::Completed
    } else if project.status == ProjectStatus::OnHold {
        ProjectStatus::OnHold
    } else {
        ProjectStatus::Active
    }
}

/// True when the auto-complete sweep should patch this project.
pub fn needs_auto_complete(project: &Project) -> bool {
    is_fully_progressed(project.progress) && project.status != ProjectStatus::Completed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_progress_forces_completed() {
        for requested in [
            ProjectStatus::Active,
            ProjectStatus::OnHold,
            ProjectStatus::Completed,
        ] {
            assert_eq!(
                resolve_project_status(requested, 100.0),
                Ok(ProjectStatus::Completed)
            );
        }
    }

    #[test]
    fn completed_below_full_is_rejected() {
        assert_eq!(
            resolve_project_status(ProjectStatus::Completed, 99.5),
            Err(PolicyError::CompletedBeforeDone { progress: 99.5 })
        );
    }

    #[test]
    fn other_choices_pass_through() {
        assert_eq!(
            resolve_project_status(ProjectStatus::OnHold, 10.0),
            Ok(ProjectStatus::OnHold)
        );
    }

    #[test]
    fn computed_status_and_sweep_predicate() {
        let mut p = Project::new(1, "Apollo");
        p.status = ProjectStatus::Completed;
        p.progress = 80.0;
        assert_eq!(computed_status(&p), ProjectStatus::Active);
        assert!(!needs_auto_complete(&p));

        p.status = ProjectStatus::OnHold;
        p.progress = 100.0;
        assert_eq!(computed_status(&p), ProjectStatus::Completed);
        assert!(needs_auto_complete(&p));
    }
}
