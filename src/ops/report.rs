use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{Project, ProjectStatus, Task, TaskStatus};
use crate::sync::policy::computed_status;

/// Stat cards shown above the project list
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectStats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub on_hold: usize,
    pub starred: usize,
    /// Mean progress, one decimal
    pub average_progress: f64,
}

/// Counts use the status a project *should* have given its progress, so a
/// project at 100% shows as completed before the sweep has patched it.
pub fn project_stats(projects: &[Project]) -> ProjectStats {
    let mut stats = ProjectStats {
        total: projects.len(),
        ..Default::default()
    };
    for project in projects {
        match computed_status(project) {
            ProjectStatus::Active => stats.active += 1,
            ProjectStatus::Completed => stats.completed += 1,
            ProjectStatus::OnHold => stats.on_hold += 1,
        }
        if project.starred {
            stats.starred += 1;
        }
    }
    if !projects.is_empty() {
        let sum: f64 = projects.iter().map(|p| p.progress).sum();
        stats.average_progress = (sum / projects.len() as f64 * 10.0).round() / 10.0;
    }
    stats
}

/// Task summary for the "Your Work" page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    pub total: usize,
    pub story_points_done: u32,
    pub story_points_total: u32,
}

pub fn task_stats(tasks: &[Task]) -> TaskStats {
    let mut stats = TaskStats {
        total: tasks.len(),
        ..Default::default()
    };
    for task in tasks {
        match task.status {
            TaskStatus::Todo => stats.todo += 1,
            TaskStatus::InProgress => stats.in_progress += 1,
            TaskStatus::Done => {
                stats.done += 1;
                stats.story_points_done += task.story_points;
            }
        }
        stats.story_points_total += task.story_points;
    }
    stats
}

/// Open tasks dated within `days` of `today` (inclusive), soonest first.
/// Overdue open tasks are included.
pub fn upcoming(tasks: &[Task], today: NaiveDate, days: u32) -> Vec<&Task> {
    let horizon = today + chrono::Duration::days(i64::from(days));
    let mut dated: Vec<(NaiveDate, &Task)> = tasks
        .iter()
        .filter(|t| !t.status.is_terminal())
        .filter_map(|t| {
            let date = NaiveDate::parse_from_str(t.calendar_date()?, "%Y-%m-%d").ok()?;
            (date <= horizon).then_some((date, t))
        })
        .collect();
    dated.sort_by_key(|(date, t)| (*date, t.id));
    dated.into_iter().map(|(_, t)| t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn project(id: u64, progress: f64, status: ProjectStatus, starred: bool) -> Project {
        let mut p = Project::new(id, format!("p{}", id));
        p.progress = progress;
        p.status = status;
        p.starred = starred;
        p
    }

    #[test]
    fn stats_use_computed_status() {
        let projects = vec![
            project(1, 100.0, ProjectStatus::Active, true),
            project(2, 40.0, ProjectStatus::Active, false),
            project(3, 10.0, ProjectStatus::OnHold, true),
            project(4, 55.55, ProjectStatus::Active, false),
        ];
        assert_eq!(
            project_stats(&projects),
            ProjectStats {
                total: 4,
                active: 2,
                completed: 1,
                on_hold: 1,
                starred: 2,
                // 205.55 / 4 = 51.3875
                average_progress: 51.4,
            }
        );
    }

    #[test]
    fn empty_project_list_is_all_zero() {
        assert_eq!(project_stats(&[]), ProjectStats::default());
    }

    #[test]
    fn task_summary_counts() {
        let mut done = Task::new(1, "a");
        done.status = TaskStatus::Done;
        done.story_points = 3;
        let mut doing = Task::new(2, "b");
        doing.status = TaskStatus::InProgress;
        doing.story_points = 2;
        let stats = task_stats(&[done, doing, Task::new(3, "c")]);
        assert_eq!(
            (stats.todo, stats.in_progress, stats.done, stats.total),
            (1, 1, 1, 3)
        );
        assert_eq!((stats.story_points_done, stats.story_points_total), (3, 5));
    }

    #[test]
    fn upcoming_skips_done_and_far_future() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut overdue = Task::new(1, "overdue");
        overdue.due_date = Some("2024-02-20".into());
        let mut soon = Task::new(2, "soon");
        soon.start_date = Some("2024-03-05".into());
        let mut later = Task::new(3, "later");
        later.due_date = Some("2024-04-01".into());
        let mut finished = Task::new(4, "finished");
        finished.due_date = Some("2024-03-02".into());
        finished.status = TaskStatus::Done;
        let tasks = vec![later, soon, finished, overdue];

        let ids: Vec<u64> = upcoming(&tasks, today, 7).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
