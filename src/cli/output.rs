use serde::Serialize;

use crate::io::recovery::RecoveryEntry;
use crate::model::{Project, ProjectStatus, RecentItem, Task, TaskStatus, TeamMember};
use crate::ops::filter::highlight_spans;
use crate::ops::progress::{MemberProgress, ProgressBasis};
use crate::ops::report::{ProjectStats, TaskStats};
use crate::sync::policy::computed_status;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct BoardJson<'a> {
    pub todo: Vec<&'a Task>,
    pub in_progress: Vec<&'a Task>,
    pub done: Vec<&'a Task>,
}

#[derive(Serialize)]
pub struct MemberJson<'a> {
    #[serde(flatten)]
    pub member: &'a TeamMember,
    pub progress: u32,
    pub basis: ProgressBasis,
    pub live_total_tasks: u32,
    pub live_completed_tasks: u32,
}

#[derive(Serialize)]
pub struct ReportJson<'a> {
    pub projects: &'a ProjectStats,
    pub tasks: &'a TaskStats,
    pub upcoming: Vec<&'a Task>,
}

#[derive(Serialize)]
pub struct FlushJson {
    pub task_id: u64,
    pub story_points: u32,
    pub edits: usize,
    pub remote_calls: usize,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn board_to_json<'a>(tasks: &[&'a Task]) -> BoardJson<'a> {
    let column = |status: TaskStatus| {
        tasks
            .iter()
            .copied()
            .filter(|t| t.status == status)
            .collect::<Vec<_>>()
    };
    BoardJson {
        todo: column(TaskStatus::Todo),
        in_progress: column(TaskStatus::InProgress),
        done: column(TaskStatus::Done),
    }
}

pub fn member_to_json<'a>(member: &'a TeamMember, progress: &MemberProgress) -> MemberJson<'a> {
    MemberJson {
        member,
        progress: progress.percent,
        basis: progress.basis,
        live_total_tasks: progress.total_tasks,
        live_completed_tasks: progress.completed_tasks,
    }
}

// ---------------------------------------------------------------------------
// Text formatting
// ---------------------------------------------------------------------------

/// Wrap every case-insensitive match of `query` in `[` `]`.
pub fn highlight(text: &str, query: &str) -> String {
    let spans = highlight_spans(text, query);
    if spans.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + spans.len() * 2);
    let mut last = 0;
    for span in spans {
        out.push_str(&text[last..span.start]);
        out.push('[');
        out.push_str(&text[span.clone()]);
        out.push(']');
        last = span.end;
    }
    out.push_str(&text[last..]);
    out
}

fn status_char(status: TaskStatus) -> char {
    match status {
        TaskStatus::Todo => ' ',
        TaskStatus::InProgress => '>',
        TaskStatus::Done => 'x',
    }
}

/// `[>] #12 Title (high, 3 pts) due:2025-03-01 @alice`
pub fn format_task_line(task: &Task, query: &str) -> String {
    let mut line = format!(
        "[{}] #{} {} ({}, {} pts)",
        status_char(task.status),
        task.id,
        highlight(&task.title, query),
        task.priority,
        task.story_points
    );
    if let Some(due) = &task.due_date {
        line.push_str(&format!(" due:{}", due));
    }
    if let Some(user) = &task.assignee {
        line.push_str(&format!(" @{}", user.username));
    }
    line
}

pub fn format_board(tasks: &[&Task], query: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for status in [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done] {
        let column: Vec<&&Task> = tasks.iter().filter(|t| t.status == status).collect();
        lines.push(format!("{} ({})", status.label(), column.len()));
        for task in column {
            lines.push(format!("  {}", format_task_line(task, query)));
        }
    }
    lines
}

/// `* #3 Apollo [Completed] 100.0% high`. A status that the backend has not
/// caught up with yet is shown as `Active -> Completed`.
pub fn format_project_line(project: &Project, query: &str) -> String {
    let star = if project.starred { '*' } else { ' ' };
    let derived = computed_status(project);
    let status = if derived == project.status {
        project.status.to_string()
    } else {
        format!("{} -> {}", project.status, derived)
    };
    let mut line = format!(
        "{} #{} {} [{}] {:.1}% {}",
        star,
        project.id,
        highlight(&project.name, query),
        status,
        project.progress,
        project.priority
    );
    if let Some(due) = &project.due_date {
        line.push_str(&format!(" due:{}", due));
    }
    line
}

pub fn format_member_line(member: &TeamMember, progress: &MemberProgress, query: &str) -> String {
    format!(
        "#{} {} <{}> {} | {} | {}% ({}/{} tasks)",
        member.id,
        highlight(&member.name, query),
        highlight(&member.email, query),
        member.role,
        member.project_label(),
        progress.percent,
        progress.completed_tasks,
        progress.total_tasks
    )
}

/// A dated calendar line: a task on its due (or start) date, or a project
/// on its due date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalendarEntry<'a> {
    pub date: &'a str,
    pub mark: char,
    pub id: u64,
    pub title: &'a str,
}

impl<'a> CalendarEntry<'a> {
    pub fn task(task: &'a Task) -> Option<Self> {
        Some(CalendarEntry {
            date: task.calendar_date()?,
            mark: status_char(task.status),
            id: task.id,
            title: &task.title,
        })
    }

    /// Completed reads as done, Active as in progress, On Hold as open.
    pub fn project(project: &'a Project) -> Option<Self> {
        let mark = match computed_status(project) {
            ProjectStatus::Completed => 'x',
            ProjectStatus::Active => '>',
            ProjectStatus::OnHold => ' ',
        };
        Some(CalendarEntry {
            date: project.due_date.as_deref()?,
            mark,
            id: project.id,
            title: &project.name,
        })
    }
}

/// Entries must already be sorted by date.
pub fn format_calendar(entries: &[CalendarEntry]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_day: Option<&str> = None;
    for entry in entries {
        if current_day != Some(entry.date) {
            lines.push(entry.date.to_string());
            current_day = Some(entry.date);
        }
        lines.push(format!("  [{}] #{} {}", entry.mark, entry.id, entry.title));
    }
    lines
}

pub fn format_recent_line(item: &RecentItem) -> String {
    let when = item
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    if item.title == item.message {
        format!("{}  {}", when, item.message)
    } else {
        format!("{}  {} - {}", when, item.title, item.message)
    }
}

pub fn format_report(projects: &ProjectStats, tasks: &TaskStats, upcoming: &[&Task]) -> Vec<String> {
    let mut lines = vec![
        format!(
            "projects: {} total, {} active, {} completed, {} on hold, {} starred",
            projects.total, projects.active, projects.completed, projects.on_hold, projects.starred
        ),
        format!("average progress: {:.1}%", projects.average_progress),
        format!(
            "tasks: {} todo, {} in progress, {} done ({} total)",
            tasks.todo, tasks.in_progress, tasks.done, tasks.total
        ),
        format!(
            "story points: {}/{} done",
            tasks.story_points_done, tasks.story_points_total
        ),
    ];
    if !upcoming.is_empty() {
        lines.push(String::new());
        lines.push("upcoming:".to_string());
        for task in upcoming {
            lines.push(format!(
                "  {} #{} {}",
                task.due_date.as_deref().unwrap_or(""),
                task.id,
                task.title
            ));
        }
    }
    lines
}

pub fn format_recovery_entry(entry: &RecoveryEntry) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {}: {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.category,
        entry.description
    )];
    for (key, value) in &entry.fields {
        lines.push(format!("  {}: {}", key, value));
    }
    for body_line in entry.body.lines() {
        lines.push(format!("    {}", body_line));
    }
    lines
}
