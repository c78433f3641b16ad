use std::collections::HashSet;
use std::ops::Range;

use chrono::NaiveDate;
use regex::RegexBuilder;

use crate::model::{
    MemberStatus, Priority, Project, ProjectPriority, ProjectStatus, Role, Task, TaskStatus,
    TeamMember,
};

/// Case-insensitive substring test; an empty needle matches everything.
fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    needle_lower.is_empty() || haystack.to_lowercase().contains(needle_lower)
}

fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Date range
// ---------------------------------------------------------------------------

/// Inclusive `yyyy-mm-dd` bounds. Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, chrono::ParseError> {
        Ok(DateRange {
            from: from.map(parse_date).transpose()?,
            to: to.map(parse_date).transpose()?,
        })
    }

    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// A missing or malformed date is outside any bounded range.
    pub fn contains(&self, date: Option<&str>) -> bool {
        if self.is_open() {
            return true;
        }
        let Some(date) = date.and_then(|d| parse_date(d).ok()) else {
            return false;
        };
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Board and calendar filter. Empty sets mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub query: String,
    pub statuses: HashSet<TaskStatus>,
    pub priorities: HashSet<Priority>,
    pub range: DateRange,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        let query = normalize_query(&self.query);
        self.matches_with(task, &query)
    }

    fn matches_with(&self, task: &Task, query: &str) -> bool {
        (contains_ci(&task.title, query) || contains_ci(&task.description, query))
            && (self.statuses.is_empty() || self.statuses.contains(&task.status))
            && (self.priorities.is_empty() || self.priorities.contains(&task.priority))
            && self.range.contains(task.calendar_date())
    }

    /// Matching tasks, input order preserved.
    pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        let query = normalize_query(&self.query);
        tasks.iter().filter(|t| self.matches_with(t, &query)).collect()
    }
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// Project list and project calendar filter. Empty sets mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    /// Substring of the project name or category
    pub query: String,
    pub statuses: HashSet<ProjectStatus>,
    pub priorities: HashSet<ProjectPriority>,
    /// Inclusive bounds on the due date
    pub range: DateRange,
    pub starred_only: bool,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        let query = normalize_query(&self.query);
        self.matches_with(project, &query)
    }

    fn matches_with(&self, project: &Project, query: &str) -> bool {
        (contains_ci(&project.name, query) || contains_ci(&project.category, query))
            && (self.statuses.is_empty() || self.statuses.contains(&project.status))
            && (self.priorities.is_empty() || self.priorities.contains(&project.priority))
            && self.range.contains(project.due_date.as_deref())
            && (!self.starred_only || project.starred)
    }

    pub fn apply<'a>(&self, projects: &'a [Project]) -> Vec<&'a Project> {
        let query = normalize_query(&self.query);
        projects.iter().filter(|p| self.matches_with(p, &query)).collect()
    }
}

// ---------------------------------------------------------------------------
// Team members
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberFilter {
    /// Matched against name, email, and project label
    pub query: String,
    pub roles: HashSet<Role>,
    pub status: Option<MemberStatus>,
}

impl MemberFilter {
    pub fn matches(&self, member: &TeamMember) -> bool {
        let query = normalize_query(&self.query);
        let text_hit = contains_ci(&member.name, &query)
            || contains_ci(&member.email, &query)
            || contains_ci(member.project_label(), &query);
        text_hit
            && (self.roles.is_empty() || self.roles.contains(&member.role))
            && self.status.is_none_or(|s| s == member.status)
    }

    pub fn apply<'a>(&self, members: &'a [TeamMember]) -> Vec<&'a TeamMember> {
        members.iter().filter(|m| self.matches(m)).collect()
    }
}

// ---------------------------------------------------------------------------
// Highlighting
// ---------------------------------------------------------------------------

/// Byte ranges of every case-insensitive occurrence of `query` in `text`.
/// The query is taken literally.
pub fn highlight_spans(text: &str, query: &str) -> Vec<Range<usize>> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }
    match RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.find_iter(text).map(|m| m.start()..m.end()).collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn task(id: u64, title: &str, status: TaskStatus, priority: Priority, due: Option<&str>) -> Task {
        let mut t = Task::new(id, title);
        t.status = status;
        t.priority = priority;
        t.due_date = due.map(String::from);
        t
    }

    fn board() -> Vec<Task> {
        let mut with_note = task(3, "Refactor", TaskStatus::Done, Priority::Low, None);
        with_note.description = "clean up the LOGIN flow".into();
        with_note.start_date = Some("2024-03-02".into());
        vec![
            task(1, "Login page", TaskStatus::Todo, Priority::High, Some("2024-03-01")),
            task(2, "Signup", TaskStatus::InProgress, Priority::Medium, Some("2024-03-10")),
            with_note,
            task(4, "Docs", TaskStatus::Todo, Priority::Low, None),
        ]
    }

    fn ids(tasks: &[&Task]) -> Vec<u64> {
        tasks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn empty_filter_matches_everything() {
        let tasks = board();
        assert_eq!(ids(&TaskFilter::default().apply(&tasks)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn query_hits_title_or_description() {
        let tasks = board();
        let filter = TaskFilter {
            query: " login ".into(),
            ..Default::default()
        };
        assert_eq!(ids(&filter.apply(&tasks)), vec![1, 3]);
    }

    #[test]
    fn status_and_priority_sets() {
        let tasks = board();
        let filter = TaskFilter {
            statuses: [TaskStatus::Todo].into_iter().collect(),
            priorities: [Priority::Low, Priority::High].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(ids(&filter.apply(&tasks)), vec![1, 4]);
    }

    #[test]
    fn date_range_is_inclusive_and_falls_back_to_start() {
        let tasks = board();
        let filter = TaskFilter {
            range: DateRange::parse(Some("2024-03-01"), Some("2024-03-02")).unwrap(),
            ..Default::default()
        };
        assert_eq!(ids(&filter.apply(&tasks)), vec![1, 3]);
    }

    #[test]
    fn open_ended_range_excludes_undated() {
        let tasks = board();
        let filter = TaskFilter {
            range: DateRange::parse(Some("2024-03-05"), None).unwrap(),
            ..Default::default()
        };
        assert_eq!(ids(&filter.apply(&tasks)), vec![2]);
    }

    #[test]
    fn malformed_bound_is_an_error() {
        assert!(DateRange::parse(Some("March 1"), None).is_err());
    }

    #[test]
    fn filters_are_idempotent() {
        let tasks = board();
        let filter = TaskFilter {
            query: "o".into(),
            ..Default::default()
        };
        let once: Vec<Task> = filter.apply(&tasks).into_iter().cloned().collect();
        let twice = filter.apply(&once);
        assert_eq!(ids(&twice), once.iter().map(|t| t.id).collect::<Vec<_>>());
    }

    #[test]
    fn project_filter() {
        let mut apollo = Project::new(1, "Apollo");
        apollo.starred = true;
        let mut gemini = Project::new(2, "Gemini");
        gemini.status = ProjectStatus::OnHold;
        let projects = vec![apollo, gemini, Project::new(3, "Apollo Mobile")];

        let by_name = ProjectFilter {
            query: "apollo".into(),
            ..Default::default()
        };
        assert_eq!(by_name.apply(&projects).len(), 2);

        let starred = ProjectFilter {
            starred_only: true,
            ..Default::default()
        };
        assert_eq!(starred.apply(&projects)[0].id, 1);

        let on_hold = ProjectFilter {
            statuses: [ProjectStatus::OnHold].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(on_hold.apply(&projects)[0].id, 2);
    }

    fn roadmap() -> Vec<Project> {
        let mut apollo = Project::new(1, "Apollo");
        apollo.priority = ProjectPriority::High;
        apollo.category = "Marketing".into();
        apollo.due_date = Some("2025-03-31".into());
        let mut gemini = Project::new(2, "Gemini");
        gemini.priority = ProjectPriority::Low;
        gemini.due_date = Some("2025-04-15".into());
        let mut mercury = Project::new(3, "Mercury");
        mercury.priority = ProjectPriority::High;
        vec![apollo, gemini, mercury]
    }

    fn project_ids(projects: &[&Project]) -> Vec<u64> {
        projects.iter().map(|p| p.id).collect()
    }

    #[test]
    fn project_priority_set() {
        let projects = roadmap();
        let high = ProjectFilter {
            priorities: [ProjectPriority::High].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(project_ids(&high.apply(&projects)), vec![1, 3]);
    }

    #[test]
    fn project_due_date_range_is_inclusive() {
        let projects = roadmap();
        let march = ProjectFilter {
            range: DateRange::parse(Some("2025-03-01"), Some("2025-03-31")).unwrap(),
            ..Default::default()
        };
        assert_eq!(project_ids(&march.apply(&projects)), vec![1]);

        let from_march = ProjectFilter {
            range: DateRange::parse(Some("2025-03-31"), None).unwrap(),
            ..Default::default()
        };
        assert_eq!(project_ids(&from_march.apply(&projects)), vec![1, 2]);
    }

    #[test]
    fn project_query_hits_category() {
        let projects = roadmap();
        let filter = ProjectFilter {
            query: "MARKET".into(),
            ..Default::default()
        };
        assert_eq!(project_ids(&filter.apply(&projects)), vec![1]);
    }

    #[test]
    fn member_filter_searches_project_label() {
        let mut ana = TeamMember::new(1, "Ana", "ana@x.com");
        ana.department = "Platform".into();
        let mut bo = TeamMember::new(2, "Bo", "bo@x.com");
        bo.role = Role::Manager;
        let members = vec![ana, bo];

        let filter = MemberFilter {
            query: "platform".into(),
            ..Default::default()
        };
        assert_eq!(filter.apply(&members).len(), 1);

        let managers = MemberFilter {
            roles: [Role::Manager].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(managers.apply(&members)[0].id, 2);
    }

    #[test]
    fn highlight_is_case_insensitive_and_literal() {
        assert_eq!(highlight_spans("Login and LOGIN", "login"), vec![0..5, 10..15]);
        assert_eq!(highlight_spans("cost (est.)", "(est.)"), vec![5..11]);
        assert!(highlight_spans("anything", "  ").is_empty());
    }
}
