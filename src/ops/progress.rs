//! Per-member completion percentage for the team roster.
//!
//! The backend does not link team members to task assignees or to projects
//! by key, so both joins are best-effort string matches. The resolvers here
//! return a ranked match (or an explicit no-match) instead of a bare bool so
//! callers can tell how a task ended up in a member's numbers.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{MemberId, Project, ProjectId, Task, TaskStatus, TeamMember, User};

// ---------------------------------------------------------------------------
// Identity resolution
// ---------------------------------------------------------------------------

/// How a task assignee was matched to a team member, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssigneeMatch {
    /// Assignee email equals member email (case-insensitive)
    Email,
    /// Assignee username equals the local part of the member's email
    UsernameLocalPart,
    /// Assignee `first last` equals the member's name
    FullName,
    NoMatch,
}

impl AssigneeMatch {
    pub fn is_match(self) -> bool {
        self != AssigneeMatch::NoMatch
    }
}

/// How a project was associated with a member, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectMatch {
    /// Project name equals the member's project label
    ExactName,
    /// Project name contains the member's project label
    NameContains,
    /// The project's team list names the member
    TeamListed,
}

/// Lowercased, trimmed identity fields of a member
struct Identity {
    email: String,
    local_part: String,
    name: String,
}

impl Identity {
    fn of(member: &TeamMember) -> Self {
        let email = member.email.trim().to_lowercase();
        let local_part = email.split('@').next().unwrap_or("").to_string();
        Identity {
            email,
            local_part,
            name: member.name.trim().to_lowercase(),
        }
    }
}

fn norm(s: &str) -> String {
    s.trim().to_lowercase()
}

fn match_identity(identity: &Identity, user: &User) -> AssigneeMatch {
    let email = norm(&user.email);
    if !email.is_empty() && email == identity.email {
        return AssigneeMatch::Email;
    }
    let username = norm(&user.username);
    if !username.is_empty() && username == identity.local_part {
        return AssigneeMatch::UsernameLocalPart;
    }
    let full_name = user.full_name().to_lowercase();
    if !full_name.is_empty() && full_name == identity.name {
        return AssigneeMatch::FullName;
    }
    AssigneeMatch::NoMatch
}

/// Match a task assignee against a team member. The first rule that
/// succeeds wins.
pub fn match_assignee(member: &TeamMember, user: &User) -> AssigneeMatch {
    match_identity(&Identity::of(member), user)
}

/// Projects a member is associated with, each with its strongest match.
/// Ordered by match strength, then by position in `projects`.
pub fn resolve_projects(member: &TeamMember, projects: &[Project]) -> Vec<(ProjectId, ProjectMatch)> {
    let identity = Identity::of(member);
    let label = norm(member.project_label());
    let mut best: HashMap<ProjectId, ProjectMatch> = HashMap::new();
    let mut order: Vec<ProjectId> = Vec::new();

    let mut note = |id: ProjectId, m: ProjectMatch| match best.get(&id).copied() {
        Some(existing) if existing <= m => {}
        Some(_) => {
            best.insert(id, m);
        }
        None => {
            best.insert(id, m);
            order.push(id);
        }
    };

    for project in projects {
        let name = norm(&project.name);
        if !label.is_empty() {
            if name == label {
                note(project.id, ProjectMatch::ExactName);
            } else if name.contains(&label) {
                note(project.id, ProjectMatch::NameContains);
            }
        }
        let listed = project.team.iter().any(|entry| {
            let email = norm(&entry.email);
            let name = norm(&entry.name);
            (!email.is_empty() && email == identity.email)
                || (!name.is_empty() && name == identity.name)
                || (!email.is_empty()
                    && !identity.local_part.is_empty()
                    && email.split('@').next() == Some(identity.local_part.as_str()))
        });
        if listed {
            note(project.id, ProjectMatch::TeamListed);
        }
    }

    let mut resolved: Vec<(ProjectId, ProjectMatch)> =
        order.into_iter().map(|id| (id, best[&id])).collect();
    resolved.sort_by_key(|(_, m)| *m);
    resolved
}

// ---------------------------------------------------------------------------
// Weighting
// ---------------------------------------------------------------------------

/// Which inputs a percentage was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressBasis {
    StoryPoints,
    TaskCount,
    StoredCounters,
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weighted {
    pub percent: f64,
    pub basis: ProgressBasis,
}

/// Done counts fully, in-progress counts half. Weighted by story points when
/// any task carries points, by task count otherwise. `None` for no tasks.
pub fn weighted_progress(tasks: &[&Task]) -> Option<Weighted> {
    if tasks.is_empty() {
        return None;
    }
    let total_points: u64 = tasks.iter().map(|t| u64::from(t.story_points)).sum();
    if total_points > 0 {
        let earned: f64 = tasks
            .iter()
            .map(|t| f64::from(t.story_points) * t.status.weight())
            .sum();
        return Some(Weighted {
            percent: earned / total_points as f64 * 100.0,
            basis: ProgressBasis::StoryPoints,
        });
    }
    let earned: f64 = tasks.iter().map(|t| t.status.weight()).sum();
    Some(Weighted {
        percent: earned / tasks.len() as f64 * 100.0,
        basis: ProgressBasis::TaskCount,
    })
}

// ---------------------------------------------------------------------------
// Member progress
// ---------------------------------------------------------------------------

/// Derived roster numbers for one member
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberProgress {
    pub member_id: MemberId,
    /// Rounded to the nearest integer
    pub percent: u32,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub basis: ProgressBasis,
    /// The tasks the numbers were computed from
    pub task_ids: Vec<u64>,
}

/// Compute a member's completion percentage from live task data.
///
/// Task selection, first non-empty wins:
/// 1. tasks assigned to the member inside the member's projects
/// 2. tasks assigned to the member anywhere
/// 3. every task of the member's projects
///
/// With no tasks selected, the stored `completed/total` counters are used.
pub fn member_progress(member: &TeamMember, tasks: &[Task], projects: &[Project]) -> MemberProgress {
    let identity = Identity::of(member);
    let candidates: Vec<ProjectId> = resolve_projects(member, projects)
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    let in_candidates =
        |t: &Task| t.project.is_some_and(|p| candidates.contains(&p));

    let assigned: Vec<&Task> = tasks
        .iter()
        .filter(|t| {
            t.assignee
                .as_ref()
                .is_some_and(|u| match_identity(&identity, u).is_match())
        })
        .collect();

    let mut selected: Vec<&Task> = if candidates.is_empty() {
        Vec::new()
    } else {
        assigned.iter().copied().filter(|t| in_candidates(t)).collect()
    };
    if selected.is_empty() {
        selected = assigned;
    }
    if selected.is_empty() && !candidates.is_empty() {
        selected = tasks.iter().filter(|t| in_candidates(t)).collect();
    }

    match weighted_progress(&selected) {
        Some(weighted) => MemberProgress {
            member_id: member.id,
            percent: round_percent(weighted.percent),
            total_tasks: selected.len() as u32,
            completed_tasks: selected
                .iter()
                .filter(|t| t.status == TaskStatus::Done)
                .count() as u32,
            basis: weighted.basis,
            task_ids: selected.iter().map(|t| t.id).collect(),
        },
        None => {
            let (percent, basis) = if member.total_tasks > 0 {
                (
                    f64::from(member.completed_tasks) / f64::from(member.total_tasks) * 100.0,
                    ProgressBasis::StoredCounters,
                )
            } else {
                (0.0, ProgressBasis::NoData)
            };
            MemberProgress {
                member_id: member.id,
                percent: round_percent(percent),
                total_tasks: member.total_tasks,
                completed_tasks: member.completed_tasks,
                basis,
                task_ids: Vec::new(),
            }
        }
    }
}

/// [`member_progress`] for a whole roster
pub fn team_progress(members: &[TeamMember], tasks: &[Task], projects: &[Project]) -> Vec<MemberProgress> {
    members
        .iter()
        .map(|m| member_progress(m, tasks, projects))
        .collect()
}

fn round_percent(p: f64) -> u32 {
    if p.is_finite() {
        p.round().clamp(0.0, 100.0) as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TeamEntry;
    use pretty_assertions::assert_eq;

    fn user(id: u64, username: &str, email: &str, first: &str, last: &str) -> User {
        User {
            id,
            username: username.into(),
            email: email.into(),
            first_name: first.into(),
            last_name: last.into(),
        }
    }

    fn task(id: u64, status: TaskStatus, points: u32, project: Option<u64>, assignee: Option<User>) -> Task {
        let mut t = Task::new(id, format!("task {}", id));
        t.status = status;
        t.story_points = points;
        t.project = project;
        t.assignee = assignee;
        t
    }

    fn member(name: &str, email: &str, project: &str) -> TeamMember {
        let mut m = TeamMember::new(1, name, email);
        m.department = project.into();
        m
    }

    #[test]
    fn assignee_rules_apply_in_priority_order() {
        let m = member("Ana Ruiz", "ana@x.com", "");
        assert_eq!(match_assignee(&m, &user(1, "zz", "ANA@x.com", "", "")), AssigneeMatch::Email);
        assert_eq!(
            match_assignee(&m, &user(1, "ana", "other@y.com", "", "")),
            AssigneeMatch::UsernameLocalPart
        );
        assert_eq!(
            match_assignee(&m, &user(1, "aruiz", "", "Ana", "Ruiz")),
            AssigneeMatch::FullName
        );
        assert_eq!(match_assignee(&m, &user(1, "bo", "bo@x.com", "Bo", "")), AssigneeMatch::NoMatch);
    }

    #[test]
    fn empty_fields_never_match() {
        let m = member("", "", "");
        assert_eq!(match_assignee(&m, &user(1, "", "", "", "")), AssigneeMatch::NoMatch);
    }

    #[test]
    fn project_resolution_ranks_exact_before_substring() {
        let m = member("Ana", "ana@x.com", "apollo");
        let projects = vec![
            Project::new(1, "Apollo Mobile"),
            Project::new(2, "Apollo"),
            Project::new(3, "Gemini"),
        ];
        assert_eq!(
            resolve_projects(&m, &projects),
            vec![(2, ProjectMatch::ExactName), (1, ProjectMatch::NameContains)]
        );
    }

    #[test]
    fn project_resolution_includes_team_listing() {
        let m = member("Ana", "ana@x.com", "");
        let mut gemini = Project::new(3, "Gemini");
        gemini.team = vec![TeamEntry {
            name: String::new(),
            email: "ana@corp.example".into(),
        }];
        assert_eq!(resolve_projects(&m, &[gemini]), vec![(3, ProjectMatch::TeamListed)]);
    }

    #[test]
    fn story_points_weighting() {
        let a = user(1, "ana", "ana@x.com", "", "");
        let tasks = vec![
            task(1, TaskStatus::Done, 5, None, Some(a.clone())),
            task(2, TaskStatus::InProgress, 2, None, Some(a.clone())),
            task(3, TaskStatus::Todo, 3, None, Some(a)),
        ];
        let p = member_progress(&member("Ana", "ana@x.com", ""), &tasks, &[]);
        // (5 + 0.5 * 2) / 10
        assert_eq!(p.percent, 60);
        assert_eq!(p.basis, ProgressBasis::StoryPoints);
        assert_eq!(p.total_tasks, 3);
        assert_eq!(p.completed_tasks, 1);
    }

    #[test]
    fn count_weighting_without_points() {
        let a = user(1, "ana", "ana@x.com", "", "");
        let tasks = vec![
            task(1, TaskStatus::Done, 0, None, Some(a.clone())),
            task(2, TaskStatus::InProgress, 0, None, Some(a.clone())),
            task(3, TaskStatus::Todo, 0, None, Some(a)),
        ];
        let p = member_progress(&member("Ana", "ana@x.com", ""), &tasks, &[]);
        assert_eq!(p.percent, 50);
        assert_eq!(p.basis, ProgressBasis::TaskCount);
    }

    #[test]
    fn stored_counters_when_nothing_matches() {
        let mut m = member("Ana", "ana@x.com", "");
        m.total_tasks = 4;
        m.completed_tasks = 2;
        let p = member_progress(&m, &[], &[]);
        assert_eq!(p.percent, 50);
        assert_eq!(p.basis, ProgressBasis::StoredCounters);
        assert_eq!((p.total_tasks, p.completed_tasks), (4, 2));
    }

    #[test]
    fn nothing_at_all_is_zero() {
        let p = member_progress(&member("Ana", "ana@x.com", "Apollo"), &[], &[]);
        assert_eq!(p.percent, 0);
        assert_eq!(p.basis, ProgressBasis::NoData);
    }

    #[test]
    fn email_match_counts_regardless_of_project() {
        let a = user(1, "someone", "a@x.com", "", "");
        let tasks = vec![task(1, TaskStatus::Done, 3, Some(99), Some(a))];
        let projects = vec![Project::new(10, "Apollo")];
        let p = member_progress(&member("A", "a@x.com", "Apollo"), &tasks, &projects);
        assert_eq!(p.task_ids, vec![1]);
        assert_eq!(p.percent, 100);
    }

    #[test]
    fn project_scope_restricts_assigned_tasks() {
        let a = user(1, "ana", "ana@x.com", "", "");
        let tasks = vec![
            task(1, TaskStatus::Done, 1, Some(10), Some(a.clone())),
            task(2, TaskStatus::Todo, 1, Some(20), Some(a)),
        ];
        let projects = vec![Project::new(10, "Apollo"), Project::new(20, "Gemini")];
        let p = member_progress(&member("Ana", "ana@x.com", "apollo"), &tasks, &projects);
        assert_eq!(p.task_ids, vec![1]);
        assert_eq!(p.percent, 100);
    }

    #[test]
    fn falls_back_to_all_project_tasks() {
        let bo = user(2, "bo", "bo@x.com", "", "");
        let tasks = vec![
            task(1, TaskStatus::Done, 2, Some(10), Some(bo)),
            task(2, TaskStatus::Todo, 2, Some(10), None),
            task(3, TaskStatus::Done, 2, Some(20), None),
        ];
        let projects = vec![Project::new(10, "Apollo"), Project::new(20, "Gemini")];
        let p = member_progress(&member("Ana", "ana@x.com", "Apollo"), &tasks, &projects);
        assert_eq!(p.task_ids, vec![1, 2]);
        assert_eq!(p.percent, 50);
    }

    #[test]
    fn weighted_progress_empty_is_none() {
        assert!(weighted_progress(&[]).is_none());
    }

    #[test]
    fn team_progress_keeps_roster_order() {
        let members = vec![
            TeamMember::new(7, "Ana", "ana@x.com"),
            TeamMember::new(3, "Bo", "bo@x.com"),
        ];
        let ids: Vec<u64> = team_progress(&members, &[], &[])
            .iter()
            .map(|p| p.member_id)
            .collect();
        assert_eq!(ids, vec![7, 3]);
    }
}
