//! Seed data for `--offline`. Each invocation starts from this state.

use crate::api::memory::MemoryStore;
use crate::model::{
    Priority, Project, ProjectPriority, ProjectStatus, Role, Task, TaskStatus, TeamEntry,
    TeamMember, User,
};

fn user(id: u64, username: &str, first: &str, last: &str) -> User {
    User {
        id,
        username: username.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: format!("{}@example.com", username),
    }
}

struct TaskSeed {
    id: u64,
    title: &'static str,
    status: TaskStatus,
    priority: Priority,
    points: u32,
    due: Option<&'static str>,
    project: u64,
    assignee: Option<usize>,
}

const TASKS: &[TaskSeed] = &[
    TaskSeed { id: 10, title: "Design landing page", status: TaskStatus::Done, priority: Priority::High, points: 5, due: Some("2025-03-03"), project: 1, assignee: Some(0) },
    TaskSeed { id: 11, title: "Write launch post", status: TaskStatus::InProgress, priority: Priority::Medium, points: 3, due: Some("2025-03-10"), project: 1, assignee: Some(1) },
    TaskSeed { id: 12, title: "Set up analytics", status: TaskStatus::Todo, priority: Priority::Low, points: 2, due: Some("2025-03-14"), project: 1, assignee: None },
    TaskSeed { id: 13, title: "Migrate billing tables", status: TaskStatus::Done, priority: Priority::High, points: 8, due: Some("2025-02-20"), project: 2, assignee: Some(2) },
    TaskSeed { id: 14, title: "Backfill invoices", status: TaskStatus::Done, priority: Priority::Medium, points: 3, due: Some("2025-02-25"), project: 2, assignee: Some(2) },
    TaskSeed { id: 15, title: "Fix login redirect", status: TaskStatus::Todo, priority: Priority::High, points: 1, due: None, project: 3, assignee: Some(1) },
];

/// A store with three users, three projects, six tasks, and a team of three.
/// Project 2 has every task done but is still stored as Active, so
/// `complete-sweep` has work to do.
pub fn demo_store() -> MemoryStore {
    let store = MemoryStore::new();
    let users = [
        user(1, "alice", "Alice", "Nguyen"),
        user(2, "bob", "Bob", "Okafor"),
        user(3, "carol", "Carol", "Silva"),
    ];
    for u in &users {
        store.seed_user(u.clone());
    }
    store.set_current_user(1);
    store.serve_stored_status();

    let mut website = Project::new(1, "Website relaunch");
    website.priority = ProjectPriority::High;
    website.category = "Marketing".into();
    website.starred = true;
    website.due_date = Some("2025-03-31".into());
    website.team = vec![TeamEntry {
        name: "Bob Okafor".into(),
        email: "bob@example.com".into(),
    }];

    let mut billing = Project::new(2, "Billing migration");
    billing.category = "Platform".into();
    billing.status = ProjectStatus::Active;
    billing.due_date = Some("2025-02-28".into());

    let mut support = Project::new(3, "Support backlog");
    support.status = ProjectStatus::OnHold;
    support.priority = ProjectPriority::Low;

    for project in [website, billing, support] {
        store.seed_project(project);
    }

    for seed in TASKS {
        let mut task = Task::new(seed.id, seed.title);
        task.status = seed.status;
        task.priority = seed.priority;
        task.story_points = seed.points;
        task.due_date = seed.due.map(String::from);
        task.project = Some(seed.project);
        task.assignee = seed.assignee.map(|i| users[i].clone());
        store.seed_task(task);
    }

    let mut alice = TeamMember::new(20, "Alice Nguyen", "alice@example.com");
    alice.role = Role::Manager;
    alice.department = "Design".into();
    alice.project = Some(1);
    alice.project_name = Some("Website relaunch".into());

    let mut bob = TeamMember::new(21, "Bob Okafor", "bob@example.com");
    bob.department = "Marketing".into();

    let mut dana = TeamMember::new(22, "Dana Lee", "dana@example.com");
    dana.role = Role::ScrumMaster;
    dana.total_tasks = 4;
    dana.completed_tasks = 2;

    for member in [alice, bob, dana] {
        store.seed_member(member);
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RemoteStore;

    #[tokio::test]
    async fn demo_store_serves_seed() {
        let store = demo_store();
        assert_eq!(store.list_tasks().await.unwrap().len(), TASKS.len());
        assert_eq!(store.list_members().await.unwrap().len(), 3);
        let billing = store.project(2).unwrap();
        assert_eq!(billing.progress, 100.0);
        assert_eq!(billing.status, ProjectStatus::Active);
    }
}
