use std::collections::HashSet;
use std::hash::Hash;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::api::http::HttpStore;
use crate::api::{ApiError, ProjectQuery, RecentFeed, RemoteStore};
use crate::cli::commands::*;
use crate::cli::demo::demo_store;
use crate::cli::output::*;
use crate::io::{recovery, session};
use crate::model::{
    ClientConfig, MemberDraft, Priority, ProjectDraft, ProjectPatch, ProjectPriority,
    ProjectStatus, Role, TaskDraft, TaskStatus,
};
use crate::ops::filter::{DateRange, MemberFilter, ProjectFilter, TaskFilter};
use crate::ops::{progress, report};
use crate::sync::{Event, Notifier, Reconciler, Topic, View, ViewState};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Where commands read their config and session from, and which backend
/// they talk to.
pub struct Context {
    pub dir: PathBuf,
    pub config: ClientConfig,
    pub offline: bool,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub async fn dispatch(cli: Cli, ctx: Context) -> CmdResult {
    let json = cli.json;
    match cli.command {
        // Session
        Commands::Login(args) => cmd_login(args, &ctx).await,
        Commands::Logout => cmd_logout(&ctx),

        // Tasks
        Commands::Board(args) => cmd_board(args, &ctx, json).await,
        Commands::Move(args) => cmd_move(args, &ctx, json).await,
        Commands::Points(args) => cmd_points(args, &ctx, json).await,
        Commands::Add(args) => cmd_add(args, &ctx, json).await,
        Commands::Rm(args) => cmd_rm(args, &ctx).await,

        // Projects
        Commands::Projects(cmd) => match cmd.action {
            None => cmd_projects_list(cmd, &ctx, json).await,
            Some(ProjectsAction::Add(args)) => cmd_projects_add(args, &ctx, json).await,
            Some(ProjectsAction::Status(args)) => cmd_projects_status(args, &ctx, json).await,
            Some(ProjectsAction::Rm(args)) => cmd_projects_rm(args, &ctx).await,
        },
        Commands::Star(args) => cmd_star(args, &ctx).await,
        Commands::CompleteSweep => cmd_complete_sweep(&ctx, json).await,

        // Team
        Commands::Team(cmd) => match cmd.action {
            None => cmd_team_list(cmd, &ctx, json).await,
            Some(TeamAction::Add(args)) => cmd_team_add(args, &ctx, json).await,
            Some(TeamAction::Rm(args)) => cmd_team_rm(args, &ctx).await,
        },

        // Read-only views
        Commands::Calendar(args) => cmd_calendar(args, &ctx, json).await,
        Commands::Recent(args) => cmd_recent(args, &ctx, json).await,
        Commands::Report(args) => cmd_report(args, &ctx, json).await,

        // Maintenance
        Commands::Recovery(args) => cmd_recovery(args, &ctx, json),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn connect(ctx: &Context) -> Result<Reconciler, Box<dyn std::error::Error>> {
    let store: Arc<dyn RemoteStore> = if ctx.offline {
        Arc::new(demo_store())
    } else {
        let token = session::read_session(&ctx.dir).map(|s| s.access);
        Arc::new(HttpStore::new(&ctx.config.api, token)?)
    };
    Ok(Reconciler::new(store, Notifier::new())
        .with_debounce(ctx.config.sync.debounce())
        .with_recovery_dir(ctx.dir.clone()))
}

/// Items of a refreshed view, or the reason it has none.
fn ready<T>(view: &View<T>) -> Result<&[T], Box<dyn std::error::Error>> {
    match view.state() {
        ViewState::Ready(items) => Ok(items),
        ViewState::NotAuthenticated => Err(ApiError::NotAuthenticated.into()),
        ViewState::Failed(msg) => Err(format!("{}: {}", view.name(), msg).into()),
        ViewState::Loading => Err(format!("{}: no data loaded", view.name()).into()),
    }
}

/// Broadcast the search box so every mounted view picks it up.
fn broadcast_search(rec: &Reconciler, search: &Option<String>) {
    if let Some(query) = search {
        rec.notifier().publish(Event::Search(query.clone()));
    }
}

fn parse_set<T: Eq + Hash>(
    values: &[String],
    parse: fn(&str) -> Option<T>,
    what: &str,
) -> Result<HashSet<T>, String> {
    values
        .iter()
        .map(|v| parse(v).ok_or_else(|| format!("invalid {}: {}", what, v)))
        .collect()
}

fn parse_range(from: Option<&str>, to: Option<&str>) -> Result<DateRange, String> {
    DateRange::parse(from, to).map_err(|e| format!("invalid date: {}", e))
}

fn parse_one<T>(value: &str, parse: fn(&str) -> Option<T>, what: &str) -> Result<T, String> {
    parse(value).ok_or_else(|| format!("invalid {}: {}", what, value))
}

fn check_date(value: Option<String>) -> Result<Option<String>, String> {
    match value {
        Some(d) => NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
            .map(|_| Some(d.trim().to_string()))
            .map_err(|_| format!("invalid date (expected yyyy-mm-dd): {}", d)),
        None => Ok(None),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| format!("invalid timestamp (expected RFC 3339): {}", value))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

async fn cmd_login(args: LoginArgs, ctx: &Context) -> CmdResult {
    if ctx.offline {
        return Err("login has no effect with --offline".into());
    }
    let password = match args.password {
        Some(p) => p,
        None => {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    let tokens = HttpStore::login(&ctx.config.api, &args.username, &password).await?;
    session::write_session(&ctx.dir, &session::Session::from_tokens(tokens, &args.username))?;
    info!(user = %args.username, "session saved");
    println!("logged in as {}", args.username);
    Ok(())
}

fn cmd_logout(ctx: &Context) -> CmdResult {
    if session::clear_session(&ctx.dir)? {
        println!("logged out");
    } else {
        println!("no session");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn cmd_board(args: BoardArgs, ctx: &Context, json: bool) -> CmdResult {
    let mut rec = connect(ctx)?;
    let mut view = View::mount("Board", rec.notifier(), &[Topic::Tasks, Topic::Search]);
    broadcast_search(&rec, &args.search);

    let store = Arc::clone(rec.store());
    view.refresh(|| async move { store.list_tasks().await }).await;
    let tasks = ready(&view)?;

    let filter = TaskFilter {
        query: view.query(),
        statuses: parse_set(&args.status, TaskStatus::parse_status, "status")?,
        priorities: parse_set(&args.priority, Priority::parse_priority, "priority")?,
        range: DateRange::default(),
    };
    let shown = filter.apply(tasks);
    if json {
        print_json(&board_to_json(&shown))?;
    } else {
        for line in format_board(&shown, &filter.query) {
            println!("{}", line);
        }
    }

    rec.record_view("Board");
    rec.settle().await;
    Ok(())
}

async fn cmd_move(args: MoveArgs, ctx: &Context, json: bool) -> CmdResult {
    let status = parse_one(&args.status, TaskStatus::parse_status, "status")?;
    let mut rec = connect(ctx)?;
    rec.load_tasks().await?;
    rec.move_task(args.id, status).await?;
    rec.settle().await;

    if let Some(task) = rec.task(args.id) {
        if json {
            print_json(task)?;
        } else {
            println!("{}", format_task_line(task, ""));
        }
    }
    Ok(())
}

async fn cmd_points(args: PointsArgs, ctx: &Context, json: bool) -> CmdResult {
    let mut rec = connect(ctx)?;
    rec.load_tasks().await?;
    for &points in &args.points {
        rec.stage_story_points(args.id, points)?;
    }
    let outcome = rec.run_pending_flushes().await;
    rec.settle().await;

    if let Some(failure) = outcome.failed.into_iter().next() {
        return Err(format!("story points for #{} not saved: {}", failure.task_id, failure.error).into());
    }
    let story_points = rec.task(args.id).map(|t| t.story_points).unwrap_or_default();
    if json {
        print_json(&FlushJson {
            task_id: args.id,
            story_points,
            edits: args.points.len(),
            remote_calls: outcome.flushed,
        })?;
    } else {
        println!(
            "#{} story points: {} ({} edits, {} saved)",
            args.id,
            story_points,
            args.points.len(),
            outcome.flushed
        );
    }
    Ok(())
}

async fn cmd_add(args: AddArgs, ctx: &Context, json: bool) -> CmdResult {
    let mut draft = TaskDraft::new(args.title);
    draft.description = args.description;
    draft.status = parse_one(&args.status, TaskStatus::parse_status, "status")?;
    draft.priority = parse_one(&args.priority, Priority::parse_priority, "priority")?;
    draft.story_points = args.points;
    draft.start_date = check_date(args.start)?;
    draft.due_date = check_date(args.due)?;
    draft.project_id = args.project;
    draft.assignee_id = args.assignee;

    let mut rec = connect(ctx)?;
    let task = rec.create_task(draft).await?;
    rec.settle().await;

    if json {
        print_json(&task)?;
    } else {
        println!("{}", format_task_line(&task, ""));
    }
    Ok(())
}

async fn cmd_rm(args: IdArg, ctx: &Context) -> CmdResult {
    let mut rec = connect(ctx)?;
    rec.load_tasks().await?;
    rec.delete_task(args.id).await?;
    println!("deleted task #{}", args.id);
    Ok(())
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

async fn cmd_projects_list(cmd: ProjectsCmd, ctx: &Context, json: bool) -> CmdResult {
    let mut rec = connect(ctx)?;
    let mut view = View::mount("Projects", rec.notifier(), &[Topic::Projects, Topic::Search]);
    broadcast_search(&rec, &cmd.search);

    let store = Arc::clone(rec.store());
    view.refresh(|| async move { store.list_projects(&ProjectQuery::all()).await })
        .await;
    let projects = ready(&view)?;

    let filter = ProjectFilter {
        query: view.query(),
        statuses: parse_set(&cmd.status, ProjectStatus::parse_status, "status")?,
        priorities: parse_set(&cmd.priority, ProjectPriority::parse_priority, "priority")?,
        range: parse_range(cmd.from.as_deref(), cmd.to.as_deref())?,
        starred_only: cmd.starred,
    };
    let shown = filter.apply(projects);
    if json {
        print_json(&shown)?;
    } else {
        for project in &shown {
            println!("{}", format_project_line(project, &filter.query));
        }
    }

    rec.record_view("Projects");
    rec.settle().await;
    Ok(())
}

async fn cmd_projects_add(args: ProjectAddArgs, ctx: &Context, json: bool) -> CmdResult {
    let mut draft = ProjectDraft::new(args.name);
    draft.description = args.description;
    draft.status = parse_one(&args.status, ProjectStatus::parse_status, "status")?;
    draft.priority = parse_one(&args.priority, ProjectPriority::parse_priority, "priority")?;
    draft.category = args.category;
    draft.due_date = check_date(args.due)?;

    let mut rec = connect(ctx)?;
    let project = rec.create_project(draft).await?;
    rec.settle().await;

    if json {
        print_json(&project)?;
    } else {
        println!("{}", format_project_line(&project, ""));
    }
    Ok(())
}

async fn cmd_projects_status(args: ProjectStatusArgs, ctx: &Context, json: bool) -> CmdResult {
    let status = parse_one(&args.status, ProjectStatus::parse_status, "status")?;
    let mut rec = connect(ctx)?;
    rec.load_projects().await?;
    let project = rec.save_project(args.id, ProjectPatch::status(status)).await?;

    if json {
        print_json(&project)?;
    } else {
        println!("{}", format_project_line(&project, ""));
    }
    Ok(())
}

async fn cmd_projects_rm(args: IdArg, ctx: &Context) -> CmdResult {
    let mut rec = connect(ctx)?;
    rec.load_projects().await?;
    rec.delete_project(args.id).await?;
    println!("deleted project #{}", args.id);
    Ok(())
}

async fn cmd_star(args: IdArg, ctx: &Context) -> CmdResult {
    let mut rec = connect(ctx)?;
    rec.load_projects().await?;
    let starred = rec.toggle_star(args.id).await?;
    println!(
        "{} project #{}",
        if starred { "starred" } else { "unstarred" },
        args.id
    );
    Ok(())
}

async fn cmd_complete_sweep(ctx: &Context, json: bool) -> CmdResult {
    let mut rec = connect(ctx)?;
    rec.load_projects().await?;
    let completed = rec.auto_complete_projects().await;
    rec.settle().await;

    if json {
        return print_json(&completed);
    }
    if completed.is_empty() {
        println!("nothing to complete");
    }
    for id in completed {
        if let Some(project) = rec.project(id) {
            println!("completed #{} {}", id, project.name);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

async fn cmd_team_list(cmd: TeamCmd, ctx: &Context, json: bool) -> CmdResult {
    let mut rec = connect(ctx)?;
    let mut view = View::mount("Team", rec.notifier(), &[Topic::Team, Topic::Search]);
    broadcast_search(&rec, &cmd.search);

    let store = Arc::clone(rec.store());
    view.refresh(|| async move { store.list_members().await }).await;
    let members = ready(&view)?;
    rec.load_tasks().await?;
    rec.load_projects().await?;

    let filter = MemberFilter {
        query: view.query(),
        ..Default::default()
    };
    let shown: Vec<_> = filter.apply(members).into_iter().cloned().collect();
    let derived = progress::team_progress(&shown, &rec.tasks().to_vec(), &rec.projects().to_vec());

    if json {
        let rows: Vec<MemberJson> = shown
            .iter()
            .zip(&derived)
            .map(|(m, p)| member_to_json(m, p))
            .collect();
        print_json(&rows)?;
    } else {
        for (member, p) in shown.iter().zip(&derived) {
            println!("{}", format_member_line(member, p, &filter.query));
        }
    }

    rec.record_view("Team");
    rec.settle().await;
    Ok(())
}

async fn cmd_team_add(args: TeamAddArgs, ctx: &Context, json: bool) -> CmdResult {
    let draft = MemberDraft {
        name: args.name,
        email: args.email,
        role: parse_one(&args.role, Role::parse_role, "role")?,
        department: args.department,
        project_id: args.project,
        ..Default::default()
    };
    let mut rec = connect(ctx)?;
    let member = rec.create_member(draft).await?;

    if json {
        print_json(&member)?;
    } else {
        println!("added #{} {} <{}>", member.id, member.name, member.email);
    }
    Ok(())
}

async fn cmd_team_rm(args: IdArg, ctx: &Context) -> CmdResult {
    let mut rec = connect(ctx)?;
    rec.load_members().await?;
    rec.delete_member(args.id).await?;
    println!("removed team member #{}", args.id);
    Ok(())
}

// ---------------------------------------------------------------------------
// Read-only views
// ---------------------------------------------------------------------------

async fn cmd_calendar(args: CalendarArgs, ctx: &Context, json: bool) -> CmdResult {
    if args.projects {
        return cmd_calendar_projects(args, ctx, json).await;
    }
    let range = parse_range(args.from.as_deref(), args.to.as_deref())?;
    let mut rec = connect(ctx)?;
    let mut view = View::mount("Calendar", rec.notifier(), &[Topic::Tasks, Topic::Search]);
    broadcast_search(&rec, &args.search);

    let store = Arc::clone(rec.store());
    view.refresh(|| async move { store.list_tasks().await }).await;
    let tasks = ready(&view)?;

    let filter = TaskFilter {
        query: view.query(),
        statuses: parse_set(&args.status, TaskStatus::parse_status, "status")?,
        priorities: parse_set(&args.priority, Priority::parse_priority, "priority")?,
        range,
    };
    let mut dated: Vec<_> = filter
        .apply(tasks)
        .into_iter()
        .filter(|t| t.calendar_date().is_some())
        .collect();
    dated.sort_by(|a, b| (a.calendar_date(), a.id).cmp(&(b.calendar_date(), b.id)));

    if json {
        print_json(&dated)?;
    } else {
        let entries: Vec<_> = dated.iter().filter_map(|t| CalendarEntry::task(t)).collect();
        for line in format_calendar(&entries) {
            println!("{}", line);
        }
    }

    rec.record_view("Calendar");
    rec.settle().await;
    Ok(())
}

/// Projects placed on their due date.
async fn cmd_calendar_projects(args: CalendarArgs, ctx: &Context, json: bool) -> CmdResult {
    let range = parse_range(args.from.as_deref(), args.to.as_deref())?;
    let mut rec = connect(ctx)?;
    let mut view = View::mount("Calendar", rec.notifier(), &[Topic::Projects, Topic::Search]);
    broadcast_search(&rec, &args.search);

    let store = Arc::clone(rec.store());
    view.refresh(|| async move { store.list_projects(&ProjectQuery::all()).await })
        .await;
    let projects = ready(&view)?;

    let filter = ProjectFilter {
        query: view.query(),
        statuses: parse_set(&args.status, ProjectStatus::parse_status, "status")?,
        priorities: parse_set(&args.priority, ProjectPriority::parse_priority, "priority")?,
        range,
        starred_only: false,
    };
    let mut dated: Vec<_> = filter
        .apply(projects)
        .into_iter()
        .filter(|p| p.due_date.is_some())
        .collect();
    dated.sort_by(|a, b| (&a.due_date, a.id).cmp(&(&b.due_date, b.id)));

    if json {
        print_json(&dated)?;
    } else {
        let entries: Vec<_> = dated.iter().filter_map(|p| CalendarEntry::project(p)).collect();
        for line in format_calendar(&entries) {
            println!("{}", line);
        }
    }

    rec.record_view("Calendar");
    rec.settle().await;
    Ok(())
}

async fn cmd_recent(args: RecentArgs, ctx: &Context, json: bool) -> CmdResult {
    let rec = connect(ctx)?;
    let mut view = View::mount("Recent", rec.notifier(), &[Topic::Recent, Topic::Search]);
    broadcast_search(&rec, &args.search);

    let query = view.query();
    let feed = match (&args.search, args.feed) {
        (Some(_), _) => RecentFeed::Search,
        (None, FeedArg::Work) => RecentFeed::Work,
        (None, FeedArg::Views) => RecentFeed::Views,
    };
    let store = Arc::clone(rec.store());
    view.refresh(|| async move {
        let query = Some(query.as_str()).filter(|q| !q.is_empty());
        store.recent(feed, query).await
    })
    .await;
    let items = ready(&view)?;
    let shown = &items[..items.len().min(args.limit)];

    if json {
        print_json(shown)?;
    } else {
        for item in shown {
            println!("{}", format_recent_line(item));
        }
    }
    Ok(())
}

async fn cmd_report(args: ReportArgs, ctx: &Context, json: bool) -> CmdResult {
    let mut rec = connect(ctx)?;
    rec.load_tasks().await?;
    rec.load_projects().await?;
    let tasks = rec.tasks().to_vec();
    let projects = rec.projects().to_vec();

    let project_stats = report::project_stats(&projects);
    let task_stats = report::task_stats(&tasks);
    let today = chrono::Local::now().date_naive();
    let upcoming = report::upcoming(&tasks, today, args.days);

    if json {
        print_json(&ReportJson {
            projects: &project_stats,
            tasks: &task_stats,
            upcoming,
        })?;
    } else {
        for line in format_report(&project_stats, &task_stats, &upcoming) {
            println!("{}", line);
        }
    }

    rec.record_view("Dashboard");
    rec.settle().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

fn cmd_recovery(args: RecoveryArgs, ctx: &Context, json: bool) -> CmdResult {
    if args.prune {
        let before = args.before.as_deref().map(parse_timestamp).transpose()?;
        let removed = recovery::prune_recovery(&ctx.dir, before, args.all)?;
        println!("pruned {} entries", removed);
        return Ok(());
    }

    let since = args.since.as_deref().map(parse_timestamp).transpose()?;
    let entries = recovery::read_entries(&ctx.dir, Some(args.limit.unwrap_or(10)), since);
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("no recovery entries");
        return Ok(());
    }
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            println!();
        }
        for line in format_recovery_entry(entry) {
            println!("{}", line);
        }
    }
    let total = recovery::recovery_summary(&ctx.dir).map_or(0, |s| s.entry_count);
    if total > entries.len() {
        println!();
        println!(
            "({} of {} shown; see {})",
            entries.len(),
            total,
            recovery::recovery_log_path(&ctx.dir).display()
        );
    }
    Ok(())
}
