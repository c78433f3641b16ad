use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tb", about = concat!("taskboard v", env!("CARGO_PKG_VERSION"), " - tasks, projects, and team from the terminal"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Use a built-in demo backend instead of the server
    #[arg(long, global = true)]
    pub offline: bool,

    /// Directory holding config.toml, the session, and the recovery log
    #[arg(long = "config-dir", global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and save a session token
    Login(LoginArgs),
    /// Forget the saved session
    Logout,
    /// Show the task board, grouped by status
    Board(BoardArgs),
    /// Move a task to another status column
    Move(MoveArgs),
    /// Set a task's story points (several values are coalesced into one save)
    Points(PointsArgs),
    /// Create a task
    Add(AddArgs),
    /// Delete a task
    Rm(IdArg),
    /// List, create, or update projects
    Projects(ProjectsCmd),
    /// Star or unstar a project
    Star(IdArg),
    /// Mark every project at 100% progress as Completed
    CompleteSweep,
    /// Show the team roster with progress derived from live tasks
    Team(TeamCmd),
    /// Show dated tasks, or project due dates, in a date range
    Calendar(CalendarArgs),
    /// Show recent work or page views
    Recent(RecentArgs),
    /// Project and task summary
    Report(ReportArgs),
    /// View or prune the log of rolled-back edits
    Recovery(RecoveryArgs),
}

#[derive(Args)]
pub struct IdArg {
    pub id: u64,
}

#[derive(Args)]
pub struct LoginArgs {
    pub username: String,
    /// Password (read from stdin if omitted)
    #[arg(long)]
    pub password: Option<String>,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct BoardArgs {
    /// Match title or description
    #[arg(long)]
    pub search: Option<String>,
    /// Only these statuses (todo, in_progress, done); repeatable
    #[arg(long)]
    pub status: Vec<String>,
    /// Only these priorities (low, medium, high); repeatable
    #[arg(long)]
    pub priority: Vec<String>,
}

#[derive(Args)]
pub struct MoveArgs {
    pub id: u64,
    /// Target status (todo, in_progress, done)
    pub status: String,
}

#[derive(Args)]
pub struct PointsArgs {
    pub id: u64,
    /// One or more values, applied in order
    #[arg(required = true)]
    pub points: Vec<u32>,
}

#[derive(Args)]
pub struct AddArgs {
    pub title: String,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long, default_value = "todo")]
    pub status: String,
    #[arg(long, default_value = "medium")]
    pub priority: String,
    #[arg(long, default_value_t = 1)]
    pub points: u32,
    /// yyyy-mm-dd
    #[arg(long)]
    pub start: Option<String>,
    /// yyyy-mm-dd
    #[arg(long)]
    pub due: Option<String>,
    /// Project id
    #[arg(long)]
    pub project: Option<u64>,
    /// Assignee user id
    #[arg(long)]
    pub assignee: Option<u64>,
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ProjectsCmd {
    #[command(subcommand)]
    pub action: Option<ProjectsAction>,
    /// Match project name or category
    #[arg(long)]
    pub search: Option<String>,
    /// Only these statuses (Active, Completed, "On Hold"); repeatable
    #[arg(long)]
    pub status: Vec<String>,
    /// Only these priorities (Low, Medium, High); repeatable
    #[arg(long)]
    pub priority: Vec<String>,
    /// Due on or after this day (yyyy-mm-dd)
    #[arg(long)]
    pub from: Option<String>,
    /// Due on or before this day (yyyy-mm-dd)
    #[arg(long)]
    pub to: Option<String>,
    /// Only starred projects
    #[arg(long)]
    pub starred: bool,
}

#[derive(Subcommand)]
pub enum ProjectsAction {
    /// Create a project
    Add(ProjectAddArgs),
    /// Change a project's status
    Status(ProjectStatusArgs),
    /// Delete a project
    Rm(IdArg),
}

#[derive(Args)]
pub struct ProjectAddArgs {
    pub name: String,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long, default_value = "Active")]
    pub status: String,
    #[arg(long, default_value = "Medium")]
    pub priority: String,
    #[arg(long, default_value = "")]
    pub category: String,
    /// yyyy-mm-dd
    #[arg(long)]
    pub due: Option<String>,
}

#[derive(Args)]
pub struct ProjectStatusArgs {
    pub id: u64,
    /// Active, Completed, or "On Hold"
    pub status: String,
}

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct TeamCmd {
    #[command(subcommand)]
    pub action: Option<TeamAction>,
    /// Match name, email, or project
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Subcommand)]
pub enum TeamAction {
    /// Add a team member
    Add(TeamAddArgs),
    /// Remove a team member
    Rm(IdArg),
}

#[derive(Args)]
pub struct TeamAddArgs {
    pub name: String,
    pub email: String,
    /// Employee, "Scrum Master", or Manager
    #[arg(long, default_value = "Employee")]
    pub role: String,
    #[arg(long, default_value = "")]
    pub department: String,
    /// Project id
    #[arg(long)]
    pub project: Option<u64>,
}

// ---------------------------------------------------------------------------
// Read-only views
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct CalendarArgs {
    /// First day, inclusive (yyyy-mm-dd)
    #[arg(long)]
    pub from: Option<String>,
    /// Last day, inclusive (yyyy-mm-dd)
    #[arg(long)]
    pub to: Option<String>,
    /// Only these statuses; repeatable. Task statuses, or project
    /// statuses with --projects.
    #[arg(long)]
    pub status: Vec<String>,
    /// Only these priorities; repeatable
    #[arg(long)]
    pub priority: Vec<String>,
    /// Match title or description (name or category with --projects)
    #[arg(long)]
    pub search: Option<String>,
    /// Show projects by due date instead of tasks
    #[arg(long)]
    pub projects: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FeedArg {
    Work,
    Views,
}

#[derive(Args)]
pub struct RecentArgs {
    #[arg(long, value_enum, default_value = "work")]
    pub feed: FeedArg,
    /// Search both feeds instead
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args)]
pub struct ReportArgs {
    /// Days ahead to list upcoming tasks
    #[arg(long, default_value_t = 7)]
    pub days: u32,
}

#[derive(Args)]
pub struct RecoveryArgs {
    /// Maximum number of entries to show (default: 10)
    #[arg(long)]
    pub limit: Option<usize>,
    /// Show entries after this timestamp (RFC 3339)
    #[arg(long)]
    pub since: Option<String>,
    /// Remove old entries instead of listing
    #[arg(long)]
    pub prune: bool,
    /// With --prune: remove entries older than this timestamp (default: 30 days ago)
    #[arg(long, requires = "prune")]
    pub before: Option<String>,
    /// With --prune: remove every entry
    #[arg(long, requires = "prune")]
    pub all: bool,
}
