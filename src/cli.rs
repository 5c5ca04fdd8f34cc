use chrono::{Local, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

use crate::config::{Backend, Config, ConfigError};
use crate::database::SqliteTaskStore;
use crate::error::TaskError;
use crate::local::JsonTaskStore;
use crate::manager::{Resolution, TaskCollection};
use crate::models::{Priority, Status, Task, TaskDraft, TaskId};
use crate::session::Identity;
use crate::store::{StoreError, TaskStore};
use crate::utils::parse_date;
use crate::view::{self, Board, DateFilter, FilterConfig, PriorityFilter, StatusFilter};

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(about = "Personal task board: plan the week, finish tasks, clear them out")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in as a user; tasks are scoped to this identity
    Login {
        /// User identifier issued by the identity provider
        user_id: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Forget the signed-in identity
    Logout,
    /// Show the signed-in identity
    Whoami,
    #[command(flatten)]
    Task(TaskCommand),
}

/// Commands that act on the signed-in user's tasks.
#[derive(Subcommand)]
pub enum TaskCommand {
    /// Add a new task
    Add {
        title: String,
        /// Task description (required)
        #[arg(short, long)]
        description: String,
        /// to-do, in-progress or done
        #[arg(long, default_value = "to-do")]
        status: Status,
        /// low, medium or high
        #[arg(short, long, default_value = "low")]
        priority: Priority,
        /// Scheduled date (YYYY-MM-DD or "YYYY-MM-DD HH:MM")
        #[arg(long)]
        date: Option<String>,
    },
    /// List active and done tasks
    List {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Show active tasks laid out by weekday
    Week {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Mark an active task as done
    Done { id: String },
    /// Delete a done task
    Remove { id: String },
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Case-insensitive text to look for in title or description
    #[arg(short, long, default_value = "")]
    pub search: String,
    /// all, low, medium or high
    #[arg(short, long, default_value = "all")]
    pub priority: PriorityFilter,
    /// all, to-do, in-progress or done
    #[arg(long, default_value = "all")]
    pub status: StatusFilter,
    /// all, today, this-week or completed
    #[arg(short, long, default_value = "all")]
    pub when: DateFilter,
}

impl From<FilterArgs> for FilterConfig {
    fn from(args: FilterArgs) -> Self {
        FilterConfig {
            search: args.search,
            priority: args.priority,
            status: args.status,
            date: args.when,
        }
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    TaskError(#[from] TaskError),
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Output error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
}

/// Open the store selected in the config
pub fn open_store(config: &Config) -> Result<Box<dyn TaskStore>, CliError> {
    let store: Box<dyn TaskStore> = match config.backend {
        Backend::Sqlite => {
            let path = config.get_database_path();
            let path = path.to_str().ok_or_else(|| {
                StoreError::DirectoryError("Database path contains invalid UTF-8".to_string())
            })?;
            Box::new(SqliteTaskStore::new(path)?)
        }
        Backend::Json => Box::new(JsonTaskStore::open(config.get_json_path())?),
    };
    Ok(store)
}

/// Handle the login command
pub fn handle_login(
    config: &mut Config,
    config_path: &Path,
    user_id: String,
    email: Option<String>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let mut session = config.session();
    let mut identity = Identity::new(user_id);
    identity.email = email;
    session.sign_in(identity.clone());

    config.identity = Some(identity);
    config.save_to(config_path)?;
    writeln!(out, "Signed in as {}", describe(session.require()?))?;
    Ok(())
}

/// Handle the logout command
pub fn handle_logout(config: &mut Config, config_path: &Path, out: &mut dyn Write) -> Result<(), CliError> {
    let mut session = config.session();
    match session.sign_out() {
        Some(identity) => {
            config.identity = None;
            config.save_to(config_path)?;
            writeln!(out, "Signed out {}", describe(&identity))?;
        }
        None => writeln!(out, "Not signed in")?,
    }
    Ok(())
}

pub fn handle_whoami(config: &Config, out: &mut dyn Write) -> Result<(), CliError> {
    let session = config.session();
    let identity = session.require()?;
    writeln!(out, "{}", describe(identity))?;
    Ok(())
}

fn describe(identity: &Identity) -> String {
    match identity.email {
        Some(ref email) => format!("{} <{}>", identity.user_id, email),
        None => identity.user_id.to_string(),
    }
}

/// Run one task command against an already loaded collection.
///
/// Actions suppressed by the cooldown are reported as a notice, not an error.
pub fn run_task_command<S: TaskStore + ?Sized>(
    command: TaskCommand,
    collection: &mut TaskCollection,
    store: &mut S,
    now: NaiveDateTime,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    match dispatch(command, collection, store, now, out) {
        Err(CliError::TaskError(e)) if e.is_advisory() => {
            writeln!(out, "{}", e)?;
            Ok(())
        }
        other => other,
    }
}

fn dispatch<S: TaskStore + ?Sized>(
    command: TaskCommand,
    collection: &mut TaskCollection,
    store: &mut S,
    now: NaiveDateTime,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    match command {
        TaskCommand::Add {
            title,
            description,
            status,
            priority,
            date,
        } => handle_add(collection, store, title, description, status, priority, date, out),
        TaskCommand::List { filters } => {
            let board = view::project(collection.active(), collection.done(), &filters.into(), now);
            write!(out, "{}", render_lists(&board))?;
            Ok(())
        }
        TaskCommand::Week { filters } => {
            let board = view::project(collection.active(), collection.done(), &filters.into(), now);
            write!(out, "{}", render_week(&board))?;
            Ok(())
        }
        TaskCommand::Done { id } => {
            let id = TaskId::new(id);
            if collection.complete_task(store, &id)? {
                writeln!(out, "Done: {}", id)?;
            } else {
                writeln!(out, "No active task with id {}", id)?;
            }
            Ok(())
        }
        TaskCommand::Remove { id } => {
            let id = TaskId::new(id);
            match collection.remove_task(store, &id)? {
                Resolution::Reloaded => writeln!(out, "Removed: {}", id)?,
                Resolution::Stale => writeln!(out, "Removed: {} (list may be out of date)", id)?,
            }
            Ok(())
        }
    }
}

/// Handle the add command
#[allow(clippy::too_many_arguments)]
fn handle_add<S: TaskStore + ?Sized>(
    collection: &mut TaskCollection,
    store: &mut S,
    title: String,
    description: String,
    status: Status,
    priority: Priority,
    date: Option<String>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    // Parse date if provided
    let date = match date {
        Some(date_str) => Some(parse_date(&date_str).map_err(|e| {
            CliError::DateParseError(format!("Invalid date format '{}': {}", date_str, e))
        })?),
        None => None,
    };

    let draft = TaskDraft {
        title,
        description,
        status,
        priority,
        date,
    };
    let task = collection.add_task(store, draft)?;
    writeln!(out, "Task created successfully (ID: {})", task.id)?;
    Ok(())
}

pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn render_task(task: &Task) -> String {
    let marker = if task.status.is_done() { "✓" } else { "○" };
    let when = task
        .date
        .map(|d| format!("  {}", d.format("%a %Y-%m-%d %H:%M")))
        .unwrap_or_default();
    format!(
        "  {} [{}] {}  ({}, {}){}",
        marker, task.id, task.title, task.priority, task.status, when
    )
}

/// Render the filtered active and done lists
pub fn render_lists(board: &Board) -> String {
    let mut s = String::new();
    s.push_str(&format!("Active ({})\n", board.active.len()));
    for task in &board.active {
        s.push_str(&render_task(task));
        s.push('\n');
    }
    s.push_str(&format!("Done ({})\n", board.done.len()));
    for task in &board.done {
        s.push_str(&render_task(task));
        s.push('\n');
    }
    s
}

/// Render the weekday layout followed by unscheduled tasks
pub fn render_week(board: &Board) -> String {
    let mut s = String::new();
    for (day, tasks) in board.week.iter() {
        s.push_str(&format!("{}\n", weekday_name(day)));
        for task in tasks {
            s.push_str(&render_task(task));
            s.push('\n');
        }
    }
    s.push_str("Unscheduled\n");
    for task in &board.unscheduled {
        s.push_str(&render_task(task));
        s.push('\n');
    }
    s
}

fn weekday_name(day: chrono::Weekday) -> &'static str {
    match day {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}
