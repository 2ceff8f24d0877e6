//! worktally - command-line client for worktallyd

mod output;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use worktally_api::{
    Command, EvaluationFilter, ManualSession, NewTarget, SessionFilter, TargetPeriod,
    TargetUpdate,
};
use worktally_ipc::IpcClient;
use worktally_util::{
    socket_path_without_env, CategoryId, NotificationId, SessionId, TargetId, UserId,
};

/// worktally - track work sessions and daily targets
#[derive(Parser, Debug)]
#[command(name = "worktally", version)]
#[command(about = "Track work sessions and daily targets", long_about = None)]
struct Cli {
    /// Daemon socket path
    #[arg(short, long, global = true, env = "WORKTALLY_SOCKET", default_value_os_t = socket_path_without_env())]
    socket: PathBuf,

    /// User to act as (default: your Unix uid; other ids need the admin role)
    #[arg(short, long, global = true, env = "WORKTALLY_USER")]
    user: Option<i64>,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    /// Log level
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the timer
    Start {
        #[arg(short, long)]
        category: Option<i64>,
        #[arg(short, long)]
        note: Option<String>,
        /// Effectiveness multiplier (default 1.0)
        #[arg(short, long)]
        multiplier: Option<f64>,
    },
    /// Stop the running timer
    Stop {
        /// Replace the session note
        #[arg(short, long)]
        note: Option<String>,
    },
    /// Record a finished session (RFC 3339 timestamps)
    Add {
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
        #[arg(short, long)]
        category: Option<i64>,
        #[arg(short, long)]
        note: Option<String>,
        #[arg(short, long)]
        multiplier: Option<f64>,
    },
    /// Show the running session
    Active,
    /// List sessions
    List {
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        #[arg(short, long)]
        category: Option<i64>,
        /// Include the running session
        #[arg(long)]
        include_active: bool,
    },
    /// Show one session
    Show { id: i64 },
    /// Delete a session
    Delete { id: i64 },
    /// Manage categories
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },
    /// Manage targets
    Target {
        #[command(subcommand)]
        action: TargetAction,
    },
    /// Evaluate daily targets for a date (default: today, UTC)
    Evaluate {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Every user (admin only)
        #[arg(long)]
        all: bool,
    },
    /// List evaluations
    Evaluations {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        target: Option<i64>,
    },
    /// List notifications
    Notifications {
        #[arg(long)]
        unread: bool,
    },
    /// Mark a notification as read
    Read { id: i64 },
    /// List punishment events
    Punishments,
    /// Ask the daemon to reload its config (admin only)
    Reload,
    /// Show daemon health
    Health,
    /// Stream daemon events until interrupted
    Watch,
}

#[derive(Subcommand, Debug)]
enum CategoryAction {
    Add {
        name: String,
        /// #RRGGBB
        #[arg(long)]
        color: Option<String>,
    },
    List {
        /// Include archived categories
        #[arg(long)]
        all: bool,
    },
    Archive { id: i64 },
}

#[derive(Subcommand, Debug)]
enum TargetAction {
    Add {
        /// Target time, e.g. `4h`, `90m`, `1h30m` or plain seconds
        #[arg(value_parser = output::parse_duration)]
        duration: i64,
        #[arg(long, default_value = "daily")]
        period: TargetPeriod,
        /// Only count these categories (repeatable)
        #[arg(short, long = "category")]
        categories: Vec<i64>,
        #[arg(long)]
        effective_from: Option<DateTime<Utc>>,
    },
    List {
        /// Include inactive targets
        #[arg(long)]
        all: bool,
    },
    Update {
        id: i64,
        #[arg(long, value_parser = output::parse_duration)]
        duration: Option<i64>,
        /// Replace the category list (repeatable)
        #[arg(short, long = "category")]
        categories: Vec<i64>,
        /// Count every category again
        #[arg(long, conflicts_with = "categories")]
        all_categories: bool,
        #[arg(long, conflicts_with = "deactivate")]
        activate: bool,
        #[arg(long)]
        deactivate: bool,
    },
}

fn categories(ids: Vec<i64>) -> Vec<CategoryId> {
    ids.into_iter().map(CategoryId::new).collect()
}

/// Translate a parsed command line into a protocol command
fn build_command(user: UserId, command: Commands) -> Result<Command> {
    Ok(match command {
        Commands::Start {
            category,
            note,
            multiplier,
        } => Command::StartSession {
            user_id: user,
            category_id: category.map(CategoryId::new),
            note,
            effectiveness_multiplier: multiplier,
        },
        Commands::Stop { note } => Command::StopSession { user_id: user, note },
        Commands::Add {
            start,
            end,
            category,
            note,
            multiplier,
        } => Command::CreateManualSession {
            user_id: user,
            entry: ManualSession {
                category_id: category.map(CategoryId::new),
                start_time: start,
                end_time: end,
                note,
                effectiveness_multiplier: multiplier,
            },
        },
        Commands::Active => Command::GetActiveSession { user_id: user },
        Commands::List {
            from,
            to,
            category,
            include_active,
        } => Command::ListSessions {
            user_id: user,
            filter: SessionFilter {
                start: from,
                end: to,
                category_id: category.map(CategoryId::new),
                include_active,
            },
        },
        Commands::Show { id } => Command::GetSession {
            user_id: user,
            session_id: SessionId::new(id),
        },
        Commands::Delete { id } => Command::DeleteSession {
            user_id: user,
            session_id: SessionId::new(id),
        },
        Commands::Category { action } => match action {
            CategoryAction::Add { name, color } => Command::CreateCategory {
                user_id: user,
                name,
                color,
            },
            CategoryAction::List { all } => Command::ListCategories {
                user_id: user,
                include_archived: all,
            },
            CategoryAction::Archive { id } => Command::ArchiveCategory {
                user_id: user,
                category_id: CategoryId::new(id),
            },
        },
        Commands::Target { action } => match action {
            TargetAction::Add {
                duration,
                period,
                categories: ids,
                effective_from,
            } => Command::CreateTarget {
                user_id: user,
                target: NewTarget {
                    target_seconds: duration,
                    period,
                    include_category_ids: categories(ids),
                    effective_from,
                },
            },
            TargetAction::List { all } => Command::ListTargets {
                user_id: user,
                include_inactive: all,
            },
            TargetAction::Update {
                id,
                duration,
                categories: ids,
                all_categories,
                activate,
                deactivate,
            } => {
                let include_category_ids = if all_categories {
                    Some(Vec::new())
                } else if ids.is_empty() {
                    None
                } else {
                    Some(categories(ids))
                };
                let update = TargetUpdate {
                    target_seconds: duration,
                    include_category_ids,
                    is_active: (activate || deactivate).then_some(activate),
                };
                if update.is_empty() {
                    bail!("nothing to update");
                }
                Command::UpdateTarget {
                    user_id: user,
                    target_id: TargetId::new(id),
                    update,
                }
            }
        },
        Commands::Evaluate { date, all } => Command::EvaluateForDate {
            date,
            user_id: (!all).then_some(user),
        },
        Commands::Evaluations { from, to, target } => Command::ListEvaluations {
            user_id: user,
            filter: EvaluationFilter {
                start_date: from,
                end_date: to,
                target_id: target.map(TargetId::new),
            },
        },
        Commands::Notifications { unread } => Command::ListNotifications {
            user_id: user,
            unread_only: unread,
        },
        Commands::Read { id } => Command::MarkNotificationRead {
            user_id: user,
            notification_id: NotificationId::new(id),
        },
        Commands::Punishments => Command::ListPunishments { user_id: user },
        Commands::Reload => Command::ReloadConfig,
        Commands::Health => Command::GetHealth,
        Commands::Watch => Command::SubscribeEvents,
    })
}

async fn watch(client: IpcClient, json: bool) -> Result<()> {
    let mut events = client.subscribe().await.context("Failed to subscribe")?;
    loop {
        let event = events.next().await?;
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("{}", output::render_event(&event));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let user = UserId::new(
        cli.user
            .unwrap_or_else(|| i64::from(nix::unistd::getuid().as_raw())),
    );
    let mut client = IpcClient::connect(&cli.socket)
        .await
        .with_context(|| format!("Failed to connect to worktallyd at {:?}", cli.socket))?;
    debug!(socket = %cli.socket.display(), user_id = %user, "Connected");

    if matches!(cli.command, Commands::Watch) {
        return watch(client, cli.json).await;
    }

    let command = build_command(user, cli.command)?;
    let response = client.send(command).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response.result {
        worktally_api::ResponseResult::Ok(payload) => {
            println!("{}", output::render_payload(&payload));
            Ok(())
        }
        worktally_api::ResponseResult::Err(e) => {
            bail!("{} ({})", e.message, output::error_code_label(e.code))
        }
    }
}
