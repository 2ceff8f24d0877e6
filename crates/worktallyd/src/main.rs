//! worktallyd - The worktally background service
//!
//! This is the main entry point for the worktallyd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Core engine
//! - Startup backfill and the daily evaluation trigger
//! - IPC server

mod handlers;

use anyhow::{Context, Result};
use clap::Parser;
use handlers::{evaluation_event, handle_engine_command, run_evaluation, Trigger};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use worktally_api::{
    Command, ErrorCode, ErrorInfo, EvaluationScope, Event, EventPayload, HealthStatus, Response,
    ResponsePayload,
};
use worktally_config::{load_config_or_default, Settings};
use worktally_core::{CoreEngine, DailyTrigger};
use worktally_ipc::{IpcServer, ServerMessage};
use worktally_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use worktally_util::{database_path, default_config_path, ClientId, RateLimiter, WorktallyError};

/// worktallyd - Time tracking and daily target evaluation service
#[derive(Parser, Debug)]
#[command(name = "worktallyd")]
#[command(about = "Time tracking and daily target evaluation service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/worktally/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set WORKTALLY_SOCKET env var)
    #[arg(short, long, env = "WORKTALLY_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set WORKTALLY_DATA_DIR env var)
    #[arg(short, long, env = "WORKTALLY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Mutable state shared by the main loop and command handling
struct State {
    engine: CoreEngine,
    settings: Settings,
    trigger: Option<DailyTrigger>,
}

/// Main service state
struct Service {
    state: State,
    config_path: PathBuf,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    rate_limiter: RateLimiter,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let settings = load_config_or_default(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            run_at = %settings.evaluation.run_at,
            scheduler_enabled = settings.evaluation.enabled,
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| settings.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| settings.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = database_path(&data_dir);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let engine = CoreEngine::new(store.clone(), settings.sessions);

        let now = worktally_util::now();
        let trigger = settings
            .evaluation
            .enabled
            .then(|| DailyTrigger::new(settings.evaluation.run_at, now));

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        // 30 requests per second per client
        let rate_limiter = RateLimiter::new(30, Duration::from_secs(1));

        Ok(Self {
            state: State {
                engine,
                settings,
                trigger,
            },
            config_path: args.config.clone(),
            ipc: Arc::new(ipc),
            store,
            rate_limiter,
        })
    }

    /// Re-evaluate the last few days in case the service was down at run time
    fn backfill(&self) {
        let today = worktally_util::today();
        let now = worktally_util::now();
        for date in self.state.settings.evaluation.backfill_dates(today) {
            match run_evaluation(
                &self.state.engine,
                date,
                EvaluationScope::AllUsers,
                Trigger::Backfill,
                now,
            ) {
                Ok(run) if !run.evaluations.is_empty() => {
                    self.ipc.broadcast_event(Event::new(evaluation_event(&run)));
                }
                Ok(_) => debug!(%date, "Nothing to backfill"),
                Err(e) => warn!(%date, error = %e, "Backfill evaluation failed"),
            }
        }
    }

    async fn run(self) -> Result<()> {
        self.backfill();

        let ipc_ref = self.ipc.clone();
        let mut ipc_messages = ipc_ref
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let state = Arc::new(Mutex::new(self.state));
        let rate_limiter = Arc::new(Mutex::new(self.rate_limiter));
        let store = self.store.clone();
        let config_path = self.config_path;

        let ipc_accept = ipc_ref.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup())
            .context("Failed to create SIGHUP handler")?;

        let mut tick_timer = tokio::time::interval(Duration::from_secs(1));

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                // SIGHUP - reload configuration
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    let mut state = state.lock().await;
                    if let Err(e) = Self::reload_config(&mut state, &config_path, &ipc_ref) {
                        warn!(error = %e, "Configuration reload failed");
                    }
                }

                // Tick timer - fire the daily evaluation when due
                _ = tick_timer.tick() => {
                    let now = worktally_util::now();
                    let mut state = state.lock().await;
                    let fired = state.trigger.as_mut().and_then(|t| t.poll(now));
                    if let Some(fired_at) = fired {
                        let date = state.settings.evaluation.date_for_run(fired_at);
                        info!(%date, fired_at = %fired_at, "Daily evaluation due");
                        match run_evaluation(&state.engine, date, EvaluationScope::AllUsers, Trigger::Schedule, now) {
                            Ok(run) => ipc_ref.broadcast_event(Event::new(evaluation_event(&run))),
                            Err(e) => error!(%date, error = %e, "Scheduled evaluation failed"),
                        }
                    }
                    rate_limiter.lock().await.cleanup(Duration::from_secs(60));
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&state, &ipc_ref, &store, &rate_limiter, &config_path, msg).await;
                }
            }
        }

        info!("Shutting down worktallyd");

        ipc_ref.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::ServiceStopped)) {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Reload the config file and apply what can change at runtime.
    ///
    /// Socket and data directory changes need a restart.
    fn reload_config(
        state: &mut State,
        config_path: &Path,
        ipc: &Arc<IpcServer>,
    ) -> std::result::Result<(), WorktallyError> {
        let result = load_config_or_default(config_path);
        let success = result.is_ok();
        if let Err(e) = state
            .engine
            .store()
            .append_audit(AuditEvent::new(AuditEventType::ConfigReloaded { success }))
        {
            warn!(error = %e, "Failed to log config reload");
        }
        let settings = result?;

        if settings.service.socket_path != state.settings.service.socket_path
            || settings.service.data_dir != state.settings.service.data_dir
        {
            warn!("Service paths changed; restart worktallyd to apply them");
        }

        let now = worktally_util::now();
        state.engine.set_rules(settings.sessions);
        state.trigger = match (state.trigger.take(), settings.evaluation.enabled) {
            (_, false) => None,
            (Some(mut trigger), true) => {
                if trigger.run_at() != settings.evaluation.run_at {
                    trigger.reschedule(settings.evaluation.run_at, now);
                }
                Some(trigger)
            }
            (None, true) => Some(DailyTrigger::new(settings.evaluation.run_at, now)),
        };
        state.settings = settings;

        info!(
            next_evaluation_at = ?state.trigger.as_ref().map(DailyTrigger::next),
            "Configuration reloaded"
        );
        ipc.broadcast_event(Event::new(EventPayload::ConfigReloaded));
        Ok(())
    }

    async fn handle_ipc_message(
        state: &Arc<Mutex<State>>,
        ipc: &Arc<IpcServer>,
        store: &Arc<dyn Store>,
        rate_limiter: &Arc<Mutex<RateLimiter>>,
        config_path: &Path,
        msg: ServerMessage,
    ) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                {
                    let mut limiter = rate_limiter.lock().await;
                    if !limiter.check(&client_id) {
                        let response = Response::error(
                            request.request_id,
                            ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                        );
                        let _ = ipc.send_response(&client_id, response).await;
                        return;
                    }
                }

                let response = Self::handle_command(
                    state,
                    ipc,
                    store,
                    config_path,
                    &client_id,
                    request.request_id,
                    request.command,
                )
                .await;

                let _ = ipc.send_response(&client_id, response).await;
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );

                let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientConnected {
                    client_id: client_id.to_string(),
                    role: format!("{:?}", info.role),
                    uid: info.uid,
                }));
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientDisconnected {
                    client_id: client_id.to_string(),
                }));

                rate_limiter.lock().await.remove(&client_id);
            }
        }
    }

    async fn handle_command(
        state: &Arc<Mutex<State>>,
        ipc: &Arc<IpcServer>,
        store: &Arc<dyn Store>,
        config_path: &Path,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> Response {
        let now = worktally_util::now();

        let Some(info) = ipc.get_client_info(client_id).await else {
            return Response::error(
                request_id,
                ErrorInfo::new(ErrorCode::InternalError, "Unknown client"),
            );
        };

        match command {
            Command::ReloadConfig => {
                if !info.role.can_reload_config() {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Admin role required"),
                    );
                }

                let mut state = state.lock().await;
                match Self::reload_config(&mut state, config_path, ipc) {
                    Ok(()) => Response::success(request_id, ResponsePayload::ConfigReloaded),
                    Err(e) => Response::error(request_id, ErrorInfo::from(&e)),
                }
            }

            Command::SubscribeEvents => Response::success(
                request_id,
                ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
            ),

            Command::UnsubscribeEvents => {
                Response::success(request_id, ResponsePayload::Unsubscribed)
            }

            Command::GetHealth => {
                let state = state.lock().await;
                let health = HealthStatus {
                    live: true,
                    ready: true,
                    config_loaded: true,
                    store_ok: store.is_healthy(),
                    scheduler_enabled: state.trigger.is_some(),
                    next_evaluation_at: state.trigger.as_ref().map(DailyTrigger::next),
                };
                Response::success(request_id, ResponsePayload::Health(health))
            }

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),

            command => {
                let state = state.lock().await;
                match handle_engine_command(&state.engine, &info, command, now) {
                    Ok(handled) => {
                        if let Some(event) = handled.event {
                            ipc.broadcast_event(Event::new(event));
                        }
                        Response::success(request_id, handled.payload)
                    }
                    Err(e) => {
                        if e.is_client_error() {
                            debug!(client_id = %client_id, error = %e, "Request rejected");
                        } else {
                            error!(client_id = %client_id, error = %e, "Request failed");
                        }
                        Response::error(request_id, ErrorInfo::from(&e))
                    }
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mock_time = worktally_util::is_mock_time_active(),
        "worktallyd starting"
    );

    let service = Service::new(&args).await?;
    service.run().await
}
