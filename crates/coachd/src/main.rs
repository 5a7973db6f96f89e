//! coachd - The coaching session service
//!
//! This is the main entry point for the coachd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Core engine (status policy, booking, reminders)
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use coach_api::{
    API_VERSION, ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, Response,
    ResponsePayload,
};
use coach_config::{Config, ConfigError, load_config, load_config_or_default};
use coach_core::{
    BookingDecision, BookingRequest, CoachEngine, CoreEvent, EditDecision, StatusChangeDecision,
};
use coach_ipc::{IpcServer, ServerMessage};
use coach_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use coach_util::{ClientId, CoachError, RateLimiter, default_config_path};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Upper bound on audit entries returned per request
const MAX_AUDIT_ENTRIES: usize = 1000;

/// coachd - Coaching session booking and status service
#[derive(Parser, Debug)]
#[command(name = "coachd")]
#[command(about = "Coaching session booking and status service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/coachd/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set COACH_SOCKET env var)
    #[arg(short, long, env = "COACH_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set COACH_DATA_DIR env var)
    #[arg(short, long, env = "COACH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    engine: CoachEngine,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    rate_limiter: RateLimiter,
    config_path: PathBuf,
    scan_interval: Duration,
}

impl Service {
    async fn new(args: &Args, config: Config) -> Result<Self> {
        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| config.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| config.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("coachd.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let rate_limiter = rate_limiter_for(&config);
        let scan_interval = config.sessions.reminder_scan_interval;

        let engine = CoachEngine::new(config, store.clone());

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        Ok(Self {
            engine,
            ipc: Arc::new(ipc),
            store,
            rate_limiter,
            config_path: args.config.clone(),
            scan_interval,
        })
    }

    async fn run(self) -> Result<()> {
        let ipc_ref = self.ipc.clone();
        let mut ipc_messages = ipc_ref
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let engine = Arc::new(Mutex::new(self.engine));
        let rate_limiter = Arc::new(Mutex::new(self.rate_limiter));
        let store = self.store.clone();
        let config_path = self.config_path;

        let ipc_accept = ipc_ref.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        // Reminder scan
        let mut scan_timer = tokio::time::interval(self.scan_interval);

        info!(
            scan_interval = %coach_util::format_duration(self.scan_interval),
            "Service running"
        );

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
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    if let Err(e) = Self::reload(&engine, &ipc_ref, &rate_limiter, &config_path).await {
                        warn!(path = %config_path.display(), error = %e, "Config reload failed");
                    }
                }

                _ = scan_timer.tick() => {
                    let now = coach_util::now();

                    let events = {
                        let mut engine = engine.lock().await;
                        engine.tick(now)
                    };

                    for event in events {
                        ipc_ref.broadcast_event(Event::new(event_payload(event)));
                    }
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&engine, &ipc_ref, &store, &rate_limiter, &config_path, msg).await;
                }
            }
        }

        info!("Shutting down coachd");

        ipc_ref.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::ServiceStopped)) {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }

    async fn handle_ipc_message(
        engine: &Arc<Mutex<CoachEngine>>,
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

                let response = if request.api_version != API_VERSION {
                    Response::error(
                        request.request_id,
                        ErrorInfo::new(
                            ErrorCode::UnsupportedVersion,
                            format!(
                                "API version {} is not supported (expected {})",
                                request.api_version, API_VERSION
                            ),
                        ),
                    )
                } else {
                    Self::handle_command(
                        engine,
                        ipc,
                        store,
                        rate_limiter,
                        config_path,
                        &client_id,
                        request.request_id,
                        request.command,
                    )
                    .await
                };

                let _ = ipc.send_response(&client_id, response).await;
            }

            ServerMessage::ClientConnected { client_id, info } => {
                debug!(client_id = %client_id, role = ?info.role, "Recording client connection");

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

                let mut limiter = rate_limiter.lock().await;
                limiter.remove_client(&client_id);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_command(
        engine: &Arc<Mutex<CoachEngine>>,
        ipc: &Arc<IpcServer>,
        store: &Arc<dyn Store>,
        rate_limiter: &Arc<Mutex<RateLimiter>>,
        config_path: &Path,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> Response {
        let now = coach_util::now();

        let role = ipc
            .get_client_info(client_id)
            .await
            .map(|info| info.role)
            .unwrap_or(ClientRole::Observer);

        if let Some(denied) = permission_denial(role, &command) {
            warn!(client_id = %client_id, role = ?role, "Permission denied");
            return Response::error(
                request_id,
                ErrorInfo::new(ErrorCode::PermissionDenied, denied),
            );
        }

        match command {
            Command::GetState => match engine.lock().await.get_state(now) {
                Ok(state) => Response::success(request_id, ResponsePayload::State(state)),
                Err(e) => error_response(request_id, &e),
            },

            Command::GetHealth => {
                let health = engine.lock().await.health();
                Response::success(request_id, ResponsePayload::Health(health))
            }

            Command::ListSessions { filter } => {
                match engine.lock().await.list_sessions(&filter, now) {
                    Ok(sessions) => {
                        Response::success(request_id, ResponsePayload::Sessions(sessions))
                    }
                    Err(e) => error_response(request_id, &e),
                }
            }

            Command::GetSession { session_id } => {
                match engine.lock().await.get_session(&session_id, now) {
                    Ok(Some(view)) => Response::success(request_id, ResponsePayload::Session(view)),
                    Ok(None) => error_response(request_id, &CoachError::SessionNotFound(session_id)),
                    Err(e) => error_response(request_id, &e),
                }
            }

            Command::BookSession {
                coach_id,
                client_id: booked_client,
                date,
                notes,
            } => {
                let request = BookingRequest {
                    coach_id,
                    client_id: booked_client,
                    date,
                    notes,
                };

                let decision = engine.lock().await.book_session(request, now);
                match decision {
                    Ok(BookingDecision::Booked { view, event }) => {
                        ipc.broadcast_event(Event::new(event_payload(event)));
                        Response::success(request_id, ResponsePayload::Booked(view))
                    }
                    Ok(BookingDecision::Rejected { reasons }) => Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::ValidationFailed, reasons.join("; ")),
                    ),
                    Err(e) => error_response(request_id, &e),
                }
            }

            Command::UpdateStatus { session_id, status } => {
                let decision = engine
                    .lock()
                    .await
                    .request_status_change(&session_id, status, now);
                match decision {
                    Ok(StatusChangeDecision::Applied { view, event }) => {
                        ipc.broadcast_event(Event::new(event_payload(event)));
                        Response::success(request_id, ResponsePayload::StatusUpdated(view))
                    }
                    Ok(StatusChangeDecision::Denied { reasons }) => Response::success(
                        request_id,
                        ResponsePayload::StatusChangeDenied {
                            session_id,
                            reasons,
                        },
                    ),
                    Err(e) => error_response(request_id, &e),
                }
            }

            Command::EditSession { session_id, edit } => {
                let decision = engine.lock().await.edit_session(&session_id, edit, now);
                match decision {
                    Ok(EditDecision::Applied { view, event }) => {
                        ipc.broadcast_event(Event::new(event_payload(event)));
                        Response::success(request_id, ResponsePayload::Edited(view))
                    }
                    Ok(EditDecision::Rejected { reasons }) => Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::ValidationFailed, reasons.join("; ")),
                    ),
                    Err(e) => error_response(request_id, &e),
                }
            }

            Command::AllowedTransitions {
                session_id,
                at_time,
            } => {
                let time = at_time.unwrap_or(now);
                match engine.lock().await.allowed_transitions(&session_id, time) {
                    Ok((current, allowed)) => Response::success(
                        request_id,
                        ResponsePayload::Transitions {
                            session_id,
                            current,
                            allowed,
                        },
                    ),
                    Err(e) => error_response(request_id, &e),
                }
            }

            Command::ReloadConfig => {
                match Self::reload(engine, ipc, rate_limiter, config_path).await {
                    Ok(()) => Response::success(request_id, ResponsePayload::ConfigReloaded),
                    Err(e) => {
                        warn!(path = %config_path.display(), error = %e, "Config reload failed");
                        Response::error(
                            request_id,
                            ErrorInfo::new(ErrorCode::ConfigError, e.to_string()),
                        )
                    }
                }
            }

            Command::GetAuditLog { limit } => {
                match store.get_recent_audits(limit.min(MAX_AUDIT_ENTRIES)) {
                    Ok(events) => Response::success(
                        request_id,
                        ResponsePayload::AuditLog(events.iter().map(AuditEvent::to_record).collect()),
                    ),
                    Err(e) => error_response(request_id, &CoachError::from(e)),
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

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        }
    }

    /// Re-read `config_path` and swap in its policy and request budget.
    /// The running config is kept if the file fails to load.
    async fn reload(
        engine: &Arc<Mutex<CoachEngine>>,
        ipc: &Arc<IpcServer>,
        rate_limiter: &Arc<Mutex<RateLimiter>>,
        config_path: &Path,
    ) -> Result<(), ConfigError> {
        let config = load_config(config_path)?;

        *rate_limiter.lock().await = rate_limiter_for(&config);
        let event = engine.lock().await.reload_config(config);
        ipc.broadcast_event(Event::new(event_payload(event)));

        info!(path = %config_path.display(), "Configuration reloaded");
        Ok(())
    }
}

fn rate_limiter_for(config: &Config) -> RateLimiter {
    RateLimiter::new(config.service.requests_per_second, Duration::from_secs(1))
}

/// Why `role` may not run `command`, if it may not
fn permission_denial(role: ClientRole, command: &Command) -> Option<&'static str> {
    match command {
        Command::BookSession { .. } if !role.can_book() => Some("Booking requires a member role"),
        Command::UpdateStatus { .. } | Command::EditSession { .. } if !role.can_modify() => {
            Some("Changing sessions requires a member role")
        }
        Command::ReloadConfig if !role.can_reload_config() => Some("Admin role required"),
        Command::GetAuditLog { .. } if !role.can_read_audit() => Some("Admin role required"),
        _ => None,
    }
}

fn error_response(request_id: u64, error: &CoachError) -> Response {
    let code = match error {
        CoachError::SessionNotFound(_) => ErrorCode::SessionNotFound,
        CoachError::ValidationError(_) => ErrorCode::ValidationFailed,
        CoachError::ConfigError(_) => ErrorCode::ConfigError,
        CoachError::StoreError(_) => ErrorCode::StoreError,
        CoachError::PermissionDenied(_) => ErrorCode::PermissionDenied,
        CoachError::RateLimited => ErrorCode::RateLimited,
        CoachError::IpcError(_) | CoachError::Internal(_) => ErrorCode::InternalError,
    };

    if error.is_validation() {
        debug!(request_id, error = %error, "Request rejected");
    } else {
        error!(request_id, error = %error, "Request failed");
    }

    Response::error(request_id, ErrorInfo::new(code, error.to_string()))
}

fn event_payload(event: CoreEvent) -> EventPayload {
    match event {
        CoreEvent::SessionBooked {
            session_id,
            coach_id,
            client_id,
            date,
        } => EventPayload::SessionBooked {
            session_id,
            coach_id,
            client_id,
            date,
        },
        CoreEvent::StatusChanged {
            session_id,
            from,
            to,
        } => EventPayload::StatusChanged {
            session_id,
            from,
            to,
        },
        CoreEvent::SessionEdited {
            session_id,
            rescheduled,
        } => EventPayload::SessionEdited {
            session_id,
            rescheduled,
        },
        CoreEvent::SessionUpcoming {
            session_id,
            coach_id,
            client_id,
            date,
        } => EventPayload::SessionUpcoming {
            session_id,
            coach_id,
            client_id,
            date,
        },
        CoreEvent::PolicyReloaded {
            cancellation_window_hours,
        } => EventPayload::PolicyReloaded {
            cancellation_window_hours,
        },
    }
}

/// Console output plus a JSON log file in `log_dir`
fn init_logging(log_level: &str, log_dir: &Path) -> Result<PathBuf> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", log_dir))?;
    let log_path = log_dir.join("coachd.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::sync::Mutex::new(log_file)),
        )
        .init();

    Ok(log_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let log_path = init_logging(&args.log_level, &config.service.log_dir)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %args.config.display(),
        log_path = %log_path.display(),
        cancellation_window_hours = config.sessions.cancellation_window_hours,
        mock_time = coach_util::is_mock_time_active(),
        "coachd starting"
    );

    let service = Service::new(&args, config).await?;
    service.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use coach_api::{ReasonCode, Request, ResponseResult, SessionEdit, SessionFilter, SessionStatus};
    use coach_ipc::IpcClient;
    use coach_util::{SessionId, UserId};
    use tempfile::tempdir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// Serve `dir/coachd.sock` with the daemon's dispatch over an in-memory
    /// store. `ReloadConfig` reads `dir/config.toml`.
    async fn spawn_dispatch(dir: &Path) -> PathBuf {
        let socket_path = dir.join("coachd.sock");
        let config_path = dir.join("config.toml");

        let mut server = IpcServer::new(&socket_path);
        server.start().await.unwrap();
        let ipc = Arc::new(server);
        let mut messages = ipc.take_message_receiver().await.unwrap();

        let accept = ipc.clone();
        tokio::spawn(async move {
            let _ = accept.run().await;
        });

        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let config = Config::default();
        let rate_limiter = Arc::new(Mutex::new(rate_limiter_for(&config)));
        let engine = Arc::new(Mutex::new(CoachEngine::new(config, store.clone())));

        tokio::spawn(async move {
            while let Some(msg) = messages.recv().await {
                Service::handle_ipc_message(&engine, &ipc, &store, &rate_limiter, &config_path, msg)
                    .await;
            }
        });

        socket_path
    }

    async fn book_in(client: &mut IpcClient, from_now: chrono::Duration) -> SessionId {
        let response = client
            .send(Command::BookSession {
                coach_id: UserId::new("coach-1"),
                client_id: UserId::new("client-1"),
                date: coach_util::now() + from_now,
                notes: String::new(),
            })
            .await
            .unwrap();

        match response.result {
            ResponseResult::Ok(ResponsePayload::Booked(view)) => view.session.id,
            other => panic!("unexpected result {:?}", other),
        }
    }

    async fn allowed(client: &mut IpcClient, session_id: &SessionId) -> Vec<SessionStatus> {
        let response = client
            .send(Command::AllowedTransitions {
                session_id: session_id.clone(),
                at_time: None,
            })
            .await
            .unwrap();

        match response.result {
            ResponseResult::Ok(ResponsePayload::Transitions { allowed, .. }) => allowed,
            other => panic!("unexpected result {:?}", other),
        }
    }

    fn error_code(response: &Response) -> ErrorCode {
        match &response.result {
            ResponseResult::Err(e) => e.code,
            other => panic!("expected an error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancel_inside_window_is_denied_not_failed() {
        let dir = tempdir().unwrap();
        let socket_path = spawn_dispatch(dir.path()).await;
        let mut client = IpcClient::connect(&socket_path).await.unwrap();

        let session_id = book_in(&mut client, chrono::Duration::minutes(90)).await;

        let response = client
            .send(Command::UpdateStatus {
                session_id: session_id.clone(),
                status: SessionStatus::Cancelled,
            })
            .await
            .unwrap();

        match response.result {
            ResponseResult::Ok(ResponsePayload::StatusChangeDenied {
                session_id: denied,
                reasons,
            }) => {
                assert_eq!(denied, session_id);
                assert!(matches!(
                    reasons[0],
                    ReasonCode::CancellationWindow {
                        hours_until: 1,
                        window_hours: 2,
                        ..
                    }
                ));
            }
            other => panic!("unexpected result {:?}", other),
        }

        let response = client
            .send(Command::GetSession {
                session_id: session_id.clone(),
            })
            .await
            .unwrap();
        match response.result {
            ResponseResult::Ok(ResponsePayload::Session(view)) => {
                assert_eq!(view.session.status, SessionStatus::Pending);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let dir = tempdir().unwrap();
        let socket_path = spawn_dispatch(dir.path()).await;
        let mut client = IpcClient::connect(&socket_path).await.unwrap();

        let response = client
            .send(Command::GetSession {
                session_id: SessionId::new(),
            })
            .await
            .unwrap();
        assert_eq!(error_code(&response), ErrorCode::SessionNotFound);
    }

    #[tokio::test]
    async fn other_api_versions_are_refused() {
        let dir = tempdir().unwrap();
        let socket_path = spawn_dispatch(dir.path()).await;

        let stream = tokio::net::UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();

        let request = Request {
            request_id: 5,
            api_version: API_VERSION + 1,
            command: Command::Ping,
        };
        let mut line = serde_json::to_string(&request).unwrap();
        line.push('\n');
        write_half.write_all(line.as_bytes()).await.unwrap();

        let mut reply = String::new();
        BufReader::new(read_half).read_line(&mut reply).await.unwrap();
        let response: Response = serde_json::from_str(reply.trim()).unwrap();

        assert_eq!(response.request_id, 5);
        assert_eq!(error_code(&response), ErrorCode::UnsupportedVersion);
    }

    #[tokio::test]
    async fn reload_applies_new_window() {
        let dir = tempdir().unwrap();
        let socket_path = spawn_dispatch(dir.path()).await;
        let mut client = IpcClient::connect(&socket_path).await.unwrap();

        let session_id = book_in(&mut client, chrono::Duration::hours(10)).await;
        assert_eq!(
            allowed(&mut client, &session_id).await,
            vec![
                SessionStatus::InProgress,
                SessionStatus::Completed,
                SessionStatus::Cancelled
            ]
        );

        // No config file yet: the running policy stays
        let response = client.send(Command::ReloadConfig).await.unwrap();
        assert_eq!(error_code(&response), ErrorCode::ConfigError);
        assert!(allowed(&mut client, &session_id)
            .await
            .contains(&SessionStatus::Cancelled));

        std::fs::write(
            dir.path().join("config.toml"),
            "config_version = 1\n\n[sessions]\ncancellation_window_hours = 24\n",
        )
        .unwrap();

        let response = client.send(Command::ReloadConfig).await.unwrap();
        assert!(matches!(
            response.result,
            ResponseResult::Ok(ResponsePayload::ConfigReloaded)
        ));
        assert_eq!(
            allowed(&mut client, &session_id).await,
            vec![SessionStatus::InProgress, SessionStatus::Completed]
        );
    }

    fn book_command() -> Command {
        Command::BookSession {
            coach_id: UserId::new("coach-1"),
            client_id: UserId::new("client-1"),
            date: coach_util::now(),
            notes: String::new(),
        }
    }

    #[test]
    fn observers_are_read_only() {
        let role = ClientRole::Observer;
        assert!(permission_denial(role, &book_command()).is_some());
        assert!(permission_denial(
            role,
            &Command::UpdateStatus {
                session_id: SessionId::new(),
                status: SessionStatus::Cancelled,
            }
        )
        .is_some());
        assert!(permission_denial(
            role,
            &Command::EditSession {
                session_id: SessionId::new(),
                edit: SessionEdit::default(),
            }
        )
        .is_some());
        assert!(permission_denial(
            role,
            &Command::ListSessions {
                filter: SessionFilter::default()
            }
        )
        .is_none());
        assert!(permission_denial(role, &Command::Ping).is_none());
    }

    #[test]
    fn members_cannot_administer() {
        let role = ClientRole::Member;
        assert!(permission_denial(role, &book_command()).is_none());
        assert!(permission_denial(role, &Command::ReloadConfig).is_some());
        assert!(permission_denial(role, &Command::GetAuditLog { limit: 10 }).is_some());
        assert!(permission_denial(ClientRole::Admin, &Command::ReloadConfig).is_none());
    }

    #[test]
    fn errors_map_to_protocol_codes() {
        let not_found = error_response(7, &CoachError::SessionNotFound(SessionId::new()));
        assert_eq!(not_found.request_id, 7);
        match not_found.result {
            coach_api::ResponseResult::Err(e) => assert_eq!(e.code, ErrorCode::SessionNotFound),
            other => panic!("unexpected result {:?}", other),
        }

        let store = error_response(8, &CoachError::store("disk full"));
        match store.result {
            coach_api::ResponseResult::Err(e) => {
                assert_eq!(e.code, ErrorCode::StoreError);
                assert!(e.message.contains("disk full"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn core_events_keep_their_fields() {
        let session_id = SessionId::new();
        let payload = event_payload(CoreEvent::StatusChanged {
            session_id: session_id.clone(),
            from: SessionStatus::Pending,
            to: SessionStatus::Cancelled,
        });

        match payload {
            EventPayload::StatusChanged { session_id: id, from, to } => {
                assert_eq!(id, session_id);
                assert_eq!(from, SessionStatus::Pending);
                assert_eq!(to, SessionStatus::Cancelled);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn rate_limit_follows_config() {
        let mut config = Config::default();
        config.service.requests_per_second = 2;
        let mut limiter = rate_limiter_for(&config);
        let client = ClientId::new();

        assert!(limiter.check(&client));
        assert!(limiter.check(&client));
        assert!(!limiter.check(&client));
    }
}
