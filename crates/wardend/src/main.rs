//! wardend - the warden restriction service
//!
//! Wires together:
//! - Configuration loading
//! - Store initialization and restart reconciliation
//! - The restriction registry
//! - The session-server bridge (presence + checkpoints over IPC)
//! - The IPC server
//!
//! Everything that touches the registry runs on one cooperative
//! current-thread runtime: registry mutations and release fires can never
//! interleave, which is what makes the duplicate-impose check and the
//! generation validation sufficient (no locks around the registry).

mod bridge;
mod ipc;
mod webhook;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use bridge::SessionBridge;
use ipc::{IpcServer, ServerMessage};
use warden_api::{
    ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Response,
    ResponsePayload,
};
use warden_config::{load_config, Config};
use warden_core::{RegistryEvent, RestrictionRegistry};
use warden_host_api::{PresenceEvent, SessionLifecycle};
use warden_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use warden_util::{
    format_duration, parse_duration, parse_signed_duration, ClientId, EntityId, MonotonicInstant,
    RateLimiter, RestrictionError,
};

/// wardend - temporary restriction service for multi-user session servers
#[derive(Parser, Debug)]
#[command(name = "wardend")]
#[command(about = "Temporary restriction service for multi-user session servers", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/warden/config.toml)
    #[arg(short, long, default_value_os_t = warden_util::default_config_path())]
    config: PathBuf,

    /// Socket path override (or set WARDEN_SOCKET env var)
    #[arg(short, long, env = "WARDEN_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set WARDEN_DATA_DIR env var)
    #[arg(short, long, env = "WARDEN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    registry: RestrictionRegistry,
    bridge: Arc<SessionBridge>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    config: Config,
    rate_limiter: RateLimiter,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let config = if args.config.exists() {
            load_config(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?
        } else {
            warn!(config_path = %args.config.display(), "Config not found, using defaults");
            Config::default()
        };

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

        // A broken durable store degrades to in-memory: losing a stale
        // restriction list is less harmful than refusing to start.
        let db_path = data_dir.join("wardend.db");
        let store: Arc<dyn Store> = match SqliteStore::open(&db_path) {
            Ok(store) => {
                info!(db_path = %db_path.display(), "Store initialized");
                Arc::new(store)
            }
            Err(e) => {
                warn!(db_path = %db_path.display(), error = %e, "Durable store unavailable, state will not survive restarts");
                Arc::new(SqliteStore::in_memory().context("Failed to open in-memory store")?)
            }
        };

        let _ = store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted));

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;
        let ipc = Arc::new(ipc);

        let bridge = Arc::new(SessionBridge::new(ipc.event_sender()));

        let mut registry = RestrictionRegistry::new(
            store.clone(),
            bridge.clone(),
            config.restriction.default_duration,
        );
        match store.load_restrictions() {
            Ok(rows) => registry.hydrate(rows),
            Err(e) => {
                warn!(error = %e, "Restriction snapshot unreadable, starting empty");
            }
        }

        // 30 requests per second per client
        let rate_limiter = RateLimiter::new(30, Duration::from_secs(1));

        Ok(Self {
            registry,
            bridge,
            ipc,
            store,
            config,
            rate_limiter,
        })
    }

    async fn run(self) -> Result<()> {
        let Service {
            mut registry,
            bridge,
            ipc,
            store,
            config,
            mut rate_limiter,
        } = self;

        let mut presence_events = bridge.subscribe();
        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("Message receiver should be available")?;

        // IPC accept loop
        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        // Release timers are polled; the heartbeat bounds data loss from
        // any missed write-through path.
        let mut release_tick = tokio::time::interval(Duration::from_millis(250));
        let mut heartbeat = tokio::time::interval(config.service.heartbeat_interval);

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

                _ = release_tick.tick() => {
                    let now = MonotonicInstant::now();
                    for event in registry.tick(now) {
                        publish(&ipc, &config, &registry, event, now);
                    }
                }

                _ = heartbeat.tick() => {
                    registry.write_snapshot(MonotonicInstant::now());
                    debug!("Heartbeat snapshot written");
                }

                Some(presence) = presence_events.recv() => {
                    let now = MonotonicInstant::now();
                    let (entity_id, present) = match presence {
                        PresenceEvent::Present { entity_id } => (entity_id, true),
                        PresenceEvent::Absent { entity_id, reason_tag } => {
                            debug!(entity_id = %entity_id, reason_tag = %reason_tag, "Entity absent");
                            (entity_id, false)
                        }
                    };
                    if let Some(event) = registry.on_presence_changed(&entity_id, present, now) {
                        publish(&ipc, &config, &registry, event, now);
                    }
                }

                Some(message) = ipc_messages.recv() => {
                    handle_ipc_message(
                        &mut registry,
                        &bridge,
                        &ipc,
                        &store,
                        &config,
                        &mut rate_limiter,
                        message,
                    )
                    .await;
                }
            }
        }

        // Freeze every present record before exit: only relative durations
        // may reach the store.
        let now = MonotonicInstant::now();
        let suspended = registry.suspend_all(now);
        if !suspended.is_empty() {
            info!(count = suspended.len(), "Suspended active restrictions for shutdown");
        }
        registry.write_snapshot(now);

        ipc.broadcast_event(Event::new(EventPayload::Shutdown));
        if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::ServiceStopped)) {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Broadcast a registry event to subscribers plus side channels.
fn publish(
    ipc: &IpcServer,
    config: &Config,
    registry: &RestrictionRegistry,
    event: RegistryEvent,
    now: MonotonicInstant,
) {
    match event {
        RegistryEvent::Imposed {
            entity_id,
            reason,
            remaining,
            present,
        } => {
            if let Some(url) = &config.restriction.webhook_url {
                webhook::send_impose_notice(
                    url.clone(),
                    webhook::ImposeNotice {
                        entity_id: entity_id.to_string(),
                        reason: reason.clone(),
                        duration: format_duration(remaining),
                        offline: !present,
                    },
                );
            }
            ipc.broadcast_event(Event::new(EventPayload::RestrictionImposed {
                entity_id,
                reason,
                remaining,
                present,
            }));
        }

        RegistryEvent::Released {
            entity_id,
            cause,
            checkpoint_restored,
        } => {
            ipc.broadcast_event(Event::new(EventPayload::RestrictionReleased {
                entity_id,
                cause,
                checkpoint_restored,
            }));
            ipc.broadcast_event(Event::new(EventPayload::StateChanged(
                registry.state_snapshot(now),
            )));
        }

        RegistryEvent::Extended {
            entity_id,
            remaining,
        } => {
            ipc.broadcast_event(Event::new(EventPayload::RestrictionExtended {
                entity_id,
                remaining,
            }));
        }

        RegistryEvent::Suspended {
            entity_id,
            remaining,
        } => {
            ipc.broadcast_event(Event::new(EventPayload::RestrictionSuspended {
                entity_id,
                remaining,
            }));
        }

        RegistryEvent::Resumed {
            entity_id,
            remaining,
        } => {
            ipc.broadcast_event(Event::new(EventPayload::RestrictionResumed {
                entity_id,
                remaining,
            }));
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_ipc_message(
    registry: &mut RestrictionRegistry,
    bridge: &Arc<SessionBridge>,
    ipc: &Arc<IpcServer>,
    store: &Arc<dyn Store>,
    config: &Config,
    rate_limiter: &mut RateLimiter,
    message: ServerMessage,
) {
    match message {
        ServerMessage::Request { client_id, request } => {
            if !rate_limiter.check(&client_id) {
                let response = Response::error(
                    request.request_id,
                    ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                );
                let _ = ipc.send_response(&client_id, response).await;
                return;
            }

            let response = handle_command(
                registry,
                bridge,
                ipc,
                store,
                config,
                &client_id,
                request.request_id,
                request.command,
            )
            .await;

            let _ = ipc.send_response(&client_id, response).await;
        }

        ServerMessage::ClientConnected { client_id, info } => {
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
            rate_limiter.remove_client(&client_id);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_command(
    registry: &mut RestrictionRegistry,
    bridge: &Arc<SessionBridge>,
    ipc: &Arc<IpcServer>,
    store: &Arc<dyn Store>,
    config: &Config,
    client_id: &ClientId,
    request_id: u64,
    command: Command,
) -> Response {
    let now = MonotonicInstant::now();
    let role = ipc
        .client_info(client_id)
        .await
        .map(|info| info.role)
        .unwrap_or(ClientRole::Observer);

    match command {
        Command::GetState => {
            Response::success(request_id, ResponsePayload::State(registry.state_snapshot(now)))
        }

        Command::List => Response::success(
            request_id,
            ResponsePayload::Restrictions {
                restrictions: registry.list(now),
            },
        ),

        Command::Query { entity_id } => Response::success(
            request_id,
            ResponsePayload::Restriction {
                restriction: registry.query(&entity_id, now),
            },
        ),

        Command::CheckCommand {
            entity_id,
            command,
            args,
        } => {
            let blocked = registry.is_restricted(&entity_id)
                && config.restriction.blacklist.is_blocked(&command, &args);
            Response::success(request_id, ResponsePayload::CommandVerdict { blocked })
        }

        Command::GetPolicy => Response::success(
            request_id,
            ResponsePayload::Policy(warden_api::PolicyInfo {
                default_duration: config.restriction.default_duration,
                holding_zone: config.restriction.holding_zone.clone(),
                rules_url: config.restriction.rules_url.clone(),
            }),
        ),

        Command::Impose {
            entity_id,
            duration,
            reason,
        } => {
            if !role.can_mutate() {
                return permission_denied(request_id);
            }

            let duration = match duration.as_deref().map(parse_duration).transpose() {
                Ok(duration) => duration,
                Err(e) => {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::InvalidDuration, e.to_string()),
                    );
                }
            };

            let present = bridge.is_currently_present(&entity_id);
            match registry.impose(&entity_id, duration, reason, present, now) {
                Ok(event) => {
                    let remaining = match &event {
                        RegistryEvent::Imposed { remaining, .. } => *remaining,
                        _ => Duration::ZERO,
                    };
                    publish(ipc, config, registry, event, now);
                    Response::success(
                        request_id,
                        ResponsePayload::Imposed {
                            entity_id,
                            remaining,
                        },
                    )
                }
                Err(e) => Response::error(request_id, restriction_error_info(e)),
            }
        }

        Command::Release { entity_id } => {
            if !role.can_mutate() {
                return permission_denied(request_id);
            }

            match registry.release(&entity_id, now) {
                Ok(event) => {
                    publish(ipc, config, registry, event, now);
                    Response::success(request_id, ResponsePayload::Released { entity_id })
                }
                Err(e) => Response::error(request_id, restriction_error_info(e)),
            }
        }

        Command::Extend { entity_id, by } => {
            if !role.can_mutate() {
                return permission_denied(request_id);
            }

            let delta = match parse_signed_duration(&by) {
                Ok(delta) => delta,
                Err(e) => {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::InvalidDuration, e.to_string()),
                    );
                }
            };

            match registry.extend(&entity_id, delta, now) {
                Ok(event) => {
                    // Shortening past zero expires the restriction instead
                    let payload = match &event {
                        RegistryEvent::Extended { remaining, .. } => ResponsePayload::Extended {
                            entity_id,
                            remaining: *remaining,
                        },
                        _ => ResponsePayload::Released { entity_id },
                    };
                    publish(ipc, config, registry, event, now);
                    Response::success(request_id, payload)
                }
                Err(e) => Response::error(request_id, restriction_error_info(e)),
            }
        }

        Command::NotifyPresent {
            entity_id,
            checkpoint,
        } => {
            if !role.can_mutate() {
                return permission_denied(request_id);
            }

            bridge.note_present(entity_id, checkpoint);
            Response::success(request_id, ResponsePayload::Acknowledged)
        }

        Command::NotifyAbsent { entity_id, reason } => {
            if !role.can_mutate() {
                return permission_denied(request_id);
            }

            bridge.note_absent(entity_id, reason);
            Response::success(request_id, ResponsePayload::Acknowledged)
        }

        Command::SyncPresence { entity_ids } => {
            if !role.can_mutate() {
                return permission_denied(request_id);
            }

            bridge.sync_presence(entity_ids);

            // Suspend records the host no longer reports, then promote the
            // ones it does.
            let stale: Vec<EntityId> = registry
                .list(now)
                .into_iter()
                .filter(|view| view.present && !bridge.is_currently_present(&view.entity_id))
                .map(|view| view.entity_id)
                .collect();
            for entity_id in stale {
                if let Some(event) = registry.on_presence_changed(&entity_id, false, now) {
                    publish(ipc, config, registry, event, now);
                }
            }
            let lifecycle: &dyn SessionLifecycle = bridge.as_ref();
            for event in registry.reconcile(lifecycle, now) {
                publish(ipc, config, registry, event, now);
            }

            Response::success(request_id, ResponsePayload::Acknowledged)
        }

        Command::SubscribeEvents => Response::success(
            request_id,
            ResponsePayload::Subscribed {
                client_id: client_id.clone(),
            },
        ),

        Command::GetHealth => {
            let health = HealthStatus {
                live: true,
                ready: true,
                store_ok: store.is_healthy(),
            };
            Response::success(request_id, ResponsePayload::Health(health))
        }

        Command::Ping => Response::success(request_id, ResponsePayload::Pong),
    }
}

fn permission_denied(request_id: u64) -> Response {
    Response::error(
        request_id,
        ErrorInfo::new(ErrorCode::PermissionDenied, "Admin role required"),
    )
}

fn restriction_error_info(error: RestrictionError) -> ErrorInfo {
    let code = match &error {
        RestrictionError::AlreadyRestricted(_) => ErrorCode::AlreadyRestricted,
        RestrictionError::NotRestricted(_) => ErrorCode::NotRestricted,
        RestrictionError::InvalidDuration(_) => ErrorCode::InvalidDuration,
    };
    ErrorInfo::new(code, error.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "wardend starting");

    let service = Service::new(&args).await?;
    service.run().await
}
