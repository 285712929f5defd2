//! Command types for the wardend protocol

use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_util::{ClientId, EntityId};

use crate::{Checkpoint, ClientRole, API_VERSION};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    AlreadyRestricted,
    NotRestricted,
    /// Target could not be resolved by an upstream name resolver
    EntityNotFound,
    InvalidDuration,
    PermissionDenied,
    RateLimited,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Get current service state
    GetState,

    /// List all active restrictions with live remaining times
    List,

    /// Query a single entity (enforcement read, no side effects)
    Query { entity_id: EntityId },

    /// Enforcement read: should this command from this entity be blocked?
    CheckCommand {
        entity_id: EntityId,
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },

    /// Read the restriction policy (holding zone, rules URL, default length)
    GetPolicy,

    /// Impose a restriction. `duration` is parsed server-side
    /// (bare minutes or unit-suffixed); omitted means the configured default.
    Impose {
        entity_id: EntityId,
        duration: Option<String>,
        reason: Option<String>,
    },

    /// Release a restriction early
    Release { entity_id: EntityId },

    /// Extend (or, with a negative value, shorten) a restriction
    Extend { entity_id: EntityId, by: String },

    /// Session server reports an entity connected. The checkpoint is the
    /// entity's current restore token, cached for capture at impose time.
    NotifyPresent {
        entity_id: EntityId,
        checkpoint: Option<Checkpoint>,
    },

    /// Session server reports an entity disconnected
    NotifyAbsent {
        entity_id: EntityId,
        reason: Option<String>,
    },

    /// Session server replays the full set of currently-connected entities
    /// (sent once after either side restarts)
    SyncPresence { entity_ids: Vec<EntityId> },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    State(crate::ServiceStateSnapshot),
    Restrictions {
        restrictions: Vec<crate::RestrictionView>,
    },
    Restriction {
        restriction: Option<crate::RestrictionView>,
    },
    Imposed {
        entity_id: EntityId,
        remaining: Duration,
    },
    Released {
        entity_id: EntityId,
    },
    Extended {
        entity_id: EntityId,
        remaining: Duration,
    },
    CommandVerdict {
        blocked: bool,
    },
    Policy(crate::PolicyInfo),
    Acknowledged,
    Subscribed {
        client_id: ClientId,
    },
    Health(crate::HealthStatus),
    Pong,
}

/// Client connection info (set by the IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}
