use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Resource a `NotFound` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    FloatingIp,
    InternalPort,
    PortForwarding,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::FloatingIp => "Floating IP",
            ResourceKind::InternalPort => "Port",
            ResourceKind::PortForwarding => "Port forwarding",
        };
        f.write_str(name)
    }
}

/// Classifies conflicts for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Another rule on the floating IP uses the same external port and protocol
    ExternalPort,
    /// Another rule forwards to the same internal address, port and protocol
    InternalEndpoint,
    /// The floating IP is bound to a port by 1:1 NAT
    FloatingIpAssociated,
    /// Concurrent writers kept winning until retries ran out
    ConcurrentModification,
}

/// Errors raised by a `RuleStore` backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("deadlock detected: {0}")]
    Deadlock(String),

    #[error("stale data for rule {id}: expected revision {expected}, found {actual:?}")]
    StaleData {
        id: Uuid,
        expected: u64,
        actual: Option<u64>,
    },

    #[error("duplicate entry for unique index {index}")]
    DuplicateEntry { index: &'static str },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether re-running the read-check-write sequence may succeed.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, StoreError::Backend(_))
    }
}

/// Port forwarding registry error types
#[derive(Error, Debug)]
pub enum PortFwError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} {id} could not be found")]
    NotFound { kind: ResourceKind, id: String },

    #[error("Conflict: {message}")]
    Conflict { kind: ConflictKind, message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PortFwError {
    pub(crate) fn not_found(kind: ResourceKind, id: impl ToString) -> Self {
        PortFwError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn conflict(kind: ConflictKind, message: impl Into<String>) -> Self {
        PortFwError::Conflict {
            kind,
            message: message.into(),
        }
    }

    /// HTTP status code the documented API reports for this error.
    ///
    /// Conflicts are reported as 400, not 409.
    pub fn status_code(&self) -> u16 {
        match self {
            PortFwError::InvalidInput(_) | PortFwError::Conflict { .. } => 400,
            PortFwError::NotFound { .. } => 404,
            PortFwError::Store(_) | PortFwError::ConfigError(_) | PortFwError::IoError(_) => 500,
        }
    }

    /// Short error type name used in API error bodies.
    pub fn type_name(&self) -> &'static str {
        match self {
            PortFwError::InvalidInput(_) => "InvalidInput",
            PortFwError::NotFound { .. } => "NotFound",
            PortFwError::Conflict { .. } => "Conflict",
            PortFwError::Store(_) => "StoreError",
            PortFwError::ConfigError(_) => "ConfigError",
            PortFwError::IoError(_) => "IoError",
        }
    }
}

pub type Result<T> = std::result::Result<T, PortFwError>;
