use std::fmt;

use shared::domain::ResourceKind;
use thiserror::Error;

use crate::query_state::QueryError;

/// The credential refresh was rejected; the operation never reached the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("credential refresh rejected: {reason}")]
pub struct AuthFailure {
    pub reason: String,
}

impl AuthFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// User-triggered actions that talk to the API outside of list retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Block,
    Unblock,
    Reinject,
    Import,
    Ventilate,
    Export,
}

impl Operation {
    /// Noun used in notices, e.g. "Deletion failed."
    pub fn label(self) -> &'static str {
        match self {
            Operation::Create => "Creation",
            Operation::Update => "Update",
            Operation::Delete => "Deletion",
            Operation::Block => "Blocking",
            Operation::Unblock => "Unblocking",
            Operation::Reinject => "Reinjection",
            Operation::Import => "Import",
            Operation::Ventilate => "Ventilation",
            Operation::Export => "Export",
        }
    }

    pub fn success_message(self) -> String {
        format!("{} succeeded.", self.label())
    }

    pub fn failure_message(self) -> String {
        format!("{} failed.", self.label())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("not authenticated: {0}")]
    NotAuthenticated(#[from] AuthFailure),
    #[error("failed to retrieve {kind} list: {source}")]
    Retrieval {
        kind: ResourceKind,
        source: anyhow::Error,
    },
    #[error("{operation} failed: {source}")]
    OperationFailed {
        operation: Operation,
        source: anyhow::Error,
    },
    #[error("{operation} is not available for {kind}")]
    Unsupported {
        operation: Operation,
        kind: ResourceKind,
    },
    #[error("create payload does not match resource kind {0}")]
    PayloadKindMismatch(ResourceKind),
    #[error("import payload must be a JSON array of records")]
    InvalidImport,
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl SyncError {
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::NotAuthenticated(_))
    }
}
