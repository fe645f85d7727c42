//! Error types for schema configuration and trace processing.
//!
//! Every variant is fatal. Configuration errors are raised while a schema is
//! being built or loaded, stream errors while a trace is being read and carry
//! the byte offset of the offending record.

use std::io;

use thiserror::Error;

use crate::trace::{EventKind, Field};

pub type Result<T, E = TraceError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("unknown event kind '{0}'")]
    UnknownKind(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("{kind} cannot carry field {field}")]
    FieldNotAllowed { kind: EventKind, field: Field },

    #[error("{kind} has no optional fields and cannot be enabled directly")]
    NotConfigurable { kind: EventKind },

    #[error("schema file version {found} does not match expected version {expected}")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("schema does not request allocation object ids, no transform is needed")]
    TransformNotNeeded,

    #[error("unknown opcode {opcode} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: u64 },

    #[error("truncated {kind} record at offset {offset}")]
    Truncated { kind: EventKind, offset: u64 },

    #[error("{kind} record at offset {offset} is not enabled in the schema")]
    EventNotEnabled { kind: EventKind, offset: u64 },

    #[error("trace ended with {pending} unterminated allocation(s) and {staged} staged byte(s)")]
    UnterminatedAllocation { pending: usize, staged: usize },

    #[error("no trace ids left, every positive i32 has been assigned")]
    IdsExhausted,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TraceError {
    /// True for errors caused by a bad schema or schema configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            TraceError::UnknownKind(_)
                | TraceError::UnknownField(_)
                | TraceError::FieldNotAllowed { .. }
                | TraceError::NotConfigurable { .. }
                | TraceError::SchemaVersion { .. }
                | TraceError::TransformNotNeeded
        )
    }

    /// Byte offset of the record that could not be decoded, if any.
    pub fn offset(&self) -> Option<u64> {
        match self {
            TraceError::UnknownOpcode { offset, .. }
            | TraceError::Truncated { offset, .. }
            | TraceError::EventNotEnabled { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}
