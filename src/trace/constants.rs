//! Shared constants for trace processing.
//!
//! The id sentinels are part of the wire contract: the runtime emitter, the
//! transformer and the reader all agree on them.

/// Object id reserved for `null`. Interned ids start at 1.
pub const NULL_ID: i32 = 0;

/// Value reported for a field the schema does not request.
pub const MISSING_FIELD_VAL: i32 = -1;

/// Value reported for a field the schema requests but that was never resolved.
///
/// The transformer writes this as the object-id placeholder of every staged
/// allocation; it survives into the final trace only if the allocation was
/// evicted before its end event arrived.
pub const UNKNOWN_FIELD_VAL: i32 = -2;

/// Width in bytes of every field on the wire.
pub const FIELD_BYTES: usize = 4;

/// Width in bytes of the opcode that starts every record.
pub const OPCODE_BYTES: usize = 1;

/// Number of bytes read from or written to a trace file per I/O operation.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Staging-buffer size above which the transformer evicts the oldest pending
/// allocation.
pub const DEFAULT_STAGING_LIMIT: usize = 5_000_000;

/// Version stamped into persisted schema files.
pub const SCHEMA_FILE_VERSION: u32 = 1;
