//! I/O and staging settings for one trace-processing pass.
//!
//! The transformer reads both fields. The reader, the validator and the
//! emitter only use `block_size`.

use crate::trace::{DEFAULT_BLOCK_SIZE, DEFAULT_STAGING_LIMIT};

/// Configuration for one trace-processing pass.
///
/// Mirrors the CLI arguments so library callers can build it directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceConfig {
    /// Bytes read from or written to a trace file per I/O operation
    pub block_size: usize,
    /// Staging-buffer size in bytes above which the oldest pending
    /// allocation is evicted
    pub staging_limit: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig {
            block_size: DEFAULT_BLOCK_SIZE,
            staging_limit: DEFAULT_STAGING_LIMIT,
        }
    }
}

impl TraceConfig {
    pub fn with_staging_limit(mut self, staging_limit: usize) -> Self {
        self.staging_limit = staging_limit;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }
}
