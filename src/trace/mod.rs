//! Shared trace data types.
//!
//! These types are used by every stage of the pipeline: the runtime emitter
//! writing crude traces, the reorder transformer, and the reader handing typed
//! events to analyses.
//!
//! # Module Organization
//!
//! - [`kind`]: the opcode enumeration and the fields each kind can carry
//! - [`models`]: the decoded [`Event`] record
//! - [`constants`]: id sentinels and I/O defaults

pub mod constants;
pub mod kind;
pub mod models;

// Re-export commonly used types
pub use constants::*;
pub use kind::{EventKind, Field, FieldSet, Layout, SchemaFlag};
pub use models::Event;
