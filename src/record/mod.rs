//! Producer-side recording support.
//!
//! The instrumented program links these in to write crude traces: the
//! [`IdInterner`] turns runtime identities into trace ids and the
//! [`EventEmitter`] serializes records from every thread into one stream.

pub mod emitter;
pub mod interner;

pub use emitter::{EventEmitter, Probe};
pub use interner::IdInterner;
