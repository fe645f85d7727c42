//! instrace library - execution-trace schema, codec, reorder transform and reader.
//!
//! A trace is a flat sequence of records, each an opcode byte followed by the
//! 4-byte fields the [`Schema`] requests for that kind. Traces written by the
//! running program ("crude" traces) report allocations as begin/end pairs; the
//! [`transform`] pass merges every pair into one `NEW` record so that
//! consumers reading the "final" trace see complete allocations.
//!
//! # Modules
//!
//! - [`scheme`] - Schema registry and its persisted form
//! - [`codec`] - Byte-level reader and writer
//! - [`transform`] - Crude-to-final reorder transform
//! - [`reader`] - Lazy event decoder
//! - [`printer`] - Text and JSON dumps
//! - [`record`] - Producer-side emitter and identity interner
//! - [`validate`] - Final-trace validation
//!
//! # Example
//!
//! ```no_run
//! use instrace::{decode, transform, Schema, TraceConfig};
//! use std::path::Path;
//!
//! let schema = Schema::load(Path::new("scheme.json")).unwrap();
//! let config = TraceConfig::default();
//! transform(&schema, Path::new("crude.trace"), Path::new("final.trace"), &config)
//!     .expect("Failed to transform trace");
//!
//! for event in decode(&schema, Path::new("final.trace")).unwrap() {
//!     let event = event.unwrap();
//!     if event.has_obj() {
//!         println!("{} {}", event.kind, event.obj);
//!     }
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod printer;
pub mod reader;
pub mod record;
pub mod scheme;
pub mod trace;
pub mod transform;
pub mod validate;

// Re-export for convenience
pub use config::TraceConfig;
pub use error::{Result, TraceError};
pub use reader::{decode, decode_with_config, TraceReader};
pub use scheme::{EventFormat, Schema, SchemaBuilder, SchemaConfig};
pub use trace::{Event, EventKind, Field};
pub use transform::{transform, transform_stream, TraceTransformer, TransformStats};
pub use validate::{validate_trace, ValidationError, ValidationResult, ValidationWarning};
