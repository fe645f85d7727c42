//! Final-trace validation.
//!
//! Decodes a trace and checks that it is something consumers can rely on: it
//! must decode cleanly to the end, contain no crude-only allocation records and
//! carry no sentinel values in fields the schema requests. Allocations left
//! unresolved by eviction are legal but reported as warnings.
//!
//! # Example
//!
//! ```no_run
//! use instrace::scheme::Schema;
//! use instrace::validate::validate_trace;
//! use instrace::TraceConfig;
//! use std::path::Path;
//!
//! let schema = Schema::load(Path::new("scheme.json")).unwrap();
//! let result = validate_trace(&schema, Path::new("final.trace"), &TraceConfig::default());
//! if result.has_errors() {
//!     for error in &result.errors {
//!         eprintln!("Error: {}", error);
//!     }
//! }
//! ```

use std::fmt;
use std::path::Path;

use crate::config::TraceConfig;
use crate::error::Result;
use crate::reader::decode_with_config;
use crate::scheme::Schema;
use crate::trace::{Event, EventKind, Field, UNKNOWN_FIELD_VAL};

/// Errors of one kind reported individually before being summarized.
const MAX_REPORTED: usize = 20;

/// Result of validating a trace.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Errors that indicate invalid trace data.
    pub errors: Vec<ValidationError>,
    /// Warnings that indicate potential issues.
    pub warnings: Vec<ValidationWarning>,
    /// Records decoded before validation stopped.
    pub events: u64,
}

impl ValidationResult {
    /// Returns true if there are any validation errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if there are any validation warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Returns true if the trace is valid (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// Validation error types.
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// The trace could not be decoded past this point.
    Decode {
        offset: Option<u64>,
        message: String,
    },
    /// An allocation begin/end record survived into a final trace.
    CrudeOnlyEvent { kind: EventKind, offset: u64 },
    /// A requested field holds a sentinel or otherwise impossible value.
    InvalidValue {
        kind: EventKind,
        field: Field,
        value: i32,
        offset: u64,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Decode {
                offset: Some(offset),
                message,
            } => {
                write!(f, "offset {offset}: decode error: {message}")
            }
            ValidationError::Decode {
                offset: None,
                message,
            } => {
                write!(f, "decode error: {message}")
            }
            ValidationError::CrudeOnlyEvent { kind, offset } => {
                write!(f, "offset {offset}: {kind} record in a final trace")
            }
            ValidationError::InvalidValue {
                kind,
                field,
                value,
                offset,
            } => {
                write!(f, "offset {offset}: {kind}.{field}: invalid value {value}")
            }
        }
    }
}

/// Validation warning types.
#[derive(Debug, Clone)]
pub enum ValidationWarning {
    /// The trace holds no records.
    EmptyTrace,
    /// An allocation was evicted before its object id was known.
    UnresolvedAllocation { loc: i32, offset: u64 },
    /// Too many problems of the same type - only showing first N.
    TooManyProblems { what: &'static str, shown: usize, total: usize },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::EmptyTrace => write!(f, "trace is empty"),
            ValidationWarning::UnresolvedAllocation { loc, offset } => {
                write!(f, "offset {offset}: allocation at site {loc} has no object id")
            }
            ValidationWarning::TooManyProblems { what, shown, total } => {
                write!(f, "{what}: showing first {shown} of {total}")
            }
        }
    }
}

/// Validates the trace at `path` as a final trace under `schema`.
pub fn validate_trace(schema: &Schema, path: &Path, config: &TraceConfig) -> ValidationResult {
    match decode_with_config(schema, path, config) {
        Ok(events) => validate_events(events),
        Err(e) => {
            let mut result = ValidationResult::default();
            result.add_error(ValidationError::Decode {
                offset: None,
                message: e.to_string(),
            });
            result
        }
    }
}

/// Validates an already-decoded event stream.
pub fn validate_events<I>(events: I) -> ValidationResult
where
    I: IntoIterator<Item = Result<Event>>,
{
    let mut result = ValidationResult::default();
    let mut invalid = 0;
    let mut unresolved = 0;

    for event in events {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                result.add_error(ValidationError::Decode {
                    offset: e.offset(),
                    message: e.to_string(),
                });
                break;
            }
        };
        result.events += 1;

        if event.kind.is_crude_only() {
            result.add_error(ValidationError::CrudeOnlyEvent {
                kind: event.kind,
                offset: event.offset,
            });
            continue;
        }

        if event.kind == EventKind::New && event.is_unresolved() {
            unresolved += 1;
            if unresolved <= MAX_REPORTED {
                result.add_warning(ValidationWarning::UnresolvedAllocation {
                    loc: event.loc,
                    offset: event.offset,
                });
            }
        }

        for (field, value) in event.values() {
            if is_valid_value(&event, field, value) {
                continue;
            }
            invalid += 1;
            if invalid <= MAX_REPORTED {
                result.add_error(ValidationError::InvalidValue {
                    kind: event.kind,
                    field,
                    value,
                    offset: event.offset,
                });
            }
        }
    }

    if result.events == 0 && !result.has_errors() {
        result.add_warning(ValidationWarning::EmptyTrace);
    }
    if invalid > MAX_REPORTED {
        result.add_warning(ValidationWarning::TooManyProblems {
            what: "invalid values",
            shown: MAX_REPORTED,
            total: invalid,
        });
    }
    if unresolved > MAX_REPORTED {
        result.add_warning(ValidationWarning::TooManyProblems {
            what: "unresolved allocations",
            shown: MAX_REPORTED,
            total: unresolved,
        });
    }
    result
}

fn is_valid_value(event: &Event, field: Field, value: i32) -> bool {
    if value >= 0 {
        return true;
    }
    // Only a NEW record's object id may legitimately stay unresolved.
    event.kind == EventKind::New && field == Field::Obj && value == UNKNOWN_FIELD_VAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TraceError;
    use crate::scheme::SchemaBuilder;
    use crate::trace::MISSING_FIELD_VAL;

    fn schema() -> Schema {
        let mut builder = SchemaBuilder::new();
        builder
            .enable(EventKind::New, &[Field::Loc, Field::Obj])
            .unwrap()
            .enable(EventKind::AcquireLock, &[Field::Obj])
            .unwrap();
        builder.build()
    }

    fn event(schema: &Schema, kind: EventKind, offset: u64, values: &[(Field, i32)]) -> Event {
        let mut event = Event::empty(kind, *schema.format(kind), offset);
        for (field, value) in values {
            event.set(*field, *value);
        }
        event
    }

    #[test]
    fn test_validation_result_methods() {
        let mut result = ValidationResult::default();
        assert!(result.is_valid());
        assert!(!result.has_errors());
        assert!(!result.has_warnings());

        result.add_warning(ValidationWarning::EmptyTrace);
        assert!(result.is_valid());
        assert!(result.has_warnings());

        result.add_error(ValidationError::Decode {
            offset: None,
            message: "test".to_string(),
        });
        assert!(!result.is_valid());
        assert!(result.has_errors());
    }

    #[test]
    fn test_crude_only_event_display() {
        let error = ValidationError::CrudeOnlyEvent {
            kind: EventKind::AllocBegin,
            offset: 18,
        };
        assert_eq!(
            format!("{error}"),
            "offset 18: ALLOC_BEGIN record in a final trace"
        );
    }

    #[test]
    fn test_invalid_value_display() {
        let error = ValidationError::InvalidValue {
            kind: EventKind::AcquireLock,
            field: Field::Obj,
            value: -1,
            offset: 0,
        };
        assert_eq!(
            format!("{error}"),
            "offset 0: ACQUIRE_LOCK.OBJ: invalid value -1"
        );
    }

    #[test]
    fn test_valid_trace() {
        let schema = schema();
        let events = vec![
            Ok(event(&schema, EventKind::New, 0, &[(Field::Loc, 5), (Field::Obj, 42)])),
            Ok(event(&schema, EventKind::AcquireLock, 9, &[(Field::Obj, 0)])),
        ];
        let result = validate_events(events);
        assert!(result.is_valid());
        assert!(!result.has_warnings());
        assert_eq!(result.events, 2);
    }

    #[test]
    fn test_crude_events_rejected() {
        let schema = schema();
        let events = vec![Ok(event(
            &schema,
            EventKind::AllocBegin,
            0,
            &[(Field::Loc, 5), (Field::Thr, 1)],
        ))];
        let result = validate_events(events);
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationError::CrudeOnlyEvent {
                kind: EventKind::AllocBegin,
                offset: 0
            }]
        ));
    }

    #[test]
    fn test_unresolved_allocation_is_a_warning() {
        let schema = schema();
        let events = vec![Ok(event(
            &schema,
            EventKind::New,
            0,
            &[(Field::Loc, 5), (Field::Obj, UNKNOWN_FIELD_VAL)],
        ))];
        let result = validate_events(events);
        assert!(result.is_valid());
        assert!(matches!(
            result.warnings.as_slice(),
            [ValidationWarning::UnresolvedAllocation { loc: 5, offset: 0 }]
        ));
    }

    #[test]
    fn test_sentinel_in_requested_field() {
        let schema = schema();
        let events = vec![Ok(event(
            &schema,
            EventKind::AcquireLock,
            0,
            &[(Field::Obj, MISSING_FIELD_VAL)],
        ))];
        let result = validate_events(events);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_decode_error_stops_validation() {
        let schema = schema();
        let events = vec![
            Ok(event(&schema, EventKind::AcquireLock, 0, &[(Field::Obj, 3)])),
            Err(TraceError::UnknownOpcode {
                opcode: 99,
                offset: 5,
            }),
        ];
        let result = validate_events(events);
        assert_eq!(result.events, 1);
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationError::Decode {
                offset: Some(5),
                ..
            }]
        ));
    }

    #[test]
    fn test_empty_trace_warning() {
        let result = validate_events(Vec::<Result<Event>>::new());
        assert!(result.is_valid());
        assert!(matches!(
            result.warnings.as_slice(),
            [ValidationWarning::EmptyTrace]
        ));
    }
}
