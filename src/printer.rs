//! Human- and machine-readable trace dumps.
//!
//! Text output prints one line per record: the kind name followed by the value
//! of every field the kind can carry, in canonical order, so lines of the same
//! kind always have the same columns. Fields the schema does not request show
//! up as `-1`. JSON output writes one object per line with only the present
//! fields.

use std::io::Write;

use crate::error::Result;
use crate::trace::Event;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Renders `event` as a single text line, without the trailing newline.
pub fn format_event(event: &Event) -> String {
    let mut line = event.kind.name().to_string();
    for field in event.kind.potential_fields().iter() {
        line.push(' ');
        line.push_str(&event.get(field).to_string());
    }
    line
}

/// Writes every event to `out`, stopping at the first decode error.
///
/// Returns the number of events written.
pub fn print_events<I, W>(events: I, out: &mut W, format: OutputFormat) -> Result<u64>
where
    I: IntoIterator<Item = Result<Event>>,
    W: Write,
{
    let mut count = 0;
    for event in events {
        let event = event?;
        match format {
            OutputFormat::Text => writeln!(out, "{}", format_event(&event))?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, &event)?;
                writeln!(out)?;
            }
        }
        count += 1;
    }
    out.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::SchemaBuilder;
    use crate::trace::{EventKind, Field};

    fn new_event() -> Event {
        let mut builder = SchemaBuilder::new();
        builder
            .enable(EventKind::New, &[Field::Loc, Field::Obj])
            .unwrap();
        let schema = builder.build();
        let mut event = Event::empty(EventKind::New, *schema.format(EventKind::New), 0);
        event.loc = 5;
        event.obj = 42;
        event
    }

    #[test]
    fn test_text_line_has_every_potential_field() {
        assert_eq!(format_event(&new_event()), "NEW 5 -1 42");
    }

    #[test]
    fn test_json_lines() {
        let mut out = Vec::new();
        let count = print_events(vec![Ok(new_event())], &mut out, OutputFormat::Json).unwrap();
        assert_eq!(count, 1);
        let line = String::from_utf8(out).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["kind"], "NEW");
        assert_eq!(value["LOC"], 5);
        assert_eq!(value["OBJ"], 42);
        assert!(value.get("THR").is_none());
    }

    #[test]
    fn test_stops_at_first_error() {
        let events = vec![
            Ok(new_event()),
            Err(crate::error::TraceError::UnknownOpcode {
                opcode: 200,
                offset: 9,
            }),
            Ok(new_event()),
        ];
        let mut out = Vec::new();
        assert!(print_events(events, &mut out, OutputFormat::Text).is_err());
        assert_eq!(String::from_utf8(out).unwrap(), "NEW 5 -1 42\n");
    }
}
