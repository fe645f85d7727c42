//! Producer side of the wire format.
//!
//! Instrumented code may run on many threads, but a trace is one ordered byte
//! sequence. [`EventEmitter`] holds a single lock around "format one record and
//! append it", so the order in the trace is whichever probe got the lock first.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use crate::codec::ByteWriter;
use crate::config::TraceConfig;
use crate::error::Result;
use crate::scheme::Schema;
use crate::trace::{EventKind, Field};

/// Values captured at a probe site. Only the fields the schema requests for
/// the emitted kind are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Probe {
    pub loc: i32,
    pub thr: i32,
    pub base_obj: i32,
    pub fld_or_idx: i32,
    pub obj: i32,
}

impl Probe {
    pub fn get(&self, field: Field) -> i32 {
        match field {
            Field::Loc => self.loc,
            Field::Thr => self.thr,
            Field::BaseObj => self.base_obj,
            Field::FldOrIdx => self.fld_or_idx,
            Field::Obj => self.obj,
        }
    }
}

pub struct EventEmitter<'a, W: Write> {
    schema: &'a Schema,
    out: Mutex<ByteWriter<W>>,
}

impl<'a, W: Write> EventEmitter<'a, W> {
    /// Output is buffered in `config.block_size` chunks.
    pub fn new(schema: &'a Schema, out: W, config: &TraceConfig) -> Self {
        Self {
            schema,
            out: Mutex::new(ByteWriter::new(out, config.block_size)),
        }
    }

    /// Appends a `kind` record. Returns false, writing nothing, if the schema
    /// does not emit `kind`.
    pub fn emit(&self, kind: EventKind, probe: &Probe) -> Result<bool> {
        let format = self.schema.format(kind);
        if !format.present() {
            return Ok(false);
        }
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.put_opcode(kind)?;
        for field in format.fields().iter() {
            out.put_i32(probe.get(field))?;
        }
        Ok(true)
    }

    /// Emitted before an allocation's initializer runs.
    pub fn alloc_begin(&self, site: i32, thr: i32) -> Result<bool> {
        let probe = Probe {
            loc: site,
            thr,
            ..Probe::default()
        };
        self.emit(EventKind::AllocBegin, &probe)
    }

    /// Emitted once the allocated object has an id.
    pub fn alloc_end(&self, site: i32, thr: i32, obj: i32) -> Result<bool> {
        let probe = Probe {
            loc: site,
            thr,
            obj,
            ..Probe::default()
        };
        self.emit(EventKind::AllocEnd, &probe)
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.out
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .written()
    }

    /// Flushes the trace and returns the underlying writer.
    pub fn finish(self) -> Result<W> {
        self.out
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::TraceReader;
    use crate::scheme::SchemaBuilder;
    use std::thread;

    fn small_blocks() -> TraceConfig {
        TraceConfig::default().with_block_size(64)
    }

    fn schema() -> Schema {
        let mut builder = SchemaBuilder::new();
        builder
            .enable(EventKind::New, &[Field::Loc, Field::Obj])
            .unwrap()
            .enable(EventKind::AcquireLock, &[Field::Thr, Field::Obj])
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_only_requested_fields_are_written() {
        let schema = schema();
        let emitter = EventEmitter::new(&schema, Vec::new(), &small_blocks());
        let probe = Probe {
            loc: 9,
            thr: 2,
            obj: 7,
            ..Probe::default()
        };
        assert!(emitter.emit(EventKind::AcquireLock, &probe).unwrap());
        assert!(!emitter.emit(EventKind::Wait, &probe).unwrap());
        assert_eq!(emitter.written(), 9);
        let bytes = emitter.finish().unwrap();
        assert_eq!(bytes, vec![30, 0, 0, 0, 2, 0, 0, 0, 7]);
    }

    #[test]
    fn test_alloc_pair_carries_full_key() {
        let schema = schema();
        let emitter = EventEmitter::new(&schema, Vec::new(), &small_blocks());
        emitter.alloc_begin(5, 1).unwrap();
        emitter.alloc_end(5, 1, 42).unwrap();
        let bytes = emitter.finish().unwrap();

        let events: Vec<_> = TraceReader::new(&schema, &bytes[..], 64)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::AllocBegin);
        assert_eq!((events[0].loc, events[0].thr), (5, 1));
        assert_eq!(events[1].kind, EventKind::AllocEnd);
        assert_eq!((events[1].loc, events[1].thr, events[1].obj), (5, 1, 42));
    }

    #[test]
    fn test_concurrent_records_do_not_interleave() {
        let schema = schema();
        let emitter = EventEmitter::new(&schema, Vec::new(), &TraceConfig::default());

        thread::scope(|s| {
            for thr in 1..=8 {
                let emitter = &emitter;
                s.spawn(move || {
                    for obj in 0..100 {
                        let probe = Probe {
                            thr,
                            obj,
                            ..Probe::default()
                        };
                        emitter.emit(EventKind::AcquireLock, &probe).unwrap();
                    }
                });
            }
        });

        let bytes = emitter.finish().unwrap();
        assert_eq!(bytes.len(), 800 * 9);
        let events: Vec<_> = TraceReader::new(&schema, &bytes[..], 4096)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(events.len(), 800);
        for thr in 1..=8 {
            let objs: Vec<_> = events
                .iter()
                .filter(|e| e.thr == thr)
                .map(|e| e.obj)
                .collect();
            assert_eq!(objs, (0..100).collect::<Vec<_>>());
        }
    }
}
