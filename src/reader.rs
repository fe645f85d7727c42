//! Schema-driven trace decoding.
//!
//! [`TraceReader`] turns the raw bytes of a crude or final trace back into
//! [`Event`]s. It is lazy and forward-only; after the first error it yields
//! nothing further.

use std::fs::File;
use std::io::Read;
use std::iter::FusedIterator;
use std::path::Path;

use crate::codec::ByteReader;
use crate::config::TraceConfig;
use crate::error::Result;
use crate::scheme::Schema;
use crate::trace::Event;

pub struct TraceReader<'a, R> {
    schema: &'a Schema,
    input: ByteReader<R>,
    done: bool,
}

impl<'a, R: Read> TraceReader<'a, R> {
    pub fn new(schema: &'a Schema, input: R, block_size: usize) -> Self {
        Self {
            schema,
            input: ByteReader::new(input, block_size),
            done: false,
        }
    }

    /// Offset of the next record to be decoded.
    pub fn offset(&self) -> u64 {
        self.input.offset()
    }

    fn read_event(&mut self) -> Result<Option<Event>> {
        let Some((kind, start)) = self.input.read_kind(self.schema)? else {
            return Ok(None);
        };
        let format = *self.schema.format(kind);
        let mut event = Event::empty(kind, format, start);
        for field in format.fields().iter() {
            event.set(field, self.input.read_i32(kind, start)?);
        }
        Ok(Some(event))
    }
}

impl<'a> TraceReader<'a, File> {
    pub fn open(schema: &'a Schema, path: &Path, block_size: usize) -> Result<Self> {
        Ok(Self::new(schema, File::open(path)?, block_size))
    }
}

impl<R: Read> Iterator for TraceReader<'_, R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> FusedIterator for TraceReader<'_, R> {}

/// Opens the trace at `path` for decoding under `schema`.
pub fn decode<'a>(schema: &'a Schema, path: &Path) -> Result<TraceReader<'a, File>> {
    decode_with_config(schema, path, &TraceConfig::default())
}

/// Like [`decode`], reading `config.block_size` bytes at a time.
pub fn decode_with_config<'a>(
    schema: &'a Schema,
    path: &Path,
    config: &TraceConfig,
) -> Result<TraceReader<'a, File>> {
    TraceReader::open(schema, path, config.block_size)
}
