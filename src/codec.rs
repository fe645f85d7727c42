//! Byte-level trace codec.
//!
//! A record is one opcode byte followed by one big-endian `i32` per field the
//! schema marks present for that kind, in canonical field order. There is no
//! header, length prefix or checksum, so the reader relies entirely on the
//! schema to know where a record ends.

use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};

use crate::error::{Result, TraceError};
use crate::scheme::Schema;
use crate::trace::{EventKind, FIELD_BYTES};

/// Largest payload any record can carry.
pub const MAX_PAYLOAD: usize = 5 * FIELD_BYTES;

/// Sequential reader that tracks the absolute byte offset.
pub struct ByteReader<R> {
    inner: BufReader<R>,
    offset: u64,
}

impl<R: Read> ByteReader<R> {
    pub fn new(inner: R, block_size: usize) -> Self {
        Self {
            inner: BufReader::with_capacity(block_size.max(1), inner),
            offset: 0,
        }
    }

    /// Offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads one opcode byte, returning `None` at a clean end of stream.
    pub fn read_opcode(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.offset += 1;
                    return Ok(Some(byte[0]));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reads the next opcode and resolves it against `schema`.
    ///
    /// Returns the kind together with the offset of its opcode byte. Opcodes
    /// outside the known set, and known kinds the schema never emits, are
    /// malformed-stream errors.
    pub fn read_kind(&mut self, schema: &Schema) -> Result<Option<(EventKind, u64)>> {
        let start = self.offset;
        let Some(opcode) = self.read_opcode()? else {
            return Ok(None);
        };
        let kind = EventKind::from_opcode(opcode).ok_or(TraceError::UnknownOpcode {
            opcode,
            offset: start,
        })?;
        if !schema.is_present(kind) {
            return Err(TraceError::EventNotEnabled {
                kind,
                offset: start,
            });
        }
        Ok(Some((kind, start)))
    }

    /// Fills `buf` from the payload of the `kind` record starting at `start`.
    pub fn read_payload(&mut self, kind: EventKind, start: u64, buf: &mut [u8]) -> Result<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(TraceError::Truncated {
                kind,
                offset: start,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_i32(&mut self, kind: EventKind, start: u64) -> Result<i32> {
        let mut buf = [0u8; FIELD_BYTES];
        self.read_payload(kind, start, &mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }
}

/// Sequential block-buffered writer.
pub struct ByteWriter<W: Write> {
    inner: BufWriter<W>,
    written: u64,
}

impl<W: Write> ByteWriter<W> {
    pub fn new(inner: W, block_size: usize) -> Self {
        Self {
            inner: BufWriter::with_capacity(block_size.max(1), inner),
            written: 0,
        }
    }

    /// Total bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn put_opcode(&mut self, kind: EventKind) -> Result<()> {
        self.put_bytes(&[kind.opcode()])
    }

    pub fn put_i32(&mut self, value: i32) -> Result<()> {
        self.put_bytes(&value.to_be_bytes())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Flushes buffered bytes and hands back the underlying writer.
    pub fn finish(self) -> Result<W> {
        self.inner.into_inner().map_err(|e| e.into_error().into())
    }
}

/// Appends `value` to an in-memory buffer in wire encoding.
pub fn push_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Overwrites the field stored at `pos` in an in-memory buffer.
pub fn patch_i32(buf: &mut [u8], pos: usize, value: i32) {
    buf[pos..pos + FIELD_BYTES].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::SchemaBuilder;
    use crate::trace::Field;

    fn schema() -> Schema {
        let mut builder = SchemaBuilder::new();
        builder
            .enable(EventKind::AcquireLock, &[Field::Thr, Field::Obj])
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_fields_are_big_endian() {
        let mut writer = ByteWriter::new(Vec::new(), 16);
        writer.put_opcode(EventKind::AcquireLock).unwrap();
        writer.put_i32(1).unwrap();
        writer.put_i32(-2).unwrap();
        assert_eq!(writer.written(), 9);
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes, vec![30, 0, 0, 0, 1, 0xff, 0xff, 0xff, 0xfe]);
    }

    #[test]
    fn test_read_kind_and_fields() {
        let bytes = [30u8, 0, 0, 0, 7, 0, 0, 1, 0];
        let schema = schema();
        let mut reader = ByteReader::new(&bytes[..], 4);
        let (kind, start) = reader.read_kind(&schema).unwrap().unwrap();
        assert_eq!(kind, EventKind::AcquireLock);
        assert_eq!(start, 0);
        assert_eq!(reader.read_i32(kind, start).unwrap(), 7);
        assert_eq!(reader.read_i32(kind, start).unwrap(), 256);
        assert_eq!(reader.offset(), 9);
        assert!(reader.read_kind(&schema).unwrap().is_none());
    }

    #[test]
    fn test_truncated_payload_reports_record_start() {
        let bytes = [30u8, 0, 0, 0, 7, 30, 0, 0];
        let schema = schema();
        let mut reader = ByteReader::new(&bytes[..], 4096);
        let (kind, start) = reader.read_kind(&schema).unwrap().unwrap();
        reader.read_i32(kind, start).unwrap();
        let (kind, start) = reader.read_kind(&schema).unwrap().unwrap();
        assert_eq!(start, 5);
        let err = reader.read_i32(kind, start).unwrap_err();
        assert!(matches!(err, TraceError::Truncated { offset: 5, .. }));
    }

    #[test]
    fn test_unknown_and_disabled_opcodes() {
        let schema = schema();
        let mut reader = ByteReader::new(&[200u8][..], 4096);
        assert!(matches!(
            reader.read_kind(&schema),
            Err(TraceError::UnknownOpcode {
                opcode: 200,
                offset: 0
            })
        ));

        let wait = [EventKind::Wait.opcode()];
        let mut reader = ByteReader::new(&wait[..], 4096);
        assert!(matches!(
            reader.read_kind(&schema),
            Err(TraceError::EventNotEnabled {
                kind: EventKind::Wait,
                ..
            })
        ));
    }

    #[test]
    fn test_patch_in_place() {
        let mut buf = Vec::new();
        push_i32(&mut buf, 5);
        push_i32(&mut buf, -2);
        patch_i32(&mut buf, 4, 42);
        assert_eq!(buf, vec![0, 0, 0, 5, 0, 0, 0, 42]);
    }
}
