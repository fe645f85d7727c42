//! Reorder transformer: crude trace in, final trace out.
//!
//! The runtime cannot know an allocated object's id until its initializer has
//! returned, so crude traces report every allocation as an `ALLOC_BEGIN`
//! (site, thread) followed later by an `ALLOC_END` (site, thread, object), with
//! arbitrary records from any thread in between. Consumers want a single `NEW`
//! record at the position of the begin event.
//!
//! The transformer writes that `NEW` record into a staging buffer as soon as the
//! begin event is seen, with a placeholder where the object id goes, and stages
//! everything after it until the placeholder can be patched. Bytes in front of
//! the oldest unresolved placeholder can never change again and are flushed as
//! soon as that allocation resolves.
//!
//! # Bounded memory
//!
//! When the staging buffer grows beyond [`TraceConfig::staging_limit`] the
//! oldest pending allocation is evicted: its placeholder keeps the
//! [`UNKNOWN_FIELD_VAL`] sentinel and the buffer is flushed up to the next
//! pending allocation. This covers allocations whose end event is never
//! produced, e.g. when the initializer throws.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::codec::{patch_i32, push_i32, ByteReader, ByteWriter, MAX_PAYLOAD};
use crate::config::TraceConfig;
use crate::error::{Result, TraceError};
use crate::scheme::Schema;
use crate::trace::{EventKind, UNKNOWN_FIELD_VAL};

/// An allocation whose end event has not been seen yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingAlloc {
    site: i32,
    thread: i32,
    /// Offset of the object-id placeholder in the staging buffer.
    position: usize,
}

/// Counters describing one transform pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransformStats {
    /// Records read from the crude trace.
    pub records_in: u64,
    /// Records written to the final trace.
    pub records_out: u64,
    /// Allocation begin events merged into `NEW` records.
    pub allocations: u64,
    /// Allocations evicted before their end event arrived.
    pub evictions: u64,
    /// End events that matched no pending allocation.
    pub unmatched_ends: u64,
    /// High-water mark of the staging buffer.
    pub max_staged_bytes: usize,
}

pub struct TraceTransformer<'a> {
    schema: &'a Schema,
    config: TraceConfig,
    staging: Vec<u8>,
    pending: VecDeque<PendingAlloc>,
    in_flight: bool,
    stats: TransformStats,
}

impl<'a> TraceTransformer<'a> {
    /// Fails with [`TraceError::TransformNotNeeded`] if `schema` never
    /// produces allocation begin/end pairs.
    pub fn new(schema: &'a Schema, config: &TraceConfig) -> Result<Self> {
        if !schema.needs_transform() {
            return Err(TraceError::TransformNotNeeded);
        }
        Ok(Self {
            schema,
            config: config.clone(),
            staging: Vec::new(),
            pending: VecDeque::new(),
            in_flight: false,
            stats: TransformStats::default(),
        })
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn staged_len(&self) -> usize {
        self.staging.len()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn stats(&self) -> &TransformStats {
        &self.stats
    }

    /// Transforms the whole of `input` into `output`.
    ///
    /// The output is flushed before returning. On error it holds an arbitrary
    /// prefix of the final trace and must be discarded.
    pub fn run<R: Read, W: Write>(&mut self, input: R, output: W) -> Result<TransformStats> {
        let mut reader = ByteReader::new(input, self.config.block_size);
        let mut writer = ByteWriter::new(output, self.config.block_size);
        let mut payload = [0u8; MAX_PAYLOAD];

        while let Some((kind, start)) = reader.read_kind(self.schema)? {
            self.stats.records_in += 1;
            if self.in_flight && self.staging.len() > self.config.staging_limit {
                self.evict(&mut writer)?;
            }

            match kind {
                EventKind::AllocBegin => {
                    let site = reader.read_i32(kind, start)?;
                    let thread = reader.read_i32(kind, start)?;
                    self.begin(site, thread);
                }
                EventKind::AllocEnd => {
                    let site = reader.read_i32(kind, start)?;
                    let thread = reader.read_i32(kind, start)?;
                    let obj = reader.read_i32(kind, start)?;
                    self.end(site, thread, obj, &mut writer)?;
                }
                _ => {
                    let payload = &mut payload[..self.schema.format(kind).size()];
                    reader.read_payload(kind, start, payload)?;
                    self.stats.records_out += 1;
                    if self.in_flight {
                        self.staging.push(kind.opcode());
                        self.staging.extend_from_slice(payload);
                        self.note_staged();
                    } else {
                        writer.put_opcode(kind)?;
                        writer.put_bytes(payload)?;
                    }
                }
            }
        }

        if self.in_flight || !self.pending.is_empty() || !self.staging.is_empty() {
            return Err(TraceError::UnterminatedAllocation {
                pending: self.pending.len(),
                staged: self.staging.len(),
            });
        }
        writer.finish()?;

        info!(
            records_in = self.stats.records_in,
            records_out = self.stats.records_out,
            allocations = self.stats.allocations,
            evictions = self.stats.evictions,
            unmatched_ends = self.stats.unmatched_ends,
            max_staged_bytes = self.stats.max_staged_bytes,
            "Transform complete"
        );
        Ok(self.stats)
    }

    fn begin(&mut self, site: i32, thread: i32) {
        let format = self.schema.format(EventKind::New);
        self.staging.push(EventKind::New.opcode());
        if format.has_loc() {
            push_i32(&mut self.staging, site);
        }
        if format.has_thr() {
            push_i32(&mut self.staging, thread);
        }
        // Obj is last in canonical order for NEW records.
        let position = self.staging.len();
        push_i32(&mut self.staging, UNKNOWN_FIELD_VAL);

        self.pending.push_back(PendingAlloc {
            site,
            thread,
            position,
        });
        self.in_flight = true;
        self.stats.allocations += 1;
        self.stats.records_out += 1;
        self.note_staged();
    }

    fn end<W: Write>(
        &mut self,
        site: i32,
        thread: i32,
        obj: i32,
        writer: &mut ByteWriter<W>,
    ) -> Result<()> {
        let Some(index) = self
            .pending
            .iter()
            .position(|p| p.site == site && p.thread == thread)
        else {
            self.stats.unmatched_ends += 1;
            debug!(site, thread, obj, "Allocation end without pending begin");
            return Ok(());
        };

        if let Some(alloc) = self.pending.remove(index) {
            patch_i32(&mut self.staging, alloc.position, obj);
        }
        if index == 0 {
            self.flush(writer)?;
        }
        Ok(())
    }

    fn evict<W: Write>(&mut self, writer: &mut ByteWriter<W>) -> Result<()> {
        let Some(alloc) = self.pending.pop_front() else {
            return Ok(());
        };
        self.stats.evictions += 1;
        warn!(
            site = alloc.site,
            thread = alloc.thread,
            staged = self.staging.len(),
            limit = self.config.staging_limit,
            "Evicting unresolved allocation"
        );
        self.flush(writer)
    }

    /// Writes out every staged byte in front of the oldest pending allocation.
    fn flush<W: Write>(&mut self, writer: &mut ByteWriter<W>) -> Result<()> {
        let Some(head) = self.pending.front() else {
            writer.put_bytes(&self.staging)?;
            self.staging.clear();
            self.in_flight = false;
            return Ok(());
        };

        // Pending entries are appended in staging order and never reordered.
        debug_assert!(self.pending.iter().all(|p| p.position >= head.position));

        let len = head.position;
        writer.put_bytes(&self.staging[..len])?;
        self.staging.drain(..len);
        for alloc in self.pending.iter_mut() {
            alloc.position -= len;
        }
        Ok(())
    }

    fn note_staged(&mut self) {
        self.stats.max_staged_bytes = self.stats.max_staged_bytes.max(self.staging.len());
    }
}

/// Transforms an in-memory or already-open crude trace.
pub fn transform_stream<R: Read, W: Write>(
    schema: &Schema,
    input: R,
    output: W,
    config: &TraceConfig,
) -> Result<TransformStats> {
    TraceTransformer::new(schema, config)?.run(input, output)
}

/// Transforms the crude trace at `crude` into a final trace at `fin`.
pub fn transform(
    schema: &Schema,
    crude: &Path,
    fin: &Path,
    config: &TraceConfig,
) -> Result<TransformStats> {
    let mut transformer = TraceTransformer::new(schema, config)?;
    let input = File::open(crude)?;
    let output = File::create(fin)?;
    transformer.run(input, output)
}
