//! Schema registry: which events a trace contains and how each is laid out.
//!
//! A [`SchemaBuilder`] collects configuration calls, all of which only ever add
//! presence. [`SchemaBuilder::build`] freezes the result into a [`Schema`] that
//! the emitter, the transformer and the reader share read-only. Processes that
//! write and read the same trace must agree on the schema byte for byte, which
//! is why it is persisted with [`Schema::save`] and reloaded with
//! [`Schema::load`] rather than rebuilt independently.

pub mod config;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};
use crate::trace::{
    EventKind, Field, FieldSet, Layout, SchemaFlag, FIELD_BYTES, OPCODE_BYTES,
    SCHEMA_FILE_VERSION,
};

pub use config::SchemaConfig;

/// Layout of one event kind.
///
/// `size` is the payload length in bytes and always equals four times the
/// number of present fields. `present` is tracked separately: an enabled kind
/// may carry no fields at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EventFormat {
    present: bool,
    fields: FieldSet,
    size: usize,
}

impl EventFormat {
    pub const fn new() -> Self {
        Self {
            present: false,
            fields: FieldSet::EMPTY,
            size: 0,
        }
    }

    pub fn set_present(&mut self) {
        self.present = true;
    }

    /// Marks `field` present. Repeated calls for the same field do not grow
    /// the record.
    pub fn set_field(&mut self, field: Field) {
        if self.fields.insert(field) {
            self.size += FIELD_BYTES;
        }
    }

    /// True if records of this kind are emitted at all.
    pub fn present(&self) -> bool {
        self.present
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fields(&self) -> FieldSet {
        self.fields
    }

    pub fn has(&self, field: Field) -> bool {
        self.fields.contains(field)
    }

    pub fn has_loc(&self) -> bool {
        self.has(Field::Loc)
    }

    pub fn has_thr(&self) -> bool {
        self.has(Field::Thr)
    }

    pub fn has_base_obj(&self) -> bool {
        self.has(Field::BaseObj)
    }

    pub fn has_fld_or_idx(&self) -> bool {
        self.has(Field::FldOrIdx)
    }

    pub fn has_obj(&self) -> bool {
        self.has(Field::Obj)
    }

    /// Opcode plus payload.
    pub fn record_size(&self) -> usize {
        OPCODE_BYTES + self.size
    }
}

/// Mutable schema under construction.
#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    formats: [EventFormat; EventKind::COUNT],
    flags: SchemaFlags,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            formats: [EventFormat::new(); EventKind::COUNT],
            flags: SchemaFlags::default(),
        }
    }

    /// Builder pre-loaded from a configuration table.
    pub fn from_config(config: &SchemaConfig) -> Result<Self> {
        let mut builder = Self::new();
        builder.apply(config)?;
        Ok(builder)
    }

    /// Enables `kind` and each of `fields`.
    ///
    /// Fails if the kind is not configurable or a field is not one the kind
    /// can carry. Nothing is changed on failure.
    pub fn enable(&mut self, kind: EventKind, fields: &[Field]) -> Result<&mut Self> {
        let potential = match kind.layout() {
            Layout::Configurable(potential) => potential,
            Layout::Flagged(..) | Layout::CrudeOnly(_) => {
                return Err(TraceError::NotConfigurable { kind });
            }
        };
        if let Some(&field) = fields.iter().find(|f| !potential.contains(**f)) {
            return Err(TraceError::FieldNotAllowed { kind, field });
        }

        let format = &mut self.formats[kind.index()];
        format.set_present();
        for &field in fields {
            format.set_field(field);
        }
        Ok(self)
    }

    pub fn enable_flag(&mut self, flag: SchemaFlag) -> &mut Self {
        self.flags.set(flag);
        self
    }

    /// Caps how many times each method or loop is recorded. Zero lifts the
    /// cap. Unlike the other switches this one may lower a previous value.
    pub fn set_method_and_loop_bound(&mut self, bound: u32) -> &mut Self {
        self.flags.method_and_loop_bound = bound;
        self
    }

    pub fn enable_method_entry_exit(&mut self) -> &mut Self {
        self.enable_flag(SchemaFlag::MethodEntryExit)
    }

    pub fn enable_loop_entry_exit(&mut self) -> &mut Self {
        self.enable_flag(SchemaFlag::LoopEntryExit)
    }

    pub fn enable_basic_block(&mut self) -> &mut Self {
        self.enable_flag(SchemaFlag::BasicBlock)
    }

    pub fn enable_quad(&mut self) -> &mut Self {
        self.enable_flag(SchemaFlag::Quad)
    }

    pub fn enable_finalize(&mut self) -> &mut Self {
        self.enable_flag(SchemaFlag::Finalize)
    }

    /// Applies a `{kind -> fields}` table and the flag switches.
    pub fn apply(&mut self, config: &SchemaConfig) -> Result<&mut Self> {
        for (kind_name, field_names) in &config.events {
            let kind = EventKind::from_name(kind_name)
                .ok_or_else(|| TraceError::UnknownKind(kind_name.clone()))?;
            let fields = field_names
                .iter()
                .map(|name| {
                    Field::from_name(name).ok_or_else(|| TraceError::UnknownField(name.clone()))
                })
                .collect::<Result<Vec<_>>>()?;
            self.enable(kind, &fields)?;
        }
        for flag in SchemaFlag::ALL {
            if config.flag(flag) {
                self.enable_flag(flag);
            }
        }
        if config.method_and_loop_bound > 0 {
            self.set_method_and_loop_bound(config.method_and_loop_bound);
        }
        Ok(self)
    }

    /// Freezes the configuration.
    ///
    /// Flag-gated kinds receive their fixed layouts here, and the crude-only
    /// allocation pair is switched on when the allocation record asks for the
    /// object id.
    pub fn build(&self) -> Schema {
        let mut formats = self.formats;
        let needs_transform = formats[EventKind::New.index()].has_obj();
        for kind in EventKind::ALL {
            let fixed = match kind.layout() {
                Layout::Configurable(_) => continue,
                Layout::Flagged(flag, fields) if self.flags.get(flag) => fields,
                Layout::CrudeOnly(fields) if needs_transform => fields,
                Layout::Flagged(..) | Layout::CrudeOnly(_) => continue,
            };
            let format = &mut formats[kind.index()];
            format.set_present();
            for field in fixed.iter() {
                format.set_field(field);
            }
        }
        Schema {
            formats,
            flags: self.flags,
        }
    }
}

/// Switch state carried from the builder into the frozen schema.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
struct SchemaFlags {
    enabled: [bool; 5],
    method_and_loop_bound: u32,
}

impl SchemaFlags {
    fn get(&self, flag: SchemaFlag) -> bool {
        self.enabled[flag.index()]
    }

    fn set(&mut self, flag: SchemaFlag) {
        self.enabled[flag.index()] = true;
    }
}

/// On-disk form of a schema.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaFile {
    version: u32,
    scheme: SchemaConfig,
}

/// Frozen schema shared by every producer and consumer of a trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    formats: [EventFormat; EventKind::COUNT],
    flags: SchemaFlags,
}

impl Default for Schema {
    fn default() -> Self {
        SchemaBuilder::new().build()
    }
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn from_config(config: &SchemaConfig) -> Result<Self> {
        Ok(SchemaBuilder::from_config(config)?.build())
    }

    pub fn format(&self, kind: EventKind) -> &EventFormat {
        &self.formats[kind.index()]
    }

    /// Wire size of a `kind` record, opcode included.
    pub fn record_size(&self, kind: EventKind) -> usize {
        self.format(kind).record_size()
    }

    pub fn is_present(&self, kind: EventKind) -> bool {
        self.format(kind).present()
    }

    pub fn has_flag(&self, flag: SchemaFlag) -> bool {
        self.flags.get(flag)
    }

    /// Per-site recording cap for methods and loops, zero when unbounded.
    pub fn method_and_loop_bound(&self) -> u32 {
        self.flags.method_and_loop_bound
    }

    pub fn has_enter_and_leave_method_event(&self) -> bool {
        self.has_flag(SchemaFlag::MethodEntryExit)
    }

    pub fn has_enter_and_leave_loop_event(&self) -> bool {
        self.has_flag(SchemaFlag::LoopEntryExit)
    }

    pub fn has_basic_block_event(&self) -> bool {
        self.has_flag(SchemaFlag::BasicBlock)
    }

    pub fn has_quad_event(&self) -> bool {
        self.has_flag(SchemaFlag::Quad)
    }

    pub fn has_finalize_event(&self) -> bool {
        self.has_flag(SchemaFlag::Finalize)
    }

    fn any_present(&self, kinds: &[EventKind]) -> bool {
        kinds.iter().any(|k| self.is_present(*k))
    }

    fn any_has(&self, kinds: &[EventKind], field: Field) -> bool {
        kinds.iter().any(|k| self.format(*k).has(field))
    }

    pub fn has_getstatic_event(&self) -> bool {
        self.any_present(&[EventKind::GetstaticPrimitive, EventKind::GetstaticReference])
    }

    pub fn has_putstatic_event(&self) -> bool {
        self.any_present(&[EventKind::PutstaticPrimitive, EventKind::PutstaticReference])
    }

    pub fn has_getfield_event(&self) -> bool {
        self.any_present(&[EventKind::GetfieldPrimitive, EventKind::GetfieldReference])
    }

    pub fn has_putfield_event(&self) -> bool {
        self.any_present(&[EventKind::PutfieldPrimitive, EventKind::PutfieldReference])
    }

    pub fn has_aload_event(&self) -> bool {
        self.any_present(&[EventKind::AloadPrimitive, EventKind::AloadReference])
    }

    pub fn has_astore_event(&self) -> bool {
        self.any_present(&[EventKind::AstorePrimitive, EventKind::AstoreReference])
    }

    pub fn has_static_event(&self) -> bool {
        self.has_getstatic_event() || self.has_putstatic_event()
    }

    pub fn has_field_event(&self) -> bool {
        self.has_getfield_event() || self.has_putfield_event()
    }

    pub fn has_array_event(&self) -> bool {
        self.has_aload_event() || self.has_astore_event()
    }

    // The needs_*_map predicates tell the index-map builders which
    // id <-> program-entity maps the instrumentor must produce.

    /// Method ids are also needed to count bounded method and loop sites.
    pub fn needs_method_map(&self) -> bool {
        self.has_enter_and_leave_method_event()
            || self.has_enter_and_leave_loop_event()
            || self.method_and_loop_bound() > 0
    }

    pub fn needs_loop_map(&self) -> bool {
        self.has_enter_and_leave_loop_event()
    }

    pub fn needs_alloc_site_map(&self) -> bool {
        let format = self.format(EventKind::New);
        let array = self.format(EventKind::NewArray);
        format.has_loc() || format.has_obj() || array.has_loc() || array.has_obj()
    }

    pub fn needs_access_site_map(&self) -> bool {
        self.any_has(&ACCESS_KINDS, Field::Loc)
    }

    pub fn needs_field_map(&self) -> bool {
        self.any_has(&ACCESS_KINDS[..8], Field::FldOrIdx)
    }

    pub fn needs_invoke_site_map(&self) -> bool {
        self.any_has(
            &[
                EventKind::MethodCallBefore,
                EventKind::MethodCallAfter,
                EventKind::ThreadStart,
                EventKind::ThreadJoin,
                EventKind::Wait,
                EventKind::Notify,
                EventKind::NotifyAll,
            ],
            Field::Loc,
        )
    }

    pub fn needs_quad_map(&self) -> bool {
        self.has_quad_event()
            || self.any_has(
                &[
                    EventKind::ReturnPrimitive,
                    EventKind::ReturnReference,
                    EventKind::ExplicitThrow,
                ],
                Field::Loc,
            )
    }

    pub fn needs_acquire_map(&self) -> bool {
        self.format(EventKind::AcquireLock).has_loc()
    }

    pub fn needs_release_map(&self) -> bool {
        self.format(EventKind::ReleaseLock).has_loc()
    }

    pub fn needs_basic_block_map(&self) -> bool {
        self.has_basic_block_event()
    }

    /// True if crude traces carry allocation begin/end pairs that must be
    /// merged before the trace can be consumed.
    pub fn needs_transform(&self) -> bool {
        self.format(EventKind::New).has_obj()
    }

    /// The configuration table this schema was built from.
    pub fn to_config(&self) -> SchemaConfig {
        let mut config = SchemaConfig {
            method_and_loop_bound: self.flags.method_and_loop_bound,
            ..SchemaConfig::default()
        };
        for flag in SchemaFlag::ALL {
            if self.flags.get(flag) {
                config.set_flag(flag);
            }
        }
        config.events = EventKind::ALL
            .into_iter()
            .filter(|k| matches!(k.layout(), Layout::Configurable(_)) && self.is_present(*k))
            .map(|k| {
                let fields = self
                    .format(k)
                    .fields()
                    .iter()
                    .map(|f| f.name().to_string())
                    .collect();
                (k.name().to_string(), fields)
            })
            .collect();
        config
    }

    pub fn to_json(&self) -> Result<String> {
        let file = SchemaFile {
            version: SCHEMA_FILE_VERSION,
            scheme: self.to_config(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Parses a persisted schema. Layouts are re-derived through the builder,
    /// never read from the file.
    pub fn from_json(buf: &str) -> Result<Self> {
        let file: SchemaFile = serde_json::from_str(buf)?;
        if file.version != SCHEMA_FILE_VERSION {
            return Err(TraceError::SchemaVersion {
                found: file.version,
                expected: SCHEMA_FILE_VERSION,
            });
        }
        Self::from_config(&file.scheme)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let buf = fs::read_to_string(path)?;
        Self::from_json(&buf)
    }
}

// Static and instance field accesses first, then array accesses.
const ACCESS_KINDS: [EventKind; 12] = [
    EventKind::GetstaticPrimitive,
    EventKind::GetstaticReference,
    EventKind::PutstaticPrimitive,
    EventKind::PutstaticReference,
    EventKind::GetfieldPrimitive,
    EventKind::GetfieldReference,
    EventKind::PutfieldPrimitive,
    EventKind::PutfieldReference,
    EventKind::AloadPrimitive,
    EventKind::AloadReference,
    EventKind::AstorePrimitive,
    EventKind::AstoreReference,
];
