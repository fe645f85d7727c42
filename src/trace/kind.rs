//! Event kinds and the fields they can carry.
//!
//! Every record on the wire starts with the opcode of an [`EventKind`]. Which of
//! the kind's potential fields follow is decided by the schema, except for the
//! flag-gated kinds (fixed fields, switched on as a group) and the allocation
//! begin/end pair, which only ever appear in crude traces and always carry their
//! full key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A field an event may carry. Declaration order is the canonical wire order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Field {
    /// Program point (allocation site, access site, method, invoke site, ...).
    Loc,
    /// Interned id of the executing thread.
    Thr,
    /// Interned id of the object whose field or element is accessed.
    BaseObj,
    /// Field id, or element index for array accesses.
    FldOrIdx,
    /// Interned id of the object the event is about.
    Obj,
}

impl Field {
    /// All fields in canonical wire order.
    pub const CANONICAL: [Field; 5] = [
        Field::Loc,
        Field::Thr,
        Field::BaseObj,
        Field::FldOrIdx,
        Field::Obj,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Loc => "LOC",
            Field::Thr => "THR",
            Field::BaseObj => "BASE_OBJ",
            Field::FldOrIdx => "FLD_OR_IDX",
            Field::Obj => "OBJ",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::CANONICAL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A small set of [`Field`]s. Iteration always yields canonical order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldSet(u8);

impl FieldSet {
    pub const EMPTY: FieldSet = FieldSet(0);

    pub const fn of(fields: &[Field]) -> FieldSet {
        let mut bits = 0;
        let mut i = 0;
        while i < fields.len() {
            bits |= fields[i].bit();
            i += 1;
        }
        FieldSet(bits)
    }

    pub fn contains(self, field: Field) -> bool {
        self.0 & field.bit() != 0
    }

    /// Adds `field`, returning true if it was not already present.
    pub fn insert(&mut self, field: Field) -> bool {
        let added = !self.contains(field);
        self.0 |= field.bit();
        added
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_subset(self, other: FieldSet) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Field> {
        Field::CANONICAL
            .into_iter()
            .filter(move |f| self.contains(*f))
    }
}

impl FromIterator<Field> for FieldSet {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        let mut set = FieldSet::EMPTY;
        for field in iter {
            set.insert(field);
        }
        set
    }
}

/// Cross-cutting schema switches for the kinds without optional fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SchemaFlag {
    MethodEntryExit,
    LoopEntryExit,
    BasicBlock,
    Quad,
    Finalize,
}

impl SchemaFlag {
    pub const ALL: [SchemaFlag; 5] = [
        SchemaFlag::MethodEntryExit,
        SchemaFlag::LoopEntryExit,
        SchemaFlag::BasicBlock,
        SchemaFlag::Quad,
        SchemaFlag::Finalize,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// How the wire layout of a kind is decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// The schema enables any subset of these potential fields.
    Configurable(FieldSet),
    /// All fields present whenever the flag is on.
    Flagged(SchemaFlag, FieldSet),
    /// Allocation begin/end: full key, present only when the trace needs the
    /// reorder transform.
    CrudeOnly(FieldSet),
}

const LOC_THR: FieldSet = FieldSet::of(&[Field::Loc, Field::Thr]);
const LOC_THR_OBJ: FieldSet = FieldSet::of(&[Field::Loc, Field::Thr, Field::Obj]);
const PRIMITIVE_ACCESS: FieldSet =
    FieldSet::of(&[Field::Loc, Field::Thr, Field::BaseObj, Field::FldOrIdx]);
const REFERENCE_ACCESS: FieldSet = FieldSet::of(&[
    Field::Loc,
    Field::Thr,
    Field::BaseObj,
    Field::FldOrIdx,
    Field::Obj,
]);

/// The kind of an event generated during the instrumented program's execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum EventKind {
    EnterMethod = 0,
    LeaveMethod = 1,
    EnterLoop = 2,
    LeaveLoop = 3,
    AllocBegin = 4,
    AllocEnd = 5,
    New = 6,
    NewArray = 7,
    GetstaticPrimitive = 8,
    GetstaticReference = 9,
    PutstaticPrimitive = 10,
    PutstaticReference = 11,
    GetfieldPrimitive = 12,
    GetfieldReference = 13,
    PutfieldPrimitive = 14,
    PutfieldReference = 15,
    AloadPrimitive = 16,
    AloadReference = 17,
    AstorePrimitive = 18,
    AstoreReference = 19,
    MethodCallBefore = 20,
    MethodCallAfter = 21,
    ReturnPrimitive = 22,
    ReturnReference = 23,
    ExplicitThrow = 24,
    ImplicitThrow = 25,
    Quad = 26,
    BasicBlock = 27,
    ThreadStart = 28,
    ThreadJoin = 29,
    AcquireLock = 30,
    ReleaseLock = 31,
    Wait = 32,
    Notify = 33,
    NotifyAll = 34,
    Finalize = 35,
}

impl EventKind {
    /// Every kind, indexed by opcode.
    pub const ALL: [EventKind; 36] = [
        EventKind::EnterMethod,
        EventKind::LeaveMethod,
        EventKind::EnterLoop,
        EventKind::LeaveLoop,
        EventKind::AllocBegin,
        EventKind::AllocEnd,
        EventKind::New,
        EventKind::NewArray,
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
        EventKind::MethodCallBefore,
        EventKind::MethodCallAfter,
        EventKind::ReturnPrimitive,
        EventKind::ReturnReference,
        EventKind::ExplicitThrow,
        EventKind::ImplicitThrow,
        EventKind::Quad,
        EventKind::BasicBlock,
        EventKind::ThreadStart,
        EventKind::ThreadJoin,
        EventKind::AcquireLock,
        EventKind::ReleaseLock,
        EventKind::Wait,
        EventKind::Notify,
        EventKind::NotifyAll,
        EventKind::Finalize,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn opcode(self) -> u8 {
        self as u8
    }

    pub fn from_opcode(opcode: u8) -> Option<EventKind> {
        Self::ALL.get(opcode as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::EnterMethod => "ENTER_METHOD",
            EventKind::LeaveMethod => "LEAVE_METHOD",
            EventKind::EnterLoop => "ENTER_LOOP",
            EventKind::LeaveLoop => "LEAVE_LOOP",
            EventKind::AllocBegin => "ALLOC_BEGIN",
            EventKind::AllocEnd => "ALLOC_END",
            EventKind::New => "NEW",
            EventKind::NewArray => "NEW_ARRAY",
            EventKind::GetstaticPrimitive => "GETSTATIC_PRIMITIVE",
            EventKind::GetstaticReference => "GETSTATIC_REFERENCE",
            EventKind::PutstaticPrimitive => "PUTSTATIC_PRIMITIVE",
            EventKind::PutstaticReference => "PUTSTATIC_REFERENCE",
            EventKind::GetfieldPrimitive => "GETFIELD_PRIMITIVE",
            EventKind::GetfieldReference => "GETFIELD_REFERENCE",
            EventKind::PutfieldPrimitive => "PUTFIELD_PRIMITIVE",
            EventKind::PutfieldReference => "PUTFIELD_REFERENCE",
            EventKind::AloadPrimitive => "ALOAD_PRIMITIVE",
            EventKind::AloadReference => "ALOAD_REFERENCE",
            EventKind::AstorePrimitive => "ASTORE_PRIMITIVE",
            EventKind::AstoreReference => "ASTORE_REFERENCE",
            EventKind::MethodCallBefore => "METHOD_CALL_BEFORE",
            EventKind::MethodCallAfter => "METHOD_CALL_AFTER",
            EventKind::ReturnPrimitive => "RETURN_PRIMITIVE",
            EventKind::ReturnReference => "RETURN_REFERENCE",
            EventKind::ExplicitThrow => "EXPLICIT_THROW",
            EventKind::ImplicitThrow => "IMPLICIT_THROW",
            EventKind::Quad => "QUAD",
            EventKind::BasicBlock => "BASIC_BLOCK",
            EventKind::ThreadStart => "THREAD_START",
            EventKind::ThreadJoin => "THREAD_JOIN",
            EventKind::AcquireLock => "ACQUIRE_LOCK",
            EventKind::ReleaseLock => "RELEASE_LOCK",
            EventKind::Wait => "WAIT",
            EventKind::Notify => "NOTIFY",
            EventKind::NotifyAll => "NOTIFY_ALL",
            EventKind::Finalize => "FINALIZE",
        }
    }

    pub fn from_name(name: &str) -> Option<EventKind> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }

    pub fn layout(self) -> Layout {
        use EventKind::*;
        match self {
            EnterMethod | LeaveMethod => Layout::Flagged(SchemaFlag::MethodEntryExit, LOC_THR),
            EnterLoop | LeaveLoop => Layout::Flagged(SchemaFlag::LoopEntryExit, LOC_THR),
            Quad => Layout::Flagged(SchemaFlag::Quad, LOC_THR),
            BasicBlock => Layout::Flagged(SchemaFlag::BasicBlock, LOC_THR),
            Finalize => Layout::Flagged(SchemaFlag::Finalize, FieldSet::of(&[Field::Obj])),
            AllocBegin => Layout::CrudeOnly(LOC_THR),
            AllocEnd => Layout::CrudeOnly(LOC_THR_OBJ),
            GetstaticPrimitive | PutstaticPrimitive | GetfieldPrimitive | PutfieldPrimitive
            | AloadPrimitive | AstorePrimitive => Layout::Configurable(PRIMITIVE_ACCESS),
            GetstaticReference | PutstaticReference | GetfieldReference | PutfieldReference
            | AloadReference | AstoreReference => Layout::Configurable(REFERENCE_ACCESS),
            ReturnPrimitive => Layout::Configurable(LOC_THR),
            ImplicitThrow => Layout::Configurable(FieldSet::of(&[Field::Thr, Field::Obj])),
            New | NewArray | MethodCallBefore | MethodCallAfter | ReturnReference
            | ExplicitThrow | ThreadStart | ThreadJoin | AcquireLock | ReleaseLock | Wait
            | Notify | NotifyAll => Layout::Configurable(LOC_THR_OBJ),
        }
    }

    /// Fields this kind can carry on the wire.
    pub fn potential_fields(self) -> FieldSet {
        match self.layout() {
            Layout::Configurable(fields)
            | Layout::Flagged(_, fields)
            | Layout::CrudeOnly(fields) => fields,
        }
    }

    pub fn is_crude_only(self) -> bool {
        matches!(self.layout(), Layout::CrudeOnly(_))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
