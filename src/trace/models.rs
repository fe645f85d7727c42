//! Decoded trace records.
//!
//! An [`Event`] always has a slot for every field. Slots the schema does not
//! request hold [`MISSING_FIELD_VAL`], so consumers can ask the `has_*`
//! predicates instead of special-casing formats.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::scheme::EventFormat;
use crate::trace::constants::{MISSING_FIELD_VAL, UNKNOWN_FIELD_VAL};
use crate::trace::kind::{EventKind, Field};

/// One decoded record.
///
/// # Fields
/// - `kind`: opcode of the record
/// - `format`: the schema layout the record was decoded with
/// - `loc`: program point id
/// - `thr`: thread id
/// - `base_obj`: receiver object id for field and array accesses
/// - `fld_or_idx`: field id or array index
/// - `obj`: object id
/// - `offset`: byte offset of the opcode in the trace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub format: EventFormat,
    pub loc: i32,
    pub thr: i32,
    pub base_obj: i32,
    pub fld_or_idx: i32,
    pub obj: i32,
    pub offset: u64,
}

impl Event {
    /// An event of `kind` with every slot set to [`MISSING_FIELD_VAL`].
    pub fn empty(kind: EventKind, format: EventFormat, offset: u64) -> Self {
        Self {
            kind,
            format,
            loc: MISSING_FIELD_VAL,
            thr: MISSING_FIELD_VAL,
            base_obj: MISSING_FIELD_VAL,
            fld_or_idx: MISSING_FIELD_VAL,
            obj: MISSING_FIELD_VAL,
            offset,
        }
    }

    pub fn get(&self, field: Field) -> i32 {
        match field {
            Field::Loc => self.loc,
            Field::Thr => self.thr,
            Field::BaseObj => self.base_obj,
            Field::FldOrIdx => self.fld_or_idx,
            Field::Obj => self.obj,
        }
    }

    pub fn set(&mut self, field: Field, value: i32) {
        match field {
            Field::Loc => self.loc = value,
            Field::Thr => self.thr = value,
            Field::BaseObj => self.base_obj = value,
            Field::FldOrIdx => self.fld_or_idx = value,
            Field::Obj => self.obj = value,
        }
    }

    pub fn has_loc(&self) -> bool {
        self.format.has(Field::Loc)
    }

    pub fn has_thr(&self) -> bool {
        self.format.has(Field::Thr)
    }

    pub fn has_base_obj(&self) -> bool {
        self.format.has(Field::BaseObj)
    }

    pub fn has_fld_or_idx(&self) -> bool {
        self.format.has(Field::FldOrIdx)
    }

    pub fn has_obj(&self) -> bool {
        self.format.has(Field::Obj)
    }

    /// True if the object id was requested but never resolved, which happens
    /// when the transformer had to evict the allocation.
    pub fn is_unresolved(&self) -> bool {
        self.has_obj() && self.obj == UNKNOWN_FIELD_VAL
    }

    /// Field values in wire order, skipping absent fields.
    pub fn values(&self) -> impl Iterator<Item = (Field, i32)> + '_ {
        self.format.fields().iter().map(move |f| (f, self.get(f)))
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("kind", self.kind.name())?;
        map.serialize_entry("offset", &self.offset)?;
        for (field, value) in self.values() {
            map.serialize_entry(&field, &value)?;
        }
        map.end()
    }
}
