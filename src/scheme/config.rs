//! Data-driven schema configuration.
//!
//! A schema is described by one table mapping event kinds to the optional
//! fields they should carry, plus the switches for the kinds that have no
//! optional fields. The same shape is used for hand-written configuration files
//! and for persisted schemas.
//!
//! ```json
//! {
//!   "method_entry_exit": true,
//!   "events": {
//!     "NEW": ["LOC", "OBJ"],
//!     "GETFIELD_PRIMITIVE": ["LOC", "BASE_OBJ", "FLD_OR_IDX"],
//!     "ACQUIRE_LOCK": []
//!   }
//! }
//! ```
//!
//! Listing a kind with no fields still enables it: its records consist of the
//! opcode alone.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::trace::SchemaFlag;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    #[serde(default)]
    pub method_entry_exit: bool,
    #[serde(default)]
    pub loop_entry_exit: bool,
    #[serde(default)]
    pub basic_block: bool,
    #[serde(default)]
    pub quad: bool,
    #[serde(default)]
    pub finalize: bool,
    /// Number of method and loop iterations to record before a site goes
    /// quiet. Zero means unbounded.
    #[serde(default)]
    pub method_and_loop_bound: u32,
    /// Event kind name -> names of the fields to enable.
    #[serde(default)]
    pub events: BTreeMap<String, Vec<String>>,
}

impl SchemaConfig {
    pub fn from_json(buf: &str) -> Result<Self> {
        Ok(serde_json::from_str(buf)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let buf = fs::read_to_string(path)?;
        Self::from_json(&buf)
    }

    pub fn flag(&self, flag: SchemaFlag) -> bool {
        match flag {
            SchemaFlag::MethodEntryExit => self.method_entry_exit,
            SchemaFlag::LoopEntryExit => self.loop_entry_exit,
            SchemaFlag::BasicBlock => self.basic_block,
            SchemaFlag::Quad => self.quad,
            SchemaFlag::Finalize => self.finalize,
        }
    }

    pub fn set_flag(&mut self, flag: SchemaFlag) {
        match flag {
            SchemaFlag::MethodEntryExit => self.method_entry_exit = true,
            SchemaFlag::LoopEntryExit => self.loop_entry_exit = true,
            SchemaFlag::BasicBlock => self.basic_block = true,
            SchemaFlag::Quad => self.quad = true,
            SchemaFlag::Finalize => self.finalize = true,
        }
    }
}
