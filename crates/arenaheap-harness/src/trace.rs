//! JSON allocation traces.
//!
//! A trace names each allocation with a caller-chosen `id`; frees refer to
//! that id so a trace stays valid whatever addresses the heap hands out.
//!
//! ```json
//! {
//!   "arena_size": 4096,
//!   "ops": [
//!     { "op": "malloc", "id": "a", "size": 100, "file": "demo.c", "line": 3 },
//!     { "op": "calloc", "id": "b", "count": 4, "size": 8 },
//!     { "op": "free", "id": "a" },
//!     { "op": "free_address", "address": 4104 }
//!   ]
//! }
//! ```

use std::path::Path;

use arenaheap_core::{CallSite, HeapError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name recorded for ops that carry no `file`.
pub const TRACE_FILE: &str = "<trace>";

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("op {index}: unknown allocation id `{id}`")]
    UnknownId { index: usize, id: String },
    #[error("op {index}: allocation id `{id}` is still live")]
    DuplicateId { index: usize, id: String },
    #[error("heap: {0}")]
    Heap(#[from] HeapError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    /// Arena size for the replay; callers supply a default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arena_size: Option<usize>,
    pub ops: Vec<TraceOp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraceOp {
    Malloc {
        id: String,
        size: usize,
        #[serde(flatten)]
        site: SiteSpec,
    },
    Calloc {
        id: String,
        count: usize,
        size: usize,
        #[serde(flatten)]
        site: SiteSpec,
    },
    Free {
        id: String,
        #[serde(flatten)]
        site: SiteSpec,
    },
    /// Free a raw address, for replaying wild or interior frees.
    FreeAddress {
        address: usize,
        #[serde(flatten)]
        site: SiteSpec,
    },
}

/// Optional call-site annotation of an op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl SiteSpec {
    /// Call site for the op at `index`; defaults to `<trace>:<index + 1>`.
    #[must_use]
    pub fn call_site(&self, index: usize) -> CallSite {
        let file = self.file.clone().unwrap_or_else(|| TRACE_FILE.to_string());
        let line = self
            .line
            .unwrap_or_else(|| u32::try_from(index + 1).unwrap_or(u32::MAX));
        CallSite::owned(file, line)
    }
}

impl TraceOp {
    #[must_use]
    pub fn site(&self) -> &SiteSpec {
        match self {
            Self::Malloc { site, .. }
            | Self::Calloc { site, .. }
            | Self::Free { site, .. }
            | Self::FreeAddress { site, .. } => site,
        }
    }
}

impl Trace {
    pub fn from_json(text: &str) -> Result<Self, TraceError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, TraceError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
