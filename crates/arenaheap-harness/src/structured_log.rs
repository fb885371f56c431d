//! JSONL rendering of allocator lifecycle records.
//!
//! Provides:
//! - [`LifecycleLogEntry`]: serializable view of an `AllocatorLogRecord`.
//! - [`LogEmitter`]: writes one JSON object per line to any writer.

use std::io::Write;
use std::path::Path;

use arenaheap_core::{AllocatorLogLevel, AllocatorLogRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<AllocatorLogLevel> for LogLevel {
    fn from(level: AllocatorLogLevel) -> Self {
        match level {
            AllocatorLogLevel::Trace => Self::Trace,
            AllocatorLogLevel::Debug => Self::Debug,
            AllocatorLogLevel::Info => Self::Info,
            AllocatorLogLevel::Warn => Self::Warn,
            AllocatorLogLevel::Error => Self::Error,
        }
    }
}

/// One lifecycle record as written to JSONL.
///
/// Required fields: `trace_id`, `level`, `symbol`, `event`, `outcome`.
/// Addresses are rendered as `0x`-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleLogEntry {
    pub decision_id: u64,
    pub trace_id: String,
    pub level: LogLevel,
    pub symbol: String,
    pub event: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_site: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub details: String,
    pub active_count: u64,
    pub active_size: u64,
    pub extent_count: usize,
}

impl From<&AllocatorLogRecord> for LifecycleLogEntry {
    fn from(record: &AllocatorLogRecord) -> Self {
        Self {
            decision_id: record.decision_id,
            trace_id: record.trace_id.clone(),
            level: record.level.into(),
            symbol: record.symbol.to_string(),
            event: record.event.to_string(),
            outcome: record.outcome.to_string(),
            ptr: record.ptr.map(|p| format!("{p:#x}")),
            size: record.size,
            call_site: record.call_site.as_ref().map(ToString::to_string),
            details: record.details.clone(),
            active_count: record.active_count,
            active_size: record.active_size,
            extent_count: record.extent_count,
        }
    }
}

/// Writes lifecycle entries as JSONL.
pub struct LogEmitter<W: Write> {
    writer: W,
    lines: u64,
}

impl LogEmitter<std::io::BufWriter<std::fs::File>> {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(std::io::BufWriter::new(file)))
    }
}

impl<W: Write> LogEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    pub fn emit(&mut self, record: &AllocatorLogRecord) -> std::io::Result<()> {
        let entry = LifecycleLogEntry::from(record);
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        self.lines += 1;
        Ok(())
    }

    pub fn emit_all<'a, I>(&mut self, records: I) -> std::io::Result<()>
    where
        I: IntoIterator<Item = &'a AllocatorLogRecord>,
    {
        for record in records {
            self.emit(record)?;
        }
        Ok(())
    }

    /// Lines written so far.
    #[must_use]
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Parses one JSONL line back into an entry.
pub fn parse_log_line(line: &str) -> Result<LifecycleLogEntry, serde_json::Error> {
    serde_json::from_str(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arenaheap_core::{CallSite, HeapOptions, HeapState};

    fn logged_heap() -> HeapState {
        HeapState::with_options(0x1000, 1024, HeapOptions { log_capacity: 64 }).unwrap()
    }

    #[test]
    fn emits_one_line_per_record() {
        let mut heap = logged_heap();
        let p = heap.malloc(16, CallSite::new("log.c", 1)).unwrap();
        heap.free(p, CallSite::new("log.c", 2)).unwrap();
        let records = heap.drain_lifecycle_logs();

        let mut emitter = LogEmitter::new(Vec::new());
        emitter.emit_all(&records).unwrap();
        assert_eq!(emitter.lines(), records.len() as u64);

        let text = String::from_utf8(emitter.into_inner()).unwrap();
        let entries: Vec<LifecycleLogEntry> =
            text.lines().map(|l| parse_log_line(l).unwrap()).collect();
        let alloc = entries.iter().find(|e| e.event == "alloc").unwrap();
        assert_eq!(alloc.ptr.as_deref(), Some("0x1000"));
        assert_eq!(alloc.size, Some(16));
        assert_eq!(alloc.call_site.as_deref(), Some("log.c:1"));
        assert!(entries.iter().any(|e| e.event == "free"));
    }

    #[test]
    fn levels_serialize_lowercase() {
        let mut heap = logged_heap();
        let _ = heap.free(0x1000, CallSite::new("bad.c", 3));
        let records = heap.drain_lifecycle_logs();
        let entry = LifecycleLogEntry::from(&records[0]);
        assert_eq!(entry.level, LogLevel::Warn);
        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["level"], "warn");
        assert_eq!(json["event"], "invalid_free");
    }
}
