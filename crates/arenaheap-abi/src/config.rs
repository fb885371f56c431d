//! Runtime configuration.
//!
//! Read once from the environment when the process-wide heap is created:
//! - `ARENAHEAP_ARENA_SIZE`: arena bytes, decimal or `0x` hex, with an optional
//!   `K`/`M`/`G` binary suffix. Defaults to 8 MiB; unparsable or zero values
//!   fall back to the default.
//! - `ARENAHEAP_MODE`:
//!   - `strict` (default): an invalid free prints a `MEMORY BUG` diagnostic and
//!     terminates the process.
//!   - `hardened` (also `repair`, `lenient` or `continue`): an invalid free is
//!     printed, counted and ignored.
//!
//!   Matching is case-insensitive; any other value selects `strict`.
//! - `ARENAHEAP_LOG_CAPACITY`: lifecycle records kept by the heap (default 0).

use arenaheap_core::HeapOptions;

/// Arena size used when none is configured: 8 MiB.
pub const DEFAULT_ARENA_SIZE: usize = 8 << 20;

pub const ENV_ARENA_SIZE: &str = "ARENAHEAP_ARENA_SIZE";
pub const ENV_MODE: &str = "ARENAHEAP_MODE";
pub const ENV_LOG_CAPACITY: &str = "ARENAHEAP_LOG_CAPACITY";

/// How the C boundary treats an invalid free.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapMode {
    /// Report and terminate the process.
    #[default]
    Strict,
    /// Report, count and continue; the heap is left unchanged.
    Hardened,
}

impl HeapMode {
    /// Parse from string (case-insensitive). `hardened`, `repair`, `lenient`
    /// and `continue` select hardened; anything else is strict.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "hardened" | "repair" | "lenient" | "continue" => Self::Hardened,
            _ => Self::Strict,
        }
    }

    #[must_use]
    pub const fn terminates_on_invalid_free(self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// Settings for building a [`crate::Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    pub arena_size: usize,
    pub mode: HeapMode,
    pub log_capacity: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            arena_size: DEFAULT_ARENA_SIZE,
            mode: HeapMode::Strict,
            log_capacity: 0,
        }
    }
}

impl HeapConfig {
    /// Configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let arena_size = lookup(ENV_ARENA_SIZE)
            .and_then(|raw| parse_size(&raw))
            .filter(|&size| size > 0)
            .unwrap_or(defaults.arena_size);
        let mode = lookup(ENV_MODE)
            .map(|raw| HeapMode::from_str_loose(&raw))
            .unwrap_or(defaults.mode);
        let log_capacity = lookup(ENV_LOG_CAPACITY)
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(defaults.log_capacity);
        Self {
            arena_size,
            mode,
            log_capacity,
        }
    }

    #[must_use]
    pub fn heap_options(&self) -> HeapOptions {
        HeapOptions {
            log_capacity: self.log_capacity,
        }
    }
}

/// Parses `4096`, `0x1000`, `64K`, `8M`, `1g` into bytes.
#[must_use]
pub fn parse_size(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.chars().last()?.to_ascii_uppercase() {
        'K' => (&raw[..raw.len() - 1], 1usize << 10),
        'M' => (&raw[..raw.len() - 1], 1 << 20),
        'G' => (&raw[..raw.len() - 1], 1 << 30),
        _ => (raw, 1),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => usize::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<usize>().ok()?,
    };
    value.checked_mul(multiplier)
}
