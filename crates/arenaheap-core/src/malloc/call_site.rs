//! Call-site metadata attached to allocations.
//!
//! The allocator never inspects a call site; it stores it with the record and
//! prints it in diagnostics and leak reports.

use std::borrow::Cow;
use std::fmt;

/// Source location (file and line) that requested an allocation or free.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSite {
    file: Cow<'static, str>,
    line: u32,
}

impl CallSite {
    /// Call site for a compile-time known file name.
    #[must_use]
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self {
            file: Cow::Borrowed(file),
            line,
        }
    }

    /// Call site for a file name only known at runtime (e.g. from a C caller).
    #[must_use]
    pub fn owned(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: Cow::Owned(file.into()),
            line,
        }
    }

    /// Placeholder used when the caller supplied no location.
    #[must_use]
    pub const fn unknown() -> Self {
        Self::new("?", 0)
    }

    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    #[must_use]
    pub const fn line(&self) -> u32 {
        self.line
    }
}

impl Default for CallSite {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Captures the current `file!()`/`line!()` as a [`CallSite`].
#[macro_export]
macro_rules! call_site {
    () => {
        $crate::malloc::CallSite::new(file!(), line!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_file_colon_line() {
        assert_eq!(CallSite::new("test.c", 42).to_string(), "test.c:42");
        assert_eq!(CallSite::owned("dyn.c", 7).to_string(), "dyn.c:7");
    }

    #[test]
    fn macro_captures_this_file() {
        let site = crate::call_site!();
        assert!(site.file().ends_with("call_site.rs"));
        assert!(site.line() > 0);
    }

    #[test]
    fn borrowed_and_owned_compare_equal() {
        assert_eq!(CallSite::new("a.c", 1), CallSite::owned("a.c", 1));
        assert_eq!(CallSite::default(), CallSite::unknown());
    }
}
