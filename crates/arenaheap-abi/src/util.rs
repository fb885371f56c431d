//! Shared internal utilities for ABI adapters.

use std::ffi::c_char;

use arenaheap_core::CallSite;

/// Longest file name read from a C caller.
pub const MAX_FILE_NAME: usize = 4096;

/// Length of the C string at `ptr`, reading at most `limit` bytes.
///
/// Returns `(len, terminated)`: `terminated` is false when no NUL was found
/// within `limit`, in which case `len == limit`.
///
/// # Safety
///
/// `ptr` must be readable up to the first NUL or `limit` bytes, whichever
/// comes first.
pub unsafe fn bounded_c_str_len(ptr: *const c_char, limit: usize) -> (usize, bool) {
    for i in 0..limit {
        // SAFETY: `i < limit` and no NUL seen yet; caller guarantees readability.
        if unsafe { *ptr.add(i) } == 0 {
            return (i, true);
        }
    }
    (limit, false)
}

/// Builds a [`CallSite`] from the `(file, line)` pair a C caller passes.
///
/// A null `file` yields [`CallSite::unknown`]; negative lines clamp to 0.
///
/// # Safety
///
/// `file` must be null or point to a NUL-terminated string (read at most
/// [`MAX_FILE_NAME`] bytes).
pub unsafe fn call_site_from_c(file: *const c_char, line: i32) -> CallSite {
    if file.is_null() {
        return CallSite::unknown();
    }
    let (len, _) = unsafe { bounded_c_str_len(file, MAX_FILE_NAME) };
    // SAFETY: `bounded_c_str_len` just read `len` bytes from `file`.
    let bytes = unsafe { std::slice::from_raw_parts(file.cast::<u8>(), len) };
    CallSite::owned(
        String::from_utf8_lossy(bytes).into_owned(),
        u32::try_from(line).unwrap_or(0),
    )
}
