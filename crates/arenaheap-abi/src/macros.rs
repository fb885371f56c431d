//! `abi_fn!`: generator for the exported `extern "C"` entry points.

/// Generate an exported `#[unsafe(no_mangle)] pub unsafe extern "C" fn`.
///
/// Allocation entry points end their argument list with `; site = name`.
/// The generated function then takes two trailing C parameters,
/// `const char *file, int line`, and binds `name` to the [`CallSite`] built
/// from them before the body runs. Reporting entry points omit the clause.
///
/// ```ignore
/// abi_fn! {
///     fn arenaheap_malloc(size: usize; site = site) -> *mut c_void {
///         // `site` is the caller's `(file, line)` as a `CallSite`
///     }
/// }
/// ```
///
/// [`CallSite`]: arenaheap_core::CallSite
macro_rules! abi_fn {
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),+ ; site = $site:ident ) $(-> $ret:ty)?
        $body:block
    ) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        #[allow(unused_unsafe)]
        pub unsafe extern "C" fn $name(
            $($arg : $argty,)+
            file: *const ::std::ffi::c_char,
            line: ::std::ffi::c_int,
        ) $(-> $ret)? {
            // SAFETY: the caller passes null or a NUL-terminated file name.
            let $site = unsafe { $crate::util::call_site_from_c(file, line) };
            unsafe { $body }
        }
    };

    (
        $(#[$meta:meta])*
        fn $name:ident() $(-> $ret:ty)?
        $body:block
    ) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        #[allow(unused_unsafe)]
        pub unsafe extern "C" fn $name() $(-> $ret)? {
            unsafe { $body }
        }
    };
}
