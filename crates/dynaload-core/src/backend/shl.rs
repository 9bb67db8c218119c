//! HP-UX loader: `shl_load` / `shl_findsym` / `shl_unload`.

#![allow(non_camel_case_types)]

use std::ffi::{CStr, CString, c_char, c_int, c_long, c_short, c_void};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr::{self, NonNull};

use super::{BackendError, LoaderBackend, null_symbol};

type shl_t = *mut c_void;

/// Resolve references when first used.
const BIND_DEFERRED: c_int = 0x1;
/// Match any symbol type in `shl_findsym`.
const TYPE_UNDEFINED: c_short = 0;

extern "C" {
    fn shl_load(path: *const c_char, flags: c_int, address: c_long) -> shl_t;
    fn shl_findsym(handle: *mut shl_t, sym: *const c_char, kind: c_short, value: *mut c_void) -> c_int;
    fn shl_unload(handle: shl_t) -> c_int;
}

/// A module mapped by `shl_load`.
#[derive(Debug)]
pub struct ShlHandle(NonNull<c_void>);

// SAFETY: the shl_* API takes the handle by value and does its own locking.
unsafe impl Send for ShlHandle {}
unsafe impl Sync for ShlHandle {}

/// HP-UX shared library loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShlBackend;

impl LoaderBackend for ShlBackend {
    type Handle = ShlHandle;

    const NAME: &'static str = "shl";
    const LOAD_ONCE: bool = false;

    fn open(&self, path: &Path) -> Result<ShlHandle, BackendError> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| BackendError::new("path contains a NUL byte"))?;
        // SAFETY: `c_path` is a valid NUL-terminated string.
        let handle = unsafe { shl_load(c_path.as_ptr(), BIND_DEFERRED, 0) };
        NonNull::new(handle)
            .map(ShlHandle)
            .ok_or_else(|| BackendError::last_os_error("shl_load"))
    }

    fn resolve(&self, handle: &ShlHandle, symbol: &CStr) -> Result<NonNull<c_void>, BackendError> {
        let mut raw: shl_t = handle.0.as_ptr();
        let mut value: *mut c_void = ptr::null_mut();
        // SAFETY: `raw` is a live handle and `value` a valid out slot.
        let rc = unsafe {
            shl_findsym(
                &mut raw,
                symbol.as_ptr(),
                TYPE_UNDEFINED,
                (&mut value as *mut *mut c_void).cast(),
            )
        };
        if rc != 0 {
            return Err(BackendError::last_os_error("shl_findsym"));
        }
        NonNull::new(value).ok_or_else(|| null_symbol(symbol))
    }

    fn close(&self, handle: ShlHandle) -> Result<(), BackendError> {
        // SAFETY: the handle came from `shl_load` and is consumed here.
        if unsafe { shl_unload(handle.0.as_ptr()) } != 0 {
            return Err(BackendError::last_os_error("shl_unload"));
        }
        Ok(())
    }
}
