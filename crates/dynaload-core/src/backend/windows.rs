//! Windows loader: `LoadLibraryW` / `GetProcAddress` / `FreeLibrary`.

use std::ffi::{CStr, c_void};
use std::path::Path;
use std::ptr::NonNull;

use libloading::os::windows::Library;

use super::{BackendError, LoaderBackend, null_symbol};

/// DLL loader.
///
/// Windows reference-counts a DLL loaded twice from the same path, so the
/// second handle shares the first mapping, but each handle must be closed.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsBackend;

impl LoaderBackend for WindowsBackend {
    type Handle = Library;

    const NAME: &'static str = "windows";
    const LOAD_ONCE: bool = false;

    fn open(&self, path: &Path) -> Result<Library, BackendError> {
        // SAFETY: loading runs `DllMain`, which the host accepted by asking
        // for the module.
        unsafe { Library::new(path) }.map_err(BackendError::from)
    }

    fn resolve(&self, handle: &Library, symbol: &CStr) -> Result<NonNull<c_void>, BackendError> {
        // SAFETY: the symbol is read as a bare address, never called here.
        let address = unsafe { handle.get::<*mut c_void>(symbol.to_bytes_with_nul()) }?;
        NonNull::new(*address).ok_or_else(|| null_symbol(symbol))
    }

    fn close(&self, handle: Library) -> Result<(), BackendError> {
        handle.close().map_err(BackendError::from)
    }
}
