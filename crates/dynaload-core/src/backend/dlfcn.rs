//! Generic POSIX loader: `dlopen` / `dlsym` / `dlclose`.

use std::ffi::{CStr, c_void};
use std::path::Path;
use std::ptr::NonNull;

use libloading::os::unix::{Library, RTLD_LAZY, RTLD_LOCAL};

use super::{BackendError, LoaderBackend, null_symbol};

/// `dlopen`-based loader.
///
/// Modules are opened with `RTLD_LAZY | RTLD_LOCAL`. Opening a path twice
/// yields two handles; the dynamic linker reference-counts the mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct DlfcnBackend;

impl LoaderBackend for DlfcnBackend {
    type Handle = Library;

    const NAME: &'static str = "dlfcn";
    const LOAD_ONCE: bool = false;

    fn open(&self, path: &Path) -> Result<Library, BackendError> {
        // SAFETY: loading runs the module's initialisers, which the host
        // accepted by asking for the module.
        unsafe { Library::open(Some(path), RTLD_LAZY | RTLD_LOCAL) }.map_err(BackendError::from)
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
