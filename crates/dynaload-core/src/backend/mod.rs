//! Platform loader backends.
//!
//! Exactly one backend is compiled in and exported as [`NativeBackend`]:
//!
//! | Backend | Platform | Native API | Load-once |
//! |---|---|---|---|
//! | [`DlfcnBackend`] | unix (default) | `dlopen` / `dlsym` / `dlclose` | no |
//! | `WindowsBackend` | windows | `LoadLibraryW` / `GetProcAddress` / `FreeLibrary` | no |
//! | `ShlBackend` | HP-UX | `shl_load` / `shl_findsym` / `shl_unload` | no |
//! | `LoadOnce<DyldBackend>` | macOS + `mach-dyld` | `NSLinkModule` / `NSLookupSymbolInModule` | yes |
//!
//! The choice is made by `cfg` at build time; nothing above this module
//! switches backends at runtime. Generic code takes a `B: LoaderBackend`
//! defaulting to [`NativeBackend`].

use std::ffi::{CStr, c_void};
use std::path::Path;
use std::ptr::NonNull;

mod load_once;

pub use load_once::LoadOnce;

#[cfg(all(
    unix,
    not(target_os = "hpux"),
    not(all(target_os = "macos", feature = "mach-dyld"))
))]
mod dlfcn;
#[cfg(all(
    unix,
    not(target_os = "hpux"),
    not(all(target_os = "macos", feature = "mach-dyld"))
))]
pub use dlfcn::DlfcnBackend;
#[cfg(all(
    unix,
    not(target_os = "hpux"),
    not(all(target_os = "macos", feature = "mach-dyld"))
))]
pub type NativeBackend = DlfcnBackend;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::WindowsBackend;
#[cfg(windows)]
pub type NativeBackend = WindowsBackend;

#[cfg(target_os = "hpux")]
mod shl;
#[cfg(target_os = "hpux")]
pub use shl::{ShlBackend, ShlHandle};
#[cfg(target_os = "hpux")]
pub type NativeBackend = ShlBackend;

#[cfg(all(target_os = "macos", feature = "mach-dyld"))]
mod dyld;
#[cfg(all(target_os = "macos", feature = "mach-dyld"))]
pub use dyld::{DyldBackend, DyldModule};
#[cfg(all(target_os = "macos", feature = "mach-dyld"))]
pub type NativeBackend = LoadOnce<DyldBackend>;

/// Failure reported by a native loader, with its diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Builds an error from `errno` for loaders that report through it.
    pub fn last_os_error(operation: &str) -> Self {
        Self::new(format!("{}: {}", operation, std::io::Error::last_os_error()))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<libloading::Error> for BackendError {
    fn from(err: libloading::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// A platform's module loader.
///
/// `resolve` results are only valid while the handle is open: `close`
/// invalidates every address resolved through it.
pub trait LoaderBackend: Send + Sync + 'static {
    /// The loader's own module reference.
    type Handle: Send + Sync;

    /// Short name used in diagnostics.
    const NAME: &'static str;

    /// Whether the loader maps each path at most once per process.
    ///
    /// Load-once backends return the resident module on a repeated open
    /// and keep it mapped on close.
    const LOAD_ONCE: bool;

    /// Maps the module at `path`.
    fn open(&self, path: &Path) -> Result<Self::Handle, BackendError>;

    /// Address of `symbol` inside the module.
    fn resolve(&self, handle: &Self::Handle, symbol: &CStr) -> Result<NonNull<c_void>, BackendError>;

    /// Releases the module.
    fn close(&self, handle: Self::Handle) -> Result<(), BackendError>;
}

pub(crate) fn null_symbol(symbol: &CStr) -> BackendError {
    BackendError::new(format!("symbol `{}` resolved to null", symbol.to_string_lossy()))
}
