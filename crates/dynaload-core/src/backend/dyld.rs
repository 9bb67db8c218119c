//! Legacy Mach loader built on the `NSObjectFileImage` / `NSModule` API.
//!
//! This API cannot link the same image twice into one process, so the
//! native backend for this platform is `LoadOnce<DyldBackend>`, sharing a
//! single process-wide cache of resident modules. Symbols are looked up by
//! their raw Mach-O names, which carry a leading underscore.

use std::collections::HashMap;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::{BackendError, LoadOnce, LoaderBackend, null_symbol};

type NSObjectFileImage = *mut c_void;
type NSModule = *mut c_void;
type NSSymbol = *mut c_void;

const NS_OBJECT_FILE_IMAGE_FAILURE: c_int = 0;
const NS_OBJECT_FILE_IMAGE_SUCCESS: c_int = 1;
const NS_OBJECT_FILE_IMAGE_INAPPROPRIATE_FILE: c_int = 2;
const NS_OBJECT_FILE_IMAGE_ARCH: c_int = 3;
const NS_OBJECT_FILE_IMAGE_FORMAT: c_int = 4;
const NS_OBJECT_FILE_IMAGE_ACCESS: c_int = 5;

const NSLINKMODULE_OPTION_PRIVATE: u32 = 0x2;
const NSLINKMODULE_OPTION_RETURN_ON_ERROR: u32 = 0x4;
const NSUNLINKMODULE_OPTION_NONE: u32 = 0x0;

extern "C" {
    fn NSCreateObjectFileImageFromFile(path: *const c_char, image: *mut NSObjectFileImage) -> c_int;
    fn NSDestroyObjectFileImage(image: NSObjectFileImage) -> bool;
    fn NSLinkModule(image: NSObjectFileImage, name: *const c_char, options: u32) -> NSModule;
    fn NSUnLinkModule(module: NSModule, options: u32) -> bool;
    fn NSLookupSymbolInModule(module: NSModule, name: *const c_char) -> NSSymbol;
    fn NSAddressOfSymbol(symbol: NSSymbol) -> *mut c_void;
    fn NSLinkEditError(
        class: *mut c_int,
        number: *mut c_int,
        file: *mut *const c_char,
        message: *mut *const c_char,
    );
}

static RESIDENT: Lazy<Arc<Mutex<HashMap<PathBuf, DyldModule>>>> =
    Lazy::new(|| Arc::new(Mutex::new(HashMap::new())));

/// A linked `NSModule`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DyldModule(NonNull<c_void>);

// SAFETY: dyld serialises access to its module list internally.
unsafe impl Send for DyldModule {}
unsafe impl Sync for DyldModule {}

/// Raw `NSLinkModule` loader. Use it through [`LoadOnce`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DyldBackend;

impl DyldBackend {
    /// The load-once wrapper sharing the process-wide resident cache.
    pub fn process_wide() -> LoadOnce<DyldBackend> {
        LoadOnce::with_cache(DyldBackend, Arc::clone(&RESIDENT))
    }
}

impl Default for LoadOnce<DyldBackend> {
    fn default() -> Self {
        DyldBackend::process_wide()
    }
}

fn image_error(code: c_int) -> &'static str {
    match code {
        NS_OBJECT_FILE_IMAGE_FAILURE => "object file setup failure",
        NS_OBJECT_FILE_IMAGE_INAPPROPRIATE_FILE => "inappropriate Mach-O file",
        NS_OBJECT_FILE_IMAGE_ARCH => "inappropriate Mach-O architecture",
        NS_OBJECT_FILE_IMAGE_FORMAT => "invalid Mach-O file format",
        NS_OBJECT_FILE_IMAGE_ACCESS => "permission denied",
        _ => "unknown error",
    }
}

fn link_edit_error() -> BackendError {
    let mut class: c_int = 0;
    let mut number: c_int = 0;
    let mut file: *const c_char = ptr::null();
    let mut message: *const c_char = ptr::null();
    // SAFETY: all out parameters are valid slots.
    unsafe { NSLinkEditError(&mut class, &mut number, &mut file, &mut message) };
    if message.is_null() {
        return BackendError::new("NSLinkModule failed");
    }
    // SAFETY: dyld returns a NUL-terminated static buffer.
    let text = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    BackendError::new(format!("NSLinkModule failed: {}", text.trim_end()))
}

impl LoaderBackend for DyldBackend {
    type Handle = DyldModule;

    const NAME: &'static str = "dyld";
    const LOAD_ONCE: bool = false;

    fn open(&self, path: &Path) -> Result<DyldModule, BackendError> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| BackendError::new("path contains a NUL byte"))?;

        let mut image: NSObjectFileImage = ptr::null_mut();
        // SAFETY: `c_path` is NUL-terminated and `image` a valid out slot.
        let rc = unsafe { NSCreateObjectFileImageFromFile(c_path.as_ptr(), &mut image) };
        if rc != NS_OBJECT_FILE_IMAGE_SUCCESS {
            return Err(BackendError::new(image_error(rc)));
        }

        // SAFETY: `image` was created above and is destroyed right after linking.
        let module = unsafe {
            let module = NSLinkModule(
                image,
                c_path.as_ptr(),
                NSLINKMODULE_OPTION_PRIVATE | NSLINKMODULE_OPTION_RETURN_ON_ERROR,
            );
            NSDestroyObjectFileImage(image);
            module
        };
        NonNull::new(module).map(DyldModule).ok_or_else(link_edit_error)
    }

    fn resolve(&self, handle: &DyldModule, symbol: &CStr) -> Result<NonNull<c_void>, BackendError> {
        // SAFETY: the module is linked for as long as the handle exists.
        let ns_symbol = unsafe { NSLookupSymbolInModule(handle.0.as_ptr(), symbol.as_ptr()) };
        if ns_symbol.is_null() {
            return Err(BackendError::new(format!(
                "symbol `{}` is not defined in the module",
                symbol.to_string_lossy()
            )));
        }
        // SAFETY: `ns_symbol` was just returned by dyld.
        let address = unsafe { NSAddressOfSymbol(ns_symbol) };
        NonNull::new(address).ok_or_else(|| null_symbol(symbol))
    }

    fn close(&self, handle: DyldModule) -> Result<(), BackendError> {
        // SAFETY: the handle came from `NSLinkModule`.
        if unsafe { NSUnLinkModule(handle.0.as_ptr(), NSUNLINKMODULE_OPTION_NONE) } {
            Ok(())
        } else {
            Err(BackendError::new("NSUnLinkModule failed"))
        }
    }
}
