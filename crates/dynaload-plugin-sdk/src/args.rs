//! Plugin-side access to the host store through the installed tables.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::abi::{SymbolTable, TableSlot, UtilTable, log_level};

/// Arguments of one dispatched call.
///
/// Wraps the opaque store pointer the host passed in together with the
/// tables it installed, and exposes the utility callbacks as safe methods.
pub struct CallArgs<'a> {
    store: *mut c_void,
    symbols: &'a SymbolTable,
    util: &'a UtilTable,
}

impl<'a> CallArgs<'a> {
    /// # Safety
    /// `store` must be the pointer the host passed to the current call, and
    /// the tables must be the ones the host installed.
    pub unsafe fn from_raw(store: *mut c_void, symbols: &'a SymbolTable, util: &'a UtilTable) -> Self {
        Self { store, symbols, util }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        let key = CString::new(key).ok()?;
        let mut out = 0i64;
        // SAFETY: store and table come from the host, `out` is a valid slot.
        let found = unsafe { (self.util.getint)(self.store, key.as_ptr(), &mut out) };
        (found != 0).then_some(out)
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        let key = CString::new(key).ok()?;
        let mut out = 0f64;
        // SAFETY: see `get_int`.
        let found = unsafe { (self.util.getdouble)(self.store, key.as_ptr(), &mut out) };
        (found != 0).then_some(out)
    }

    /// Copies a string value out of the store.
    pub fn get_str(&self, key: &str) -> Option<String> {
        let key = CString::new(key).ok()?;
        let mut out: *const c_char = ptr::null();
        // SAFETY: see `get_int`. The returned pointer is only valid until the
        // store is modified, so it is copied right away.
        unsafe {
            if (self.util.getstr)(self.store, key.as_ptr(), &mut out) == 0 || out.is_null() {
                return None;
            }
            Some(CStr::from_ptr(out).to_string_lossy().into_owned())
        }
    }

    pub fn get_ptr(&self, key: &str) -> Option<*mut c_void> {
        let key = CString::new(key).ok()?;
        let mut out: *mut c_void = ptr::null_mut();
        // SAFETY: see `get_int`.
        let found = unsafe { (self.util.getvoid)(self.store, key.as_ptr(), &mut out) };
        (found != 0).then_some(out)
    }

    /// Pointer of an object stored under `key` that derives from `class`.
    pub fn get_object(&self, key: &str, class: &str) -> Option<*mut c_void> {
        let key = CString::new(key).ok()?;
        let class = CString::new(class).ok()?;
        let mut out: *mut c_void = ptr::null_mut();
        // SAFETY: see `get_int`.
        let found = unsafe { (self.util.getobj)(self.store, key.as_ptr(), class.as_ptr(), &mut out) };
        (found != 0).then_some(out)
    }

    pub fn set_int(&mut self, key: &str, value: i64) -> bool {
        let Ok(key) = CString::new(key) else {
            return false;
        };
        // SAFETY: see `get_int`.
        unsafe { (self.util.setint)(self.store, key.as_ptr(), value) != 0 }
    }

    pub fn set_double(&mut self, key: &str, value: f64) -> bool {
        let Ok(key) = CString::new(key) else {
            return false;
        };
        // SAFETY: see `get_int`.
        unsafe { (self.util.setdouble)(self.store, key.as_ptr(), value) != 0 }
    }

    pub fn set_str(&mut self, key: &str, value: &str) -> bool {
        let (Ok(key), Ok(value)) = (CString::new(key), CString::new(value)) else {
            return false;
        };
        // SAFETY: see `get_int`.
        unsafe { (self.util.setstr)(self.store, key.as_ptr(), value.as_ptr()) != 0 }
    }

    pub fn set_ptr(&mut self, key: &str, value: *mut c_void) -> bool {
        let Ok(key) = CString::new(key) else {
            return false;
        };
        // SAFETY: see `get_int`.
        unsafe { (self.util.setvoid)(self.store, key.as_ptr(), value) != 0 }
    }

    pub fn contains(&self, key: &str) -> bool {
        let Ok(key) = CString::new(key) else {
            return false;
        };
        // SAFETY: see `get_int`.
        unsafe { (self.util.exists)(self.store, key.as_ptr()) != 0 }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let Ok(key) = CString::new(key) else {
            return false;
        };
        // SAFETY: see `get_int`.
        unsafe { (self.util.remove)(self.store, key.as_ptr()) != 0 }
    }

    /// Sends a message to the host log.
    pub fn log(&self, level: c_int, message: &str) {
        log_to(self.symbols, level, message);
    }

    /// Name the host reported in its symbol table.
    pub fn host(&self) -> String {
        if self.symbols.host.is_null() {
            return String::new();
        }
        // SAFETY: the host name is a static NUL-terminated string.
        unsafe { CStr::from_ptr(self.symbols.host) }
            .to_string_lossy()
            .into_owned()
    }
}

fn log_to(symbols: &SymbolTable, level: c_int, message: &str) {
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    // SAFETY: the log callback comes from the installed host table.
    unsafe { (symbols.log)(level, message.as_ptr()) }
}

/// Runs `f` for one dispatched call.
///
/// A panic inside `f` is caught and reported through the host log instead
/// of unwinding across the C boundary.
///
/// # Preconditions
/// The host must call `install_tables` before dispatching into the module.
/// A call made before that is a caller error: `f` is not run and the store
/// is left untouched, since there is no table to report through.
///
/// # Safety
/// `store` must be the pointer the host passed to the exported function.
pub unsafe fn invoke(
    store: *mut c_void,
    symbols: &TableSlot<SymbolTable>,
    util: &TableSlot<UtilTable>,
    f: fn(&mut CallArgs<'_>),
) {
    let (Some(symbols), Some(util)) = (symbols.get(), util.get()) else {
        return;
    };
    // SAFETY: forwarded from the caller.
    let mut args = unsafe { CallArgs::from_raw(store, symbols, util) };
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(&mut args))) {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log_to(symbols, log_level::ERROR, &format!("plugin function panicked: {}", reason));
    }
}
