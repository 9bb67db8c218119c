//! Host implementation of the utility and symbol tables.
//!
//! Plugins receive the store as an opaque pointer to a [`StoreRef`]. Each
//! callback turns that pointer and the key back into a [`UtilArgs`] for the
//! duration of one lookup, and reports 1 on success and 0 otherwise.

use std::ffi::{CStr, CString, c_char, c_int, c_void};

use dynaload_plugin_sdk::abi::{SymbolTable, UtilTable, log_level};

use crate::store::{ArgStore, Value};

/// What the host hands a plugin as its store pointer.
pub struct StoreRef<'a> {
    pub store: &'a mut dyn ArgStore,
}

impl<'a> StoreRef<'a> {
    pub fn new(store: &'a mut dyn ArgStore) -> Self {
        Self { store }
    }

    pub fn as_raw(&mut self) -> *mut c_void {
        (self as *mut StoreRef<'a>).cast()
    }
}

/// One lookup: store, key and output slot, borrowed from the caller.
pub(crate) struct UtilArgs<'a, T> {
    store: &'a mut dyn ArgStore,
    key: &'a str,
    output: *mut T,
}

impl<'a, T> UtilArgs<'a, T> {
    /// Rebuilds the lookup from raw callback arguments.
    ///
    /// `None` for a null store, a null or non UTF-8 key, or a null output
    /// when `needs_output` is set.
    ///
    /// # Safety
    /// `store` must be null or a live `StoreRef`; `key` null or
    /// NUL-terminated.
    unsafe fn from_raw(
        store: *mut c_void,
        key: *const c_char,
        output: *mut T,
        needs_output: bool,
    ) -> Option<Self> {
        if store.is_null() || key.is_null() || (needs_output && output.is_null()) {
            return None;
        }
        // SAFETY: guaranteed by the caller.
        let store_ref = unsafe { &mut *store.cast::<StoreRef<'a>>() };
        let key = unsafe { CStr::from_ptr(key) }.to_str().ok()?;
        Some(Self {
            store: &mut *store_ref.store,
            key,
            output,
        })
    }

    fn fetch(&self) -> Option<&Value> {
        self.store.get(self.key)
    }

    /// Writes `value` to the output slot.
    fn emit(&self, value: T) -> c_int {
        // SAFETY: `output` was checked non-null in `from_raw`.
        unsafe { self.output.write(value) };
        1
    }

    fn store_value(&mut self, value: Value) -> c_int {
        self.store.insert(self.key.to_string(), value);
        1
    }
}

unsafe extern "C" fn util_getstr(store: *mut c_void, key: *const c_char, out: *mut *const c_char) -> c_int {
    let Some(args) = (unsafe { UtilArgs::from_raw(store, key, out, true) }) else {
        return 0;
    };
    match args.fetch() {
        Some(Value::Str(s)) => args.emit(s.as_ptr()),
        _ => 0,
    }
}

unsafe extern "C" fn util_getint(store: *mut c_void, key: *const c_char, out: *mut i64) -> c_int {
    let Some(args) = (unsafe { UtilArgs::from_raw(store, key, out, true) }) else {
        return 0;
    };
    match args.fetch() {
        Some(Value::Int(v)) => args.emit(*v),
        _ => 0,
    }
}

unsafe extern "C" fn util_getdouble(store: *mut c_void, key: *const c_char, out: *mut f64) -> c_int {
    let Some(args) = (unsafe { UtilArgs::from_raw(store, key, out, true) }) else {
        return 0;
    };
    match args.fetch() {
        Some(Value::Double(v)) => args.emit(*v),
        _ => 0,
    }
}

unsafe extern "C" fn util_getvoid(store: *mut c_void, key: *const c_char, out: *mut *mut c_void) -> c_int {
    let Some(args) = (unsafe { UtilArgs::from_raw(store, key, out, true) }) else {
        return 0;
    };
    match args.fetch() {
        Some(Value::Pointer(p)) => args.emit(*p),
        _ => 0,
    }
}

unsafe extern "C" fn util_getobj(
    store: *mut c_void,
    key: *const c_char,
    class: *const c_char,
    out: *mut *mut c_void,
) -> c_int {
    if class.is_null() {
        return 0;
    }
    let Some(args) = (unsafe { UtilArgs::from_raw(store, key, out, true) }) else {
        return 0;
    };
    let Ok(class) = (unsafe { CStr::from_ptr(class) }).to_str() else {
        return 0;
    };
    match args.fetch() {
        Some(Value::Object(obj)) if obj.derives_from(class) => args.emit(obj.as_ptr()),
        _ => 0,
    }
}

unsafe extern "C" fn util_setstr(store: *mut c_void, key: *const c_char, value: *const c_char) -> c_int {
    if value.is_null() {
        return 0;
    }
    let Some(mut args) = (unsafe { UtilArgs::<()>::from_raw(store, key, std::ptr::null_mut(), false) }) else {
        return 0;
    };
    let value = CString::from(unsafe { CStr::from_ptr(value) });
    args.store_value(Value::Str(value))
}

unsafe extern "C" fn util_setint(store: *mut c_void, key: *const c_char, value: i64) -> c_int {
    match unsafe { UtilArgs::<()>::from_raw(store, key, std::ptr::null_mut(), false) } {
        Some(mut args) => args.store_value(Value::Int(value)),
        None => 0,
    }
}

unsafe extern "C" fn util_setdouble(store: *mut c_void, key: *const c_char, value: f64) -> c_int {
    match unsafe { UtilArgs::<()>::from_raw(store, key, std::ptr::null_mut(), false) } {
        Some(mut args) => args.store_value(Value::Double(value)),
        None => 0,
    }
}

unsafe extern "C" fn util_setvoid(store: *mut c_void, key: *const c_char, value: *mut c_void) -> c_int {
    match unsafe { UtilArgs::<()>::from_raw(store, key, std::ptr::null_mut(), false) } {
        Some(mut args) => args.store_value(Value::Pointer(value)),
        None => 0,
    }
}

unsafe extern "C" fn util_exists(store: *mut c_void, key: *const c_char) -> c_int {
    match unsafe { UtilArgs::<()>::from_raw(store, key, std::ptr::null_mut(), false) } {
        Some(args) => c_int::from(args.fetch().is_some()),
        None => 0,
    }
}

unsafe extern "C" fn util_remove(store: *mut c_void, key: *const c_char) -> c_int {
    match unsafe { UtilArgs::<()>::from_raw(store, key, std::ptr::null_mut(), false) } {
        Some(args) => c_int::from(args.store.remove(args.key).is_some()),
        None => 0,
    }
}

unsafe extern "C" fn host_log(level: c_int, message: *const c_char) {
    if message.is_null() {
        return;
    }
    let message = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    match level {
        log_level::ERROR => tracing::error!(target: "dynaload::plugin", "{}", message),
        log_level::WARN => tracing::warn!(target: "dynaload::plugin", "{}", message),
        log_level::INFO => tracing::info!(target: "dynaload::plugin", "{}", message),
        log_level::DEBUG => tracing::debug!(target: "dynaload::plugin", "{}", message),
        _ => tracing::trace!(target: "dynaload::plugin", level, "{}", message),
    }
}

/// The host's utility table.
pub static HOST_UTIL_TABLE: UtilTable = UtilTable {
    getstr: util_getstr,
    getint: util_getint,
    getdouble: util_getdouble,
    getvoid: util_getvoid,
    getobj: util_getobj,
    setstr: util_setstr,
    setint: util_setint,
    setdouble: util_setdouble,
    setvoid: util_setvoid,
    exists: util_exists,
    remove: util_remove,
};

/// The host's symbol table.
pub static HOST_SYMBOL_TABLE: SymbolTable = SymbolTable {
    host: c"dynaload".as_ptr(),
    log: host_log,
};
