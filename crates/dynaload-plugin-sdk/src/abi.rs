//! C ABI shared by the host and plugin modules.
//!
//! All tables are `#[repr(C)]` so that plugins written in C can declare the
//! same structures. The store pointer handed to every callback is opaque on
//! the plugin side; only the host knows what it points to.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Signature shared by every entry of a plugin's function list.
pub type PluginFn = unsafe extern "C" fn(store: *mut c_void);

/// Signature of the plugin's `install_tables` entry point.
pub type InstallTablesFn = unsafe extern "C" fn(symbols: *const SymbolTable, util: *const UtilTable);

/// Host logging callback.
pub type LogFn = unsafe extern "C" fn(level: c_int, message: *const c_char);

pub type GetStrFn =
    unsafe extern "C" fn(store: *mut c_void, key: *const c_char, out: *mut *const c_char) -> c_int;
pub type GetIntFn = unsafe extern "C" fn(store: *mut c_void, key: *const c_char, out: *mut i64) -> c_int;
pub type GetDoubleFn =
    unsafe extern "C" fn(store: *mut c_void, key: *const c_char, out: *mut f64) -> c_int;
pub type GetVoidFn =
    unsafe extern "C" fn(store: *mut c_void, key: *const c_char, out: *mut *mut c_void) -> c_int;
pub type GetObjFn = unsafe extern "C" fn(
    store: *mut c_void,
    key: *const c_char,
    class: *const c_char,
    out: *mut *mut c_void,
) -> c_int;
pub type SetStrFn =
    unsafe extern "C" fn(store: *mut c_void, key: *const c_char, value: *const c_char) -> c_int;
pub type SetIntFn = unsafe extern "C" fn(store: *mut c_void, key: *const c_char, value: i64) -> c_int;
pub type SetDoubleFn = unsafe extern "C" fn(store: *mut c_void, key: *const c_char, value: f64) -> c_int;
pub type SetVoidFn =
    unsafe extern "C" fn(store: *mut c_void, key: *const c_char, value: *mut c_void) -> c_int;
pub type KeyFn = unsafe extern "C" fn(store: *mut c_void, key: *const c_char) -> c_int;

/// Log levels understood by [`SymbolTable::log`].
pub mod log_level {
    use std::ffi::c_int;

    pub const ERROR: c_int = 1;
    pub const WARN: c_int = 2;
    pub const INFO: c_int = 3;
    pub const DEBUG: c_int = 4;
    pub const TRACE: c_int = 5;
}

/// Host callbacks for reading and writing the associative store.
///
/// Every callback returns 1 on success and 0 on failure. Getters fail when
/// the key is missing or the stored value has a different shape than the
/// one requested; `getobj` additionally requires the object to derive from
/// `class`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UtilTable {
    pub getstr: GetStrFn,
    pub getint: GetIntFn,
    pub getdouble: GetDoubleFn,
    pub getvoid: GetVoidFn,
    pub getobj: GetObjFn,
    pub setstr: SetStrFn,
    pub setint: SetIntFn,
    pub setdouble: SetDoubleFn,
    pub setvoid: SetVoidFn,
    pub exists: KeyFn,
    pub remove: KeyFn,
}

/// Host services that are not tied to the store.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SymbolTable {
    /// NUL-terminated host name.
    pub host: *const c_char,
    pub log: LogFn,
}

// SAFETY: `host` points to immutable static data.
unsafe impl Sync for SymbolTable {}
unsafe impl Send for SymbolTable {}

/// One entry of a plugin's `function_list`.
///
/// The list ends with an entry whose `name` is null ([`FuncEntry::END`]).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FuncEntry {
    pub call: Option<PluginFn>,
    /// NUL-terminated function name.
    pub name: *const c_char,
    /// NUL-terminated free-form description of the calling contract, may be null.
    pub signature: *const c_char,
}

// SAFETY: entries only point to static strings and code.
unsafe impl Sync for FuncEntry {}
unsafe impl Send for FuncEntry {}

impl FuncEntry {
    /// List terminator.
    pub const END: FuncEntry = FuncEntry {
        call: None,
        name: ptr::null(),
        signature: ptr::null(),
    };

    pub const fn new(call: PluginFn, name: &'static CStr, signature: &'static CStr) -> Self {
        Self {
            call: Some(call),
            name: name.as_ptr(),
            signature: signature.as_ptr(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.name.is_null()
    }
}

/// A plugin-side slot holding a pointer to a host table.
///
/// Has the same layout as a plain `*const T`, so a C plugin declaring
/// `UTIL_table_t *util_table;` is compatible with it.
#[repr(transparent)]
pub struct TableSlot<T>(AtomicPtr<T>);

impl<T> TableSlot<T> {
    pub const fn empty() -> Self {
        Self(AtomicPtr::new(ptr::null_mut()))
    }

    pub fn install(&self, table: *const T) {
        self.0.store(table.cast_mut(), Ordering::Release);
    }

    pub fn as_ptr(&self) -> *const T {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_installed(&self) -> bool {
        !self.as_ptr().is_null()
    }

    /// The installed table, if any.
    pub fn get(&self) -> Option<&'static T> {
        // SAFETY: hosts only install tables with static lifetime.
        unsafe { self.as_ptr().as_ref() }
    }
}

impl<T> Default for TableSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> std::fmt::Debug for TableSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TableSlot").field(&self.as_ptr()).finish()
    }
}

/// Copies `text` into a NUL-terminated byte array at compile time.
///
/// `N` must be `text.len() + 1`.
pub const fn nul_terminated<const N: usize>(text: &str) -> [u8; N] {
    let bytes = text.as_bytes();
    assert!(bytes.len() + 1 == N, "array length must leave room for the NUL terminator");
    let mut out = [0u8; N];
    let mut i = 0;
    while i < bytes.len() {
        out[i] = bytes[i];
        i += 1;
    }
    out
}

/// Turns a `concat!(.., "\0")` literal into a `CStr` at compile time.
pub const fn static_cstr(text: &'static str) -> &'static CStr {
    match CStr::from_bytes_with_nul(text.as_bytes()) {
        Ok(s) => s,
        Err(_) => panic!("string must end with a single NUL and contain no other"),
    }
}
