//! In-process fake loader for unit tests.
//!
//! "Modules" are sets of addresses of statics defined in the test binary,
//! registered under a path. Their functions go through the plugin SDK the
//! same way a real plugin's would.

use std::collections::HashMap;
use std::ffi::{CStr, c_void};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use dynaload_plugin_sdk::abi::{FuncEntry, InstallTablesFn, SymbolTable, TableSlot, UtilTable};
use dynaload_plugin_sdk::{CallArgs, invoke};
use parking_lot::Mutex;

use crate::backend::{BackendError, LoaderBackend};
use crate::symbols::{Role, SymbolNaming};

static SYMBOL_SLOT: TableSlot<SymbolTable> = TableSlot::empty();
static UTIL_SLOT: TableSlot<UtilTable> = TableSlot::empty();

// Never written: modules ignoring `install_tables` point at these.
static IDLE_SYMBOL_SLOT: TableSlot<SymbolTable> = TableSlot::empty();
static IDLE_UTIL_SLOT: TableSlot<UtilTable> = TableSlot::empty();

unsafe extern "C" fn fake_install(symbols: *const SymbolTable, util: *const UtilTable) {
    SYMBOL_SLOT.install(symbols);
    UTIL_SLOT.install(util);
}

// Written only by modules built with `with_own_slots`.
static OWN_SYMBOL_SLOT: TableSlot<SymbolTable> = TableSlot::empty();
static OWN_UTIL_SLOT: TableSlot<UtilTable> = TableSlot::empty();

unsafe extern "C" fn idle_install(_symbols: *const SymbolTable, _util: *const UtilTable) {}

unsafe extern "C" fn own_install(symbols: *const SymbolTable, util: *const UtilTable) {
    OWN_SYMBOL_SLOT.install(symbols);
    OWN_UTIL_SLOT.install(util);
}

fn inspect(args: &mut CallArgs<'_>) {
    if let Some(obj) = args.get_object("obj", "Imager") {
        args.set_int("obj_ptr", obj as i64);
    }
    if let Some(n) = args.get_int("n") {
        args.set_int("n_seen", n);
    }
    if let Some(x) = args.get_double("x") {
        args.set_double("x_seen", x);
    }
    if let Some(p) = args.get_ptr("p") {
        args.set_int("p_seen", p as i64);
    }
    let found = args.get_int("missing").is_some();
    args.set_int("missing_found", i64::from(found));
}

fn increment(args: &mut CallArgs<'_>) {
    let n = args.get_int("n").unwrap_or(0);
    args.set_int("n", n + 1);
}

fn mark(args: &mut CallArgs<'_>) {
    args.set_str("marked", "yes");
}

fn double(args: &mut CallArgs<'_>) {
    let n = args.get_int("n").unwrap_or(0);
    args.set_int("n", n * 2);
}

unsafe extern "C" fn inspect_shim(store: *mut c_void) {
    unsafe { invoke(store, &SYMBOL_SLOT, &UTIL_SLOT, inspect) }
}

unsafe extern "C" fn increment_shim(store: *mut c_void) {
    unsafe { invoke(store, &SYMBOL_SLOT, &UTIL_SLOT, increment) }
}

unsafe extern "C" fn mark_shim(store: *mut c_void) {
    unsafe { invoke(store, &SYMBOL_SLOT, &UTIL_SLOT, mark) }
}

unsafe extern "C" fn double_shim(store: *mut c_void) {
    unsafe { invoke(store, &SYMBOL_SLOT, &UTIL_SLOT, double) }
}

static FUNCTIONS: [FuncEntry; 4] = [
    FuncEntry::new(inspect_shim, c"inspect", c"obj:Imager n:int x:double p:ptr"),
    FuncEntry::new(increment_shim, c"increment", c"n:int -> n:int"),
    FuncEntry::new(mark_shim, c"mark", c"-> marked:str"),
    FuncEntry::END,
];

/// A function list with names disjoint from the default one.
pub static EXTRA_FUNCTIONS: [FuncEntry; 2] = [
    FuncEntry::new(double_shim, c"double", c"n:int -> n:int"),
    FuncEntry::END,
];

static BROKEN_FUNCTIONS: [FuncEntry; 2] = [
    FuncEntry {
        call: None,
        name: c"broken".as_ptr(),
        signature: ptr::null(),
    },
    FuncEntry::END,
];

/// Addresses a fake module exports, by role.
#[derive(Debug, Clone)]
pub struct FakeModule {
    symbols: HashMap<Role, usize>,
}

impl FakeModule {
    pub const EVALSTR: &'static CStr = c"fake module for tests";
    pub const FUNCTION_NAMES: [&'static str; 3] = ["inspect", "increment", "mark"];

    /// All five roles, with a working `install_tables`.
    pub fn complete() -> Self {
        let install: InstallTablesFn = fake_install;
        let symbols = HashMap::from([
            (Role::EvalStr, Self::EVALSTR.as_ptr() as usize),
            (Role::SymbolTable, &SYMBOL_SLOT as *const _ as usize),
            (Role::UtilTable, &UTIL_SLOT as *const _ as usize),
            (Role::FunctionList, FUNCTIONS.as_ptr() as usize),
            (Role::InstallTables, install as usize),
        ]);
        Self { symbols }
    }

    pub fn without(mut self, role: Role) -> Self {
        self.symbols.remove(&role);
        self
    }

    pub fn with_functions(mut self, list: &'static [FuncEntry]) -> Self {
        self.symbols.insert(Role::FunctionList, list.as_ptr() as usize);
        self
    }

    /// A function list whose first entry has no callable.
    pub fn with_broken_list(self) -> Self {
        self.with_functions(&BROKEN_FUNCTIONS)
    }

    /// An `install_tables` that stores nothing.
    pub fn ignoring_install(mut self) -> Self {
        let install: InstallTablesFn = idle_install;
        self.symbols.insert(Role::InstallTables, install as usize);
        self.symbols.insert(Role::SymbolTable, &IDLE_SYMBOL_SLOT as *const _ as usize);
        self.symbols.insert(Role::UtilTable, &IDLE_UTIL_SLOT as *const _ as usize);
        self
    }

    /// Table slots no other fake module shares, so a test can install
    /// custom tables without racing the others.
    pub fn with_own_slots(mut self) -> Self {
        let install: InstallTablesFn = own_install;
        self.symbols.insert(Role::InstallTables, install as usize);
        self.symbols.insert(Role::SymbolTable, &OWN_SYMBOL_SLOT as *const _ as usize);
        self.symbols.insert(Role::UtilTable, &OWN_UTIL_SLOT as *const _ as usize);
        self
    }

    /// The symbol table last installed into a `with_own_slots` module.
    pub fn own_symbol_table() -> *const SymbolTable {
        OWN_SYMBOL_SLOT.as_ptr()
    }
}

/// A fake native handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeHandle {
    path: PathBuf,
    serial: u64,
}

/// Loader serving [`FakeModule`]s registered by path.
#[derive(Debug, Default)]
pub struct FakeBackend {
    modules: Mutex<HashMap<PathBuf, FakeModule>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    resolves: AtomicUsize,
    serial: AtomicU64,
    fail_close: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: impl Into<PathBuf>, module: FakeModule) {
        self.modules.lock().insert(path.into(), module);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Close attempts, failed ones included.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }
}

impl LoaderBackend for FakeBackend {
    type Handle = FakeHandle;

    const NAME: &'static str = "fake";
    const LOAD_ONCE: bool = false;

    fn open(&self, path: &Path) -> Result<FakeHandle, BackendError> {
        if !self.modules.lock().contains_key(path) {
            return Err(BackendError::new(format!(
                "{}: cannot open shared object file: No such file or directory",
                path.display()
            )));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(FakeHandle {
            path: path.to_path_buf(),
            serial: self.serial.fetch_add(1, Ordering::SeqCst),
        })
    }

    fn resolve(&self, handle: &FakeHandle, symbol: &CStr) -> Result<NonNull<c_void>, BackendError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        let modules = self.modules.lock();
        let module = modules
            .get(&handle.path)
            .ok_or_else(|| BackendError::new("module is not registered"))?;
        Role::ALL
            .into_iter()
            .find(|role| role.symbol_name(SymbolNaming::BUILD) == symbol)
            .and_then(|role| module.symbols.get(&role))
            .and_then(|&address| NonNull::new(address as *mut c_void))
            .ok_or_else(|| BackendError::new(format!("undefined symbol: {}", symbol.to_string_lossy())))
    }

    fn close(&self, _handle: FakeHandle) -> Result<(), BackendError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(BackendError::new("close refused"));
        }
        Ok(())
    }
}
