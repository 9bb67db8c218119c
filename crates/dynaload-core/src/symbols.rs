//! The five-symbol plugin contract and its resolution.
//!
//! Every module must export:
//!
//! | Role | Plain name | Underscore-prefixed name |
//! |---|---|---|
//! | evaluation string | `evalstr` | `_evalstr` |
//! | symbol table | `symbol_table` | `_symbol_table` |
//! | utility table | `util_table` | `_util_table` |
//! | function list | `function_list` | `_function_list` |
//! | install entry point | `install_tables` | `_install_tables` |
//!
//! Which column applies is fixed at build time by [`SymbolNaming::BUILD`].

use std::ffi::{CStr, c_char, c_void};
use std::fmt;
use std::path::Path;
use std::ptr::NonNull;

use dynaload_plugin_sdk::abi::{FuncEntry, InstallTablesFn, SymbolTable, TableSlot, UtilTable};
use tracing::trace;

use crate::backend::LoaderBackend;
use crate::error::{Error, Result};

/// A symbol role in the plugin contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    EvalStr,
    SymbolTable,
    UtilTable,
    FunctionList,
    InstallTables,
}

impl Role {
    /// All roles, in the order they are resolved.
    pub const ALL: [Role; 5] = [
        Role::EvalStr,
        Role::SymbolTable,
        Role::UtilTable,
        Role::FunctionList,
        Role::InstallTables,
    ];

    pub const fn plain_name(self) -> &'static CStr {
        match self {
            Role::EvalStr => c"evalstr",
            Role::SymbolTable => c"symbol_table",
            Role::UtilTable => c"util_table",
            Role::FunctionList => c"function_list",
            Role::InstallTables => c"install_tables",
        }
    }

    pub const fn underscored_name(self) -> &'static CStr {
        match self {
            Role::EvalStr => c"_evalstr",
            Role::SymbolTable => c"_symbol_table",
            Role::UtilTable => c"_util_table",
            Role::FunctionList => c"_function_list",
            Role::InstallTables => c"_install_tables",
        }
    }

    /// The concrete symbol name under `naming`.
    pub const fn symbol_name(self, naming: SymbolNaming) -> &'static CStr {
        match naming {
            SymbolNaming::Plain => self.plain_name(),
            SymbolNaming::Underscored => self.underscored_name(),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Role::EvalStr => "evaluation string",
            Role::SymbolTable => "symbol table",
            Role::UtilTable => "utility table",
            Role::FunctionList => "function list",
            Role::InstallTables => "install entry point",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// How contract roles map to symbol names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolNaming {
    Plain,
    Underscored,
}

impl SymbolNaming {
    /// The convention this build resolves symbols with.
    pub const BUILD: SymbolNaming = if cfg!(any(
        feature = "underscore-symbols",
        all(target_os = "macos", feature = "mach-dyld")
    )) {
        SymbolNaming::Underscored
    } else {
        SymbolNaming::Plain
    };

    pub const fn prefix(self) -> &'static str {
        match self {
            SymbolNaming::Plain => "",
            SymbolNaming::Underscored => "_",
        }
    }
}

/// Addresses of the five contract symbols inside one open module.
///
/// Only valid until the module is closed.
#[derive(Debug, Clone, Copy)]
pub struct Contract {
    pub evalstr: NonNull<c_char>,
    pub symbol_table: NonNull<TableSlot<SymbolTable>>,
    pub util_table: NonNull<TableSlot<UtilTable>>,
    pub function_list: NonNull<FuncEntry>,
    pub install_tables: InstallTablesFn,
}

// SAFETY: the addresses point into a mapped module that is only read through
// them, or written through the atomic table slots.
unsafe impl Send for Contract {}
unsafe impl Sync for Contract {}

/// Resolves contract roles inside modules opened by one backend.
pub struct SymbolResolver<'a, B: LoaderBackend> {
    backend: &'a B,
    naming: SymbolNaming,
}

impl<'a, B: LoaderBackend> SymbolResolver<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            naming: SymbolNaming::BUILD,
        }
    }

    pub fn naming(&self) -> SymbolNaming {
        self.naming
    }

    /// Address of one role's symbol.
    pub fn resolve(&self, handle: &B::Handle, path: &Path, role: Role) -> Result<NonNull<c_void>> {
        let symbol = role.symbol_name(self.naming);
        trace!(path = %path.display(), symbol = %symbol.to_string_lossy(), "Resolving symbol");
        self.backend
            .resolve(handle, symbol)
            .map_err(|source| Error::SymbolNotFound {
                path: path.to_path_buf(),
                role,
                symbol: symbol.to_string_lossy().into_owned(),
                source,
            })
    }

    /// Resolves all five roles; fails on the first missing one.
    pub fn resolve_contract(&self, handle: &B::Handle, path: &Path) -> Result<Contract> {
        let mut addresses = [NonNull::<c_void>::dangling(); 5];
        for (slot, role) in addresses.iter_mut().zip(Role::ALL) {
            *slot = self.resolve(handle, path, role)?;
        }
        let [evalstr, symbol_table, util_table, function_list, install_tables] = addresses;

        // SAFETY: the install entry point is exported as a function with the
        // `InstallTablesFn` signature by contract.
        let install_tables =
            unsafe { std::mem::transmute::<*mut c_void, InstallTablesFn>(install_tables.as_ptr()) };

        Ok(Contract {
            evalstr: evalstr.cast(),
            symbol_table: symbol_table.cast(),
            util_table: util_table.cast(),
            function_list: function_list.cast(),
            install_tables,
        })
    }
}
