//! Installing the host tables into an opened module.

use std::fmt;
use std::path::Path;

use dynaload_plugin_sdk::abi::{SymbolTable, UtilTable};
use tracing::{debug, warn};

use crate::backend::{LoaderBackend, NativeBackend};
use crate::error::{Error, Result};
use crate::function::FunctionTable;
use crate::registry::ModuleHandle;
use crate::util::{HOST_SYMBOL_TABLE, HOST_UTIL_TABLE};

/// The pair of tables handed to `install_tables`.
#[derive(Debug, Clone, Copy)]
pub struct HostTables {
    pub symbols: &'static SymbolTable,
    pub util: &'static UtilTable,
}

impl HostTables {
    pub const fn new(symbols: &'static SymbolTable, util: &'static UtilTable) -> Self {
        Self { symbols, util }
    }
}

impl Default for HostTables {
    /// The host's built-in tables.
    fn default() -> Self {
        Self::new(&HOST_SYMBOL_TABLE, &HOST_UTIL_TABLE)
    }
}

impl<B: LoaderBackend> ModuleHandle<B> {
    /// Calls the module's `install_tables` entry point with `tables`.
    ///
    /// Consumes the handle, so a module is installed once and only an
    /// installed module can be dispatched into. When verification is on and
    /// the module's table slots do not hold `tables` afterwards, the module
    /// is closed and `Error::Install` is returned.
    pub fn install(self, tables: &HostTables) -> Result<InstalledModule<B>> {
        debug!(path = %self.path().display(), "Installing host tables");

        // SAFETY: the entry point was resolved from this still-open module and
        // the tables are static.
        unsafe { (self.contract.install_tables)(tables.symbols, tables.util) };

        if self.verify_install {
            if let Err(reason) = self.check_installed(tables) {
                let path = self.path().to_path_buf();
                if let Err(e) = self.close() {
                    warn!(path = %path.display(), error = %e, "Failed to close module after install failure");
                }
                return Err(Error::Install { path, reason });
            }
        }

        Ok(InstalledModule {
            module: self,
            tables: *tables,
        })
    }

    fn check_installed(&self, tables: &HostTables) -> std::result::Result<(), String> {
        // SAFETY: the slots live in the open module.
        let (symbols, util) = unsafe {
            (
                self.contract.symbol_table.as_ref().as_ptr(),
                self.contract.util_table.as_ref().as_ptr(),
            )
        };
        if !std::ptr::eq(symbols, tables.symbols) {
            return Err("symbol table slot does not hold the host table".to_string());
        }
        if !std::ptr::eq(util, tables.util) {
            return Err("utility table slot does not hold the host table".to_string());
        }
        Ok(())
    }
}

/// A module with the host tables installed, ready for dispatch.
pub struct InstalledModule<B: LoaderBackend = NativeBackend> {
    module: ModuleHandle<B>,
    tables: HostTables,
}

impl<B: LoaderBackend> InstalledModule<B> {
    pub fn path(&self) -> &Path {
        self.module.path()
    }

    pub fn evalstr(&self) -> &str {
        self.module.evalstr()
    }

    pub fn functions(&self) -> &FunctionTable {
        self.module.functions()
    }

    pub fn tables(&self) -> &HostTables {
        &self.tables
    }

    pub fn handle(&self) -> &ModuleHandle<B> {
        &self.module
    }

    pub fn close(self) -> Result<()> {
        self.module.close()
    }
}

impl<B: LoaderBackend> fmt::Debug for InstalledModule<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstalledModule")
            .field("module", &self.module)
            .finish()
    }
}
