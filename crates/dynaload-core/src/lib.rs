//! Dynaload Core Library
//!
//! Loads native plugin modules at runtime, checks that they export the
//! five-symbol plugin contract, installs the host utility tables into them
//! and dispatches calls into their function tables by index.
//!
//! ## Architecture
//!
//! ```text
//! ModuleLoader::open ──> ModuleHandle ──install──> InstalledModule ──call──> plugin function
//!        │                                                                        │
//!   LoaderBackend (dlfcn / windows / shl / dyld)                UtilTable <── ArgStore
//! ```
//!
//! - `backend`: the platform loader, chosen at build time
//! - `symbols`: contract roles and their symbol names
//! - `registry`: opening and closing modules
//! - `install`: handing the host tables to a module
//! - `util`: the host side of the utility and symbol tables
//! - `store`: the associative store passed to plugin functions
//! - `host`: loaded plugins addressed by function name
//!
//! ## Example
//!
//! ```rust,no_run
//! use dynaload_core::{ArgStore, Store, Value, close_module, dispatch, open_module};
//!
//! # fn main() -> dynaload_core::Result<()> {
//! let (module, evalstr) = open_module("plugins/libfilters.so")?;
//! println!("{}", evalstr);
//!
//! let mut store = Store::new().with("n", 20i64);
//! dispatch(&module, 0, &mut store)?;
//! println!("{:?}", store.get("n").map(Value::to_string));
//!
//! close_module(module)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod function;
pub mod host;
pub mod install;
pub mod registry;
pub mod store;
pub mod symbols;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;

pub use backend::{BackendError, LoadOnce, LoaderBackend, NativeBackend};
pub use config::LoaderConfig;
pub use error::{Error, ErrorKind, Result};
pub use function::{FunctionEntry, FunctionTable};
pub use host::{FunctionInfo, PluginHost};
pub use install::{HostTables, InstalledModule};
pub use registry::{ModuleHandle, ModuleLoader};
pub use store::{ArgStore, HostObject, ParseValueError, Store, Value};
pub use symbols::{Role, SymbolNaming};

/// Opens the module at `path` with the native backend and installs the
/// default host tables.
///
/// Returns the installed module and its evaluation string.
pub fn open_module(path: impl AsRef<Path>) -> Result<(InstalledModule, String)> {
    let module = ModuleLoader::new().open(path)?.install(&HostTables::default())?;
    let evalstr = module.evalstr().to_string();
    Ok((module, evalstr))
}

/// Closes a module returned by [`open_module`].
pub fn close_module<B: LoaderBackend>(module: InstalledModule<B>) -> Result<()> {
    module.close()
}

/// Invokes function `index` of `module` with `store`.
pub fn dispatch<B: LoaderBackend>(
    module: &InstalledModule<B>,
    index: usize,
    store: &mut dyn ArgStore,
) -> Result<()> {
    module.call(index, store)
}

/// Prelude module with common imports
pub mod prelude {
    pub use crate::{
        ArgStore, Error, HostObject, HostTables, InstalledModule, LoaderConfig, ModuleHandle,
        ModuleLoader, PluginHost, Result, Store, Value, close_module, dispatch, open_module,
    };
}
