//! Dynaload Plugin SDK
//!
//! Everything a plugin module needs to satisfy the host's five-symbol
//! contract:
//! - `evalstr`: evaluation / description text handed back to the host
//! - `symbol_table`: slot receiving the host service table
//! - `util_table`: slot receiving the host utility (store access) table
//! - `function_list`: null-name terminated list of callable entries
//! - `install_tables`: entry point the host calls to fill both slots
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use dynaload_plugin_sdk::prelude::*;
//!
//! fn add(args: &mut CallArgs<'_>) {
//!     let a = args.get_int("a").unwrap_or(0);
//!     let b = args.get_int("b").unwrap_or(0);
//!     args.set_int("sum", a + b);
//! }
//!
//! export_plugin! {
//!     evalstr: "arithmetic filters",
//!     functions: [
//!         { name: "add", signature: "a:int b:int -> sum:int", call: add },
//!     ],
//! }
//! ```
//!
//! The host side of the same ABI lives in `dynaload-core`.

pub mod abi;
pub mod args;
#[macro_use]
pub mod macros;

pub use abi::{
    FuncEntry, InstallTablesFn, LogFn, PluginFn, SymbolTable, TableSlot, UtilTable, log_level,
};
pub use args::{CallArgs, invoke};

/// Prelude module with common imports
pub mod prelude {
    pub use crate::abi::{FuncEntry, SymbolTable, TableSlot, UtilTable, log_level};
    pub use crate::args::CallArgs;
    pub use crate::export_plugin;
}
