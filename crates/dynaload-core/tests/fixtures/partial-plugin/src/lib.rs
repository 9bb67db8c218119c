//! Plugin exporting only the evaluation string and the table slots.
//!
//! `function_list` and `install_tables` are missing, so the host must
//! refuse it.

use dynaload_plugin_sdk::abi::{SymbolTable, TableSlot, UtilTable, nul_terminated};

#[no_mangle]
#[allow(non_upper_case_globals)]
pub static evalstr: [u8; 15] = nul_terminated("partial plugin");

#[no_mangle]
#[allow(non_upper_case_globals)]
pub static symbol_table: TableSlot<SymbolTable> = TableSlot::empty();

#[no_mangle]
#[allow(non_upper_case_globals)]
pub static util_table: TableSlot<UtilTable> = TableSlot::empty();
