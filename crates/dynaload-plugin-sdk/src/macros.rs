//! Declarative macros for plugin development.

/// Exports the five contract symbols for a plugin module.
///
/// Generates, with plain (unprefixed) names:
/// - `evalstr`: the given text, NUL-terminated
/// - `symbol_table` / `util_table`: empty table slots
/// - `install_tables`: fills both slots
/// - `function_list`: one entry per function plus the terminator
///
/// Each listed function has the signature `fn(&mut CallArgs<'_>)` and is
/// wrapped in an `extern "C"` shim that catches panics.
///
/// The host must call `install_tables` before any exported function. A call
/// made earlier returns without running the function.
///
/// # Example
///
/// ```rust,ignore
/// use dynaload_plugin_sdk::prelude::*;
///
/// fn invert(args: &mut CallArgs<'_>) {
///     if let Some(v) = args.get_double("value") {
///         args.set_double("value", -v);
///     }
/// }
///
/// export_plugin! {
///     evalstr: "invert filter",
///     functions: [
///         { name: "invert", signature: "value:double -> value:double", call: invert },
///     ],
/// }
/// ```
#[macro_export]
macro_rules! export_plugin {
    (
        evalstr: $evalstr:expr,
        functions: [
            $( { name: $name:literal, signature: $signature:literal, call: $func:path $(,)? } ),* $(,)?
        ] $(,)?
    ) => {
        const __DYNALOAD_EVALSTR: &str = $evalstr;

        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static evalstr: [u8; __DYNALOAD_EVALSTR.len() + 1] =
            $crate::abi::nul_terminated(__DYNALOAD_EVALSTR);

        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static symbol_table: $crate::abi::TableSlot<$crate::abi::SymbolTable> =
            $crate::abi::TableSlot::empty();

        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static util_table: $crate::abi::TableSlot<$crate::abi::UtilTable> =
            $crate::abi::TableSlot::empty();

        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static function_list: [$crate::abi::FuncEntry; {
            let names: &[&str] = &[$($name),*];
            names.len() + 1
        }] = [
            $(
                $crate::abi::FuncEntry::new(
                    {
                        unsafe extern "C" fn shim(store: *mut ::std::ffi::c_void) {
                            // SAFETY: the host passes its store pointer straight through.
                            unsafe { $crate::args::invoke(store, &symbol_table, &util_table, $func) }
                        }
                        shim
                    },
                    $crate::abi::static_cstr(concat!($name, "\0")),
                    $crate::abi::static_cstr(concat!($signature, "\0")),
                ),
            )*
            $crate::abi::FuncEntry::END,
        ];

        #[no_mangle]
        pub unsafe extern "C" fn install_tables(
            symbols: *const $crate::abi::SymbolTable,
            util: *const $crate::abi::UtilTable,
        ) {
            symbol_table.install(symbols);
            util_table.install(util);
        }
    };
}
