//! The function table read from a module's `function_list`.

use std::ffi::CStr;
use std::fmt;
use std::ptr::NonNull;

use dynaload_plugin_sdk::abi::{FuncEntry, PluginFn};

/// One callable exported by a module.
#[derive(Clone)]
pub struct FunctionEntry {
    name: String,
    signature: String,
    call: PluginFn,
}

impl FunctionEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form description of the calling contract.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub(crate) fn callable(&self) -> PluginFn {
        self.call
    }
}

impl fmt::Debug for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEntry")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("call", &(self.call as *const ()))
            .finish()
    }
}

/// Ordered function entries, fixed once the module is opened.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    entries: Vec<FunctionEntry>,
}

impl FunctionTable {
    /// Reads a terminator-ended list.
    ///
    /// Fails when an entry has a name but no callable, or when no terminator
    /// shows up within `max` entries.
    ///
    /// # Safety
    /// `list` must point to a readable array of `FuncEntry` values ending
    /// with an entry whose name is null, or holding at least `max + 1`
    /// entries. Names and signatures must be NUL-terminated strings.
    pub unsafe fn read(list: NonNull<FuncEntry>, max: usize) -> Result<Self, String> {
        let mut entries = Vec::new();
        for index in 0..=max {
            // SAFETY: caller guarantees the array extends to a terminator or `max`.
            let entry = unsafe { list.as_ptr().add(index).read() };
            if entry.is_terminator() {
                return Ok(Self { entries });
            }
            if index == max {
                break;
            }

            // SAFETY: non-null names are NUL-terminated by contract.
            let name = unsafe { CStr::from_ptr(entry.name) }.to_string_lossy().into_owned();
            let Some(call) = entry.call else {
                return Err(format!("entry {} (`{}`) has no callable", index, name));
            };
            let signature = if entry.signature.is_null() {
                String::new()
            } else {
                // SAFETY: as for the name.
                unsafe { CStr::from_ptr(entry.signature) }.to_string_lossy().into_owned()
            };
            entries.push(FunctionEntry { name, signature, call });
        }
        Err(format!("no terminator within {} entries", max))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FunctionEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionEntry> {
        self.entries.iter()
    }

    /// Index of the first entry named `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}
