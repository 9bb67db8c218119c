//! Calling into an installed module's function table.

use tracing::trace;

use crate::backend::LoaderBackend;
use crate::error::{Error, Result};
use crate::install::InstalledModule;
use crate::store::ArgStore;
use crate::util::StoreRef;

impl<B: LoaderBackend> InstalledModule<B> {
    /// Invokes function `index` with `store` as its only argument.
    ///
    /// An index at or past the end of the table is rejected before anything
    /// is invoked. What the function does with the store is not checked.
    pub fn call(&self, index: usize, store: &mut dyn ArgStore) -> Result<()> {
        let functions = self.functions();
        let entry = functions.get(index).ok_or_else(|| Error::IndexOutOfRange {
            path: self.path().to_path_buf(),
            index,
            len: functions.len(),
        })?;

        trace!(path = %self.path().display(), index, function = entry.name(), "Dispatching");
        let mut store_ref = StoreRef::new(store);
        // SAFETY: the module is open and installed for as long as `self`
        // lives, and the store reference outlives the call.
        unsafe { (entry.callable())(store_ref.as_raw()) };
        Ok(())
    }

    /// Invokes the first function named `name`.
    pub fn call_by_name(&self, name: &str, store: &mut dyn ArgStore) -> Result<()> {
        let index = self
            .functions()
            .position(name)
            .ok_or_else(|| Error::FunctionNotFound(name.to_string()))?;
        self.call(index, store)
    }
}
