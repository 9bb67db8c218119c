//! Load-at-most-once adapter.

use std::collections::HashMap;
use std::ffi::{CStr, c_void};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{BackendError, LoaderBackend};

type ResidentMap<H> = Arc<Mutex<HashMap<PathBuf, H>>>;

/// Maps each path at most once and keeps it resident.
///
/// Opens are serialised by one mutex, so two threads opening the same path
/// concurrently observe a single native load and receive handles to the
/// same module. `close` leaves the module mapped; re-opening a closed path
/// returns the resident module with its state intact.
pub struct LoadOnce<B: LoaderBackend> {
    inner: B,
    resident: ResidentMap<B::Handle>,
}

impl<B: LoaderBackend> LoadOnce<B>
where
    B::Handle: Clone,
{
    /// Wraps `inner` with a cache of its own.
    pub fn new(inner: B) -> Self {
        Self::with_cache(inner, Arc::new(Mutex::new(HashMap::new())))
    }

    /// Wraps `inner` with a shared cache.
    pub fn with_cache(inner: B, resident: ResidentMap<B::Handle>) -> Self {
        Self { inner, resident }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn is_resident(&self, path: &Path) -> bool {
        self.resident.lock().contains_key(&cache_key(path))
    }

    pub fn resident_count(&self) -> usize {
        self.resident.lock().len()
    }
}

fn cache_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl<B: LoaderBackend> LoaderBackend for LoadOnce<B>
where
    B::Handle: Clone,
{
    type Handle = B::Handle;

    const NAME: &'static str = B::NAME;
    const LOAD_ONCE: bool = true;

    fn open(&self, path: &Path) -> Result<B::Handle, BackendError> {
        let key = cache_key(path);
        let mut resident = self.resident.lock();
        if let Some(handle) = resident.get(&key) {
            debug!(path = %path.display(), "Module already resident, reusing it");
            return Ok(handle.clone());
        }
        let handle = self.inner.open(path)?;
        resident.insert(key, handle.clone());
        Ok(handle)
    }

    fn resolve(&self, handle: &B::Handle, symbol: &CStr) -> Result<NonNull<c_void>, BackendError> {
        self.inner.resolve(handle, symbol)
    }

    fn close(&self, _handle: B::Handle) -> Result<(), BackendError> {
        Ok(())
    }
}
