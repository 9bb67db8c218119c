//! Opening and closing plugin modules.
//!
//! A [`ModuleHandle`] only exists for a module that passed every contract
//! check: if anything fails after the native open, the native handle is
//! closed again before the error is returned.

use std::ffi::CStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{LoaderBackend, NativeBackend};
use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::function::FunctionTable;
use crate::symbols::{Contract, SymbolResolver};

/// Opens modules through one backend with one configuration.
pub struct ModuleLoader<B: LoaderBackend = NativeBackend> {
    backend: Arc<B>,
    config: LoaderConfig,
}

impl ModuleLoader<NativeBackend> {
    /// Native backend, default configuration.
    pub fn new() -> Self {
        Self::with_backend(NativeBackend::default(), LoaderConfig::default())
    }

    pub fn with_config(config: LoaderConfig) -> Self {
        Self::with_backend(NativeBackend::default(), config)
    }
}

impl Default for ModuleLoader<NativeBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: LoaderBackend> ModuleLoader<B> {
    pub fn with_backend(backend: B, config: LoaderConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            config,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Loads the module at `path` and checks its contract.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<ModuleHandle<B>> {
        let path = path.as_ref();
        debug!(path = %path.display(), backend = B::NAME, "Opening module");

        let native = self.backend.open(path).map_err(|source| Error::Load {
            path: path.to_path_buf(),
            source,
        })?;

        let (contract, evalstr, functions) = match self.bind(&native, path) {
            Ok(bound) => bound,
            Err(err) => {
                if let Err(close_err) = self.backend.close(native) {
                    warn!(path = %path.display(), error = %close_err, "Failed to close rejected module");
                }
                return Err(err);
            }
        };

        debug!(
            path = %path.display(),
            functions = functions.len(),
            "Module opened"
        );
        Ok(ModuleHandle {
            backend: Arc::clone(&self.backend),
            native: Some(native),
            path: path.to_path_buf(),
            contract,
            evalstr,
            functions,
            verify_install: self.config.verify_install,
        })
    }

    /// Closes a module opened by any loader sharing this backend type.
    pub fn close(&self, module: ModuleHandle<B>) -> Result<()> {
        module.close()
    }

    fn bind(&self, native: &B::Handle, path: &Path) -> Result<(Contract, String, FunctionTable)> {
        let contract = SymbolResolver::new(&*self.backend).resolve_contract(native, path)?;

        // SAFETY: `evalstr` is a NUL-terminated string by contract and the
        // module is mapped for the duration of the copy.
        let evalstr = unsafe { CStr::from_ptr(contract.evalstr.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        // SAFETY: `function_list` is a terminator-ended array by contract;
        // the read is bounded by `max_functions` otherwise.
        let functions = unsafe { FunctionTable::read(contract.function_list, self.config.max_functions) }
            .map_err(|reason| Error::InvalidFunctionList {
                path: path.to_path_buf(),
                reason,
            })?;

        Ok((contract, evalstr, functions))
    }
}

/// An open module whose contract has been checked.
///
/// Closing consumes the handle. A handle dropped without [`close`] is
/// closed on drop and a failure is only logged.
///
/// [`close`]: ModuleHandle::close
pub struct ModuleHandle<B: LoaderBackend = NativeBackend> {
    backend: Arc<B>,
    native: Option<B::Handle>,
    path: PathBuf,
    pub(crate) contract: Contract,
    evalstr: String,
    functions: FunctionTable,
    pub(crate) verify_install: bool,
}

impl<B: LoaderBackend> ModuleHandle<B> {
    /// The path the module was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The module's evaluation string, copied at open time.
    pub fn evalstr(&self) -> &str {
        &self.evalstr
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn backend_name(&self) -> &'static str {
        B::NAME
    }

    /// Whether closing this handle leaves the module resident.
    pub fn load_once(&self) -> bool {
        B::LOAD_ONCE
    }

    /// The backend's own handle.
    pub fn native(&self) -> Option<&B::Handle> {
        self.native.as_ref()
    }

    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let Some(native) = self.native.take() else {
            return Ok(());
        };
        self.functions = FunctionTable::default();
        debug!(path = %self.path.display(), "Closing module");
        self.backend.close(native).map_err(|source| Error::Close {
            path: self.path.clone(),
            source,
        })
    }
}

impl<B: LoaderBackend> Drop for ModuleHandle<B> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "Failed to close module on drop");
        }
    }
}

impl<B: LoaderBackend> fmt::Debug for ModuleHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("backend", &B::NAME)
            .field("load_once", &B::LOAD_ONCE)
            .field("path", &self.path)
            .field("evalstr", &self.evalstr)
            .field("functions", &self.functions.names())
            .field("open", &self.native.is_some())
            .finish()
    }
}
