//! A set of loaded plugins addressed by function name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::backend::{LoaderBackend, NativeBackend};
use crate::config::{LoaderConfig, is_plugin_file};
use crate::error::{Error, Result};
use crate::install::{HostTables, InstalledModule};
use crate::registry::ModuleLoader;
use crate::store::ArgStore;

/// A function exported by a loaded plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    pub signature: String,
    pub plugin: PathBuf,
    pub index: usize,
}

struct HostState<B: LoaderBackend> {
    plugins: HashMap<PathBuf, InstalledModule<B>>,
    /// Function name -> (plugin key, index in its table).
    functions: HashMap<String, (PathBuf, usize)>,
}

/// Keeps installed plugins and dispatches calls to them by function name.
///
/// Function names are unique across the host. Calls take the read lock,
/// loads and unloads the write lock, so a plugin is never closed while one
/// of its functions runs.
pub struct PluginHost<B: LoaderBackend = NativeBackend> {
    loader: ModuleLoader<B>,
    tables: HostTables,
    state: RwLock<HostState<B>>,
}

impl PluginHost<NativeBackend> {
    pub fn new() -> Self {
        Self::with_loader(ModuleLoader::new())
    }

    pub fn with_config(config: LoaderConfig) -> Self {
        Self::with_loader(ModuleLoader::with_config(config))
    }
}

impl Default for PluginHost<NativeBackend> {
    fn default() -> Self {
        Self::new()
    }
}

fn plugin_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl<B: LoaderBackend> PluginHost<B> {
    pub fn with_loader(loader: ModuleLoader<B>) -> Self {
        Self {
            loader,
            tables: HostTables::default(),
            state: RwLock::new(HostState {
                plugins: HashMap::new(),
                functions: HashMap::new(),
            }),
        }
    }

    pub fn with_tables(mut self, tables: HostTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn loader(&self) -> &ModuleLoader<B> {
        &self.loader
    }

    /// Loads and installs a plugin, returning its evaluation string.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let key = plugin_key(path);
        let mut state = self.state.write();

        if state.plugins.contains_key(&key) {
            return Err(Error::AlreadyLoaded(key));
        }

        let module = self.loader.open(path)?.install(&self.tables)?;

        let clash = module.functions().iter().find_map(|entry| {
            state
                .functions
                .get(entry.name())
                .map(|(existing, _)| (entry.name().to_string(), existing.clone()))
        });
        if let Some((name, existing)) = clash {
            if let Err(e) = module.close() {
                warn!(path = %path.display(), error = %e, "Failed to close rejected plugin");
            }
            return Err(Error::DuplicateFunction {
                name,
                path: key,
                existing,
            });
        }

        for (index, entry) in module.functions().iter().enumerate() {
            state
                .functions
                .entry(entry.name().to_string())
                .or_insert_with(|| (key.clone(), index));
        }
        let evalstr = module.evalstr().to_string();
        info!(
            path = %key.display(),
            functions = module.functions().len(),
            "Plugin loaded"
        );
        state.plugins.insert(key, module);
        Ok(evalstr)
    }

    /// Closes a plugin and forgets its functions.
    pub fn unload(&self, path: impl AsRef<Path>) -> Result<()> {
        let key = plugin_key(path.as_ref());
        let mut state = self.state.write();
        let module = state
            .plugins
            .remove(&key)
            .ok_or_else(|| Error::NotLoaded(key.clone()))?;
        state.functions.retain(|_, (plugin, _)| *plugin != key);
        drop(state);

        info!(path = %key.display(), "Plugin unloaded");
        module.close()
    }

    /// Calls the function `name` from whichever plugin provides it.
    pub fn call(&self, name: &str, store: &mut dyn ArgStore) -> Result<()> {
        let state = self.state.read();
        let (key, index) = state
            .functions
            .get(name)
            .ok_or_else(|| Error::FunctionNotFound(name.to_string()))?;
        let module = state
            .plugins
            .get(key)
            .ok_or_else(|| Error::NotLoaded(key.clone()))?;
        module.call(*index, store)
    }

    /// All functions, sorted by name.
    pub fn functions(&self) -> Vec<FunctionInfo> {
        let state = self.state.read();
        let mut infos: Vec<FunctionInfo> = state
            .functions
            .iter()
            .filter_map(|(name, (key, index))| {
                let entry = state.plugins.get(key)?.functions().get(*index)?;
                Some(FunctionInfo {
                    name: name.clone(),
                    signature: entry.signature().to_string(),
                    plugin: key.clone(),
                    index: *index,
                })
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Paths of loaded plugins, sorted.
    pub fn loaded(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.state.read().plugins.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn is_loaded(&self, path: impl AsRef<Path>) -> bool {
        self.state.read().plugins.contains_key(&plugin_key(path.as_ref()))
    }

    pub fn evalstr(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state
            .read()
            .plugins
            .get(&plugin_key(path.as_ref()))
            .map(|m| m.evalstr().to_string())
    }

    /// Plugin files in the configured search paths.
    pub fn discover(&self) -> Vec<PathBuf> {
        discover_in(&self.loader.config().search_paths)
    }

    /// Loads every discovered plugin, logging the ones that fail.
    ///
    /// Returns the number of plugins loaded.
    pub fn load_all(&self) -> usize {
        let mut loaded = 0;
        for path in self.discover() {
            match self.load(&path) {
                Ok(_) => loaded += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping plugin"),
            }
        }
        loaded
    }
}

/// Plugin files directly inside `dirs`, in directory order then by name.
pub fn discover_in(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping plugin directory");
                continue;
            }
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_plugin_file(path))
            .collect();
        files.sort();
        found.extend(files);
    }
    found
}

#[cfg(test)]
mod tests {
    use std::env::consts::DLL_EXTENSION;

    use std::ffi::{c_char, c_int};

    use dynaload_plugin_sdk::abi::SymbolTable;

    use super::*;
    use crate::error::ErrorKind;
    use crate::store::{Store, Value};
    use crate::testing::{EXTRA_FUNCTIONS, FakeBackend, FakeModule};
    use crate::util::HOST_UTIL_TABLE;

    unsafe extern "C" fn quiet_log(_level: c_int, _message: *const c_char) {}

    static EMBEDDER_SYMBOLS: SymbolTable = SymbolTable {
        host: c"embedder".as_ptr(),
        log: quiet_log,
    };

    fn host() -> PluginHost<FakeBackend> {
        let backend = FakeBackend::new();
        backend.register("/plugins/libbase.so", FakeModule::complete());
        backend.register("/plugins/libextra.so", FakeModule::complete().with_functions(&EXTRA_FUNCTIONS));
        backend.register("/plugins/libclash.so", FakeModule::complete());
        PluginHost::with_loader(ModuleLoader::with_backend(backend, LoaderConfig::default()))
    }

    #[test]
    fn test_load_and_call_by_name() {
        let host = host();
        let evalstr = host.load("/plugins/libbase.so").unwrap();
        assert_eq!(evalstr, FakeModule::EVALSTR.to_str().unwrap());
        host.load("/plugins/libextra.so").unwrap();

        let mut store = Store::new().with("n", 5i64);
        host.call("increment", &mut store).unwrap();
        host.call("double", &mut store).unwrap();
        assert_eq!(store.get("n").and_then(Value::as_int), Some(12));

        let names: Vec<_> = host.functions().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["double", "increment", "inspect", "mark"]);
        assert_eq!(host.loaded().len(), 2);
    }

    #[test]
    fn test_rejects_already_loaded() {
        let host = host();
        host.load("/plugins/libbase.so").unwrap();
        let err = host.load("/plugins/libbase.so").unwrap_err();
        assert!(matches!(err, Error::AlreadyLoaded(_)));
        assert_eq!(host.loader().backend().open_count(), 1);
    }

    #[test]
    fn test_rejects_duplicate_function_names() {
        let host = host();
        host.load("/plugins/libbase.so").unwrap();

        let err = host.load("/plugins/libclash.so").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Host);
        match err {
            Error::DuplicateFunction { existing, path, .. } => {
                assert_eq!(existing, PathBuf::from("/plugins/libbase.so"));
                assert_eq!(path, PathBuf::from("/plugins/libclash.so"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!host.is_loaded("/plugins/libclash.so"));
        assert_eq!(host.loader().backend().close_count(), 1);
    }

    #[test]
    fn test_unload() {
        let host = host();
        host.load("/plugins/libextra.so").unwrap();
        host.unload("/plugins/libextra.so").unwrap();

        let mut store = Store::new();
        let err = host.call("double", &mut store).unwrap_err();
        assert!(matches!(err, Error::FunctionNotFound(_)));
        assert!(host.functions().is_empty());

        let err = host.unload("/plugins/libextra.so").unwrap_err();
        assert!(matches!(err, Error::NotLoaded(_)));
    }

    #[test]
    fn test_custom_tables_are_installed() {
        let backend = FakeBackend::new();
        backend.register("/plugins/libown.so", FakeModule::complete().with_own_slots());
        let host = PluginHost::with_loader(ModuleLoader::with_backend(backend, LoaderConfig::default()))
            .with_tables(HostTables::new(&EMBEDDER_SYMBOLS, &HOST_UTIL_TABLE));

        host.load("/plugins/libown.so").unwrap();
        assert!(std::ptr::eq(FakeModule::own_symbol_table(), &EMBEDDER_SYMBOLS));
        assert!(host.is_loaded("/plugins/libown.so"));
    }

    #[test]
    fn test_discover_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(format!("b.{}", DLL_EXTENSION)), b"").unwrap();
        std::fs::write(dir.path().join(format!("a.{}", DLL_EXTENSION)), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join(format!("sub.{}", DLL_EXTENSION))).unwrap();

        let found = discover_in(&[dir.path().to_path_buf(), PathBuf::from("/nonexistent/plugins")]);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![format!("a.{}", DLL_EXTENSION), format!("b.{}", DLL_EXTENSION)]
        );
    }
}
