//! Error types for loading, installing and dispatching into plugin modules.

use std::path::PathBuf;

use crate::backend::BackendError;
use crate::symbols::Role;

/// Result type for dynaload operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The native loader could not map the module.
    Load,
    /// The module loaded but does not satisfy the symbol contract.
    SymbolNotFound,
    /// The utility tables could not be installed.
    Install,
    /// A call named a function the module does not export.
    Dispatch,
    /// The native unload failed.
    Close,
    /// Plugin host bookkeeping (already loaded, duplicate names, ...).
    Host,
    /// Invalid configuration or an I/O problem reading it.
    Config,
}

/// Dynaload error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The native loader could not load the file.
    #[error("Failed to load module {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    /// A required contract symbol is missing.
    #[error("Module {} is missing the {role} symbol `{symbol}`: {source}", path.display())]
    SymbolNotFound {
        path: PathBuf,
        role: Role,
        symbol: String,
        #[source]
        source: BackendError,
    },

    /// The exported function list is malformed.
    #[error("Invalid function list in {}: {reason}", path.display())]
    InvalidFunctionList { path: PathBuf, reason: String },

    /// The host tables did not end up in the module.
    #[error("Failed to install utility tables into {}: {reason}", path.display())]
    Install { path: PathBuf, reason: String },

    /// Function index outside the module's function table.
    #[error("Function index {index} out of range for {} ({len} functions)", path.display())]
    IndexOutOfRange {
        path: PathBuf,
        index: usize,
        len: usize,
    },

    /// No function with this name.
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    /// The native unload failed. Host-side bookkeeping is released anyway.
    #[error("Failed to close module {}: {source}", path.display())]
    Close {
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    #[error("Plugin already loaded: {}", .0.display())]
    AlreadyLoaded(PathBuf),

    #[error("Plugin not loaded: {}", .0.display())]
    NotLoaded(PathBuf),

    /// Two plugins export the same function name.
    #[error("Function `{name}` from {} is already provided by {}", path.display(), existing.display())]
    DuplicateFunction {
        name: String,
        path: PathBuf,
        existing: PathBuf,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Load { .. } => ErrorKind::Load,
            Error::SymbolNotFound { .. } | Error::InvalidFunctionList { .. } => {
                ErrorKind::SymbolNotFound
            }
            Error::Install { .. } => ErrorKind::Install,
            Error::IndexOutOfRange { .. } | Error::FunctionNotFound(_) => ErrorKind::Dispatch,
            Error::Close { .. } => ErrorKind::Close,
            Error::AlreadyLoaded(_) | Error::NotLoaded(_) | Error::DuplicateFunction { .. } => {
                ErrorKind::Host
            }
            Error::Config(_) | Error::Io(_) | Error::Toml(_) => ErrorKind::Config,
        }
    }

    /// The contract role a `SymbolNotFound` error refers to.
    pub fn missing_role(&self) -> Option<Role> {
        match self {
            Error::SymbolNotFound { role, .. } => Some(*role),
            _ => None,
        }
    }
}
