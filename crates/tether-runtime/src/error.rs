use thiserror::Error;

use tether_core::{FrameworkError, NativeObjectId};
use tether_types::RegistryError;

/// Failures while locating or bootstrapping the managed host.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("hostfxr not found: {0}")]
    LibraryNotFound(String),

    #[error("hostfxr export missing: {0}")]
    MissingExport(&'static str),

    #[error("{call} failed with status {status:#x}")]
    HostCall { call: &'static str, status: i32 },

    #[error("managed entry point {0} could not be resolved")]
    EntryPointNotFound(String),

    #[error("managed host initialization returned {0}")]
    ManagedInitFailed(i32),

    #[error("callback table version mismatch: expected {expected}, got {actual}")]
    CallbackVersion { expected: u32, actual: u32 },

    #[error("path is not valid for the host: {0}")]
    InvalidPath(String),

    #[error("host has been shut down")]
    ShutDown,

    #[error(transparent)]
    Library(#[from] libloading::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("type {0} has no managed counterpart")]
    NoManagedType(String),

    #[error("managed construction of {type_name} for {native} failed")]
    ConstructionFailed {
        type_name: String,
        native: NativeObjectId,
    },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Type not found: {0}")]
    TypeNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Framework(#[from] FrameworkError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
