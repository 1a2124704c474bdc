//! Managed runtime host for Tether.
//!
//! Provides [`LifecycleManager`], which boots the managed runtime through
//! `hostfxr`, keeps the native-to-managed object map, and loads and reloads
//! module metadata into the type registry.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use tether_core::MemoryFramework;
//! use tether_runtime::{LifecycleManager, TetherConfig};
//!
//! # fn run() -> Result<(), tether_runtime::RuntimeError> {
//! let config = TetherConfig::load(None)?;
//! let mut framework = MemoryFramework::new();
//! let mut manager = LifecycleManager::start(config)?;
//!
//! manager.load_all_modules(&mut framework);
//!
//! // Later, after the managed build rewrites some metadata:
//! let events = manager.reload_changed(&mut framework);
//! # let _ = events;
//! manager.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod callbacks;
pub mod config;
pub mod detached;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod storage;
pub mod watch;

pub use bridge::ObjectBridge;
pub use callbacks::{CallbackRuntime, MANAGED_CALLBACKS_VERSION, ManagedCallbacks};
pub use config::{HostMode, HotReloadMethod, TetherConfig};
pub use detached::DetachedRuntime;
pub use error::{BridgeError, HostError, RuntimeError};
pub use host::{HostLoader, HostSettings, locate_hostfxr};
pub use lifecycle::LifecycleManager;
pub use storage::ModuleStorage;
pub use watch::ModuleWatcher;
