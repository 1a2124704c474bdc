use std::collections::HashMap;
use std::sync::Arc;

use tether_core::{
    ManagedHandle, ManagedRuntime, NativeObjectId, NativeTypeId, ObjectDeleteListener,
    TypeDescriptor, TypeIndex,
};
use tether_types::{ModuleLoad, ModuleMetadata, TypeEvent, TypeRegistry};

use crate::bridge::ObjectBridge;
use crate::config::TetherConfig;
use crate::detached::DetachedRuntime;
use crate::error::RuntimeError;
use crate::host::HostLoader;
use crate::storage::ModuleStorage;

/// Composes the host loader, type registry and object bridge for one
/// session, and drives module loading and reloading.
///
/// # Threading
///
/// Everything here runs on the framework's main thread. The host context is
/// not `Send`, so neither is the manager.
pub struct LifecycleManager {
    config: TetherConfig,
    host: HostLoader,
    runtime: Arc<dyn ManagedRuntime>,
    registry: TypeRegistry,
    bridge: ObjectBridge,
    storage: ModuleStorage,
    /// module → fingerprint of the metadata last loaded for it
    fingerprints: HashMap<String, String>,
}

impl LifecycleManager {
    /// Bootstrap the managed host and set up a session on top of it.
    pub fn start(config: TetherConfig) -> Result<Self, RuntimeError> {
        let mut host = HostLoader::new(&config.host);
        let runtime = host.initialize().inspect_err(|e| {
            tracing::error!(error = %e, "Managed host bootstrap failed");
        })?;
        Self::assemble(config, host, runtime)
    }

    /// Set up a session on an already-available runtime. The host loader is
    /// left uninitialized.
    pub fn with_runtime(
        config: TetherConfig,
        runtime: Arc<dyn ManagedRuntime>,
    ) -> Result<Self, RuntimeError> {
        let host = HostLoader::new(&config.host);
        Self::assemble(config, host, runtime)
    }

    /// Session without a managed host, backed by [`DetachedRuntime`].
    pub fn detached(config: TetherConfig) -> Result<Self, RuntimeError> {
        Self::with_runtime(config, Arc::new(DetachedRuntime::new()))
    }

    fn assemble(
        config: TetherConfig,
        host: HostLoader,
        runtime: Arc<dyn ManagedRuntime>,
    ) -> Result<Self, RuntimeError> {
        let storage = ModuleStorage::new(config.modules.metadata_dir.clone());
        storage.init()?;

        let mut registry = TypeRegistry::with_runtime(runtime.clone());
        registry.set_suffix_generated_types(config.types.suffix_generated_types);
        let bridge = ObjectBridge::new(runtime.clone());

        Ok(Self {
            config,
            host,
            runtime,
            registry,
            bridge,
            storage,
            fingerprints: HashMap::new(),
        })
    }

    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    pub fn host(&self) -> &HostLoader {
        &self.host
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    pub fn bridge(&self) -> &ObjectBridge {
        &self.bridge
    }

    pub fn storage(&self) -> &ModuleStorage {
        &self.storage
    }

    /// Load every module in the metadata directory.
    ///
    /// Modules that fail to load are logged and skipped. Pending classes
    /// are retried after each successful load.
    pub fn load_all_modules<T: TypeIndex + ?Sized>(&mut self, types: &mut T) -> Vec<ModuleLoad> {
        let modules = match self.storage.list_modules() {
            Ok(modules) => modules,
            Err(e) => {
                tracing::warn!("Failed to list modules: {e}");
                return Vec::new();
            }
        };

        let mut loads = Vec::with_capacity(modules.len());
        for module in modules {
            match self.load_module(types, &module) {
                Ok(load) => loads.push(load),
                Err(e) => tracing::error!(module, error = %e, "Failed to load module"),
            }
        }

        for (class, parent) in self.registry.stalled_classes() {
            tracing::warn!(class, parent, "Class is still waiting on its parent");
        }
        loads
    }

    /// Load (or reload) one module's metadata and retry pending classes.
    pub fn load_module<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        module: &str,
    ) -> Result<ModuleLoad, RuntimeError> {
        let path = self.storage.metadata_path(module);
        let fingerprint = self.storage.fingerprint(module)?;
        let load = self.registry.load_module_metadata(types, &path)?;

        self.fingerprints.insert(module.to_string(), fingerprint);
        self.registry.on_dependency_module_loaded(types, module);
        Ok(load)
    }

    /// Reload every module whose metadata changed since it was last loaded,
    /// and unload modules whose metadata file is gone. Returns the resulting
    /// type events for the reinstancer.
    pub fn reload_changed<T: TypeIndex + ?Sized>(&mut self, types: &mut T) -> Vec<TypeEvent> {
        let on_disk = match self.storage.list_modules() {
            Ok(modules) => modules,
            Err(e) => {
                tracing::warn!("Failed to list modules: {e}");
                return Vec::new();
            }
        };

        for module in &on_disk {
            let current = match self.storage.fingerprint(module) {
                Ok(fingerprint) => fingerprint,
                Err(e) => {
                    tracing::warn!(module, error = %e, "Failed to fingerprint module");
                    continue;
                }
            };
            if self.fingerprints.get(module) == Some(&current) {
                tracing::debug!(module, "Module unchanged");
                continue;
            }
            match self.load_module(types, module) {
                Ok(load) => tracing::info!(module, types = load.types, "Module reloaded"),
                Err(e) => tracing::error!(module, error = %e, "Failed to reload module"),
            }
        }

        let gone: Vec<String> = self
            .fingerprints
            .keys()
            .filter(|module| !on_disk.contains(module))
            .cloned()
            .collect();
        for module in gone {
            self.fingerprints.remove(&module);
            let load = self.registry.register_module(
                types,
                ModuleMetadata {
                    module: module.clone(),
                    records: Vec::new(),
                },
            );
            tracing::info!(module, removed = load.removed.len(), "Module unloaded");
        }

        self.registry.drain_events()
    }

    /// Managed peer for a native object, created through the registry's
    /// descriptor for its type.
    pub fn peer_for<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        native: NativeObjectId,
        type_id: NativeTypeId,
    ) -> Result<ManagedHandle, RuntimeError> {
        let descriptor = self.registry.find_or_create_for_native_type(types, type_id)?;
        Ok(self.bridge.create_peer(native, &descriptor)?)
    }

    pub fn create_peer(
        &mut self,
        native: NativeObjectId,
        descriptor: &TypeDescriptor,
    ) -> Result<ManagedHandle, RuntimeError> {
        Ok(self.bridge.create_peer(native, descriptor)?)
    }

    /// Call a parameterless managed method on the peer of `native`.
    pub fn invoke<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        native: NativeObjectId,
        type_id: NativeTypeId,
        method: &str,
    ) -> Result<(), RuntimeError> {
        let descriptor = self.registry.find_or_create_for_native_type(types, type_id)?;
        let peer = self.bridge.create_peer(native, &descriptor)?;
        let type_handle = descriptor
            .managed
            .ok_or_else(|| RuntimeError::TypeNotFound(descriptor.name.clone()))?;
        let method_handle = self
            .runtime
            .lookup_method(type_handle, method)
            .ok_or_else(|| {
                tether_core::FrameworkError::MethodNotFound(format!("{}.{method}", descriptor.name))
            })?;
        self.runtime.invoke_method(peer, method_handle)?;
        Ok(())
    }

    /// Release every managed peer, then close the host. Returns the number
    /// of peers released.
    pub fn shutdown(&mut self) -> usize {
        let released = self.bridge.on_host_shutdown();
        self.host.shutdown();
        tracing::info!(released, "Session shut down");
        released
    }
}

impl ObjectDeleteListener for LifecycleManager {
    fn object_deleted(&mut self, id: NativeObjectId) {
        self.bridge.on_native_object_destroyed(id);
    }

    fn object_array_shutdown(&mut self) {
        self.bridge.on_host_shutdown();
    }
}
