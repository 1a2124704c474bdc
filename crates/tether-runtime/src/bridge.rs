use std::collections::HashMap;
use std::sync::Arc;

use tether_core::{
    ManagedHandle, ManagedRuntime, NativeObjectId, ObjectDeleteListener, TypeDescriptor,
};

use crate::error::BridgeError;

/// Maps live native objects to the managed objects that mirror them.
///
/// The bridge owns the strong handles: a managed peer stays alive exactly as
/// long as its native object, and is released to the managed collector when
/// the framework reports the native object deleted.
pub struct ObjectBridge {
    runtime: Arc<dyn ManagedRuntime>,
    peers: HashMap<NativeObjectId, ManagedHandle>,
}

impl ObjectBridge {
    pub fn new(runtime: Arc<dyn ManagedRuntime>) -> Self {
        Self {
            runtime,
            peers: HashMap::new(),
        }
    }

    /// Managed peer of `native`, creating it on first request.
    pub fn create_peer(
        &mut self,
        native: NativeObjectId,
        descriptor: &TypeDescriptor,
    ) -> Result<ManagedHandle, BridgeError> {
        if let Some(handle) = self.peers.get(&native) {
            return Ok(*handle);
        }

        let type_handle = descriptor
            .managed
            .ok_or_else(|| BridgeError::NoManagedType(descriptor.name.clone()))?;
        let handle = self.runtime.create_object(native, type_handle).ok_or_else(|| {
            BridgeError::ConstructionFailed {
                type_name: descriptor.name.clone(),
                native,
            }
        })?;

        self.peers.insert(native, handle);
        tracing::debug!(native = %native, handle = %handle, type_name = %descriptor.name, "Managed peer created");
        Ok(handle)
    }

    pub fn find_peer(&self, native: NativeObjectId) -> Option<ManagedHandle> {
        self.peers.get(&native).copied()
    }

    /// Forget `native` and let the collector reclaim its peer.
    pub fn on_native_object_destroyed(&mut self, native: NativeObjectId) {
        if let Some(handle) = self.peers.remove(&native) {
            self.runtime.release_handle(handle);
            tracing::debug!(native = %native, handle = %handle, "Managed peer released");
        }
    }

    /// Release every remaining peer. Returns how many there were.
    pub fn on_host_shutdown(&mut self) -> usize {
        let count = self.peers.len();
        for (_, handle) in self.peers.drain() {
            self.runtime.release_handle(handle);
        }
        if count > 0 {
            tracing::info!(released = count, "Released managed peers at shutdown");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl ObjectDeleteListener for ObjectBridge {
    fn object_deleted(&mut self, id: NativeObjectId) {
        self.on_native_object_destroyed(id);
    }

    fn object_array_shutdown(&mut self) {
        self.on_host_shutdown();
    }
}
