use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tether_core::{
    FrameworkError, HandleKind, ManagedHandle, ManagedMethodHandle, ManagedRuntime,
    ManagedTypeHandle, NativeObjectId,
};

#[derive(Default)]
struct DetachedState {
    next: usize,
    types: HashMap<(String, String), ManagedTypeHandle>,
    methods: HashMap<(usize, String), ManagedMethodHandle>,
    live: HashMap<ManagedHandle, NativeObjectId>,
    invocations: Vec<(ManagedHandle, ManagedMethodHandle)>,
}

impl DetachedState {
    fn next_raw(&mut self) -> usize {
        self.next += 1;
        self.next
    }
}

/// A [`ManagedRuntime`] with no managed host behind it.
///
/// Every type and method resolves to a stable local handle and objects are
/// counted rather than constructed. Used by the CLI when no host is
/// configured and by tests.
#[derive(Default)]
pub struct DetachedRuntime {
    state: Mutex<DetachedState>,
}

impl DetachedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DetachedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn live_handles(&self) -> usize {
        self.state().live.len()
    }

    pub fn is_live(&self, handle: ManagedHandle) -> bool {
        self.state().live.contains_key(&handle)
    }

    /// Every successful `invoke_method` call, in order.
    pub fn invocations(&self) -> Vec<(ManagedHandle, ManagedMethodHandle)> {
        self.state().invocations.clone()
    }
}

impl ManagedRuntime for DetachedRuntime {
    fn lookup_type(
        &self,
        _assembly: Option<&str>,
        namespace: &str,
        name: &str,
    ) -> Option<ManagedTypeHandle> {
        let mut state = self.state();
        let key = (namespace.to_string(), name.to_string());
        if let Some(handle) = state.types.get(&key) {
            return Some(*handle);
        }
        let handle = ManagedTypeHandle::from_raw(state.next_raw())?;
        state.types.insert(key, handle);
        Some(handle)
    }

    fn create_object(
        &self,
        native: NativeObjectId,
        _type_handle: ManagedTypeHandle,
    ) -> Option<ManagedHandle> {
        let mut state = self.state();
        let handle = ManagedHandle::from_raw(state.next_raw(), HandleKind::Strong)?;
        state.live.insert(handle, native);
        Some(handle)
    }

    fn release_handle(&self, handle: ManagedHandle) {
        if self.state().live.remove(&handle).is_none() {
            tracing::warn!(handle = %handle, "Released a handle that was not live");
        }
    }

    fn lookup_method(
        &self,
        type_handle: ManagedTypeHandle,
        name: &str,
    ) -> Option<ManagedMethodHandle> {
        let mut state = self.state();
        let key = (type_handle.raw(), name.to_string());
        if let Some(handle) = state.methods.get(&key) {
            return Some(*handle);
        }
        let handle = ManagedMethodHandle::from_raw(state.next_raw())?;
        state.methods.insert(key, handle);
        Some(handle)
    }

    fn invoke_method(
        &self,
        target: ManagedHandle,
        method: ManagedMethodHandle,
    ) -> Result<(), FrameworkError> {
        let mut state = self.state();
        if !state.live.contains_key(&target) {
            return Err(FrameworkError::ManagedException(format!(
                "ObjectDisposedException: {target} is not live"
            )));
        }
        state.invocations.push((target, method));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_are_stable() {
        let runtime = DetachedRuntime::new();
        let a = runtime.lookup_type(None, "Game", "Hero").unwrap();
        let b = runtime.lookup_type(Some("Game"), "Game", "Hero").unwrap();
        let c = runtime.lookup_type(None, "Game", "Villain").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(runtime.lookup_method(a, "Jump"), runtime.lookup_method(a, "Jump"));
    }

    #[test]
    fn invoke_requires_live_target() {
        let runtime = DetachedRuntime::new();
        let hero = runtime.lookup_type(None, "Game", "Hero").unwrap();
        let jump = runtime.lookup_method(hero, "Jump").unwrap();
        let object = runtime
            .create_object(NativeObjectId::from_addr(0x10).unwrap(), hero)
            .unwrap();

        runtime.invoke_method(object, jump).unwrap();
        assert_eq!(runtime.invocations(), vec![(object, jump)]);

        runtime.release_handle(object);
        let err = runtime.invoke_method(object, jump).unwrap_err();
        assert!(matches!(err, FrameworkError::ManagedException(_)));
    }
}
