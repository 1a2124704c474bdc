use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tether_core::{
    ManagedRuntime, ManagedTypeHandle, NativeTypeId, NativeTypeInfo, TypeDescriptor, TypeIndex,
    TypeKind, TypeMetadataRecord,
};
use tracing::{debug, error, info, warn};

use crate::entry::{EntryOrigin, EntryState, TypeDescriptorEntry};
use crate::error::RegistryError;
use crate::metadata::ModuleMetadata;
use crate::pending::PendingClassSet;

/// Suffix the framework appends to editor-generated classes.
const GENERATED_CLASS_SUFFIX: &str = "_C";

/// A change to an already-built type caused by a module reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeEvent {
    /// A fresh type object now stands in for `old`.
    Replaced {
        kind: TypeKind,
        name: String,
        old: NativeTypeId,
        new: NativeTypeId,
    },
    /// An enum was rewritten in place and kept its identity.
    Refreshed { name: String, id: NativeTypeId },
}

/// Outcome of registering one module's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleLoad {
    pub module: String,
    pub types: usize,
    pub built: usize,
    pub pending: usize,
    /// Types the module used to define and no longer does.
    pub removed: Vec<String>,
}

/// Name-keyed registry of every type Tether knows about, managed or native.
#[derive(Default)]
pub struct TypeRegistry {
    classes: HashMap<String, TypeDescriptorEntry>,
    structs: HashMap<String, TypeDescriptorEntry>,
    enums: HashMap<String, TypeDescriptorEntry>,
    interfaces: HashMap<String, TypeDescriptorEntry>,
    pending: PendingClassSet,
    modules: BTreeMap<String, Vec<(TypeKind, String)>>,
    events: Vec<TypeEvent>,
    runtime: Option<Arc<dyn ManagedRuntime>>,
    suffix_generated_types: bool,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runtime(runtime: Arc<dyn ManagedRuntime>) -> Self {
        Self {
            runtime: Some(runtime),
            ..Self::default()
        }
    }

    /// Managed type handles are looked up through `runtime` for every type
    /// built from now on.
    pub fn set_runtime(&mut self, runtime: Arc<dyn ManagedRuntime>) {
        self.runtime = Some(runtime);
    }

    /// Give managed types a `"<Name> (Managed)"` display name.
    pub fn set_suffix_generated_types(&mut self, enabled: bool) {
        self.suffix_generated_types = enabled;
    }

    fn table(&self, kind: TypeKind) -> &HashMap<String, TypeDescriptorEntry> {
        match kind {
            TypeKind::Class => &self.classes,
            TypeKind::Struct => &self.structs,
            TypeKind::Enum => &self.enums,
            TypeKind::Interface => &self.interfaces,
        }
    }

    fn table_mut(&mut self, kind: TypeKind) -> &mut HashMap<String, TypeDescriptorEntry> {
        match kind {
            TypeKind::Class => &mut self.classes,
            TypeKind::Struct => &mut self.structs,
            TypeKind::Enum => &mut self.enums,
            TypeKind::Interface => &mut self.interfaces,
        }
    }

    /// Parse a module's metadata file and register its types.
    pub fn load_module_metadata<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        path: &Path,
    ) -> Result<ModuleLoad, RegistryError> {
        let metadata = ModuleMetadata::from_path(path)?;
        Ok(self.register_module(types, metadata))
    }

    /// Register (or re-register) a module's records and build them.
    ///
    /// Re-registering replaces the module's previous records. Types that
    /// were already built are rebuilt and reported through
    /// [`drain_events`](Self::drain_events).
    pub fn register_module<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        metadata: ModuleMetadata,
    ) -> ModuleLoad {
        let ModuleMetadata { module, records } = metadata;
        let previous_keys = self.modules.remove(&module).unwrap_or_default();

        let mut keys = Vec::with_capacity(records.len());
        for mut record in records {
            if self.suffix_generated_types {
                record.display_name = Some(format!("{} (Managed)", record.name));
            }
            let key = (record.kind, record.name.clone());
            let previous = self
                .table(record.kind)
                .get(&record.name)
                .filter(|entry| entry.origin == EntryOrigin::Managed)
                .and_then(TypeDescriptorEntry::built);
            if record.kind == TypeKind::Class {
                self.pending.remove_waiter(&record.name);
            }
            let owner = self
                .table(record.kind)
                .get(&record.name)
                .and_then(|entry| entry.module.clone())
                .filter(|owner| *owner != module);
            if let Some(owner) = owner
                && let Some(owned) = self.modules.get_mut(&owner)
            {
                owned.retain(|owned_key| *owned_key != key);
                debug!(module = %module, previous_owner = %owner, name = %record.name, "Type moved between modules");
            }
            let entry = TypeDescriptorEntry::managed(record, &module, previous);
            self.table_mut(key.0).insert(key.1.clone(), entry);
            keys.push(key);
        }

        let current: HashSet<&(TypeKind, String)> = keys.iter().collect();
        let mut removed = Vec::new();
        for key in previous_keys.iter().filter(|key| !current.contains(key)) {
            let (kind, name) = key;
            let owned = self
                .table(*kind)
                .get(name)
                .is_some_and(|entry| entry.module.as_deref() == Some(module.as_str()));
            if !owned {
                continue;
            }
            if let Some(entry) = self.table_mut(*kind).remove(name) {
                if let Some(id) = entry.built() {
                    types.retire(id);
                }
                self.pending.remove_waiter(name);
                info!(module = %module, kind = %kind, name = %name, "Type removed from module");
                removed.push(name.clone());
            }
        }

        let first_event = self.events.len();
        for kind in TypeKind::ALL {
            for (_, name) in keys.iter().filter(|(k, _)| *k == kind) {
                if let Err(e) = self.initialize_builder(types, kind, name) {
                    error!(module = %module, kind = %kind, name = %name, error = %e, "Failed to build type");
                }
            }
        }
        let replaced: HashSet<String> = self.events[first_event..]
            .iter()
            .filter_map(|event| match event {
                TypeEvent::Replaced {
                    kind: TypeKind::Class,
                    name,
                    ..
                } => Some(name.clone()),
                _ => None,
            })
            .collect();
        self.rebuild_subclasses(types, replaced);

        let built = keys
            .iter()
            .filter(|(kind, name)| {
                self.table(*kind)
                    .get(name)
                    .is_some_and(|entry| entry.built().is_some())
            })
            .count();
        let load = ModuleLoad {
            module: module.clone(),
            types: keys.len(),
            built,
            pending: keys.len() - built,
            removed,
        };
        self.modules.insert(module, keys);

        info!(
            module = %load.module,
            types = load.types,
            built = load.built,
            pending = load.pending,
            "Module metadata loaded"
        );
        load
    }

    /// Rebuild every built managed class that derives, directly or not, from
    /// one of the `replaced` classes, so no live class keeps a replaced type
    /// as its parent. Each rebuild reports its own replacement.
    fn rebuild_subclasses<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        mut replaced: HashSet<String>,
    ) {
        let mut stale: Vec<String> = Vec::new();
        loop {
            let next: Vec<String> = self
                .classes
                .iter()
                .filter(|(name, entry)| {
                    entry.origin == EntryOrigin::Managed
                        && entry.built().is_some()
                        && !replaced.contains(*name)
                        && entry
                            .record
                            .parent_name()
                            .is_some_and(|parent| replaced.contains(parent))
                })
                .map(|(name, _)| name.clone())
                .collect();
            if next.is_empty() {
                break;
            }
            replaced.extend(next.iter().cloned());
            stale.extend(next);
        }
        if stale.is_empty() {
            return;
        }

        for name in &stale {
            if let Some(entry) = self.classes.get_mut(name) {
                entry.previous = entry.built();
                entry.state = EntryState::Pending;
            }
        }
        for name in &stale {
            if let Err(e) = self.build_class(types, name) {
                error!(class = %name, error = %e, "Failed to rebuild subclass");
            }
        }
        info!(rebuilt = stale.len(), "Subclasses rebuilt on their reloaded parents");
    }

    /// Build a registered entry if it is not built yet. `Ok(None)` means the
    /// entry is waiting on a base type or does not exist.
    fn initialize_builder<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        kind: TypeKind,
        name: &str,
    ) -> Result<Option<NativeTypeId>, RegistryError> {
        match kind {
            TypeKind::Class => self.build_class(types, name),
            _ => Ok(self.build_leaf(types, kind, name)),
        }
    }

    fn build_leaf<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        kind: TypeKind,
        name: &str,
    ) -> Option<NativeTypeId> {
        let entry = self.table(kind).get(name)?;
        if let Some(id) = entry.built() {
            return Some(id);
        }

        if kind == TypeKind::Enum
            && let Some(id) = entry.previous
        {
            let managed = self.lookup_managed(&entry.record);
            types.redefine(id, &entry.record);
            if let Some(entry) = self.enums.get_mut(name) {
                entry.previous = None;
                entry.managed = managed;
                entry.state = EntryState::Built(id);
            }
            self.events.push(TypeEvent::Refreshed {
                name: name.to_string(),
                id,
            });
            debug!(name, id = %id, "Enum redefined in place");
            return Some(id);
        }

        self.materialize_entry(types, kind, name, None)
    }

    /// Build a class and every unbuilt managed ancestor it needs.
    ///
    /// Walks up the managed parent chain until it reaches a built or native
    /// base, then builds the chain from the top down. If the base cannot be
    /// found, every class on the chain is queued under its direct parent.
    fn build_class<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        name: &str,
    ) -> Result<Option<NativeTypeId>, RegistryError> {
        match self.classes.get(name) {
            None => return Ok(None),
            Some(entry) => {
                if let Some(id) = entry.built() {
                    return Ok(Some(id));
                }
            }
        }

        let mut chain: Vec<String> = Vec::new();
        let mut current = name.to_string();
        let base = loop {
            let Some(entry) = self.classes.get(&current) else {
                break None;
            };
            if let Some(id) = entry.built() {
                break Some(id);
            }
            if chain.contains(&current) {
                chain.push(current);
                return Err(RegistryError::InheritanceCycle(chain));
            }
            let parent = entry.record.parent_name().map(str::to_string);
            chain.push(current);

            let Some(parent) = parent else {
                break None;
            };
            if self.classes.contains_key(&parent) {
                current = parent;
                continue;
            }
            if let Some(id) = types.find_type(TypeKind::Class, &parent) {
                break Some(id);
            }

            for waiting in &chain {
                if let Some(waiting_parent) = self
                    .classes
                    .get(waiting)
                    .and_then(|entry| entry.record.parent_name())
                {
                    self.pending.add(waiting_parent, waiting.as_str());
                }
            }
            debug!(class = name, parent = %parent, "Class waiting on unresolved parent");
            return Ok(None);
        };

        let mut parent = base;
        for class in chain.iter().rev() {
            parent = self.materialize_entry(types, TypeKind::Class, class, parent);
            self.pending.remove_waiter(class);
        }
        Ok(parent)
    }

    fn materialize_entry<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        kind: TypeKind,
        name: &str,
        parent: Option<NativeTypeId>,
    ) -> Option<NativeTypeId> {
        let runtime = self.runtime.clone();
        let entry = self.table_mut(kind).get_mut(name)?;

        let id = types.materialize(&entry.record, parent);
        entry.managed = runtime
            .as_deref()
            .and_then(|runtime| lookup_managed_type(runtime, &entry.record));
        entry.state = EntryState::Built(id);
        let previous = entry.previous.take();

        if let Some(old) = previous {
            self.events.push(TypeEvent::Replaced {
                kind,
                name: name.to_string(),
                old,
                new: id,
            });
        }
        debug!(kind = %kind, name, id = %id, "Type materialized");
        Some(id)
    }

    fn lookup_managed(&self, record: &TypeMetadataRecord) -> Option<ManagedTypeHandle> {
        self.runtime
            .as_deref()
            .and_then(|runtime| lookup_managed_type(runtime, record))
    }

    /// Resolve a type by exact name, building managed entries on first use.
    pub fn resolve<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        kind: TypeKind,
        name: &str,
    ) -> Option<NativeTypeId> {
        match kind {
            TypeKind::Class => self
                .resolve_managed_or_native(types, TypeKind::Class, name)
                .or_else(|| self.resolve_managed_or_native(types, TypeKind::Interface, name)),
            // Native interfaces are published as classes.
            TypeKind::Interface => self
                .resolve_managed_or_native(types, TypeKind::Interface, name)
                .or_else(|| types.find_type(TypeKind::Class, name)),
            _ => self.resolve_managed_or_native(types, kind, name),
        }
    }

    fn resolve_managed_or_native<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        kind: TypeKind,
        name: &str,
    ) -> Option<NativeTypeId> {
        if self.table(kind).contains_key(name) {
            match self.initialize_builder(types, kind, name) {
                Ok(Some(id)) => return Some(id),
                Ok(None) => {}
                Err(e) => warn!(kind = %kind, name, error = %e, "Managed type cannot be built"),
            }
        }
        let found = types.find_type(kind, name);
        if found.is_some() {
            debug!(kind = %kind, name, "Resolved from native index");
        }
        found
    }

    /// Resolve a type and return its full descriptor. Native classes without
    /// a registry entry get one synthesized.
    pub fn resolve_descriptor<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        kind: TypeKind,
        name: &str,
    ) -> Option<TypeDescriptor> {
        let id = self.resolve(types, kind, name)?;
        let cached = TypeKind::ALL
            .iter()
            .filter_map(|k| self.table(*k).get(name))
            .find_map(|entry| entry.descriptor().filter(|d| d.native == id));
        if cached.is_some() {
            return cached;
        }
        match self.find_or_create_for_native_type(types, id) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!(name, error = %e, "No descriptor for resolved type");
                None
            }
        }
    }

    /// Descriptor for a native type object, synthesizing and caching one for
    /// types no managed module defines.
    pub fn find_or_create_for_native_type<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        id: NativeTypeId,
    ) -> Result<TypeDescriptor, RegistryError> {
        let info = types
            .describe(id)
            .ok_or(RegistryError::UnknownNativeType(id))?;
        let name = info
            .name
            .strip_suffix(GENERATED_CLASS_SUFFIX)
            .unwrap_or(&info.name)
            .to_string();

        if let Some(entry) = self.table(info.kind).get(&name)
            && entry.origin == EntryOrigin::Native
        {
            if entry.built() == Some(id) {
                return entry.descriptor().ok_or(RegistryError::NotBuilt(name));
            }
            // Same name once the suffix is stripped, different native type.
            return self
                .native_entry(&info, &name, id)
                .descriptor()
                .ok_or(RegistryError::NotBuilt(name));
        }

        if self.table(info.kind).contains_key(&name) {
            self.initialize_builder(types, info.kind, &name)?;
            return self
                .table(info.kind)
                .get(&name)
                .and_then(TypeDescriptorEntry::descriptor)
                .ok_or(RegistryError::NotBuilt(name));
        }

        let entry = self.native_entry(&info, &name, id);
        let descriptor = entry.descriptor().ok_or(RegistryError::NotBuilt(name.clone()))?;

        debug!(name = %name, id = %id, managed = entry.managed.is_some(), "Native type descriptor cached");
        self.table_mut(info.kind).insert(name, entry);
        Ok(descriptor)
    }

    fn native_entry(
        &self,
        info: &NativeTypeInfo,
        name: &str,
        id: NativeTypeId,
    ) -> TypeDescriptorEntry {
        let managed = self
            .runtime
            .as_deref()
            .and_then(|runtime| runtime.lookup_type(None, &info.namespace, &info.name));
        let mut record = TypeMetadataRecord::new(info.kind, name);
        record.namespace = info.namespace.clone();
        TypeDescriptorEntry::native(record, id, managed)
    }

    /// Retry every pending class now that `module` has loaded. Returns the
    /// names of the classes that got built.
    pub fn on_dependency_module_loaded<T: TypeIndex + ?Sized>(
        &mut self,
        types: &mut T,
        module: &str,
    ) -> Vec<String> {
        if self.pending.is_empty() {
            return Vec::new();
        }

        let waiting: Vec<String> = self.pending.iter().map(|(class, _)| class.clone()).collect();
        let parents: Vec<String> = self.pending.parents().cloned().collect();

        for parent in parents {
            if self.resolve(types, TypeKind::Class, &parent).is_none() {
                continue;
            }
            for waiter in self.pending.take(&parent) {
                if let Err(e) = self.initialize_builder(types, TypeKind::Class, &waiter) {
                    error!(class = %waiter, error = %e, "Failed to build pending class");
                }
            }
        }

        let built: Vec<String> = waiting
            .into_iter()
            .filter(|class| {
                self.classes
                    .get(class)
                    .is_some_and(|entry| entry.built().is_some())
            })
            .collect();
        if !built.is_empty() {
            info!(module, built = built.len(), "Resolved pending classes");
        }
        built
    }

    /// `(class, parent)` pairs for every class still waiting on its parent.
    pub fn stalled_classes(&self) -> Vec<(String, String)> {
        self.pending
            .iter()
            .map(|(class, parent)| (class.clone(), parent.clone()))
            .collect()
    }

    pub fn pending(&self) -> &PendingClassSet {
        &self.pending
    }

    pub fn entry(&self, kind: TypeKind, name: &str) -> Option<&TypeDescriptorEntry> {
        self.table(kind).get(name)
    }

    /// Descriptor of an already-built entry. Never builds.
    pub fn descriptor(&self, kind: TypeKind, name: &str) -> Option<TypeDescriptor> {
        self.entry(kind, name)
            .and_then(TypeDescriptorEntry::descriptor)
    }

    /// Entries of one kind, sorted by name.
    pub fn entries(&self, kind: TypeKind) -> Vec<(&str, &TypeDescriptorEntry)> {
        let mut entries: Vec<_> = self
            .table(kind)
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn module_types(&self, module: &str) -> Option<&[(TypeKind, String)]> {
        self.modules.get(module).map(Vec::as_slice)
    }

    /// Reload events accumulated since the last drain.
    pub fn drain_events(&mut self) -> Vec<TypeEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        TypeKind::ALL.iter().map(|kind| self.table(*kind).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lookup_managed_type(
    runtime: &dyn ManagedRuntime,
    record: &TypeMetadataRecord,
) -> Option<ManagedTypeHandle> {
    let assembly = Some(record.assembly.as_str()).filter(|a| !a.is_empty());
    runtime.lookup_type(assembly, &record.namespace, &record.name)
}
