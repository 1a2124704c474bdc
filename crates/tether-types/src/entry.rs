use tether_core::{
    ManagedTypeHandle, NativeTypeId, TypeDescriptor, TypeKind, TypeMetadataRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Parsed but not yet materialized in the native framework.
    Pending,
    Built(NativeTypeId),
}

/// Where an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrigin {
    /// Parsed from a module's metadata file.
    Managed,
    /// Synthesized for a type that exists only natively.
    Native,
}

/// Registry record for one named type.
#[derive(Debug, Clone)]
pub struct TypeDescriptorEntry {
    pub record: TypeMetadataRecord,
    pub module: Option<String>,
    pub origin: EntryOrigin,
    pub state: EntryState,
    pub managed: Option<ManagedTypeHandle>,
    /// Type object this entry replaces the next time it is built.
    pub(crate) previous: Option<NativeTypeId>,
}

impl TypeDescriptorEntry {
    pub(crate) fn managed(
        record: TypeMetadataRecord,
        module: &str,
        previous: Option<NativeTypeId>,
    ) -> Self {
        Self {
            record,
            module: Some(module.to_string()),
            origin: EntryOrigin::Managed,
            state: EntryState::Pending,
            managed: None,
            previous,
        }
    }

    pub(crate) fn native(
        record: TypeMetadataRecord,
        id: NativeTypeId,
        managed: Option<ManagedTypeHandle>,
    ) -> Self {
        Self {
            record,
            module: None,
            origin: EntryOrigin::Native,
            state: EntryState::Built(id),
            managed,
            previous: None,
        }
    }

    pub fn kind(&self) -> TypeKind {
        self.record.kind
    }

    pub fn built(&self) -> Option<NativeTypeId> {
        match self.state {
            EntryState::Built(id) => Some(id),
            EntryState::Pending => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == EntryState::Pending
    }

    /// Name shown in editor tooling.
    pub fn display_name(&self) -> &str {
        self.record.display_name.as_deref().unwrap_or(&self.record.name)
    }

    pub fn descriptor(&self) -> Option<TypeDescriptor> {
        self.built().map(|native| TypeDescriptor {
            kind: self.record.kind,
            name: self.record.name.clone(),
            native,
            managed: self.managed,
        })
    }
}
