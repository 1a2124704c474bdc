use std::collections::{BTreeSet, HashMap};

use tether_core::graph::{PinTarget, PinType};
use tether_core::{NativeTypeId, TypeIndex, TypeKind};
use tether_types::TypeRegistry;

use crate::batch::ResolvedBatch;

/// What [`try_update_pin`] did to a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinUpdate {
    /// The pin now points at a different type.
    Retargeted { from: NativeTypeId, to: NativeTypeId },
    /// Same enum, but its items were rewritten in place.
    Revalidated,
    Unchanged,
    /// The referenced enum no longer exists under its name.
    Unresolved,
}

impl PinUpdate {
    /// Whether the owning node needs reconstructing.
    pub fn is_changed(&self) -> bool {
        matches!(self, PinUpdate::Retargeted { .. } | PinUpdate::Revalidated)
    }
}

/// Enum ids referenced by graphs, re-resolved by name before patching.
#[derive(Debug, Default, Clone)]
pub struct EnumIndex {
    resolved: HashMap<NativeTypeId, Option<NativeTypeId>>,
    refreshed: BTreeSet<NativeTypeId>,
}

impl EnumIndex {
    pub fn new(refreshed: BTreeSet<NativeTypeId>) -> Self {
        Self {
            resolved: HashMap::new(),
            refreshed,
        }
    }

    /// Re-resolve every enum in `ids` through the registry.
    pub fn prepare<T: TypeIndex + ?Sized>(
        ids: impl IntoIterator<Item = NativeTypeId>,
        types: &mut T,
        registry: &mut TypeRegistry,
        refreshed: BTreeSet<NativeTypeId>,
    ) -> Self {
        let mut index = Self::new(refreshed);
        for id in ids {
            if index.resolved.contains_key(&id) {
                continue;
            }
            let resolved = types
                .describe(id)
                .and_then(|info| registry.resolve(types, TypeKind::Enum, &info.name));
            index.insert(id, resolved);
        }
        index
    }

    pub fn insert(&mut self, id: NativeTypeId, resolved: Option<NativeTypeId>) {
        self.resolved.insert(id, resolved);
    }

    /// `None` if `id` was never prepared, `Some(None)` if it no longer
    /// resolves.
    pub fn lookup(&self, id: NativeTypeId) -> Option<Option<NativeTypeId>> {
        self.resolved.get(&id).copied()
    }

    pub fn was_refreshed(&self, id: NativeTypeId) -> bool {
        self.refreshed.contains(&id)
    }
}

/// Point a pin at the replacement of the type it references, if the current
/// pass replaces it.
///
/// Struct pins follow replaced structs. Enum and byte pins are re-resolved
/// by name. Object, class and interface pins follow replaced interfaces;
/// replaced classes are handled by object reinstancing instead.
pub fn try_update_pin(pin: &mut PinType, batch: &ResolvedBatch, enums: &EnumIndex) -> PinUpdate {
    match pin.target_mut() {
        PinTarget::Struct(slot) => retarget(slot, |id| batch.struct_replacement(id)),
        PinTarget::ClassLike(slot) => retarget(slot, |id| batch.interface_replacement(id)),
        PinTarget::EnumOrByte(slot) => {
            let Some(current) = *slot else {
                return PinUpdate::Unchanged;
            };
            match enums.lookup(current) {
                None => PinUpdate::Unchanged,
                Some(None) => {
                    tracing::warn!(enum_id = %current, "Enum pin no longer resolves, leaving it as is");
                    PinUpdate::Unresolved
                }
                Some(Some(resolved)) if resolved != current => {
                    *slot = Some(resolved);
                    PinUpdate::Retargeted {
                        from: current,
                        to: resolved,
                    }
                }
                Some(Some(_)) if enums.was_refreshed(current) => PinUpdate::Revalidated,
                Some(Some(_)) => PinUpdate::Unchanged,
            }
        }
        PinTarget::Untyped => PinUpdate::Unchanged,
    }
}

fn retarget(
    slot: &mut Option<NativeTypeId>,
    replacement: impl Fn(NativeTypeId) -> Option<NativeTypeId>,
) -> PinUpdate {
    let Some(current) = *slot else {
        return PinUpdate::Unchanged;
    };
    match replacement(current) {
        Some(new) => {
            *slot = Some(new);
            PinUpdate::Retargeted {
                from: current,
                to: new,
            }
        }
        None => PinUpdate::Unchanged,
    }
}
