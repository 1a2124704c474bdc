use std::collections::BTreeSet;

use tether_core::{NativeTypeId, TypeKind};
use tether_types::TypeEvent;

/// An old type and the type replacing it. Either side may be missing when
/// the framework reports a half-finished replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypePair {
    pub old: Option<NativeTypeId>,
    pub new: Option<NativeTypeId>,
}

impl TypePair {
    pub fn new(old: NativeTypeId, new: NativeTypeId) -> Self {
        Self {
            old: Some(old),
            new: Some(new),
        }
    }

    pub fn complete(&self) -> Option<(NativeTypeId, NativeTypeId)> {
        self.old.zip(self.new)
    }
}

/// Replacements collected between two reinstancing passes.
#[derive(Debug, Default, Clone)]
pub struct ReinstancingBatch {
    classes: Vec<TypePair>,
    structs: Vec<TypePair>,
    interfaces: Vec<TypePair>,
    refreshed_enums: BTreeSet<NativeTypeId>,
    /// Intermediate versions replaced again before a pass ran.
    superseded: Vec<NativeTypeId>,
}

impl ReinstancingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    fn pairs_mut(&mut self, kind: TypeKind) -> Option<&mut Vec<TypePair>> {
        match kind {
            TypeKind::Class => Some(&mut self.classes),
            TypeKind::Struct => Some(&mut self.structs),
            TypeKind::Interface => Some(&mut self.interfaces),
            TypeKind::Enum => None,
        }
    }

    pub fn pairs(&self, kind: TypeKind) -> &[TypePair] {
        match kind {
            TypeKind::Class => &self.classes,
            TypeKind::Struct => &self.structs,
            TypeKind::Interface => &self.interfaces,
            TypeKind::Enum => &[],
        }
    }

    /// Queue a replacement. A type replaced twice before a pass collapses
    /// into one pair from the oldest to the newest version.
    pub fn push(&mut self, kind: TypeKind, pair: TypePair) {
        let Some(pairs) = self.pairs_mut(kind) else {
            if let Some(id) = pair.new {
                self.refreshed_enums.insert(id);
            }
            return;
        };

        if let Some(old) = pair.old
            && let Some(existing) = pairs.iter_mut().find(|p| p.new == Some(old))
        {
            existing.new = pair.new;
            self.superseded.push(old);
            return;
        }
        pairs.push(pair);
    }

    pub fn push_refreshed_enum(&mut self, id: NativeTypeId) {
        self.refreshed_enums.insert(id);
    }

    pub fn absorb(&mut self, events: impl IntoIterator<Item = TypeEvent>) {
        for event in events {
            match event {
                TypeEvent::Replaced { kind, old, new, .. } => {
                    self.push(kind, TypePair::new(old, new))
                }
                TypeEvent::Refreshed { id, .. } => self.push_refreshed_enum(id),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
            && self.structs.is_empty()
            && self.interfaces.is_empty()
            && self.refreshed_enums.is_empty()
            && self.superseded.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Split into usable pairs, logging every pair that is missing a side.
    pub fn resolve(&self) -> ResolvedBatch {
        let mut skipped = 0;
        let mut complete = |kind: TypeKind, pairs: &[TypePair]| -> Vec<(NativeTypeId, NativeTypeId)> {
            pairs
                .iter()
                .filter_map(|pair| {
                    let complete = pair.complete();
                    if complete.is_none() {
                        skipped += 1;
                        tracing::warn!(
                            kind = %kind,
                            old = ?pair.old,
                            new = ?pair.new,
                            "Skipping incomplete type replacement"
                        );
                    }
                    complete
                })
                .collect()
        };

        let interfaces = complete(TypeKind::Interface, &self.interfaces);
        let structs = complete(TypeKind::Struct, &self.structs);
        let classes = complete(TypeKind::Class, &self.classes);

        ResolvedBatch {
            interfaces,
            structs,
            classes,
            refreshed_enums: self.refreshed_enums.clone(),
            superseded: self.superseded.clone(),
            skipped,
        }
    }
}

/// The complete pairs of a batch, as used by one reinstancing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedBatch {
    pub interfaces: Vec<(NativeTypeId, NativeTypeId)>,
    pub structs: Vec<(NativeTypeId, NativeTypeId)>,
    pub classes: Vec<(NativeTypeId, NativeTypeId)>,
    pub refreshed_enums: BTreeSet<NativeTypeId>,
    pub superseded: Vec<NativeTypeId>,
    pub skipped: usize,
}

fn replacement(pairs: &[(NativeTypeId, NativeTypeId)], old: NativeTypeId) -> Option<NativeTypeId> {
    pairs.iter().find(|(o, _)| *o == old).map(|(_, new)| *new)
}

impl ResolvedBatch {
    pub fn struct_replacement(&self, old: NativeTypeId) -> Option<NativeTypeId> {
        replacement(&self.structs, old)
    }

    pub fn interface_replacement(&self, old: NativeTypeId) -> Option<NativeTypeId> {
        replacement(&self.interfaces, old)
    }

    pub fn class_replacement(&self, old: NativeTypeId) -> Option<NativeTypeId> {
        replacement(&self.classes, old)
    }

    pub fn has_replacements(&self) -> bool {
        !(self.interfaces.is_empty() && self.structs.is_empty() && self.classes.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> NativeTypeId {
        NativeTypeId::new(raw)
    }

    #[test]
    fn absorbs_registry_events() {
        let mut batch = ReinstancingBatch::new();
        batch.absorb([
            TypeEvent::Replaced {
                kind: TypeKind::Struct,
                name: "Stats".into(),
                old: id(1),
                new: id(2),
            },
            TypeEvent::Refreshed {
                name: "Team".into(),
                id: id(3),
            },
        ]);

        assert_eq!(batch.pairs(TypeKind::Struct), &[TypePair::new(id(1), id(2))]);
        let resolved = batch.resolve();
        assert!(resolved.refreshed_enums.contains(&id(3)));
        assert_eq!(resolved.struct_replacement(id(1)), Some(id(2)));
        assert_eq!(resolved.struct_replacement(id(2)), None);
    }

    #[test]
    fn incomplete_pairs_are_skipped() {
        let mut batch = ReinstancingBatch::new();
        batch.push(TypeKind::Class, TypePair { old: Some(id(1)), new: None });
        batch.push(TypeKind::Interface, TypePair { old: None, new: Some(id(5)) });
        batch.push(TypeKind::Class, TypePair::new(id(7), id(8)));

        let resolved = batch.resolve();
        assert_eq!(resolved.skipped, 2);
        assert_eq!(resolved.classes, vec![(id(7), id(8))]);
        assert!(resolved.interfaces.is_empty());
    }

    #[test]
    fn repeated_replacement_collapses() {
        let mut batch = ReinstancingBatch::new();
        batch.push(TypeKind::Class, TypePair::new(id(1), id(2)));
        batch.push(TypeKind::Class, TypePair::new(id(2), id(3)));

        let resolved = batch.resolve();
        assert_eq!(resolved.classes, vec![(id(1), id(3))]);
        assert_eq!(resolved.superseded, vec![id(2)]);
    }

    #[test]
    fn clear_empties_everything() {
        let mut batch = ReinstancingBatch::new();
        batch.push(TypeKind::Struct, TypePair::new(id(1), id(2)));
        batch.push_refreshed_enum(id(4));
        assert!(!batch.is_empty());
        batch.clear();
        assert!(batch.is_empty());
    }
}
