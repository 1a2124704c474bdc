//! In-process native framework.
//!
//! `MemoryFramework` implements the native collaboration traits over plain
//! maps. The CLI uses it to inspect metadata without an engine attached, and
//! the test suites use it as the framework under test. It records every call
//! the reinstancer makes so ordering can be asserted.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::num::NonZeroUsize;

use serde_json::{Map, Value};

use crate::error::FrameworkError;
use crate::framework::{ObjectDeleteListener, ReloadHost, TypeIndex};
use crate::graph::{Blueprint, FunctionRef, NodeId, TableId};
use crate::handle::NativeObjectId;
use crate::types::{NativeTypeId, NativeTypeInfo, TypeKind, TypeMetadataRecord};

const WORD: usize = std::mem::size_of::<usize>();

/// Something the framework was asked to do, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameworkEvent {
    Materialized { kind: TypeKind, name: String, id: NativeTypeId },
    Redefined(NativeTypeId),
    Notified { kind: TypeKind, old: NativeTypeId, new: NativeTypeId },
    NodeReconstructed { blueprint: usize, node: NodeId },
    ObjectsReinstanced,
    ClassActionsRefreshed { old: NativeTypeId, new: NativeTypeId },
    RowTypeAttached { table: TableId, row_type: NativeTypeId },
    StructLayoutDestroyed(NativeTypeId),
    PostReinstance,
    AssetDeleted(NativeTypeId),
    Retired(NativeTypeId),
    ReloadComplete,
}

struct TypeSlot {
    info: NativeTypeInfo,
    record: TypeMetadataRecord,
    rooted: bool,
}

/// A row-typed table: row name → field name → value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    pub name: String,
    pub row_type: Option<NativeTypeId>,
    pub rows: BTreeMap<String, Map<String, Value>>,
}

#[derive(Default)]
pub struct MemoryFramework {
    types: BTreeMap<NativeTypeId, TypeSlot>,
    index: HashMap<(TypeKind, String), NativeTypeId>,
    next_type: u64,
    next_object: usize,
    objects: BTreeMap<NativeObjectId, NativeTypeId>,
    blueprints: Vec<Blueprint>,
    tables: Vec<DataTable>,
    events: Vec<FrameworkEvent>,
}

impl MemoryFramework {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type that exists natively, outside any managed module.
    pub fn register_native(&mut self, record: TypeMetadataRecord) -> NativeTypeId {
        let parent = record
            .parent_name()
            .and_then(|name| self.find_type(record.kind, name));
        self.materialize(&record, parent)
    }

    /// Allocate a native object of the given type.
    pub fn spawn_object(&mut self, type_id: NativeTypeId) -> NativeObjectId {
        // Word-aligned, never zero.
        let addr = NonZeroUsize::MIN.saturating_add(self.next_object * WORD + WORD - 1);
        self.next_object += 1;
        let id = NativeObjectId::new(addr);
        self.objects.insert(id, type_id);
        id
    }

    /// Destroy an object and deliver the deletion notification.
    pub fn destroy_object(
        &mut self,
        id: NativeObjectId,
        listener: &mut dyn ObjectDeleteListener,
    ) -> bool {
        let existed = self.objects.remove(&id).is_some();
        listener.object_deleted(id);
        existed
    }

    pub fn object_type(&self, id: NativeObjectId) -> Option<NativeTypeId> {
        self.objects.get(&id).copied()
    }

    pub fn add_blueprint(&mut self, blueprint: Blueprint) -> usize {
        self.blueprints.push(blueprint);
        self.blueprints.len() - 1
    }

    pub fn blueprint(&self, index: usize) -> Option<&Blueprint> {
        self.blueprints.get(index)
    }

    pub fn add_table(
        &mut self,
        name: impl Into<String>,
        row_type: NativeTypeId,
        rows: BTreeMap<String, Map<String, Value>>,
    ) -> TableId {
        self.tables.push(DataTable {
            name: name.into(),
            row_type: Some(row_type),
            rows,
        });
        TableId((self.tables.len() - 1) as u32)
    }

    pub fn table(&self, id: TableId) -> Option<&DataTable> {
        self.tables.get(id.0 as usize)
    }

    /// Every type object ever created, including superseded ones.
    pub fn all_types(&self) -> impl Iterator<Item = &NativeTypeInfo> {
        self.types.values().map(|slot| &slot.info)
    }

    /// Whether the type is still reachable through the name index.
    pub fn is_indexed(&self, id: NativeTypeId) -> bool {
        self.index.values().any(|indexed| *indexed == id)
    }

    pub fn is_rooted(&self, id: NativeTypeId) -> bool {
        self.types.get(&id).is_some_and(|slot| slot.rooted)
    }

    pub fn record(&self, id: NativeTypeId) -> Option<&TypeMetadataRecord> {
        self.types.get(&id).map(|slot| &slot.record)
    }

    pub fn events(&self) -> &[FrameworkEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<FrameworkEvent> {
        std::mem::take(&mut self.events)
    }

    fn table_mut(&mut self, id: TableId) -> Result<&mut DataTable, FrameworkError> {
        self.tables
            .get_mut(id.0 as usize)
            .ok_or(FrameworkError::TableNotFound(id))
    }

    fn row_fields(&self, row_type: NativeTypeId) -> Result<BTreeSet<String>, FrameworkError> {
        let slot = self
            .types
            .get(&row_type)
            .ok_or(FrameworkError::UnknownType(row_type))?;
        Ok(slot.record.properties().map(|p| p.name.clone()).collect())
    }
}

impl TypeIndex for MemoryFramework {
    fn find_type(&self, kind: TypeKind, name: &str) -> Option<NativeTypeId> {
        self.index.get(&(kind, name.to_string())).copied()
    }

    fn describe(&self, id: NativeTypeId) -> Option<NativeTypeInfo> {
        self.types.get(&id).map(|slot| slot.info.clone())
    }

    fn materialize(
        &mut self,
        record: &TypeMetadataRecord,
        parent: Option<NativeTypeId>,
    ) -> NativeTypeId {
        self.next_type += 1;
        let id = NativeTypeId::new(self.next_type);
        let info = NativeTypeInfo {
            id,
            kind: record.kind,
            name: record.name.clone(),
            namespace: record.namespace.clone(),
            parent,
            superseded: false,
        };
        self.types.insert(
            id,
            TypeSlot {
                info,
                record: record.clone(),
                rooted: true,
            },
        );
        self.index.insert((record.kind, record.name.clone()), id);
        self.events.push(FrameworkEvent::Materialized {
            kind: record.kind,
            name: record.name.clone(),
            id,
        });
        id
    }

    fn redefine(&mut self, id: NativeTypeId, record: &TypeMetadataRecord) {
        if let Some(slot) = self.types.get_mut(&id) {
            slot.record = record.clone();
            slot.info.namespace = record.namespace.clone();
            self.events.push(FrameworkEvent::Redefined(id));
        }
    }

    fn retire(&mut self, id: NativeTypeId) {
        let Some(slot) = self.types.get_mut(&id) else {
            return;
        };
        slot.info.superseded = true;
        slot.rooted = false;
        let key = (slot.info.kind, slot.info.name.clone());
        if self.index.get(&key) == Some(&id) {
            self.index.remove(&key);
        }
        self.events.push(FrameworkEvent::Retired(id));
    }
}

impl ReloadHost for MemoryFramework {
    fn notify_change(&mut self, kind: TypeKind, old: NativeTypeId, new: NativeTypeId) {
        self.events.push(FrameworkEvent::Notified { kind, old, new });
    }

    fn blueprints(&self) -> &[Blueprint] {
        &self.blueprints
    }

    fn blueprints_mut(&mut self) -> &mut [Blueprint] {
        &mut self.blueprints
    }

    fn find_function(&self, owner: NativeTypeId, name: &str) -> Option<FunctionRef> {
        let mut current = Some(owner);
        while let Some(id) = current {
            let slot = self.types.get(&id)?;
            if slot.record.functions().any(|f| f.name == name) {
                return Some(FunctionRef {
                    owner: id,
                    name: name.to_string(),
                });
            }
            current = slot.info.parent;
        }
        None
    }

    fn reconstruct_node(&mut self, blueprint: usize, node: NodeId) {
        self.events
            .push(FrameworkEvent::NodeReconstructed { blueprint, node });
    }

    fn reinstance_objects(&mut self) {
        self.events.push(FrameworkEvent::ObjectsReinstanced);
    }

    fn refresh_class_actions(&mut self, old: NativeTypeId, new: NativeTypeId) {
        self.events
            .push(FrameworkEvent::ClassActionsRefreshed { old, new });
    }

    fn tables_with_row_type(&self, row_type: NativeTypeId) -> Vec<TableId> {
        self.tables
            .iter()
            .enumerate()
            .filter(|(_, table)| table.row_type == Some(row_type))
            .map(|(index, _)| TableId(index as u32))
            .collect()
    }

    fn export_table(&self, table: TableId) -> Result<Value, FrameworkError> {
        let data = self.table(table).ok_or(FrameworkError::TableNotFound(table))?;
        Ok(serde_json::to_value(&data.rows)?)
    }

    fn detach_row_type(&mut self, table: TableId) {
        if let Ok(data) = self.table_mut(table) {
            data.rows.clear();
            data.row_type = None;
        }
    }

    fn attach_row_type(&mut self, table: TableId, row_type: NativeTypeId) {
        if let Ok(data) = self.table_mut(table) {
            data.row_type = Some(row_type);
            self.events
                .push(FrameworkEvent::RowTypeAttached { table, row_type });
        }
    }

    fn import_table(&mut self, table: TableId, rows: &Value) -> Result<usize, FrameworkError> {
        let row_type = self
            .table(table)
            .ok_or(FrameworkError::TableNotFound(table))?
            .row_type
            .ok_or(FrameworkError::MissingRowType { table })?;
        let fields = self.row_fields(row_type)?;

        let Value::Object(source) = rows else {
            return Err(FrameworkError::TableImport(
                "snapshot is not a JSON object".into(),
            ));
        };

        let mut imported = BTreeMap::new();
        for (row_name, row) in source {
            let Value::Object(values) = row else {
                return Err(FrameworkError::TableImport(format!(
                    "row '{row_name}' is not a JSON object"
                )));
            };
            let mut kept = Map::new();
            for field in &fields {
                let value = values.get(field).cloned().unwrap_or(Value::Null);
                kept.insert(field.clone(), value);
            }
            imported.insert(row_name.clone(), kept);
        }

        let count = imported.len();
        self.table_mut(table)?.rows = imported;
        Ok(count)
    }

    fn destroy_struct_layout(&mut self, old: NativeTypeId) {
        if let Some(slot) = self.types.get_mut(&old) {
            slot.record.members.clear();
            self.events.push(FrameworkEvent::StructLayoutDestroyed(old));
        }
    }

    fn post_reinstance(&mut self) {
        self.events.push(FrameworkEvent::PostReinstance);
    }

    fn asset_deleted(&mut self, old: NativeTypeId) {
        self.events.push(FrameworkEvent::AssetDeleted(old));
    }

    fn reload_complete(&mut self) {
        self.events.push(FrameworkEvent::ReloadComplete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemberDescriptor;

    #[derive(Default)]
    struct Recorder(Vec<NativeObjectId>);

    impl ObjectDeleteListener for Recorder {
        fn object_deleted(&mut self, id: NativeObjectId) {
            self.0.push(id);
        }

        fn object_array_shutdown(&mut self) {}
    }

    fn row_struct(name: &str, fields: &[&str]) -> TypeMetadataRecord {
        let mut record = TypeMetadataRecord::new(TypeKind::Struct, name);
        for field in fields {
            record = record.with_member(MemberDescriptor::property(*field, "int"));
        }
        record
    }

    #[test]
    fn materialize_shadows_older_type_of_same_name() {
        let mut fw = MemoryFramework::new();
        let old = fw.register_native(row_struct("Stats", &["hp"]));
        let new = fw.materialize(&row_struct("Stats", &["hp", "mp"]), None);

        assert_ne!(old, new);
        assert_eq!(fw.find_type(TypeKind::Struct, "Stats"), Some(new));
        assert!(fw.describe(old).is_some());
    }

    #[test]
    fn retire_unindexes_and_unroots() {
        let mut fw = MemoryFramework::new();
        let id = fw.register_native(row_struct("Stats", &["hp"]));
        fw.retire(id);

        assert_eq!(fw.find_type(TypeKind::Struct, "Stats"), None);
        assert!(!fw.is_rooted(id));
        assert!(fw.describe(id).unwrap().superseded);
    }

    #[test]
    fn find_function_walks_parents() {
        let mut fw = MemoryFramework::new();
        let base = fw.register_native(
            TypeMetadataRecord::new(TypeKind::Class, "Actor")
                .with_member(MemberDescriptor::function("Tick")),
        );
        let child = fw.register_native(TypeMetadataRecord::new(TypeKind::Class, "Pawn").with_parent("Actor"));

        let found = fw.find_function(child, "Tick").unwrap();
        assert_eq!(found.owner, base);
        assert!(fw.find_function(child, "Jump").is_none());
    }

    #[test]
    fn import_keeps_only_row_type_fields() {
        let mut fw = MemoryFramework::new();
        let old = fw.register_native(row_struct("Stats", &["hp", "legacy"]));
        let mut rows = BTreeMap::new();
        let mut row = Map::new();
        row.insert("hp".into(), Value::from(10));
        row.insert("legacy".into(), Value::from(1));
        rows.insert("goblin".to_string(), row);
        let table = fw.add_table("Monsters", old, rows);

        let snapshot = fw.export_table(table).unwrap();
        let new = fw.materialize(&row_struct("Stats", &["hp", "armor"]), None);
        fw.detach_row_type(table);
        fw.attach_row_type(table, new);
        let count = fw.import_table(table, &snapshot).unwrap();

        assert_eq!(count, 1);
        let goblin = &fw.table(table).unwrap().rows["goblin"];
        assert_eq!(goblin["hp"], Value::from(10));
        assert_eq!(goblin["armor"], Value::Null);
        assert!(!goblin.contains_key("legacy"));
    }

    #[test]
    fn import_without_row_type_fails() {
        let mut fw = MemoryFramework::new();
        let id = fw.register_native(row_struct("Stats", &["hp"]));
        let table = fw.add_table("Empty", id, BTreeMap::new());
        fw.detach_row_type(table);

        let err = fw.import_table(table, &Value::Object(Map::new())).unwrap_err();
        assert!(matches!(err, FrameworkError::MissingRowType { .. }));
    }

    #[test]
    fn destroy_object_notifies_listener() {
        let mut fw = MemoryFramework::new();
        let ty = fw.register_native(TypeMetadataRecord::new(TypeKind::Class, "Actor"));
        let obj = fw.spawn_object(ty);
        let mut recorder = Recorder::default();

        assert!(fw.destroy_object(obj, &mut recorder));
        assert_eq!(recorder.0, vec![obj]);
        assert!(fw.object_type(obj).is_none());
    }
}
