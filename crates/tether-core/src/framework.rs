//! Collaboration surfaces of the two runtimes Tether sits between.
//!
//! The native framework is reached through [`TypeIndex`], [`ReloadHost`] and
//! [`ObjectDeleteListener`]; the managed environment through
//! [`ManagedRuntime`]. Tether never implements the other side of these, only
//! drives them.

use crate::error::FrameworkError;
use crate::graph::{Blueprint, FunctionRef, NodeId, TableId};
use crate::handle::{ManagedHandle, ManagedMethodHandle, ManagedTypeHandle, NativeObjectId};
use crate::types::{NativeTypeId, NativeTypeInfo, TypeKind, TypeMetadataRecord};

/// The native framework's index of live type objects.
pub trait TypeIndex {
    /// Search already-loaded native types by exact name.
    fn find_type(&self, kind: TypeKind, name: &str) -> Option<NativeTypeId>;

    fn describe(&self, id: NativeTypeId) -> Option<NativeTypeInfo>;

    /// Create a native type object for `record` and publish it under its
    /// name, shadowing any older type of the same kind and name.
    fn materialize(
        &mut self,
        record: &TypeMetadataRecord,
        parent: Option<NativeTypeId>,
    ) -> NativeTypeId;

    /// Rewrite an existing type object in place, keeping its identity.
    fn redefine(&mut self, id: NativeTypeId, record: &TypeMetadataRecord);

    /// Flag the type as superseded, unroot it and drop it from the index.
    fn retire(&mut self, id: NativeTypeId);
}

/// Editor-side surface the reinstancer needs on top of the type index.
pub trait ReloadHost: TypeIndex {
    /// Announce a replacement to the reflection-update mechanism.
    fn notify_change(&mut self, kind: TypeKind, old: NativeTypeId, new: NativeTypeId);

    fn blueprints(&self) -> &[Blueprint];

    fn blueprints_mut(&mut self) -> &mut [Blueprint];

    fn find_function(&self, owner: NativeTypeId, name: &str) -> Option<FunctionRef>;

    fn reconstruct_node(&mut self, blueprint: usize, node: NodeId);

    /// Object-by-object memory reinstancing of everything announced so far.
    fn reinstance_objects(&mut self);

    /// Drop cached actions for `old` and rebuild them for `new`.
    fn refresh_class_actions(&mut self, old: NativeTypeId, new: NativeTypeId);

    fn tables_with_row_type(&self, row_type: NativeTypeId) -> Vec<TableId>;

    /// Serialized snapshot of every row of a table.
    fn export_table(&self, table: TableId) -> Result<serde_json::Value, FrameworkError>;

    /// Release row storage laid out for the current row type.
    fn detach_row_type(&mut self, table: TableId);

    fn attach_row_type(&mut self, table: TableId, row_type: NativeTypeId);

    /// Replay a snapshot against the table's current row type. Returns the
    /// number of rows imported.
    fn import_table(
        &mut self,
        table: TableId,
        rows: &serde_json::Value,
    ) -> Result<usize, FrameworkError>;

    /// Tear down the property layout of a struct that has been replaced.
    fn destroy_struct_layout(&mut self, old: NativeTypeId);

    /// Property editors and compiled-graph listeners refresh here.
    fn post_reinstance(&mut self);

    /// Tell the asset registry the type object is gone.
    fn asset_deleted(&mut self, old: NativeTypeId);

    fn reload_complete(&mut self);
}

/// Subscription to the native framework's object-deletion notifications.
pub trait ObjectDeleteListener {
    /// Called for every destroyed native object, whatever its type.
    fn object_deleted(&mut self, id: NativeObjectId);

    /// Called once when the native object array itself is torn down.
    fn object_array_shutdown(&mut self);
}

/// Calls into the managed environment.
///
/// Every call returns a sentinel on failure rather than unwinding across the
/// boundary; implementations convert those sentinels into `Option`/`Result`.
pub trait ManagedRuntime: Send + Sync {
    fn lookup_type(
        &self,
        assembly: Option<&str>,
        namespace: &str,
        name: &str,
    ) -> Option<ManagedTypeHandle>;

    /// Construct a managed instance of `type_handle` as the peer of `native`.
    fn create_object(
        &self,
        native: NativeObjectId,
        type_handle: ManagedTypeHandle,
    ) -> Option<ManagedHandle>;

    /// Demote and free a handle so the managed collector may reclaim it.
    fn release_handle(&self, handle: ManagedHandle);

    fn lookup_method(
        &self,
        type_handle: ManagedTypeHandle,
        name: &str,
    ) -> Option<ManagedMethodHandle>;

    fn invoke_method(
        &self,
        target: ManagedHandle,
        method: ManagedMethodHandle,
    ) -> Result<(), FrameworkError>;
}
