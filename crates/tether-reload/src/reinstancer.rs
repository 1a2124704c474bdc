use std::collections::HashMap;

use tether_core::graph::{FunctionRef, NodeId, NodeKind, TableId};
use tether_core::{NativeTypeId, ReloadHost, TypeKind};
use tether_types::{TypeEvent, TypeRegistry};
use tracing::{debug, error, info, warn};

use crate::batch::{ReinstancingBatch, ResolvedBatch, TypePair};
use crate::error::ReloadError;
use crate::pin::{EnumIndex, PinUpdate, try_update_pin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReinstancePhase {
    Idle,
    Notifying,
    GraphPatching,
    Reinstancing,
    PostFix,
}

/// Counts from one reinstancing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReinstanceReport {
    pub interfaces: usize,
    pub structs: usize,
    pub classes: usize,
    /// Pairs dropped for missing their old or new side.
    pub skipped: usize,
    pub pins_retargeted: usize,
    pub pins_revalidated: usize,
    pub pins_unresolved: usize,
    pub functions_rebound: usize,
    pub nodes_reconstructed: usize,
    pub tables_migrated: usize,
    pub rows_migrated: usize,
    /// Old type objects removed from the native index, in retirement order.
    pub retired: Vec<NativeTypeId>,
}

impl ReinstanceReport {
    fn count_pin(&mut self, update: PinUpdate) {
        match update {
            PinUpdate::Retargeted { .. } => self.pins_retargeted += 1,
            PinUpdate::Revalidated => self.pins_revalidated += 1,
            PinUpdate::Unresolved => self.pins_unresolved += 1,
            PinUpdate::Unchanged => {}
        }
    }
}

/// Swaps replaced types out of everything that still references them.
///
/// Replacements accumulate in a [`ReinstancingBatch`] as modules reload.
/// [`start_reinstancing`](Self::start_reinstancing) then runs one pass over
/// the whole batch and clears it.
#[derive(Debug)]
pub struct Reinstancer {
    batch: ReinstancingBatch,
    phase: ReinstancePhase,
}

impl Default for Reinstancer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reinstancer {
    pub fn new() -> Self {
        Self {
            batch: ReinstancingBatch::new(),
            phase: ReinstancePhase::Idle,
        }
    }

    pub fn phase(&self) -> ReinstancePhase {
        self.phase
    }

    pub fn batch(&self) -> &ReinstancingBatch {
        &self.batch
    }

    /// Queue the replacements reported by the type registry.
    pub fn absorb(&mut self, events: impl IntoIterator<Item = TypeEvent>) {
        self.batch.absorb(events);
    }

    pub fn add_pending(&mut self, kind: TypeKind, pair: TypePair) {
        self.batch.push(kind, pair);
    }

    fn enter(&mut self, phase: ReinstancePhase) {
        debug!(from = ?self.phase, to = ?phase, "Reinstancing phase");
        self.phase = phase;
    }

    /// Run a full pass over the queued replacements.
    ///
    /// Interfaces are announced before structs and structs before classes.
    /// Graphs are patched before objects are reinstanced, and old types are
    /// only retired once tables have been migrated off them. The batch is
    /// cleared whatever happens.
    pub fn start_reinstancing<H: ReloadHost + ?Sized>(
        &mut self,
        host: &mut H,
        registry: &mut TypeRegistry,
    ) -> ReinstanceReport {
        if self.batch.is_empty() {
            debug!("Nothing to reinstance");
            return ReinstanceReport::default();
        }

        let batch = self.batch.resolve();
        let mut report = ReinstanceReport {
            interfaces: batch.interfaces.len(),
            structs: batch.structs.len(),
            classes: batch.classes.len(),
            skipped: batch.skipped,
            ..ReinstanceReport::default()
        };
        info!(
            interfaces = report.interfaces,
            structs = report.structs,
            classes = report.classes,
            enums = batch.refreshed_enums.len(),
            "Starting reinstancing"
        );

        self.enter(ReinstancePhase::Notifying);
        notify_changes(host, TypeKind::Interface, &batch.interfaces);
        notify_changes(host, TypeKind::Struct, &batch.structs);
        notify_changes(host, TypeKind::Class, &batch.classes);

        self.enter(ReinstancePhase::GraphPatching);
        update_blueprints(host, registry, &batch, &mut report);

        self.enter(ReinstancePhase::Reinstancing);
        host.reinstance_objects();

        self.enter(ReinstancePhase::PostFix);
        post_reinstance(host, &batch, &mut report);

        for old in batch
            .interfaces
            .iter()
            .chain(&batch.structs)
            .chain(&batch.classes)
            .map(|(old, _)| *old)
            .chain(batch.superseded.iter().copied())
        {
            host.asset_deleted(old);
            host.retire(old);
            report.retired.push(old);
        }

        self.batch.clear();
        host.reload_complete();
        self.enter(ReinstancePhase::Idle);

        info!(
            retired = report.retired.len(),
            nodes = report.nodes_reconstructed,
            tables = report.tables_migrated,
            "Reinstancing complete"
        );
        report
    }
}

fn notify_changes<H: ReloadHost + ?Sized>(
    host: &mut H,
    kind: TypeKind,
    pairs: &[(NativeTypeId, NativeTypeId)],
) {
    for (old, new) in pairs {
        host.notify_change(kind, *old, *new);
    }
}

/// Rewrite every type reference in every blueprint.
///
/// Lookups that need the host (enum names, function bindings) are resolved
/// up front so the graphs can be patched in a single mutable pass.
fn update_blueprints<H: ReloadHost + ?Sized>(
    host: &mut H,
    registry: &mut TypeRegistry,
    batch: &ResolvedBatch,
    report: &mut ReinstanceReport,
) {
    let enum_ids = referenced_enums(&*host);
    let enums = EnumIndex::prepare(enum_ids, host, registry, batch.refreshed_enums.clone());
    let functions = rebound_functions(&*host, batch);

    let mut reconstruct: Vec<(usize, NodeId)> = Vec::new();
    for (index, blueprint) in host.blueprints_mut().iter_mut().enumerate() {
        for variable in &mut blueprint.variables {
            let update = try_update_pin(&mut variable.var_type, batch, &enums);
            report.count_pin(update);
            if update.is_changed() {
                debug!(blueprint = %blueprint.name, variable = %variable.name, "Variable type updated");
            }
        }

        for node in &mut blueprint.nodes {
            let mut changed = false;
            // Editable-pin nodes rebuild their pins from the user-defined set.
            let editable = matches!(node.kind, NodeKind::EditablePins { .. });

            match &mut node.kind {
                NodeKind::CallFunction { function } => {
                    if let Some(old) = function.parent
                        && batch.class_replacement(old).is_some()
                    {
                        match functions.get(&(old, function.member_name.clone())) {
                            Some(Some(found)) => {
                                function.parent = Some(found.owner);
                                report.functions_rebound += 1;
                                changed = true;
                            }
                            _ => warn!(
                                blueprint = %blueprint.name,
                                function = %function.member_name,
                                "Function missing on reloaded class"
                            ),
                        }
                    }
                }
                NodeKind::AsyncAction {
                    proxy_class,
                    factory_function,
                    bound,
                } => {
                    if let Some(old) = *proxy_class
                        && let Some(new) = batch.class_replacement(old)
                    {
                        *proxy_class = Some(new);
                        changed = true;
                        match functions.get(&(old, factory_function.clone())) {
                            Some(Some(found)) => {
                                *bound = Some(found.clone());
                                report.functions_rebound += 1;
                            }
                            _ => {
                                *bound = None;
                                warn!(
                                    blueprint = %blueprint.name,
                                    function = %factory_function,
                                    "Async action factory missing on reloaded class"
                                );
                            }
                        }
                    }
                }
                NodeKind::EditablePins { user_pins } => {
                    for pin in user_pins {
                        let update = try_update_pin(pin, batch, &enums);
                        report.count_pin(update);
                        changed |= update.is_changed();
                    }
                }
                NodeKind::Generic => {}
            }

            if !editable {
                for pin in &mut node.pins {
                    let update = try_update_pin(pin, batch, &enums);
                    report.count_pin(update);
                    changed |= update.is_changed();
                }
            }

            if changed {
                reconstruct.push((index, node.id));
            }
        }
    }

    for (blueprint, node) in reconstruct {
        host.reconstruct_node(blueprint, node);
        report.nodes_reconstructed += 1;
    }
}

/// Every enum id any pin or variable currently references.
fn referenced_enums<H: ReloadHost + ?Sized>(host: &H) -> Vec<NativeTypeId> {
    let mut ids: Vec<NativeTypeId> = host
        .blueprints()
        .iter()
        .flat_map(|blueprint| blueprint.pin_types())
        .filter_map(|pin| pin.enum_reference())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Look up, on each replacement class, the functions graphs bind by name on
/// the class it replaces.
fn rebound_functions<H: ReloadHost + ?Sized>(
    host: &H,
    batch: &ResolvedBatch,
) -> HashMap<(NativeTypeId, String), Option<FunctionRef>> {
    let mut functions = HashMap::new();
    for blueprint in host.blueprints() {
        for node in &blueprint.nodes {
            let (old, name) = match &node.kind {
                NodeKind::CallFunction { function } => match function.parent {
                    Some(old) => (old, &function.member_name),
                    None => continue,
                },
                NodeKind::AsyncAction {
                    proxy_class: Some(old),
                    factory_function,
                    ..
                } => (*old, factory_function),
                _ => continue,
            };
            let Some(new) = batch.class_replacement(old) else {
                continue;
            };
            functions
                .entry((old, name.clone()))
                .or_insert_with(|| host.find_function(new, name));
        }
    }
    functions
}

fn post_reinstance<H: ReloadHost + ?Sized>(
    host: &mut H,
    batch: &ResolvedBatch,
    report: &mut ReinstanceReport,
) {
    for (old, new) in &batch.classes {
        host.refresh_class_actions(*old, *new);
    }

    for (old, new) in &batch.structs {
        for table in host.tables_with_row_type(*old) {
            match migrate_table(host, table, *new) {
                Ok(rows) => {
                    report.tables_migrated += 1;
                    report.rows_migrated += rows;
                    debug!(table = ?table, rows, "Table migrated to new row type");
                }
                Err(e) => error!(error = %e, "Table migration failed"),
            }
        }
    }

    for (old, _) in &batch.structs {
        host.destroy_struct_layout(*old);
    }

    host.post_reinstance();
}

/// Snapshot a table's rows, swap its row type and replay the snapshot.
fn migrate_table<H: ReloadHost + ?Sized>(
    host: &mut H,
    table: TableId,
    row_type: NativeTypeId,
) -> Result<usize, ReloadError> {
    let snapshot: serde_json::Value = host
        .export_table(table)
        .map_err(|source| ReloadError::TableExport { table, source })?;
    host.detach_row_type(table);
    host.attach_row_type(table, row_type);
    host.import_table(table, &snapshot)
        .map_err(|source| ReloadError::TableImport { table, source })
}
