use anyhow::Result;
use serde_json::json;
use tether_core::{MemoryFramework, TypeKind};
use tether_runtime::LifecycleManager;
use tether_types::{EntryOrigin, TypeDescriptorEntry, TypeRegistry};

/// Load every module into an in-memory framework and print what came of it.
pub fn run(mut manager: LifecycleManager, as_json: bool) -> Result<()> {
    let mut framework = MemoryFramework::new();
    let loads = manager.load_all_modules(&mut framework);
    tracing::info!(
        dir = %manager.storage().base_dir().display(),
        modules = loads.len(),
        "Metadata loaded"
    );

    let registry = manager.registry();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report(registry))?);
        return Ok(());
    }

    let modules: Vec<&str> = registry.modules().collect();
    println!("modules: {}", modules.join(", "));
    for kind in TypeKind::ALL {
        for (name, entry) in registry.entries(kind) {
            println!(
                "{:<10} {:<32} {:<12} {}",
                kind.to_string(),
                name,
                state(entry),
                entry.module.as_deref().unwrap_or("-")
            );
        }
    }

    let stalled = registry.stalled_classes();
    if !stalled.is_empty() {
        println!("pending:");
        for (class, parent) in stalled {
            println!("  {class} waits on {parent}");
        }
    }
    Ok(())
}

fn state(entry: &TypeDescriptorEntry) -> String {
    match (entry.built(), entry.origin) {
        (Some(id), EntryOrigin::Managed) => format!("built #{id}"),
        (Some(id), EntryOrigin::Native) => format!("native #{id}"),
        (None, _) => "pending".to_string(),
    }
}

fn report(registry: &TypeRegistry) -> serde_json::Value {
    let types: Vec<serde_json::Value> = TypeKind::ALL
        .iter()
        .flat_map(|kind| registry.entries(*kind))
        .map(|(name, entry)| {
            json!({
                "kind": entry.kind().to_string(),
                "name": name,
                "display_name": entry.display_name(),
                "module": entry.module,
                "native": entry.built().map(|id| id.raw()),
                "managed": entry.managed.is_some(),
            })
        })
        .collect();
    let pending: Vec<serde_json::Value> = registry
        .stalled_classes()
        .into_iter()
        .map(|(class, parent)| json!({ "class": class, "parent": parent }))
        .collect();

    json!({
        "modules": registry.modules().collect::<Vec<_>>(),
        "types": types,
        "pending": pending,
    })
}
