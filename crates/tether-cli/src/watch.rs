use std::time::Duration;

use anyhow::Result;
use tether_core::MemoryFramework;
use tether_reload::{ReinstanceReport, Reinstancer};
use tether_runtime::{HotReloadMethod, LifecycleManager, ModuleWatcher};

/// Reload changed modules until interrupted.
///
/// File-driven methods wait for watcher events before checking fingerprints.
/// `on-editor-focus` has no editor to take focus from, so it polls
/// fingerprints every tick instead.
pub async fn run(mut manager: LifecycleManager) -> Result<()> {
    let hot_reload = manager.config().hot_reload.clone();
    if hot_reload.method == HotReloadMethod::Off {
        tracing::info!("Hot reload is off, nothing to watch");
        manager.shutdown();
        return Ok(());
    }

    let mut framework = MemoryFramework::new();
    let mut reinstancer = Reinstancer::new();
    let loads = manager.load_all_modules(&mut framework);
    tracing::info!(modules = loads.len(), method = ?hot_reload.method, "Initial load complete");

    let mut watcher = if hot_reload.method.watches_files() {
        Some(ModuleWatcher::new(manager.storage().base_dir())?)
    } else {
        None
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(hot_reload.debounce_ms.max(1)));
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(watcher) = watcher.as_mut() {
                    let changed = watcher.drain_changes();
                    if changed.is_empty() {
                        continue;
                    }
                    tracing::debug!(modules = ?changed, "Module metadata changed");
                }
                let report = reload_pass(&mut manager, &mut framework, &mut reinstancer);
                if report != ReinstanceReport::default() {
                    tracing::info!(
                        retired = report.retired.len(),
                        skipped = report.skipped,
                        "Hot reload applied"
                    );
                }
            }
            _ = &mut interrupted => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    let released = manager.shutdown();
    tracing::info!(released, "Watch stopped");
    Ok(())
}

fn reload_pass(
    manager: &mut LifecycleManager,
    framework: &mut MemoryFramework,
    reinstancer: &mut Reinstancer,
) -> ReinstanceReport {
    let events = manager.reload_changed(framework);
    if events.is_empty() {
        return ReinstanceReport::default();
    }
    reinstancer.absorb(events);
    reinstancer.start_reinstancing(framework, manager.registry_mut())
}
