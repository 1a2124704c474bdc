//! Module loading and reloading through the lifecycle manager, against the
//! in-memory framework and a detached runtime.

use std::fs;
use std::sync::Arc;

use tether_core::{MemoryFramework, TypeIndex, TypeKind, TypeMetadataRecord};
use tether_runtime::{DetachedRuntime, LifecycleManager, TetherConfig};
use tether_types::TypeEvent;

fn manager(dir: &std::path::Path) -> (LifecycleManager, Arc<DetachedRuntime>) {
    let mut config = TetherConfig::default();
    config.modules.metadata_dir = dir.to_path_buf();
    let runtime = Arc::new(DetachedRuntime::new());
    let manager = LifecycleManager::with_runtime(config, runtime.clone()).unwrap();
    (manager, runtime)
}

fn write(dir: &std::path::Path, module: &str, json: &str) {
    fs::write(dir.join(format!("{module}.metadata.json")), json).unwrap();
}

#[test]
fn load_all_skips_broken_modules_and_resolves_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    // Alphabetical order loads the dependent module first.
    write(
        dir.path(),
        "AGameplay",
        r#"{ "ClassMetaData": [ { "Name": "Hero", "ParentClass": { "Name": "Character" } } ] }"#,
    );
    write(dir.path(), "Broken", "{ nope");
    write(
        dir.path(),
        "Characters",
        r#"{ "ClassMetaData": [ { "Name": "Character", "ParentClass": { "Name": "Actor" } } ] }"#,
    );

    let mut fw = MemoryFramework::new();
    fw.register_native(TypeMetadataRecord::new(TypeKind::Class, "Actor"));
    let (mut manager, _) = manager(dir.path());

    let loads = manager.load_all_modules(&mut fw);
    let names: Vec<&str> = loads.iter().map(|l| l.module.as_str()).collect();
    assert_eq!(names, vec!["AGameplay", "Characters"]);

    let hero = manager.registry().descriptor(TypeKind::Class, "Hero").unwrap();
    let character = manager.registry().descriptor(TypeKind::Class, "Character").unwrap();
    assert_eq!(fw.describe(hero.native).unwrap().parent, Some(character.native));
    assert!(hero.managed.is_some());
    assert!(manager.registry().stalled_classes().is_empty());
}

#[test]
fn reload_only_touches_changed_modules() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Game", r#"{ "StructMetaData": [ { "Name": "Stats" } ] }"#);
    write(dir.path(), "Other", r#"{ "StructMetaData": [ { "Name": "Loot" } ] }"#);

    let mut fw = MemoryFramework::new();
    let (mut manager, _) = manager(dir.path());
    manager.load_all_modules(&mut fw);
    let old_stats = manager.registry().descriptor(TypeKind::Struct, "Stats").unwrap().native;
    let loot = manager.registry().descriptor(TypeKind::Struct, "Loot").unwrap().native;

    assert!(manager.reload_changed(&mut fw).is_empty());

    write(
        dir.path(),
        "Game",
        r#"{ "StructMetaData": [ { "Name": "Stats", "Properties": [ { "Name": "Hp", "Type": "int" } ] } ] }"#,
    );
    let events = manager.reload_changed(&mut fw);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0],
        TypeEvent::Replaced { kind: TypeKind::Struct, old, .. } if *old == old_stats));
    assert_eq!(
        manager.registry().descriptor(TypeKind::Struct, "Loot").unwrap().native,
        loot
    );
}

#[test]
fn deleted_module_retires_its_types() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Game", r#"{ "EnumMetaData": [ { "Name": "Team", "Items": ["Red"] } ] }"#);

    let mut fw = MemoryFramework::new();
    let (mut manager, _) = manager(dir.path());
    manager.load_all_modules(&mut fw);
    let team = manager.registry().descriptor(TypeKind::Enum, "Team").unwrap().native;

    fs::remove_file(dir.path().join("Game.metadata.json")).unwrap();
    manager.reload_changed(&mut fw);

    assert!(manager.registry().entry(TypeKind::Enum, "Team").is_none());
    assert!(fw.find_type(TypeKind::Enum, "Team").is_none());
    assert!(!fw.is_rooted(team));
}

#[test]
fn peers_follow_native_objects() {
    let dir = tempfile::tempdir().unwrap();
    let mut fw = MemoryFramework::new();
    let (mut manager, runtime) = manager(dir.path());
    let door = fw.register_native(TypeMetadataRecord::new(TypeKind::Class, "Door_C"));
    let a = fw.spawn_object(door);
    let b = fw.spawn_object(door);

    let peer_a = manager.peer_for(&mut fw, a, door).unwrap();
    let again = manager.peer_for(&mut fw, a, door).unwrap();
    assert_eq!(peer_a, again);
    manager.peer_for(&mut fw, b, door).unwrap();
    assert_eq!(runtime.live_handles(), 2);

    fw.destroy_object(a, &mut manager);
    assert_eq!(runtime.live_handles(), 1);
    assert!(manager.bridge().find_peer(a).is_none());

    assert_eq!(manager.shutdown(), 1);
    assert_eq!(runtime.live_handles(), 0);
}
