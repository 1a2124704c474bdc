//! Full reload passes: the registry rebuilds a module against the in-memory
//! framework and the reinstancer moves everything onto the new types.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use tether_core::graph::{
    Blueprint, FunctionRef, GraphNode, MemberReference, NodeId, NodeKind, PinType,
    VariableDescription,
};
use tether_core::memory::FrameworkEvent;
use tether_core::{MemoryFramework, NativeTypeId, TypeIndex, TypeKind, TypeMetadataRecord};
use tether_reload::{ReinstancePhase, Reinstancer};
use tether_types::{ModuleMetadata, TypeRegistry};

const GAME_V1: &str = r#"{
    "ClassMetaData": [
        { "Name": "Hero", "ParentClass": { "Name": "Actor" }, "Functions": [ { "Name": "Jump" } ] }
    ],
    "StructMetaData": [
        { "Name": "Stats", "Properties": [ { "Name": "Hp", "Type": "int" } ] }
    ],
    "EnumMetaData": [ { "Name": "Team", "Items": [ "Red", "Blue" ] } ]
}"#;

const GAME_V2: &str = r#"{
    "ClassMetaData": [
        { "Name": "Hero", "ParentClass": { "Name": "Actor" }, "Functions": [ { "Name": "Jump" } ] }
    ],
    "StructMetaData": [
        { "Name": "Stats", "Properties": [
            { "Name": "Hp", "Type": "int" },
            { "Name": "Armor", "Type": "int" }
        ] }
    ],
    "EnumMetaData": [ { "Name": "Team", "Items": [ "Red", "Blue", "Green" ] } ]
}"#;

struct Game {
    fw: MemoryFramework,
    registry: TypeRegistry,
}

impl Game {
    fn load() -> Self {
        let mut fw = MemoryFramework::new();
        fw.register_native(TypeMetadataRecord::new(TypeKind::Class, "Actor"));
        let mut registry = TypeRegistry::new();
        registry.register_module(&mut fw, ModuleMetadata::parse("Game", GAME_V1).unwrap());
        registry.drain_events();
        Self { fw, registry }
    }

    fn id(&self, kind: TypeKind, name: &str) -> NativeTypeId {
        self.registry.descriptor(kind, name).unwrap().native
    }

    fn reload(&mut self, reinstancer: &mut Reinstancer) {
        self.registry
            .register_module(&mut self.fw, ModuleMetadata::parse("Game", GAME_V2).unwrap());
        reinstancer.absorb(self.registry.drain_events());
    }
}

fn row(hp: i64) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert("Hp".into(), json!(hp));
    row
}

#[test]
fn table_rows_survive_a_row_type_swap() {
    let mut game = Game::load();
    let old_stats = game.id(TypeKind::Struct, "Stats");
    let rows = BTreeMap::from([("knight".to_string(), row(120)), ("archer".to_string(), row(80))]);
    let table = game.fw.add_table("Roster", old_stats, rows);

    let mut reinstancer = Reinstancer::new();
    game.reload(&mut reinstancer);
    let report = reinstancer.start_reinstancing(&mut game.fw, &mut game.registry);

    let new_stats = game.id(TypeKind::Struct, "Stats");
    assert_ne!(old_stats, new_stats);
    assert_eq!(report.tables_migrated, 1);
    assert_eq!(report.rows_migrated, 2);

    let migrated = game.fw.table(table).unwrap();
    assert_eq!(migrated.row_type, Some(new_stats));
    assert_eq!(migrated.rows.len(), 2);
    assert_eq!(migrated.rows["knight"]["Hp"], json!(120));
    assert_eq!(migrated.rows["archer"]["Armor"], Value::Null);
}

#[test]
fn old_types_leave_the_index_and_the_batch_empties() {
    let mut game = Game::load();
    let old_hero = game.id(TypeKind::Class, "Hero");
    let old_stats = game.id(TypeKind::Struct, "Stats");
    let team = game.id(TypeKind::Enum, "Team");

    let mut reinstancer = Reinstancer::new();
    game.reload(&mut reinstancer);
    assert!(!reinstancer.batch().is_empty());
    let report = reinstancer.start_reinstancing(&mut game.fw, &mut game.registry);

    assert_eq!(report.structs, 1);
    assert_eq!(report.classes, 1);
    assert_eq!(report.retired, vec![old_stats, old_hero]);
    for old in [old_hero, old_stats] {
        assert!(!game.fw.is_indexed(old));
        assert!(!game.fw.is_rooted(old));
        assert!(game.fw.describe(old).unwrap().superseded);
    }
    // Enums are rewritten in place and keep their identity.
    assert_eq!(game.id(TypeKind::Enum, "Team"), team);
    assert!(game.fw.is_indexed(team));

    assert!(reinstancer.batch().is_empty());
    assert_eq!(reinstancer.phase(), ReinstancePhase::Idle);
    assert_eq!(game.fw.events().last(), Some(&FrameworkEvent::ReloadComplete));
}

#[test]
fn function_calls_rebind_to_the_reloaded_class() {
    let mut game = Game::load();
    let old_hero = game.id(TypeKind::Class, "Hero");
    let mut blueprint = Blueprint::new("HeroController");
    blueprint.nodes.push(GraphNode {
        id: NodeId(7),
        kind: NodeKind::CallFunction {
            function: MemberReference {
                parent: Some(old_hero),
                member_name: "Jump".into(),
            },
        },
        pins: Vec::new(),
    });
    let index = game.fw.add_blueprint(blueprint);

    let mut reinstancer = Reinstancer::new();
    game.reload(&mut reinstancer);
    let report = reinstancer.start_reinstancing(&mut game.fw, &mut game.registry);

    let new_hero = game.id(TypeKind::Class, "Hero");
    assert_eq!(report.functions_rebound, 1);
    let NodeKind::CallFunction { function } = &game.fw.blueprint(index).unwrap().nodes[0].kind
    else {
        panic!("node kind changed");
    };
    assert_eq!(function.parent, Some(new_hero));
    assert!(game.fw.events().contains(&FrameworkEvent::NodeReconstructed {
        blueprint: index,
        node: NodeId(7),
    }));
    assert!(game.fw.events().contains(&FrameworkEvent::ClassActionsRefreshed {
        old: old_hero,
        new: new_hero,
    }));
}

#[test]
fn pins_follow_structs_and_revalidate_enums() {
    let mut game = Game::load();
    let old_stats = game.id(TypeKind::Struct, "Stats");
    let team = game.id(TypeKind::Enum, "Team");
    let mut blueprint = Blueprint::new("Scoreboard");
    blueprint.variables.push(VariableDescription {
        name: "Stats".into(),
        var_type: PinType::of_struct(old_stats),
    });
    blueprint.nodes.push(GraphNode {
        id: NodeId(1),
        kind: NodeKind::Generic,
        pins: vec![PinType::of_enum(team)],
    });
    let index = game.fw.add_blueprint(blueprint);

    let mut reinstancer = Reinstancer::new();
    game.reload(&mut reinstancer);
    let report = reinstancer.start_reinstancing(&mut game.fw, &mut game.registry);

    let new_stats = game.id(TypeKind::Struct, "Stats");
    let patched = game.fw.blueprint(index).unwrap();
    assert_eq!(patched.variables[0].var_type, PinType::of_struct(new_stats));
    assert_eq!(patched.nodes[0].pins[0], PinType::of_enum(team));
    assert_eq!(report.pins_retargeted, 1);
    assert_eq!(report.pins_revalidated, 1);
    assert_eq!(report.nodes_reconstructed, 1);
    assert!(game.fw.events().contains(&FrameworkEvent::Redefined(team)));
}

#[test]
fn a_second_pass_has_nothing_to_do() {
    let mut game = Game::load();
    let mut reinstancer = Reinstancer::new();
    game.reload(&mut reinstancer);
    reinstancer.start_reinstancing(&mut game.fw, &mut game.registry);
    game.fw.take_events();

    let report = reinstancer.start_reinstancing(&mut game.fw, &mut game.registry);
    assert_eq!(report.retired.len(), 0);
    assert!(game.fw.events().is_empty());
}

fn async_action(id: u32, proxy: NativeTypeId, factory: &str) -> GraphNode {
    GraphNode {
        id: NodeId(id),
        kind: NodeKind::AsyncAction {
            proxy_class: Some(proxy),
            factory_function: factory.into(),
            bound: Some(FunctionRef {
                owner: proxy,
                name: factory.into(),
            }),
        },
        pins: Vec::new(),
    }
}

#[test]
fn async_actions_follow_their_proxy_class() {
    let mut game = Game::load();
    let old_hero = game.id(TypeKind::Class, "Hero");
    let mut blueprint = Blueprint::new("HeroAbilities");
    blueprint.nodes.push(async_action(3, old_hero, "Jump"));
    blueprint.nodes.push(async_action(4, old_hero, "Dash"));
    let index = game.fw.add_blueprint(blueprint);

    let mut reinstancer = Reinstancer::new();
    game.reload(&mut reinstancer);
    let report = reinstancer.start_reinstancing(&mut game.fw, &mut game.registry);

    let new_hero = game.id(TypeKind::Class, "Hero");
    let nodes = &game.fw.blueprint(index).unwrap().nodes;
    let NodeKind::AsyncAction {
        proxy_class, bound, ..
    } = &nodes[0].kind
    else {
        panic!("node kind changed");
    };
    assert_eq!(*proxy_class, Some(new_hero));
    assert_eq!(
        *bound,
        Some(FunctionRef {
            owner: new_hero,
            name: "Jump".into(),
        })
    );

    // No factory of that name on the new class: the proxy still moves.
    let NodeKind::AsyncAction {
        proxy_class, bound, ..
    } = &nodes[1].kind
    else {
        panic!("node kind changed");
    };
    assert_eq!(*proxy_class, Some(new_hero));
    assert_eq!(*bound, None);

    assert_eq!(report.functions_rebound, 1);
    assert_eq!(report.nodes_reconstructed, 2);
    for node in [NodeId(3), NodeId(4)] {
        assert!(game.fw.events().contains(&FrameworkEvent::NodeReconstructed {
            blueprint: index,
            node,
        }));
    }
}

#[test]
fn editable_pin_nodes_patch_their_user_pins() {
    let mut game = Game::load();
    let old_stats = game.id(TypeKind::Struct, "Stats");
    let mut blueprint = Blueprint::new("MakeStats");
    blueprint.nodes.push(GraphNode {
        id: NodeId(9),
        kind: NodeKind::EditablePins {
            user_pins: vec![PinType::of_struct(old_stats)],
        },
        pins: vec![PinType::of_struct(old_stats)],
    });
    let index = game.fw.add_blueprint(blueprint);

    let mut reinstancer = Reinstancer::new();
    game.reload(&mut reinstancer);
    let report = reinstancer.start_reinstancing(&mut game.fw, &mut game.registry);

    let new_stats = game.id(TypeKind::Struct, "Stats");
    let node = &game.fw.blueprint(index).unwrap().nodes[0];
    let NodeKind::EditablePins { user_pins } = &node.kind else {
        panic!("node kind changed");
    };
    assert_eq!(user_pins, &vec![PinType::of_struct(new_stats)]);
    // Generated pins are rebuilt from the user pins on reconstruction.
    assert_eq!(node.pins, vec![PinType::of_struct(old_stats)]);
    assert_eq!(report.pins_retargeted, 1);
    assert_eq!(report.nodes_reconstructed, 1);
}

#[test]
fn reloading_a_base_module_moves_subclasses_in_other_modules() {
    const ENGINE: &str = r#"{ "ClassMetaData": [ { "Name": "Actor" } ] }"#;
    const GAME: &str = r#"{
        "ClassMetaData": [
            { "Name": "Hero", "ParentClass": { "Name": "Actor" }, "Functions": [ { "Name": "Jump" } ] }
        ]
    }"#;

    let mut fw = MemoryFramework::new();
    let mut registry = TypeRegistry::new();
    registry.register_module(&mut fw, ModuleMetadata::parse("Engine", ENGINE).unwrap());
    registry.register_module(&mut fw, ModuleMetadata::parse("Game", GAME).unwrap());
    registry.drain_events();
    let old_actor = registry.descriptor(TypeKind::Class, "Actor").unwrap().native;
    let old_hero = registry.descriptor(TypeKind::Class, "Hero").unwrap().native;

    let mut blueprint = Blueprint::new("HeroController");
    blueprint.nodes.push(GraphNode {
        id: NodeId(2),
        kind: NodeKind::CallFunction {
            function: MemberReference {
                parent: Some(old_hero),
                member_name: "Jump".into(),
            },
        },
        pins: Vec::new(),
    });
    let index = fw.add_blueprint(blueprint);

    let mut reinstancer = Reinstancer::new();
    registry.register_module(&mut fw, ModuleMetadata::parse("Engine", ENGINE).unwrap());
    reinstancer.absorb(registry.drain_events());
    let report = reinstancer.start_reinstancing(&mut fw, &mut registry);

    let new_actor = registry.descriptor(TypeKind::Class, "Actor").unwrap().native;
    let new_hero = registry.descriptor(TypeKind::Class, "Hero").unwrap().native;
    assert_ne!(old_hero, new_hero);
    let hero = fw.describe(new_hero).unwrap();
    assert_eq!(hero.parent, Some(new_actor));
    assert!(!fw.describe(new_actor).unwrap().superseded);

    assert_eq!(report.classes, 2);
    for old in [old_actor, old_hero] {
        assert!(report.retired.contains(&old));
        assert!(!fw.is_indexed(old));
    }
    let NodeKind::CallFunction { function } = &fw.blueprint(index).unwrap().nodes[0].kind else {
        panic!("node kind changed");
    };
    assert_eq!(function.parent, Some(new_hero));
}
