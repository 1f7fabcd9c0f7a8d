use std::collections::HashSet;
use traffic_control::control::ControlConfig;
use traffic_control::simulation::{generate_light_id, sanitize_component, Position, TrafficSystem};

fn offline_config() -> ControlConfig {
    ControlConfig {
        enable_api_control: false,
        ..ControlConfig::default()
    }
}

/// Lights at a named intersection are named after it
#[test]
fn test_intersection_light_id() {
    let id = generate_light_id(Some("Main St"), &Position::new(0.0, 3.0, 8.0), 0);
    assert_eq!(id.as_str(), "light_Main_St_0");
}

/// Free-standing lights use their rounded ground position
#[test]
fn test_positional_light_id_uses_neg_marker() {
    let id = generate_light_id(None, &Position::new(-25.4, 3.0, -40.6), 7);
    assert_eq!(id.as_str(), "light_neg25_neg41_7");

    let id = generate_light_id(None, &Position::new(30.0, 3.0, -12.0), 8);
    assert_eq!(id.as_str(), "light_30_neg12_8");
}

/// Rounding goes half away from zero and never produces "neg0"
#[test]
fn test_positional_rounding_edges() {
    let id = generate_light_id(None, &Position::new(2.5, 0.0, -2.5), 1);
    assert_eq!(id.as_str(), "light_3_neg3_1");

    let id = generate_light_id(None, &Position::new(-0.3, 0.0, 0.4), 2);
    assert_eq!(id.as_str(), "light_0_0_2");
}

/// An empty intersection name falls back to the position
#[test]
fn test_empty_intersection_name_falls_back_to_position() {
    let id = generate_light_id(Some(""), &Position::new(1.0, 0.0, 2.0), 3);
    assert_eq!(id.as_str(), "light_1_2_3");
}

#[test]
fn test_sanitize_component() {
    assert_eq!(sanitize_component("Main St"), "Main_St");
    assert_eq!(sanitize_component("5th & Elm/North"), "5th___Elm_North");
    assert_eq!(sanitize_component("ramp-2.b"), "ramp-2.b");
}

/// Every light in the demo scene gets a unique id in scan order
#[test]
fn test_discovery_assigns_unique_ids() {
    let mut system = TrafficSystem::new(offline_config());
    system.build_demo_scene();
    system.start();

    let ids: Vec<String> = system
        .registry()
        .ids()
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(ids.len(), 9);

    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len(), "duplicate ids: {:?}", ids);

    assert_eq!(ids[0], "light_Main_St_0");
    assert_eq!(ids[3], "light_Main_St_3");
    assert_eq!(ids[4], "light_Oak_Ave_4");
    assert_eq!(ids[7], "light_neg25_neg41_7");
    assert_eq!(ids[8], "light_30_neg12_8");

    for id in &ids {
        assert!(
            id.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')),
            "unsafe id {}",
            id
        );
        let key = system.registry().lookup(id).expect("id should resolve");
        assert_eq!(system.id_of(key).map(|id| id.as_str()), Some(id.as_str()));
    }
}

/// A refresh keeps existing ids and never reuses a removed light's index
#[test]
fn test_refresh_keeps_ids_stable() {
    let mut system = TrafficSystem::new(offline_config());
    system.build_demo_scene();
    system.start();

    let before = system.registry().ids();
    let removed = system.registry().lookup("light_Main_St_1").unwrap();
    assert!(system.remove_light(removed).is_some());
    assert_eq!(system.registry().lookup("light_Main_St_1"), None);

    let added = system.add_light("Late Addition", Position::new(-4.6, 3.0, 11.5), None);
    system.refresh_lights();

    assert_eq!(
        system.id_of(added).map(|id| id.as_str()),
        Some("light_neg5_12_9")
    );
    for id in before.iter().filter(|id| id.as_str() != "light_Main_St_1") {
        assert!(system.registry().lookup(id.as_str()).is_some(), "{} lost", id);
    }
    assert_eq!(system.registry().len(), 9);
}

/// A snapshot taken before a refresh stays complete and usable
#[test]
fn test_snapshot_survives_refresh() {
    let mut system = TrafficSystem::new(offline_config());
    system.build_demo_scene();
    system.start();

    let snapshot = system.registry().snapshot();
    let removed = system.registry().lookup("light_Oak_Ave_4").unwrap();
    system.remove_light(removed);

    assert_eq!(snapshot.len(), 9);
    assert_eq!(snapshot.lookup("light_Oak_Ave_4"), Some(removed));
    assert_eq!(system.registry().len(), 8);
}

/// Starting again after a removal never moves an id to another light
#[test]
fn test_restart_keeps_ids_with_their_lights() {
    let mut system = TrafficSystem::new(offline_config());
    system.build_demo_scene();
    system.start();

    let first = system.registry().lookup("light_Main_St_0").unwrap();
    let second = system.registry().lookup("light_Main_St_1").unwrap();
    system.remove_light(first);
    system.start();

    assert_eq!(system.registry().lookup("light_Main_St_0"), None);
    assert_eq!(system.registry().lookup("light_Main_St_1"), Some(second));
    assert_eq!(system.registry().len(), 8);

    let added = system.add_light("Late Addition", Position::new(1.0, 3.0, 1.0), None);
    system.start();
    assert_eq!(system.id_of(added).map(|id| id.as_str()), Some("light_1_1_9"));
}
