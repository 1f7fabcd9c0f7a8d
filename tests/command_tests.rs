use std::fs;
use std::path::Path;
use tempfile::TempDir;
use traffic_control::control::{
    Command, CommandChannel, CommandError, CommandFile, ControlConfig, LightCommand,
    ManagerCommand, SystemSnapshot, Target, WatermarkStore,
};
use traffic_control::simulation::{ControlMode, Status, TrafficSystem};

const CROSSWALK: &str = "light_neg25_neg41_7";
const RAMP: &str = "light_30_neg12_8";

fn demo_system(dir: &TempDir) -> TrafficSystem {
    let mut system = TrafficSystem::new_with_seed(ControlConfig::with_base_dir(dir.path()), 42);
    system.build_demo_scene();
    system.start();
    assert!(system.is_api_enabled());
    system
}

fn write_command(dir: &TempDir, id: &str, json: &str) {
    let path = dir.path().join("commands").join(format!("{}_command.json", id));
    fs::write(path, json).expect("Failed to write command file");
}

fn watermark(dir: &TempDir, id: &str) -> Option<String> {
    let path = dir
        .path()
        .join("commands")
        .join(format!("{}_last_timestamp.txt", id));
    fs::read_to_string(path).ok()
}

fn read_status(path: &Path) -> SystemSnapshot {
    let text = fs::read_to_string(path).expect("status file should exist");
    serde_json::from_str(&text).expect("status file should be valid JSON")
}

fn status_of(system: &TrafficSystem, id: &str) -> (Status, ControlMode) {
    let light = system.light_by_id(id).expect("light should exist");
    (light.status(), light.control_mode())
}

#[test]
fn test_command_file_defaults() {
    let file = CommandFile::from_json(r#"{"action": "all_red"}"#).unwrap();
    assert_eq!(file.action, "all_red");
    assert_eq!(file.status, None);
    assert_eq!(file.duration, 0.0);
    assert_eq!(file.timestamp, 0);
}

#[test]
fn test_light_command_parsing() {
    let file = CommandFile {
        action: "SET_STATUS".to_string(),
        status: Some("Red".to_string()),
        timestamp: 1,
        ..CommandFile::default()
    };
    assert_eq!(
        LightCommand::parse(&file),
        Ok(LightCommand::SetStatus(Status::Red))
    );

    let missing = CommandFile {
        action: "set_mode".to_string(),
        ..CommandFile::default()
    };
    assert!(matches!(
        LightCommand::parse(&missing),
        Err(CommandError::MissingField(_, "mode"))
    ));

    let bad_duration = CommandFile {
        action: "set_duration".to_string(),
        duration: -1.0,
        ..CommandFile::default()
    };
    assert!(matches!(
        LightCommand::parse(&bad_duration),
        Err(CommandError::InvalidDuration(..))
    ));

    let manager_only = CommandFile {
        action: "all_red".to_string(),
        ..CommandFile::default()
    };
    assert!(matches!(
        LightCommand::parse(&manager_only),
        Err(CommandError::WrongTarget(..))
    ));
    assert_eq!(
        ManagerCommand::parse(&manager_only),
        Ok(ManagerCommand::AllRed)
    );

    let unknown = CommandFile {
        action: "explode".to_string(),
        ..CommandFile::default()
    };
    assert!(matches!(
        ManagerCommand::parse(&unknown),
        Err(CommandError::UnknownAction(_))
    ));
}

/// set_status takes the light under API control and publishes the change
#[test]
fn test_set_status_command_applies() {
    let dir = TempDir::new().unwrap();
    let mut system = demo_system(&dir);
    let sequence = system.status_sequence();

    write_command(
        &dir,
        CROSSWALK,
        r#"{"action": "set_status", "status": "red", "timestamp": 100}"#,
    );
    system.poll_commands();

    assert_eq!(
        status_of(&system, CROSSWALK),
        (Status::Red, ControlMode::ApiControlled)
    );
    assert!(system.status_sequence() > sequence);
    assert_eq!(watermark(&dir, CROSSWALK).as_deref(), Some("100"));

    let status = read_status(&dir.path().join("traffic_system_status.json"));
    let snapshot = status.lights.iter().find(|l| l.id == CROSSWALK).unwrap();
    assert_eq!(snapshot.status, Status::Red);
    assert_eq!(snapshot.control_mode, ControlMode::ApiControlled);
}

/// Polling the same inbox again never re-applies its command
#[test]
fn test_repeated_polls_apply_once() {
    let dir = TempDir::new().unwrap();
    let mut system = demo_system(&dir);

    write_command(
        &dir,
        CROSSWALK,
        r#"{"action": "set_status", "status": "red", "timestamp": 100}"#,
    );
    system.poll_commands();

    let key = system.registry().lookup(CROSSWALK).unwrap();
    assert!(system.set_status(key, Status::Green, false));

    for _ in 0..5 {
        system.poll_commands();
    }
    assert_eq!(status_of(&system, CROSSWALK).0, Status::Green);
}

/// Timestamps at or below the watermark are ignored
#[test]
fn test_stale_timestamp_is_ignored() {
    let dir = TempDir::new().unwrap();
    let mut system = demo_system(&dir);

    write_command(
        &dir,
        CROSSWALK,
        r#"{"action": "set_status", "status": "yellow", "timestamp": 100}"#,
    );
    system.poll_commands();
    assert_eq!(status_of(&system, CROSSWALK).0, Status::Yellow);

    write_command(
        &dir,
        CROSSWALK,
        r#"{"action": "set_status", "status": "red", "timestamp": 90}"#,
    );
    system.poll_commands();
    assert_eq!(status_of(&system, CROSSWALK).0, Status::Yellow);
    assert_eq!(watermark(&dir, CROSSWALK).as_deref(), Some("100"));

    write_command(
        &dir,
        CROSSWALK,
        r#"{"action": "set_status", "status": "red", "timestamp": 101}"#,
    );
    system.poll_commands();
    assert_eq!(status_of(&system, CROSSWALK).0, Status::Red);
    assert_eq!(watermark(&dir, CROSSWALK).as_deref(), Some("101"));
}

/// A malformed file is skipped without touching the watermark
#[test]
fn test_malformed_command_is_skipped() {
    let dir = TempDir::new().unwrap();
    let mut system = demo_system(&dir);

    write_command(&dir, CROSSWALK, r#"{"action": "set_status", "status": "#);
    system.poll_commands();
    system.poll_commands();

    assert_eq!(
        status_of(&system, CROSSWALK),
        (Status::Green, ControlMode::Automatic)
    );
    assert_eq!(watermark(&dir, CROSSWALK), None);

    write_command(
        &dir,
        CROSSWALK,
        r#"{"action": "set_status", "status": "red", "timestamp": 5}"#,
    );
    system.poll_commands();
    assert_eq!(status_of(&system, CROSSWALK).0, Status::Red);
}

/// Commands for ids nobody knows change nothing
#[test]
fn test_unknown_light_id_is_ignored() {
    let dir = TempDir::new().unwrap();
    let mut system = demo_system(&dir);
    let before = system.snapshots();

    write_command(
        &dir,
        "light_nowhere_99",
        r#"{"action": "set_status", "status": "red", "timestamp": 5}"#,
    );
    system.poll_commands();
    system.poll_commands();

    assert_eq!(system.snapshots(), before);
    assert_eq!(watermark(&dir, "light_nowhere_99"), None);
}

/// A well-formed command with a bad value still consumes its timestamp
#[test]
fn test_rejected_command_consumes_timestamp() {
    let dir = TempDir::new().unwrap();
    let mut system = demo_system(&dir);

    write_command(
        &dir,
        CROSSWALK,
        r#"{"action": "set_status", "status": "purple", "timestamp": 10}"#,
    );
    system.poll_commands();
    assert_eq!(status_of(&system, CROSSWALK).0, Status::Green);
    assert_eq!(watermark(&dir, CROSSWALK).as_deref(), Some("10"));

    write_command(
        &dir,
        CROSSWALK,
        r#"{"action": "set_status", "status": "red", "timestamp": 10}"#,
    );
    system.poll_commands();
    assert_eq!(status_of(&system, CROSSWALK).0, Status::Green);

    write_command(
        &dir,
        CROSSWALK,
        r#"{"action": "set_status", "status": "red", "timestamp": 11}"#,
    );
    system.poll_commands();
    assert_eq!(status_of(&system, CROSSWALK).0, Status::Red);
}

#[test]
fn test_mode_duration_and_manual_commands() {
    let dir = TempDir::new().unwrap();
    let mut system = demo_system(&dir);

    write_command(
        &dir,
        RAMP,
        r#"{"action": "set_duration", "duration": 12.5, "timestamp": 1}"#,
    );
    system.poll_commands();
    assert_eq!(system.light_by_id(RAMP).unwrap().green_duration, 12.5);

    write_command(
        &dir,
        RAMP,
        r#"{"action": "set_mode", "mode": "manual", "timestamp": 2}"#,
    );
    system.poll_commands();
    assert_eq!(
        status_of(&system, RAMP),
        (Status::Green, ControlMode::Manual)
    );

    write_command(
        &dir,
        RAMP,
        r#"{"action": "set_manual_status", "status": "red", "timestamp": 3}"#,
    );
    system.poll_commands();
    let light = system.light_by_id(RAMP).unwrap();
    assert_eq!(light.status(), Status::Red);
    assert!(light.manual_override());
    assert_eq!(light.manual_status(), Status::Red);
}

/// all_red forces every light red; restore_all hands them back
#[test]
fn test_manager_all_red_then_restore() {
    let dir = TempDir::new().unwrap();
    let mut system = demo_system(&dir);

    write_command(&dir, "manager", r#"{"action": "all_red", "timestamp": 50}"#);
    system.poll_commands();
    for light in system.lights() {
        assert_eq!(light.status(), Status::Red, "{}", light.name);
        assert_eq!(light.control_mode(), ControlMode::ApiControlled);
    }
    let status = read_status(&dir.path().join("traffic_system_status.json"));
    assert!(status.lights.iter().all(|l| l.status == Status::Red));
    assert_eq!(status.total_lights, 9);

    write_command(&dir, "manager", r#"{"action": "restore_all", "timestamp": 60}"#);
    system.poll_commands();
    for light in system.lights() {
        assert_eq!(light.control_mode(), ControlMode::Automatic, "{}", light.name);
    }
    assert_eq!(watermark(&dir, "manager").as_deref(), Some("60"));
}

/// Watermarks persist across restarts of the system
#[test]
fn test_watermark_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let mut system = demo_system(&dir);
        write_command(
            &dir,
            CROSSWALK,
            r#"{"action": "set_status", "status": "red", "timestamp": 100}"#,
        );
        system.poll_commands();
        assert_eq!(status_of(&system, CROSSWALK).0, Status::Red);
    }

    let mut system = demo_system(&dir);
    system.poll_commands();
    assert_eq!(
        status_of(&system, CROSSWALK),
        (Status::Green, ControlMode::Automatic)
    );
}

#[test]
fn test_watermark_store_only_moves_forward() {
    let dir = TempDir::new().unwrap();
    let mut store = WatermarkStore::new(dir.path());

    assert_eq!(store.get("light_a_0"), None);
    assert!(!store.is_applied("light_a_0", 0));

    store.advance("light_a_0", 10).unwrap();
    store.advance("light_a_0", 5).unwrap();
    assert_eq!(store.get("light_a_0"), Some(10));
    assert!(store.is_applied("light_a_0", 10));
    assert!(!store.is_applied("light_a_0", 11));

    let reopened = WatermarkStore::new(dir.path());
    assert_eq!(reopened.get("light_a_0"), Some(10));

    fs::write(store.path("light_b_1"), "not a number").unwrap();
    assert_eq!(reopened.get("light_b_1"), None);
}

/// The channel resolves targets against the registry it is given
#[test]
fn test_channel_poll_resolves_targets() {
    let dir = TempDir::new().unwrap();
    let system = demo_system(&dir);
    let mut channel = CommandChannel::new(dir.path().join("commands"));

    write_command(&dir, "manager", r#"{"action": "chaos_mode", "duration": 3, "timestamp": 7}"#);
    write_command(
        &dir,
        CROSSWALK,
        r#"{"action": "set_mode", "mode": "manual", "timestamp": 8}"#,
    );
    fs::write(dir.path().join("commands").join(".ignored_command.json"), "{}").unwrap();

    let registry = system.registry().snapshot();
    let pending = channel.poll(&registry);
    assert_eq!(pending.len(), 2);

    let manager = pending.iter().find(|p| p.target == Target::Manager).unwrap();
    assert_eq!(
        manager.command,
        Command::Manager(ManagerCommand::ChaosMode { duration: 3.0 })
    );

    let light = pending.iter().find(|p| p.inbox == CROSSWALK).unwrap();
    assert!(matches!(light.target, Target::Light { .. }));
    assert_eq!(
        light.command,
        Command::Light(LightCommand::SetMode(ControlMode::Manual))
    );

    // Nothing is recorded until the commands are acknowledged.
    assert_eq!(channel.poll(&registry).len(), 2);
    for command in &pending {
        channel.acknowledge(command);
    }
    assert!(channel.poll(&registry).is_empty());
}

/// An unknown inbox stays ignored however often its timestamp changes
#[test]
fn test_unknown_inbox_with_new_timestamps() {
    let dir = TempDir::new().unwrap();
    let mut system = demo_system(&dir);
    let before = system.snapshots();

    for timestamp in 1..=20 {
        write_command(
            &dir,
            "light_gone_3",
            &format!(
                r#"{{"action": "set_status", "status": "red", "timestamp": {}}}"#,
                timestamp
            ),
        );
        system.poll_commands();
        system.poll_commands();
    }

    assert_eq!(system.snapshots(), before);
    assert_eq!(watermark(&dir, "light_gone_3"), None);

    // A known inbox polled in the same pass is unaffected.
    write_command(
        &dir,
        CROSSWALK,
        r#"{"action": "set_status", "status": "red", "timestamp": 21}"#,
    );
    system.poll_commands();
    assert_eq!(status_of(&system, CROSSWALK).0, Status::Red);
}
