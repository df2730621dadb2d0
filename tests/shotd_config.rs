use std::io::Write;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use shot_tracker::config::ShotdConfig;
use shot_tracker::ShotError;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SHOTD_CONFIG",
        "SHOTD_HOST",
        "SHOTD_PORT",
        "SHOTD_CAMERA_INDEX",
        "SHOTD_CAMERA_DEVICE",
        "SHOTD_HSV_LOWER",
        "SHOTD_HSV_UPPER",
        "SHOTD_MIN_AREA",
        "SHOTD_VELOCITY_THRESHOLD",
    ] {
        std::env::remove_var(key);
    }
}

fn is_configuration_error(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ShotError>(),
        Some(ShotError::Configuration(_))
    )
}

#[test]
fn loads_defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ShotdConfig::load().expect("load config");
    assert_eq!(cfg.server.host, "127.0.0.1");
    assert_eq!(cfg.server.port, 8082);
    assert_eq!(cfg.camera.device_path(), "/dev/video0");
    assert_eq!(cfg.detection.hsv_lower, [5, 106, 70]);
    assert_eq!(cfg.detection.hsv_upper, [11, 255, 255]);
    assert_eq!(cfg.detection.min_area, 100);
    assert_eq!(cfg.detection.velocity_threshold, 20000.0);
    assert!(cfg.server.announce_corners);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "camera": { "index": 1, "target_fps": 15, "width": 320, "height": 240 },
        "detection": {
            "hsv_lower": [100, 150, 0],
            "hsv_upper": [140, 255, 255],
            "min_area": 50,
            "velocity_threshold": 35.5
        },
        "server": { "host": "0.0.0.0", "port": 9000, "announce_corners": false }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("SHOTD_CONFIG", file.path());
    std::env::set_var("SHOTD_PORT", "9100");
    std::env::set_var("SHOTD_CAMERA_DEVICE", "stub://range");
    std::env::set_var("SHOTD_VELOCITY_THRESHOLD", "12");

    let cfg = ShotdConfig::load().expect("load config");
    assert_eq!(cfg.camera.index, 1);
    assert_eq!(cfg.camera.device_path(), "stub://range");
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!((cfg.camera.width, cfg.camera.height), (320, 240));
    assert_eq!(cfg.detection.hsv_lower, [100, 150, 0]);
    assert_eq!(cfg.detection.hsv_upper, [140, 255, 255]);
    assert_eq!(cfg.detection.min_area, 50);
    assert_eq!(cfg.detection.velocity_threshold, 12.0);
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9100);
    assert!(!cfg.server.announce_corners);

    let server = cfg.server_config().expect("server config");
    assert_eq!(server.addr, "0.0.0.0:9100");
    assert_eq!(server.detector.velocity_threshold, 12.0);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        [camera]
        device = "stub://bench"

        [detection]
        hsv_lower = [0, 100, 100]
        hsv_upper = [10, 255, 255]
        background_history = 120

        [server]
        port = 8090
        write_timeout_ms = 0
    "#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("SHOTD_CONFIG", file.path());

    let cfg = ShotdConfig::load().expect("load config");
    assert_eq!(cfg.camera.device_path(), "stub://bench");
    assert_eq!(cfg.detection.hsv_lower, [0, 100, 100]);
    assert_eq!(cfg.detection.background_history, 120);
    assert_eq!(cfg.server.port, 8090);
    let server = cfg.server_config().expect("server config");
    assert_eq!(server.session.write_timeout, None);

    clear_env();
}

#[test]
fn invalid_env_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();

    for (key, value) in [
        ("SHOTD_PORT", "eighty"),
        ("SHOTD_PORT", "0"),
        ("SHOTD_HSV_LOWER", "5,106"),
        ("SHOTD_HSV_UPPER", "180,255,255"),
        ("SHOTD_MIN_AREA", "0"),
        ("SHOTD_VELOCITY_THRESHOLD", "-3"),
        ("SHOTD_VELOCITY_THRESHOLD", "fast"),
    ] {
        clear_env();
        std::env::set_var(key, value);
        let err = ShotdConfig::load().expect_err("invalid value accepted");
        assert!(
            is_configuration_error(&err),
            "{key}={value}: unexpected error {err:#}"
        );
    }

    clear_env();
}

#[test]
fn malformed_file_is_a_configuration_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{ "server": { "port": "high" } }"#)
        .expect("write config");
    std::env::set_var("SHOTD_CONFIG", file.path());

    let err = ShotdConfig::load().expect_err("malformed config accepted");
    assert!(is_configuration_error(&err), "unexpected error {err:#}");

    clear_env();
}

#[test]
fn inverted_hsv_range_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SHOTD_HSV_LOWER", "20,106,70");
    std::env::set_var("SHOTD_HSV_UPPER", "11,255,255");
    let err = ShotdConfig::load().expect_err("inverted range accepted");
    assert!(is_configuration_error(&err), "unexpected error {err:#}");

    clear_env();
}
