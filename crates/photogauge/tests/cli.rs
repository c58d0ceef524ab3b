use assert_cmd::Command;
use photogauge::{DetectionStatus, MeasureConfig, MeasurementReport};
use predicates::prelude::*;
use std::fs;

const SCENE: &str = r#"{
    "image_width": 640,
    "image_height": 600,
    "image_scale": 0.5,
    "calibration": [
        {
            "kind": "tick_list",
            "axis": "y",
            "ticks": [
                {"pixel": 100.0, "value_mm": 0.0},
                {"pixel": 150.0, "value_mm": 100.0},
                {"pixel": 200.0, "value_mm": 200.0},
                {"pixel": 250.0, "value_mm": 300.0},
                {"pixel": 300.0, "value_mm": 400.0}
            ]
        }
    ],
    "lines": [
        {"start": [0.0, 500.0], "end": [600.0, 500.0]}
    ],
    "contours": [
        {"points": [[300.0, 300.0], [340.0, 300.0], [340.0, 500.0], [300.0, 500.0]]},
        {"points": [[100.0, 420.0], [130.0, 420.0], [130.0, 500.0], [100.0, 500.0]]}
    ]
}"#;

#[test]
fn measure_writes_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scene = dir.path().join("scene.json");
    let report_path = dir.path().join("report.json");
    fs::write(&scene, SCENE).expect("write scene");

    Command::cargo_bin("photogauge")
        .expect("binary")
        .args(["measure", "--scene"])
        .arg(&scene)
        .arg("--output")
        .arg(&report_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 object(s)"))
        .stdout(predicate::str::contains("object 2: 400.0 mm (C)"));

    let report = MeasurementReport::load_json(&report_path).expect("report");
    assert_eq!(report.status, DetectionStatus::Found(2));
    assert_eq!(report.objects[0].id, 1);
    assert_eq!(report.objects[0].center_x, 230.0);
    // Detected at half resolution, reported in original pixels.
    assert_eq!(report.base_line_px, Some(1000.0));
}

#[test]
fn default_config_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("config.json");
    Command::cargo_bin("photogauge")
        .expect("binary")
        .args(["default-config", "--out"])
        .arg(&out)
        .assert()
        .success();
    assert_eq!(
        MeasureConfig::load_json(&out).expect("config"),
        MeasureConfig::default()
    );
}

#[test]
fn missing_scene_fails() {
    Command::cargo_bin("photogauge")
        .expect("binary")
        .args(["measure", "--scene", "does-not-exist.json"])
        .assert()
        .failure();
}

#[test]
fn uncalibrated_scene_reports_missing_calibration() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scene = dir.path().join("scene.json");
    fs::write(&scene, r#"{"contours": []}"#).expect("write scene");
    Command::cargo_bin("photogauge")
        .expect("binary")
        .args(["measure", "--scene"])
        .arg(&scene)
        .assert()
        .failure()
        .stderr(predicate::str::contains("CalibrationMissing"));
}

#[test]
fn planar_reference_scene_uses_the_plane_scale() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scene = dir.path().join("scene.json");
    let report_path = dir.path().join("report.json");
    fs::write(
        &scene,
        r#"{
            "planar_reference": {
                "corners": [[100.0, 100.0], [300.0, 100.0], [300.0, 200.0], [100.0, 200.0]],
                "width_mm": 100.0,
                "height_mm": 50.0
            },
            "base_line_px": 500.0,
            "lines": [{"start": [0.0, 500.0], "end": [600.0, 500.0]}],
            "contours": [
                {"points": [[300.0, 300.0], [340.0, 300.0], [340.0, 500.0], [300.0, 500.0]]}
            ]
        }"#,
    )
    .expect("write scene");

    Command::cargo_bin("photogauge")
        .expect("binary")
        .args(["measure", "--scene"])
        .arg(&scene)
        .arg("--output")
        .arg(&report_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("object 1: 100.0 mm (A)"));

    let report = MeasurementReport::load_json(&report_path).expect("report");
    assert!(report.rulers.is_empty());
    assert_eq!(report.scale_px_per_mm, Some(2.0));
}
