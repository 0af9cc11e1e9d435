use assert_cmd::Command;
use circle_track::{ClusterParams, DetectionParams, TrackerConfig};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn bin() -> Command {
    Command::cargo_bin("circle-track").unwrap()
}

fn marker_frame(x: i32, y: i32) -> RgbImage {
    let mut img = RgbImage::from_pixel(160, 120, Rgb([200, 200, 200]));
    draw_filled_circle_mut(&mut img, (x, y), 20, Rgb([40, 40, 40]));
    img
}

fn small_marker_config() -> TrackerConfig {
    let detection = DetectionParams {
        blur_kernel_size: 5,
        blur_sigma: 1.0,
        min_radius: 15,
        max_radius: 25,
        edge_threshold: 100.0,
        accumulator_threshold: 15.0,
    };
    TrackerConfig::from_params(160, 120, &detection, &ClusterParams::default())
}

fn write_frames(dir: &Path, n: usize) {
    fs::create_dir_all(dir).unwrap();
    for i in 0..n {
        marker_frame(80, 60)
            .save(dir.join(format!("frame_{i:03}.png")))
            .unwrap();
    }
}

#[test]
fn help_lists_subcommands() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("track"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("detect"));
}

#[test]
fn detect_prints_the_marker_and_writes_outputs() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("marker.png");
    let render = dir.path().join("edges.png");
    let config = dir.path().join("tracker.json");
    marker_frame(80, 60).save(&image).unwrap();

    let output = bin()
        .args(["--log-level", "off", "detect", "--image"])
        .arg(&image)
        .args([
            "--blur-size",
            "5",
            "--blur-sigma",
            "1",
            "--min-radius",
            "15",
            "--max-radius",
            "25",
            "--accumulator-threshold",
            "15",
            "--mode",
            "edges",
            "--out",
        ])
        .arg(&render)
        .arg("--write-config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1, "stdout: {stdout}");
    let vals: Vec<f32> = lines[0]
        .split_whitespace()
        .map(|v| v.parse().unwrap())
        .collect();
    assert!((vals[0] - 80.0).abs() <= 2.0 && (vals[1] - 60.0).abs() <= 2.0);
    assert!((vals[2] - 20.0).abs() <= 2.0);

    assert_eq!(image::open(&render).unwrap().width(), 160);
    let cfg = TrackerConfig::load_json(&config).unwrap();
    assert_eq!(cfg.frame_size(), (160, 120));
    assert_eq!((cfg.min_radius, cfg.max_radius), (15, 25));
}

#[test]
fn detect_rejects_inverted_radius_range() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("marker.png");
    marker_frame(80, 60).save(&image).unwrap();

    bin()
        .args(["detect", "--image"])
        .arg(&image)
        .args(["--min-radius", "30", "--max-radius", "20"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_radius"));
}

#[test]
fn track_prints_one_line_per_frame() {
    let dir = tempdir().unwrap();
    let frames = dir.path().join("frames");
    let config = dir.path().join("tracker.json");
    let calibration = dir.path().join("calibration.json");
    write_frames(&frames, 3);
    small_marker_config().write_json(&config).unwrap();
    fs::write(&calibration, r#"{"H": [[1, 0, 100], [0, 1, 200], [0, 0, 1]]}"#).unwrap();

    let output = bin()
        .args(["--log-level", "off", "track", "--stdout", "--fps", "200", "--config"])
        .arg(&config)
        .arg("--calibration")
        .arg(&calibration)
        .arg("--frames")
        .arg(&frames)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3, "stdout: {stdout}");
    for line in lines {
        let tokens: Vec<f64> = line
            .split_whitespace()
            .map(|v| v.parse().unwrap())
            .collect();
        assert_eq!(tokens.len(), 3, "line: {line}");
        assert!((tokens[1] - 180.0).abs() <= 2.0);
        assert!((tokens[2] - 260.0).abs() <= 2.0);
    }
}

#[test]
fn track_refuses_degenerate_calibration() {
    let dir = tempdir().unwrap();
    let frames = dir.path().join("frames");
    let config = dir.path().join("tracker.json");
    let calibration = dir.path().join("calibration.json");
    write_frames(&frames, 1);
    small_marker_config().write_json(&config).unwrap();
    // w = 1 - x / 100 changes sign inside a 160 px wide frame.
    fs::write(&calibration, r#"{"H": [[1, 0, 0], [0, 1, 0], [-0.01, 0, 1]]}"#).unwrap();

    bin()
        .args(["track", "--stdout", "--config"])
        .arg(&config)
        .arg("--calibration")
        .arg(&calibration)
        .arg("--frames")
        .arg(&frames)
        .assert()
        .failure()
        .stderr(predicate::str::contains("projective scale"));
}

#[test]
fn track_fails_on_missing_frames() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("tracker.json");
    small_marker_config().write_json(&config).unwrap();

    bin()
        .args(["track", "--stdout", "--config"])
        .arg(&config)
        .arg("--frames")
        .arg(dir.path().join("nowhere"))
        .assert()
        .failure();
}
