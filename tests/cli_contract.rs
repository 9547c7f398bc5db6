mod common;

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

use common::{plan, write_shapes};
use neon_mosaic::ShapeKind;

fn run_mosaic(cwd: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_neon-mosaic"))
        .current_dir(cwd)
        .args(args)
        .output()
        .expect("neon-mosaic command should run")
}

fn write_plan(path: &Path, subscribers: u64) {
    let json = serde_json::to_string(&plan(false, subscribers)).expect("plan should serialize");
    fs::write(path, json).expect("plan should write");
}

#[test]
fn render_writes_final_png() {
    let dir = tempdir().expect("tempdir should create");
    write_shapes(dir.path(), &[]);
    write_plan(&dir.path().join("plan.json"), 500);

    let output = run_mosaic(
        dir.path(),
        &["render", "--plan", "plan.json", "--shapes", ".", "-o", "out"],
    );
    assert!(
        output.status.success(),
        "render should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let final_png = image::open(dir.path().join("out/final.png")).expect("final.png should decode");
    assert_eq!((final_png.width(), final_png.height()), (common::SIZE, common::SIZE));
    assert!(!dir.path().join("out/energy_0000.png").exists());
}

#[test]
fn render_writes_energy_frames_above_threshold() {
    let dir = tempdir().expect("tempdir should create");
    write_shapes(dir.path(), &[ShapeKind::Headband]);
    write_plan(&dir.path().join("plan.json"), 4000);

    let output = run_mosaic(
        dir.path(),
        &[
            "render", "--plan", "plan.json", "--shapes", ".", "--energy-frames", "3", "-o",
            "out",
        ],
    );
    assert!(output.status.success(), "render should succeed");
    for index in 0..3 {
        assert!(dir.path().join(format!("out/energy_{index:04}.png")).exists());
    }
}

#[test]
fn reduced_motion_writes_a_single_energy_frame() {
    let dir = tempdir().expect("tempdir should create");
    write_shapes(dir.path(), &[]);
    write_plan(&dir.path().join("plan.json"), 4000);

    let output = run_mosaic(
        dir.path(),
        &[
            "render",
            "--plan",
            "plan.json",
            "--shapes",
            ".",
            "--energy-frames",
            "5",
            "--reduced-motion",
            "-o",
            "out",
        ],
    );
    assert!(output.status.success(), "render should succeed");
    assert!(dir.path().join("out/energy_0000.png").exists());
    assert!(!dir.path().join("out/energy_0001.png").exists());
}

#[test]
fn check_reports_plan_summary_and_missing_shapes() {
    let dir = tempdir().expect("tempdir should create");
    write_shapes(dir.path(), &[ShapeKind::Beak, ShapeKind::Headband]);
    write_plan(&dir.path().join("plan.json"), 42);

    let output = run_mosaic(
        dir.path(),
        &["check", "--plan", "plan.json", "--shapes", "."],
    );
    assert!(output.status.success(), "check should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("81 text tiles"), "stdout: {stdout}");
    assert!(stdout.contains("Energy: off"));
    assert!(stdout.contains("Shape beak: MISSING"));
    assert!(stdout.contains("Shape headband: absent (optional)"));
}

#[test]
fn invalid_plan_fails_with_context() {
    let dir = tempdir().expect("tempdir should create");
    fs::write(dir.path().join("plan.json"), r#"{ "width": 0, "height": 4 }"#)
        .expect("plan should write");

    let output = run_mosaic(dir.path(), &["check", "--plan", "plan.json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("plan size must be positive"), "stderr: {stderr}");
}

#[test]
fn unknown_config_keys_are_rejected() {
    let dir = tempdir().expect("tempdir should create");
    write_plan(&dir.path().join("plan.json"), 1);
    fs::write(dir.path().join("cfg.yaml"), "glow:\n  brightness: 2\n").expect("config should write");

    let output = run_mosaic(
        dir.path(),
        &["check", "--plan", "plan.json", "--config", "cfg.yaml"],
    );
    assert!(!output.status.success());
}
