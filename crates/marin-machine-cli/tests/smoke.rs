use std::path::Path;
use std::process::{Command, Output};

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_marin-machine"))
        .args(args)
        .output()
        .expect("failed to run marin-machine CLI")
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("path should be UTF-8")
}

#[test]
fn boots_without_kernel_at_rom_base() {
    let output = run(&["--ram", "1"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        output.status.success(),
        "marin-machine exited with {}\nstderr:\n{stderr}",
        output.status
    );
    assert!(stderr.contains("bootstrap pc: 0x00001000"), "stderr:\n{stderr}");
    assert!(stderr.contains("moxie.rom"), "stderr:\n{stderr}");
}

#[test]
fn unknown_cpu_model_is_fatal() {
    let output = run(&["--cpu", "bogus"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(
        stderr.contains("unable to find CPU definition 'bogus'"),
        "stderr:\n{stderr}"
    );
}

#[test]
fn missing_kernel_is_fatal() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let kernel = tmp.path().join("vmlinux");
    let output = run(&["--kernel", path_str(&kernel)]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("could not load kernel"), "stderr:\n{stderr}");
}

#[test]
fn timer_runs_and_snapshot_is_written() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let snapshot = tmp.path().join("devices.snap");
    let serial_in = tmp.path().join("serial.in");
    std::fs::write(&serial_in, b"x").expect("failed to write serial input");

    let output = run(&[
        "--ram",
        "1",
        "--timer-limit",
        "50000",
        "--run-ns",
        "10000000",
        "--serial-in",
        path_str(&serial_in),
        "--snapshot-save",
        path_str(&snapshot),
    ]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr:\n{stderr}");
    // 50_000 ticks at 50 MHz is one millisecond.
    assert!(stderr.contains("timer: 10 expiries"), "stderr:\n{stderr}");

    let blob = std::fs::read(&snapshot).expect("snapshot should be written");
    assert!(blob.starts_with(b"MRIO"));
    assert_eq!(&blob[8..12], b"MRIN");
}
