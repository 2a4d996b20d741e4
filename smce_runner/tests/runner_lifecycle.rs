//! Runner lifecycle integration tests.
//!
//! The external build tool is faked with a generated shell script speaking
//! the marker protocol, and sketches are shell scripts with chosen exit
//! behavior, so the full configure → build → start → … lifecycle runs
//! against real child processes.

#![cfg(unix)]

use smce_common::board::{BoardConfig, DriverEndpoints, GpioDriverConfig, UartChannelConfig};
use smce_common::context::ExecutionContext;
use smce_common::sketch::SketchConfig;
use smce_runner::{BoardRunner, RunnerStatus};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct Harness {
    _tmp: TempDir,
    exectx: ExecutionContext,
    sketch_src: PathBuf,
    sketch_dir: PathBuf,
    sketch_bin: PathBuf,
}

fn write_executable(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

/// Build a scratch environment: a fake cmake announcing `sketch_dir` and
/// `sketch_bin` through the marker protocol, and a sketch binary with the
/// given shell body.
fn harness(sketch_body: &str) -> Harness {
    let tmp = tempfile::tempdir().unwrap();

    let res_dir = tmp.path().join("res");
    fs::create_dir_all(&res_dir).unwrap();

    let sketch_dir = tmp.path().join("generated");
    fs::create_dir_all(&sketch_dir).unwrap();

    let sketch_bin = tmp.path().join("sketch_bin.sh");
    write_executable(&sketch_bin, &format!("#!/bin/sh\n{sketch_body}\n"));

    let sketch_src = tmp.path().join("sketch.ino");
    fs::write(&sketch_src, "void setup() {}\nvoid loop() {}\n").unwrap();

    let cmake = tmp.path().join("fake_cmake.sh");
    write_executable(
        &cmake,
        &format!(
            "#!/bin/sh\n\
             if [ \"$1\" = \"--build\" ]; then\n\
             \techo \"fake build: $2\"\n\
             \texit 0\n\
             fi\n\
             echo \"-- Configuring fake sketch\"\n\
             echo '-- SMCE: \"{dir}\"'\n\
             echo '-- SMCE: \"{bin}\"'\n\
             echo \"-- Generating done\"\n",
            dir = sketch_dir.display(),
            bin = sketch_bin.display(),
        ),
    );

    let exectx = ExecutionContext::with_cmake(&res_dir, &cmake).unwrap();
    Harness {
        _tmp: tmp,
        exectx,
        sketch_src,
        sketch_dir,
        sketch_bin,
    }
}

fn board_conf() -> BoardConfig {
    BoardConfig {
        pins: vec![7, 2, 3],
        gpio_drivers: vec![GpioDriverConfig {
            pin_id: 3,
            analog: None,
            digital: Some(DriverEndpoints {
                board_read: true,
                board_write: true,
            }),
        }],
        uart_channels: vec![UartChannelConfig {
            baud_rate: 9600,
            rx_pin_override: u8::MAX,
            tx_pin_override: u8::MAX,
            rx_buffer_length: 64,
            tx_buffer_length: 64,
        }],
        ..Default::default()
    }
}

/// Tick until the runner leaves the executing states or the timeout fires.
fn tick_until_stopped(runner: &mut BoardRunner) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while runner.status().is_executing() {
        assert!(Instant::now() < deadline, "sketch never stopped");
        runner.tick();
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn full_lifecycle_with_suspension() {
    let h = harness("exec sleep 30");
    let mut runner = BoardRunner::new(h.exectx.clone(), None);

    assert!(runner.reset());
    assert_eq!(runner.status(), RunnerStatus::Clean);

    // gates: nothing but configure is legal from Clean
    assert!(!runner.build(&h.sketch_src, &SketchConfig::default()));
    assert!(!runner.start());
    assert!(!runner.suspend());
    assert!(!runner.resume());
    assert!(!runner.terminate());
    assert!(!runner.rebuild());
    assert_eq!(runner.status(), RunnerStatus::Clean);

    assert!(runner.configure("arduino:avr:uno", board_conf()));
    assert_eq!(runner.status(), RunnerStatus::Configured);

    assert!(runner.build(&h.sketch_src, &SketchConfig::default()));
    assert_eq!(runner.status(), RunnerStatus::Built);
    assert!(!runner.configure("arduino:avr:uno", board_conf())); // gate from Built

    assert!(runner.start());
    assert_eq!(runner.status(), RunnerStatus::Running);
    assert!(!runner.start());
    assert!(!runner.resume());
    assert!(!runner.reset()); // must terminate first

    assert!(runner.suspend());
    assert_eq!(runner.status(), RunnerStatus::Suspended);
    assert!(!runner.suspend());

    assert!(runner.resume());
    assert_eq!(runner.status(), RunnerStatus::Running);

    assert!(runner.terminate());
    assert_eq!(runner.status(), RunnerStatus::Stopped);
    assert!(!runner.terminate()); // absorbing until reset

    assert!(runner.reset());
    assert_eq!(runner.status(), RunnerStatus::Clean);
}

#[test]
fn segment_name_carries_the_sketch_id() {
    let h = harness("exit 0");
    let mut runner = BoardRunner::new(h.exectx.clone(), None);

    assert!(runner.configure("arduino:avr:uno", board_conf()));
    let expected = format!("SMCE-Runner-{}", runner.sketch_id());
    assert_eq!(runner.segment_name(), Some(expected.as_str()));

    // reconfigure keeps the identity
    assert!(runner.configure("arduino:avr:nano", board_conf()));
    assert_eq!(runner.segment_name(), Some(expected.as_str()));

    // reset hands out a fresh identity
    assert!(runner.reset());
    assert!(runner.configure("arduino:avr:uno", board_conf()));
    assert_ne!(runner.segment_name(), Some(expected.as_str()));
}

#[test]
fn build_discovers_paths_and_accumulates_log() {
    let h = harness("exit 0");
    let mut runner = BoardRunner::new(h.exectx.clone(), None);

    assert!(runner.configure("arduino:avr:uno", board_conf()));
    assert!(runner.build(&h.sketch_src, &SketchConfig::default()));

    assert_eq!(runner.sketch_dir(), Some(h.sketch_dir.as_path()));
    assert_eq!(runner.sketch_bin(), Some(h.sketch_bin.as_path()));

    let log = String::from_utf8(runner.build_log()).unwrap();
    assert_eq!(log.matches("-- Configuring fake sketch\n").count(), 1);
    assert_eq!(log.matches("-- Generating done\n").count(), 1);
    assert!(log.contains("fake build:"));
    // marker lines are consumed, not logged
    assert!(!log.contains("-- SMCE:"));
}

#[test]
fn reset_clears_everything() {
    let h = harness("echo diagnostics >&2\nexit 0");
    let mut runner = BoardRunner::new(h.exectx.clone(), None);

    assert!(runner.configure("arduino:avr:uno", board_conf()));
    assert!(runner.build(&h.sketch_src, &SketchConfig::default()));
    assert!(runner.start());
    tick_until_stopped(&mut runner);

    assert!(runner.reset());
    assert_eq!(runner.status(), RunnerStatus::Clean);
    assert_eq!(runner.sketch_dir(), None);
    assert_eq!(runner.sketch_bin(), None);
    assert!(runner.build_log().is_empty());
    assert!(runner.runtime_log().is_empty());
    assert_eq!(runner.segment_name(), None);

    // the generated sketch directory is removed
    assert!(!h.sketch_dir.exists());
}

#[test]
fn child_exit_code_reaches_the_callback_once() {
    let h = harness("exit 42");
    let codes: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&codes);
    let mut runner = BoardRunner::new(
        h.exectx.clone(),
        Some(Box::new(move |code| sink.lock().unwrap().push(code))),
    );

    assert!(runner.configure("arduino:avr:uno", board_conf()));
    assert!(runner.build(&h.sketch_src, &SketchConfig::default()));
    assert!(runner.start());

    tick_until_stopped(&mut runner);
    assert_eq!(runner.status(), RunnerStatus::Stopped);
    assert_eq!(*codes.lock().unwrap(), vec![42]);

    // tick on a stopped runner is a no-op
    runner.tick();
    runner.tick();
    assert_eq!(*codes.lock().unwrap(), vec![42]);
}

#[test]
fn runtime_log_captures_sketch_stderr() {
    let h = harness("echo boot message >&2\nexec sleep 30");
    let mut runner = BoardRunner::new(h.exectx.clone(), None);

    assert!(runner.configure("arduino:avr:uno", board_conf()));
    assert!(runner.build(&h.sketch_src, &SketchConfig::default()));
    assert!(runner.start());

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let log = runner.runtime_log();
        if String::from_utf8_lossy(&log).contains("boot message") {
            break;
        }
        assert!(Instant::now() < deadline, "stderr never reached the log");
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(runner.terminate());
}

#[test]
fn rebuild_gated_on_execution() {
    let h = harness("exec sleep 30");
    let mut runner = BoardRunner::new(h.exectx.clone(), None);

    assert!(runner.configure("arduino:avr:uno", board_conf()));
    assert!(runner.build(&h.sketch_src, &SketchConfig::default()));

    assert!(runner.rebuild());
    assert_eq!(runner.status(), RunnerStatus::Built);

    assert!(runner.start());
    assert!(!runner.rebuild());

    assert!(runner.terminate());
    assert!(runner.rebuild());
    assert_eq!(runner.status(), RunnerStatus::Built);

    // and the rebuilt sketch starts again
    assert!(runner.start());
    assert!(runner.terminate());
}

#[test]
fn failing_configure_tool_keeps_status() {
    let h = harness("exit 0");
    // swap the tool for one that fails the configure pass
    let failing = h.sketch_src.parent().unwrap().join("failing_cmake.sh");
    write_executable(
        &failing,
        "#!/bin/sh\nif [ \"$1\" = \"--build\" ]; then exit 0; fi\necho \"CMake Error: boom\"\nexit 1\n",
    );
    let exectx =
        ExecutionContext::with_cmake(h.exectx.resource_dir(), &failing).unwrap();
    let mut runner = BoardRunner::new(exectx, None);

    assert!(runner.configure("arduino:avr:uno", board_conf()));
    assert!(!runner.build(&h.sketch_src, &SketchConfig::default()));
    assert_eq!(runner.status(), RunnerStatus::Configured);

    // diagnostic text is retained for post-mortem
    let log = String::from_utf8(runner.build_log()).unwrap();
    assert!(log.contains("CMake Error: boom"));
}

#[test]
fn missing_binary_fails_the_build() {
    let h = harness("exit 0");
    fs::remove_file(&h.sketch_bin).unwrap();
    let mut runner = BoardRunner::new(h.exectx.clone(), None);

    assert!(runner.configure("arduino:avr:uno", board_conf()));
    assert!(!runner.build(&h.sketch_src, &SketchConfig::default()));
    assert_eq!(runner.status(), RunnerStatus::Configured);
}

#[test]
fn spawn_failure_leaves_built() {
    let h = harness("exit 0");
    let mut runner = BoardRunner::new(h.exectx.clone(), None);

    assert!(runner.configure("arduino:avr:uno", board_conf()));
    assert!(runner.build(&h.sketch_src, &SketchConfig::default()));

    // strip the execute bit so the spawn itself fails
    let mut perms = fs::metadata(&h.sketch_bin).unwrap().permissions();
    perms.set_mode(0o644);
    fs::set_permissions(&h.sketch_bin, perms).unwrap();

    assert!(!runner.start());
    assert_eq!(runner.status(), RunnerStatus::Built);
}

#[test]
fn view_follows_the_status_lattice() {
    let h = harness("exec sleep 30");
    let mut runner = BoardRunner::new(h.exectx.clone(), None);

    assert!(runner.view().is_none()); // Clean

    assert!(runner.configure("arduino:avr:uno", board_conf()));
    {
        let view = runner.view().expect("view in Configured");
        assert_eq!(view.fqbn(), "arduino:avr:uno");
        assert_eq!(view.pin_count(), 3);
        assert!(view.pin(3).is_some());
        assert!(view.pin(9).is_none());

        let uart = view.uart(0).expect("one uart");
        assert_eq!(uart.baud_rate(), 9600);
        assert_eq!(uart.feed(b"at+gmr"), 6);
        assert_eq!(uart.rx_pending(), 6);

        let pin = view.pin(3).unwrap();
        pin.drive(1);
        assert_eq!(pin.read(), 0); // sketch has written nothing
    }

    assert!(runner.build(&h.sketch_src, &SketchConfig::default()));
    assert!(runner.view().is_some()); // Built
    assert!(runner.start());
    assert!(runner.view().is_some()); // Running
    assert!(runner.terminate());
    assert!(runner.view().is_none()); // Stopped
}
