//! The board runner state machine.
//!
//! One runner drives one sketch lifecycle: configure provisions the shared
//! board segment, build produces the executable, start spawns it as a child
//! attached to the segment, suspend/resume/terminate control it, tick polls
//! for exit. All public operations are gated on [`RunnerStatus`] and report
//! a disallowed invocation as `false` without side effects.

use crate::build::{lock_log, BuildArtifacts, BuildDriver};
use crate::platform;
use crate::status::RunnerStatus;
use crate::view::BoardView;
use smce_common::board::BoardConfig;
use smce_common::consts::{segment_name, SEGNAME_ENV_VAR};
use smce_common::context::ExecutionContext;
use smce_common::sketch::SketchConfig;
use smce_shared_memory::SharedBoardData;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

/// Last handed-out sketch id, seeded from the wall clock so segment names
/// from different host launches rarely collide. Collisions still fail
/// configure via the exclusive segment create.
static LAST_SKETCH_ID: LazyLock<AtomicU64> = LazyLock::new(|| {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    AtomicU64::new(seed)
});

fn next_sketch_id() -> u64 {
    LAST_SKETCH_ID.fetch_add(1, Ordering::Relaxed) + 1
}

/// Callback receiving the child exit code when tick observes an exit.
pub type ExitNotify = Box<dyn FnMut(i32) + Send>;

/// Host-side state machine driving one sketch lifecycle.
pub struct BoardRunner {
    driver: BuildDriver,
    exit_notify: Option<ExitNotify>,
    exit_notified: bool,
    status: RunnerStatus,
    sketch_id: u64,
    sbd: SharedBoardData,
    fqbn: String,
    bconf: Option<BoardConfig>,
    sketch_path: Option<PathBuf>,
    artifacts: Option<BuildArtifacts>,
    runtime_log: Arc<Mutex<Vec<u8>>>,
    child: Option<Child>,
    drain: Option<JoinHandle<()>>,
}

impl BoardRunner {
    /// A clean runner over the given execution context.
    ///
    /// `exit_notify` is invoked with the child's exit code, exactly once per
    /// run, when [`tick`](Self::tick) observes the child exiting.
    pub fn new(exectx: ExecutionContext, exit_notify: Option<ExitNotify>) -> Self {
        Self {
            driver: BuildDriver::new(exectx),
            exit_notify,
            exit_notified: false,
            status: RunnerStatus::Clean,
            sketch_id: next_sketch_id(),
            sbd: SharedBoardData::new(),
            fqbn: String::new(),
            bconf: None,
            sketch_path: None,
            artifacts: None,
            runtime_log: Arc::new(Mutex::new(Vec::with_capacity(4096))),
            child: None,
            drain: None,
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> RunnerStatus {
        self.status
    }

    /// This runner's monotonic sketch identifier.
    pub fn sketch_id(&self) -> u64 {
        self.sketch_id
    }

    /// Name of the shared board segment while configured.
    pub fn segment_name(&self) -> Option<&str> {
        self.sbd.region().map(|region| region.name())
    }

    /// Generated sketch build directory, once configured by the build tool.
    pub fn sketch_dir(&self) -> Option<&Path> {
        self.artifacts.as_ref().map(|a| a.sketch_dir())
    }

    /// Produced sketch executable, once configured by the build tool.
    pub fn sketch_bin(&self) -> Option<&Path> {
        self.artifacts.as_ref().map(|a| a.sketch_bin())
    }

    /// Copy of the accumulated build log.
    pub fn build_log(&self) -> Vec<u8> {
        self.driver.log_snapshot()
    }

    /// Copy of the accumulated sketch runtime log.
    pub fn runtime_log(&self) -> Vec<u8> {
        lock_log(&self.runtime_log).clone()
    }

    /// Provision the shared board state for `fqbn`.
    ///
    /// Allowed from Clean and Configured; reconfiguring replaces the
    /// previous board state under the same segment name.
    pub fn configure(&mut self, fqbn: &str, bconf: BoardConfig) -> bool {
        if !self.status.allows_configure() {
            return false;
        }
        if let Err(e) = bconf.validate() {
            tracing::warn!(error = %e, "board configuration rejected");
            return false;
        }

        let name = segment_name(self.sketch_id);
        if let Err(e) = self.sbd.configure(&name, fqbn, &bconf) {
            tracing::warn!(error = %e, "shared board provisioning failed");
            if !self.sbd.is_configured() {
                self.status = RunnerStatus::Clean;
            }
            return false;
        }

        self.fqbn = fqbn.to_string();
        self.bconf = Some(bconf);
        self.status = RunnerStatus::Configured;
        true
    }

    /// Configure and compile the sketch at `sketch_src`.
    ///
    /// On success the runner holds the generated artifacts and becomes
    /// Built; on failure it stays Configured with the build log populated.
    pub fn build(&mut self, sketch_src: &Path, skonf: &SketchConfig) -> bool {
        if !self.status.allows_build() {
            return false;
        }

        let artifacts = match self.driver.configure_sketch(
            &self.fqbn,
            self.sketch_id,
            sketch_src,
            skonf,
        ) {
            Ok(artifacts) => artifacts,
            Err(e) => {
                tracing::warn!(error = %e, "sketch configure pass failed");
                return false;
            }
        };

        self.sketch_path = Some(sketch_src.to_path_buf());
        self.artifacts = Some(artifacts);
        self.do_build()
    }

    /// Recompile the previously built sketch, re-provisioning the board
    /// state under the same sketch identity.
    ///
    /// Forbidden while a child is executing.
    pub fn rebuild(&mut self) -> bool {
        if self.status.is_executing() {
            return false;
        }
        let Some(sketch_path) = self.sketch_path.clone() else {
            return false;
        };
        if self.artifacts.is_none() {
            return false;
        }
        let Some(bconf) = self.bconf.clone() else {
            return false;
        };

        let name = segment_name(self.sketch_id);
        self.sbd.reset();
        if let Err(e) = self.sbd.configure(&name, &self.fqbn, &bconf) {
            tracing::warn!(error = %e, "shared board re-provisioning failed");
            return false;
        }
        if let Err(e) = self
            .driver
            .reconfigure(&self.fqbn, self.sketch_id, &sketch_path)
        {
            tracing::warn!(error = %e, "sketch reconfigure pass failed");
            return false;
        }
        self.do_build()
    }

    /// Spawn the built executable as the sketch child process.
    pub fn start(&mut self) -> bool {
        if self.status != RunnerStatus::Built {
            return false;
        }
        let Some(artifacts) = self.artifacts.as_ref() else {
            return false;
        };

        let mut cmd = Command::new(artifacts.sketch_bin());
        cmd.env(SEGNAME_ENV_VAR, segment_name(self.sketch_id))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(error = %e, "sketch spawn failed");
                return false;
            }
        };

        if let Some(stderr) = child.stderr.take() {
            let log = Arc::clone(&self.runtime_log);
            self.drain = Some(std::thread::spawn(move || drain_stream(stderr, log)));
        }

        tracing::info!(pid = child.id(), sketch_id = self.sketch_id, "sketch started");
        self.child = Some(child);
        self.exit_notified = false;
        self.status = RunnerStatus::Running;
        true
    }

    /// Stop the child without killing it; resumable.
    pub fn suspend(&mut self) -> bool {
        if self.status != RunnerStatus::Running {
            return false;
        }
        let Some(child) = self.child.as_ref() else {
            return false;
        };
        if !platform::suspend_process(child.id()) {
            tracing::warn!(pid = child.id(), "suspend primitive failed");
            return false;
        }
        self.status = RunnerStatus::Suspended;
        true
    }

    /// Continue a suspended child.
    pub fn resume(&mut self) -> bool {
        if self.status != RunnerStatus::Suspended {
            return false;
        }
        let Some(child) = self.child.as_ref() else {
            return false;
        };
        if !platform::resume_process(child.id()) {
            tracing::warn!(pid = child.id(), "resume primitive failed");
            return false;
        }
        self.status = RunnerStatus::Running;
        true
    }

    /// Non-blocking poll for child exit.
    ///
    /// When the child has exited, transitions to Stopped and invokes the
    /// exit-notification callback exactly once with the exit code.
    pub fn tick(&mut self) {
        if !self.status.is_executing() {
            return;
        }
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(exit)) => {
                let code = platform::exit_code(exit);
                tracing::info!(code, sketch_id = self.sketch_id, "sketch exited");
                self.status = RunnerStatus::Stopped;
                self.notify_exit(code);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "child poll failed"),
        }
    }

    /// Hard-kill the child and join the log pump.
    pub fn terminate(&mut self) -> bool {
        if !self.status.is_executing() {
            return false;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        let killed = match child.kill() {
            Ok(()) => true,
            // a child that already exited on its own is terminated too
            Err(_) => matches!(child.try_wait(), Ok(Some(_))),
        };
        let _ = child.wait();
        if let Some(drain) = self.drain.take() {
            let _ = drain.join();
        }

        if killed {
            self.status = RunnerStatus::Stopped;
        }
        killed
    }

    // TODO: replace with the cooperative stop handshake once the in-shm
    // command word (run/stop/suspend/stop_ack) and its wait semantics are
    // specified.
    /// Stop the sketch; currently an alias of [`terminate`](Self::terminate).
    pub fn stop(&mut self) -> bool {
        self.terminate()
    }

    /// Return to Clean, discarding board state, artifacts and logs.
    ///
    /// Rejected while a child is executing; terminate first. The runner gets
    /// a fresh sketch id, so a subsequent configure uses a new segment name.
    pub fn reset(&mut self) -> bool {
        if self.status.is_executing() {
            return false;
        }

        self.halt_child();
        self.sbd.reset();
        self.sketch_id = next_sketch_id();
        self.fqbn.clear();
        self.bconf = None;
        self.sketch_path = None;
        self.artifacts = None; // removes the generated sketch directory
        self.driver.clear_log();
        lock_log(&self.runtime_log).clear();
        self.exit_notified = false;
        self.status = RunnerStatus::Clean;
        true
    }

    /// Read/write façade over the shared board state.
    ///
    /// `None` in Clean and Stopped, where no live board exists.
    pub fn view(&self) -> Option<BoardView<'_>> {
        if !self.status.allows_view() {
            return None;
        }
        let board = self.sbd.board_data()?;
        let alloc = self.sbd.allocator()?;
        Some(BoardView::new(board, alloc))
    }

    fn do_build(&mut self) -> bool {
        let Some(artifacts) = self.artifacts.as_ref() else {
            return false;
        };
        match self.driver.build(artifacts) {
            Ok(()) => {
                self.status = RunnerStatus::Built;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "sketch build pass failed");
                false
            }
        }
    }

    fn notify_exit(&mut self, code: i32) {
        if self.exit_notified {
            return;
        }
        self.exit_notified = true;
        if let Some(notify) = self.exit_notify.as_mut() {
            notify(code);
        }
    }

    fn halt_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(drain) = self.drain.take() {
            let _ = drain.join();
        }
    }
}

impl Drop for BoardRunner {
    fn drop(&mut self) {
        self.halt_child();
        // dropping the artifacts removes the generated sketch directory
    }
}

/// Pump stderr bytes into the runtime log until EOF or failure. The mutex
/// is held only for the duration of each append.
fn drain_stream(mut stream: ChildStderr, log: Arc<Mutex<Vec<u8>>>) {
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut log = lock_log(&log);
                log.extend_from_slice(&buf[..n]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sketch_ids_are_distinct_and_increasing() {
        let a = next_sketch_id();
        let b = next_sketch_id();
        let c = next_sketch_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn ids_are_wall_clock_seeded() {
        // seeded from unix seconds at first use, so far above small counters
        assert!(next_sketch_id() > 1_000_000_000);
    }
}
