//! Platform process-control primitives.
//!
//! Suspension must stop the child without delivering a killable signal so
//! that `resume` can pick it back up. Platforms without such a primitive
//! report failure, which the runner surfaces as an unsupported suspend.

#[cfg(unix)]
mod unix {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    /// Stop a process without terminating it (SIGSTOP).
    pub fn suspend_process(pid: u32) -> bool {
        kill(Pid::from_raw(pid as i32), Signal::SIGSTOP).is_ok()
    }

    /// Continue a stopped process (SIGCONT).
    pub fn resume_process(pid: u32) -> bool {
        kill(Pid::from_raw(pid as i32), Signal::SIGCONT).is_ok()
    }

    /// Exit code forwarded to the embedder; signal deaths map to 128+signo.
    pub fn exit_code(status: ExitStatus) -> i32 {
        status
            .code()
            .unwrap_or_else(|| status.signal().map_or(-1, |sig| 128 + sig))
    }
}

#[cfg(unix)]
pub use unix::*;

#[cfg(not(unix))]
mod unsupported {
    use std::process::ExitStatus;

    pub fn suspend_process(_pid: u32) -> bool {
        false
    }

    pub fn resume_process(_pid: u32) -> bool {
        false
    }

    pub fn exit_code(status: ExitStatus) -> i32 {
        status.code().unwrap_or(-1)
    }
}

#[cfg(not(unix))]
pub use unsupported::*;
