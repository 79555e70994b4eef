use nix::sys::wait::WaitStatus;
use std::fmt;

/// Outcome of a child process that reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The process called `exit` with the given code.
    Exited(i32),
    /// The process was killed by the given signal number.
    Signaled(i32),
}

impl ExitStatus {
    /// Convert a `waitpid` observation into a terminal status.
    ///
    /// Returns `None` for anything that is not terminal (stopped, continued,
    /// still alive, ptrace events), so callers know to keep waiting.
    pub fn from_wait(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(ExitStatus::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(ExitStatus::Signaled(signal as i32)),
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }
}

impl Default for ExitStatus {
    fn default() -> Self {
        ExitStatus::Exited(0)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit value {}", code),
            ExitStatus::Signaled(signal) => write!(f, "terminated by signal {}", signal),
        }
    }
}

/// Holds the status of the last foreground command or reaped background job.
///
/// Overwritten, never cleared. The `status` builtin only reads it.
#[derive(Debug, Default, Clone)]
pub struct StatusRegister {
    last: ExitStatus,
}

impl StatusRegister {
    pub fn get(&self) -> ExitStatus {
        self.last
    }

    pub fn set(&mut self, status: ExitStatus) {
        self.last = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;
    use nix::unistd::Pid;

    #[test]
    fn test_render_uses_variant_not_code() {
        assert_eq!(ExitStatus::Exited(0).to_string(), "exit value 0");
        assert_eq!(ExitStatus::Exited(7).to_string(), "exit value 7");
        assert_eq!(ExitStatus::Exited(2).to_string(), "exit value 2");
        assert_eq!(ExitStatus::Signaled(9).to_string(), "terminated by signal 9");
        assert_eq!(ExitStatus::Signaled(1).to_string(), "terminated by signal 1");
    }

    #[test]
    fn test_from_wait_only_accepts_terminal_states() {
        let pid = Pid::from_raw(42);
        assert_eq!(
            ExitStatus::from_wait(WaitStatus::Exited(pid, 3)),
            Some(ExitStatus::Exited(3))
        );
        assert_eq!(
            ExitStatus::from_wait(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            Some(ExitStatus::Signaled(9))
        );
        assert_eq!(
            ExitStatus::from_wait(WaitStatus::Stopped(pid, Signal::SIGSTOP)),
            None
        );
        assert_eq!(ExitStatus::from_wait(WaitStatus::StillAlive), None);
    }

    #[test]
    fn test_register_starts_at_success_and_overwrites() {
        let mut register = StatusRegister::default();
        assert_eq!(register.get(), ExitStatus::Exited(0));

        register.set(ExitStatus::Signaled(15));
        assert_eq!(register.get(), ExitStatus::Signaled(15));

        register.set(ExitStatus::Exited(1));
        assert_eq!(register.get().to_string(), "exit value 1");
        assert!(!register.get().success());
    }
}
