//! Process creation: fork, wire up redirections and SIGINT disposition in the
//! child, exec, and either wait (foreground) or register a job (background).

use crate::env::Environment;
use crate::jobs::Job;
use crate::parser::CommandRequest;
use crate::status::ExitStatus;
use nix::errno::Errno;
use nix::fcntl::{OFlag, open};
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{WaitPidFlag, waitpid};
use nix::libc::{self, c_char};
use nix::unistd::{ForkResult, Pid, close, dup2, fork, write};
use std::ffi::{CString, NulError};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, warn};

pub const NULL_DEVICE: &str = "/dev/null";

const STDIN: RawFd = 0;
const STDOUT: RawFd = 1;

/// Counts live spawned children against a fixed ceiling.
///
/// A slot is taken before fork and given back when the child is waited for,
/// either by the foreground wait or by the reaper.
#[derive(Debug, Clone)]
pub struct ChildLimit {
    live: usize,
    max: usize,
}

impl ChildLimit {
    pub const DEFAULT_MAX: usize = 100;

    pub fn new(max: usize) -> Self {
        Self { live: 0, max }
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn acquire(&mut self) -> Result<(), LaunchError> {
        if self.live >= self.max {
            return Err(LaunchError::LimitReached { max: self.max });
        }
        self.live += 1;
        Ok(())
    }

    pub fn release(&mut self) {
        self.live = self.live.saturating_sub(1);
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("too many child processes (limit {max})")]
    LimitReached { max: usize },
    #[error("argument contains a NUL byte")]
    NulByte(#[from] NulError),
    #[error("fork failed: {0}")]
    Fork(Errno),
    #[error("waiting for pid {pid} failed: {source}")]
    Wait { pid: Pid, source: Errno },
    #[error("empty command")]
    EmptyCommand,
    #[error("pid {0} is already tracked as a background job")]
    AlreadyTracked(Pid),
}

/// What the parent got back from a successful launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    Foreground(ExitStatus),
    Background(Job),
}

/// One descriptor the child must rebind before exec.
struct Redirect {
    target: RawFd,
    path: CString,
    flags: OFlag,
    error: Vec<u8>,
}

impl Redirect {
    fn new(path: &Path, target: RawFd) -> Result<Self, NulError> {
        let (flags, direction) = if target == STDIN {
            (OFlag::O_RDONLY, "input")
        } else {
            (OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC, "output")
        };
        Ok(Self {
            target,
            path: CString::new(path.as_os_str().as_bytes())?,
            flags,
            error: format!("cannot open {} for {}\n", path.display(), direction).into_bytes(),
        })
    }
}

/// Everything the child needs, converted and formatted in the parent before fork.
struct ChildPlan {
    argv: Vec<CString>,
    /// Null-terminated pointers into `argv`, handed straight to `execvp`.
    argv_ptrs: Vec<*const c_char>,
    background: bool,
    redirects: Vec<Redirect>,
}

impl ChildPlan {
    fn prepare(request: &CommandRequest) -> Result<Self, NulError> {
        let argv = request
            .argv
            .iter()
            .map(|arg| CString::new(arg.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        let argv_ptrs = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();

        let null = Path::new(NULL_DEVICE);
        let input = match (&request.input, request.background) {
            (Some(path), _) => Some(path.as_path()),
            (None, true) => Some(null),
            (None, false) => None,
        };
        let output = match (&request.output, request.background) {
            (Some(path), _) => Some(path.as_path()),
            (None, true) => Some(null),
            (None, false) => None,
        };

        let mut redirects = Vec::with_capacity(2);
        if let Some(path) = input {
            redirects.push(Redirect::new(path, STDIN)?);
        }
        if let Some(path) = output {
            redirects.push(Redirect::new(path, STDOUT)?);
        }

        Ok(Self {
            argv,
            argv_ptrs,
            background: request.background,
            redirects,
        })
    }

    /// Runs in the forked child. Never returns.
    fn exec(&self) -> ! {
        let disposition = if self.background {
            SigHandler::SigIgn
        } else {
            SigHandler::SigDfl
        };
        // SAFETY: no Rust-side handler is installed, only a disposition.
        let _ = unsafe { signal(Signal::SIGINT, disposition) };

        for redirect in &self.redirects {
            let fd = match open(
                redirect.path.as_c_str(),
                redirect.flags,
                Mode::S_IRWXU | Mode::S_IRWXG | Mode::S_IRWXO,
            ) {
                Ok(fd) => fd,
                Err(_) => child_fail(&[redirect.error.as_slice()]),
            };
            if fd != redirect.target {
                if dup2(fd, redirect.target).is_err() {
                    child_fail(&[redirect.error.as_slice()]);
                }
                let _ = close(fd);
            }
        }

        // SAFETY: `argv_ptrs` is null-terminated and points into `self.argv`,
        // which outlives the call. execvp only returns on failure.
        unsafe { libc::execvp(self.argv_ptrs[0], self.argv_ptrs.as_ptr()) };
        let err = Errno::last();
        child_fail(&[
            self.argv[0].as_bytes(),
            &b": "[..],
            err.desc().as_bytes(),
            &b"\n"[..],
        ])
    }
}

/// Report on stderr and leave the child with status 1, skipping atexit handlers.
fn child_fail(parts: &[&[u8]]) -> ! {
    for part in parts {
        let _ = write(std::io::stderr(), part);
    }
    // SAFETY: _exit is async-signal-safe and only ends this forked child.
    unsafe { libc::_exit(1) }
}

/// Block until `pid` exits or is killed, looping over stops and interrupts.
fn wait_foreground(pid: Pid) -> Result<ExitStatus, LaunchError> {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
            Ok(status) => {
                if let Some(status) = ExitStatus::from_wait(status) {
                    return Ok(status);
                }
                debug!(pid = pid.as_raw(), ?status, "foreground child not finished, waiting again");
            }
            Err(Errno::EINTR) => {}
            Err(source) => return Err(LaunchError::Wait { pid, source }),
        }
    }
}

/// Spawn exactly one process for `request`.
///
/// The child ceiling is checked before fork. A foreground launch returns once
/// the child is gone; a background launch registers a [`Job`] in `env.jobs`
/// and returns immediately, keeping its child slot until it is reaped.
pub fn launch(request: &CommandRequest, env: &mut Environment) -> Result<Launch, LaunchError> {
    if request.argv.is_empty() {
        return Err(LaunchError::EmptyCommand);
    }
    let plan = ChildPlan::prepare(request)?;

    if let Err(e) = env.children.acquire() {
        warn!(command = request.name(), max = env.children.max(), "child limit reached");
        return Err(e);
    }

    // SAFETY: the child only runs `ChildPlan::exec`, which touches nothing
    // but prepared data and raw system calls before exec or _exit.
    match unsafe { fork() } {
        Err(e) => {
            env.children.release();
            error!(command = request.name(), error = %e, "fork failed");
            Err(LaunchError::Fork(e))
        }
        Ok(ForkResult::Child) => plan.exec(),
        Ok(ForkResult::Parent { child }) => {
            debug!(
                pid = child.as_raw(),
                command = request.name(),
                background = request.background,
                "spawned"
            );
            if request.background {
                match env.jobs.insert(child) {
                    Some(job) => Ok(Launch::Background(job)),
                    None => {
                        env.children.release();
                        Err(LaunchError::AlreadyTracked(child))
                    }
                }
            } else {
                let status = wait_foreground(child);
                env.children.release();
                let status = status?;
                debug!(pid = child.as_raw(), %status, "foreground child finished");
                Ok(Launch::Foreground(status))
            }
        }
    }
}
