use crate::jobs::JobTable;
use crate::launcher::ChildLimit;
use crate::status::StatusRegister;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Everything the shell mutates between commands.
///
/// The interpreter owns one of these for its whole life and lends it to
/// every command it runs:
/// - `vars`: overrides consulted before the process environment. The shell
///   never writes them itself; embedders and tests use them to point `cd` at a
///   `HOME` without touching the process-wide environment.
/// - `current_dir`: the working directory, kept in sync with the process cwd by `cd`.
/// - `should_exit`: set by `exit` (or end of input) to stop the prompt loop.
/// - `status`: outcome of the last foreground command or reaped background job.
/// - `jobs`: background processes not yet reaped.
/// - `children`: count of live spawned processes against the configured ceiling.
#[derive(Debug)]
pub struct Environment {
    pub vars: HashMap<String, String>,
    pub current_dir: PathBuf,
    pub should_exit: bool,
    pub status: StatusRegister,
    pub jobs: JobTable,
    pub children: ChildLimit,
}

impl Environment {
    /// Capture the current process state with the default child ceiling.
    pub fn new() -> Self {
        Self::with_max_children(ChildLimit::DEFAULT_MAX)
    }

    pub fn with_max_children(max_children: usize) -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars: HashMap::new(),
            current_dir,
            should_exit: false,
            status: StatusRegister::default(),
            jobs: JobTable::new(),
            children: ChildLimit::new(max_children),
        }
    }

    /// Get the value of a variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Override `key` for this shell only; the process environment is untouched.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
