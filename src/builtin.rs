use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::interpreter::Factory;
use crate::parser::CommandRequest;
use crate::status::ExitStatus;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use nix::sys::signal::{Signal, kill};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "status".
    fn name() -> &'static str;

    /// Whether the returned exit code is stored in the status register.
    fn records_status() -> bool {
        true
    }

    /// Executes the command.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<Option<ExitStatus>> {
        let code = match <T as BuiltinCommand>::execute(*self, stdout, env) {
            Ok(x) => x,
            Err(e) => {
                eprintln!("{:#}", e);
                1
            }
        };
        Ok(T::records_status().then_some(ExitStatus::Exited(code)))
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<Option<ExitStatus>> {
        writeln!(stdout, "{}", self.output.trim_end())?;
        Ok(Some(ExitStatus::Exited(if self.is_error { 1 } else { 0 })))
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        request: &CommandRequest,
    ) -> Option<Box<dyn ExecutableCommand>> {
        let name = request.name();
        if name == T::name() {
            let args: Vec<&str> = request.args().iter().map(String::as_str).collect();
            Some(match T::from_args(&[name], &args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME").filter(|home| !home.is_empty()) {
                Some(home) => PathBuf::from(home),
                None => return Err(anyhow::anyhow!("cd: no target and HOME not set")),
            },
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: {}", canonical.display()))?;
        debug!(dir = %canonical.display(), "changed directory");
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Terminate all background jobs and leave the shell.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn records_status() -> bool {
        false
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        terminate_jobs(env);
        env.should_exit = true;
        Ok(0)
    }
}

/// Send SIGTERM to every tracked background job without waiting for any of them.
pub(crate) fn terminate_jobs(env: &Environment) {
    for job in env.jobs.iter() {
        info!(pid = job.pid.as_raw(), "terminating background job");
        if let Err(e) = kill(job.pid, Signal::SIGTERM) {
            warn!(pid = job.pid.as_raw(), error = %e, "failed to signal background job");
        }
    }
}

#[derive(FromArgs)]
/// Print the exit value or terminating signal of the last finished command.
pub struct Status {}

impl BuiltinCommand for Status {
    fn name() -> &'static str {
        "status"
    }

    fn records_status() -> bool {
        false
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.status.get())?;
        Ok(0)
    }
}
