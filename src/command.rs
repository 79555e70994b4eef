use crate::env::Environment;
use crate::parser::CommandRequest;
use crate::status::ExitStatus;
use anyhow::Result;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// Object-safe trait for any command that can be executed by the shell.
///
/// This is implemented by built-ins via a blanket impl and by external commands.
pub trait ExecutableCommand {
    /// Executes the command, writing shell-generated messages to `stdout`.
    ///
    /// Returns the status to record in the status register, or `None` when the
    /// register must be left alone (e.g. `status` itself, or a job that was
    /// only started in the background).
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<Option<ExitStatus>>;
}

/// Factory that tries to create a command from a parsed request.
///
/// Returns `None` when the factory doesn't recognize the command name.
pub trait CommandFactory {
    fn try_create(
        &self,
        env: &Environment,
        request: &CommandRequest,
    ) -> Option<Box<dyn ExecutableCommand>>;
}
