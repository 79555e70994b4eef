use crate::command::{CommandFactory, ExecutableCommand};
use crate::env::Environment;
use crate::interpreter::Factory;
use crate::launcher::{self, Launch};
use crate::parser::CommandRequest;
use crate::status::ExitStatus;
use anyhow::Result;
use std::io::Write;

/// Command that is not a builtin.
///
/// The program is looked up through `PATH` by `execvp` in the child, so a
/// missing program shows up as a failed child rather than a parent error.
pub struct ExternalCommand {
    request: CommandRequest,
}

impl ExternalCommand {
    pub fn new(request: CommandRequest) -> Self {
        Self { request }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        _env: &Environment,
        request: &CommandRequest,
    ) -> Option<Box<dyn ExecutableCommand>> {
        Some(Box::new(ExternalCommand::new(request.clone())))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<Option<ExitStatus>> {
        match launcher::launch(&self.request, env) {
            Ok(Launch::Foreground(status)) => {
                if let ExitStatus::Signaled(_) = status {
                    writeln!(stdout, "{}", status)?;
                }
                Ok(Some(status))
            }
            Ok(Launch::Background(job)) => {
                writeln!(stdout, "background pid is {}", job.pid)?;
                Ok(None)
            }
            Err(e) => {
                eprintln!("smallsh: {}: {}", self.request.name(), e);
                Ok(Some(ExitStatus::Exited(1)))
            }
        }
    }
}
