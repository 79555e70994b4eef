use crate::builtin::terminate_jobs;
use crate::command::CommandFactory;
use crate::config::ShellConfig;
use crate::env::Environment;
use crate::jobs::{self, Completion};
use crate::parser::{self, CommandLine, CommandRequest};
use crate::status::ExitStatus;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result};
use std::io::{IsTerminal, Write};
use tracing::warn;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only support commands defined in this crate — BuiltinCommand and ExternalCommand.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Ignore SIGINT in the shell itself so Ctrl-C only reaches foreground children.
pub fn ignore_interrupts() -> nix::Result<()> {
    let action = SigAction::new(SigHandler::SigIgn, SaFlags::SA_RESTART, SigSet::all());
    // SAFETY: SIG_IGN installs no handler code.
    unsafe { sigaction(Signal::SIGINT, &action) }.map(|_| ())
}

/// The interactive shell.
///
/// Owns the shell state ([`Environment`]) and an ordered list of
/// [`CommandFactory`] objects; the first factory that recognizes a command
/// runs it. Background jobs are reaped once per prompt, right before the
/// prompt is shown.
///
/// Example
/// ```
/// use smallsh::Interpreter;
/// let mut sh = Interpreter::default();
/// let mut out = Vec::new();
/// sh.execute_line("status", &mut out).unwrap();
/// assert_eq!(out, b"exit value 0\n");
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
    prompt: String,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(config: ShellConfig, commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::with_max_children(config.max_children),
            commands,
            prompt: config.prompt,
        }
    }

    /// Create an interpreter with the standard builtins and external launcher.
    pub fn with_config(config: ShellConfig) -> Self {
        use crate::builtin::*;
        use crate::external::ExternalCommand;
        Self::new(
            config,
            vec![
                Box::new(Factory::<Exit>::default()),
                Box::new(Factory::<Cd>::default()),
                Box::new(Factory::<Status>::default()),
                Box::new(Factory::<ExternalCommand>::default()),
            ],
        )
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Parse and run one input line, writing shell messages to `stdout`.
    pub fn execute_line(&mut self, line: &str, stdout: &mut dyn Write) -> anyhow::Result<()> {
        match parser::parse_line(line) {
            Ok(CommandLine::Empty) | Ok(CommandLine::Comment) => Ok(()),
            Ok(CommandLine::Command(request)) => self.run(&request, stdout),
            Err(e) => {
                eprintln!("smallsh: {}", e);
                self.env.status.set(ExitStatus::Exited(1));
                Ok(())
            }
        }
    }

    /// Dispatch a parsed command to the first factory that accepts it.
    pub fn run(&mut self, request: &CommandRequest, stdout: &mut dyn Write) -> anyhow::Result<()> {
        if request.argv.is_empty() {
            anyhow::bail!("empty command");
        }
        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(&self.env, request) {
                if let Some(status) = cmd.execute(stdout, &mut self.env)? {
                    self.env.status.set(status);
                }
                return Ok(());
            }
        }
        Err(anyhow::anyhow!("command not found: {}", request.name()))
    }

    /// Collect finished background jobs and report each one.
    ///
    /// Every completion frees its child slot and overwrites the status
    /// register, so after several completions the last one reported wins.
    /// Jobs that could not be waited for free their slot silently.
    pub fn reap_background(&mut self, stdout: &mut dyn Write) -> std::io::Result<Vec<Completion>> {
        let reaped = jobs::reap(&mut self.env.jobs);
        for _ in &reaped.lost {
            self.env.children.release();
        }
        for completion in &reaped.done {
            self.env.children.release();
            self.env.status.set(completion.status);
            writeln!(stdout, "{}", completion)?;
        }
        stdout.flush()?;
        Ok(reaped.done)
    }

    /// Signal all remaining background jobs and mark the shell as finished.
    pub fn shutdown(&mut self) {
        terminate_jobs(&self.env);
        self.env.should_exit = true;
    }

    /// Read-eval loop: reap, prompt, run, until `exit` or end of input.
    pub fn repl(&mut self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        let mut stdout = std::io::stdout();
        // rustyline only draws the prompt on a terminal
        let piped = !std::io::stdin().is_terminal();

        while !self.env.should_exit {
            self.reap_background(&mut stdout)?;

            let prompt = if piped {
                write!(stdout, "{}", self.prompt)?;
                stdout.flush()?;
                ""
            } else {
                self.prompt.as_str()
            };

            match rl.readline(prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    if let Err(e) = self.execute_line(&line, &mut stdout) {
                        warn!(error = %e, "command failed");
                        eprintln!("smallsh: {:#}", e);
                    }
                    stdout.flush()?;
                }
                Err(ReadlineError::Interrupted) => {}
                Err(ReadlineError::Eof) => self.shutdown(),
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::with_config(ShellConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::tests::lock_current_dir;
    use std::fs;
    use std::thread;
    use std::time::{Duration, Instant};

    fn run_line(sh: &mut Interpreter, line: &str) -> String {
        let mut out = Vec::new();
        sh.execute_line(line, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn reap_until_idle(sh: &mut Interpreter) -> String {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut out = Vec::new();
        while !sh.env().jobs.is_empty() {
            assert!(Instant::now() < deadline, "background jobs never finished");
            sh.reap_background(&mut out).unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_comment_and_blank_lines_are_noops() {
        let mut sh = Interpreter::default();
        sh.env.status.set(ExitStatus::Exited(7));

        assert_eq!(run_line(&mut sh, "# false"), "");
        assert_eq!(run_line(&mut sh, ""), "");
        assert_eq!(run_line(&mut sh, "   \t"), "");

        assert_eq!(sh.env().status.get(), ExitStatus::Exited(7));
        assert_eq!(sh.env().children.live(), 0);
    }

    #[test]
    fn test_status_reports_foreground_exit_value() {
        let mut sh = Interpreter::default();
        run_line(&mut sh, "false");
        assert_eq!(run_line(&mut sh, "status"), "exit value 1\n");
        run_line(&mut sh, "true");
        assert_eq!(run_line(&mut sh, "status"), "exit value 0\n");
    }

    #[test]
    fn test_status_reports_foreground_signal() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("die.sh");
        fs::write(&script, "kill -9 $$\n").unwrap();

        let mut sh = Interpreter::default();
        let out = run_line(&mut sh, &format!("sh {}", script.display()));
        assert_eq!(out, "terminated by signal 9\n");
        assert_eq!(run_line(&mut sh, "status"), "terminated by signal 9\n");
    }

    #[test]
    fn test_output_redirect_writes_file_not_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let out_file = dir.path().join("out.txt");

        let mut sh = Interpreter::default();
        let out = run_line(&mut sh, &format!("echo hi > {}", out_file.display()));
        assert_eq!(out, "");
        assert_eq!(fs::read_to_string(&out_file).unwrap(), "hi\n");
    }

    #[test]
    fn test_bad_redirect_fails_without_stopping_shell() {
        let mut sh = Interpreter::default();
        run_line(&mut sh, "cat < /does/not/exist/input.txt");
        assert_eq!(run_line(&mut sh, "status"), "exit value 1\n");
        assert!(!sh.should_exit());
    }

    #[test]
    fn test_syntax_error_records_failure() {
        let mut sh = Interpreter::default();
        run_line(&mut sh, "cat <");
        assert_eq!(sh.env().status.get(), ExitStatus::Exited(1));
        assert_eq!(sh.env().children.live(), 0);
    }

    #[test]
    fn test_cd_failure_then_status() {
        let _lock = lock_current_dir();
        let orig = std::env::current_dir().unwrap();

        let mut sh = Interpreter::default();
        run_line(&mut sh, "cd /does/not/exist");
        assert_eq!(std::env::current_dir().unwrap(), orig);
        assert_eq!(run_line(&mut sh, "status"), "exit value 1\n");
    }

    #[test]
    fn test_background_completion_reported_on_later_cycle() {
        let mut sh = Interpreter::default();
        let out = run_line(&mut sh, "sh -c exit &");
        assert!(out.starts_with("background pid is "));
        let pid: i32 = out.trim().rsplit(' ').next().unwrap().parse().unwrap();
        assert_eq!(sh.env().children.live(), 1);
        assert_eq!(sh.env().status.get(), ExitStatus::Exited(0));

        let report = reap_until_idle(&mut sh);
        assert_eq!(
            report,
            format!("background pid {} is done: exit value 0\n", pid)
        );
        assert_eq!(sh.env().children.live(), 0);
    }

    #[test]
    fn test_reaped_background_status_overwrites_register() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("three.sh");
        fs::write(&script, "exit 3\n").unwrap();

        let mut sh = Interpreter::default();
        run_line(&mut sh, &format!("sh {} &", script.display()));
        run_line(&mut sh, "true");
        assert_eq!(sh.env().status.get(), ExitStatus::Exited(0));

        let report = reap_until_idle(&mut sh);
        assert!(report.ends_with("is done: exit value 3\n"));
        assert_eq!(run_line(&mut sh, "status"), "exit value 3\n");
    }

    #[test]
    fn test_running_background_job_is_not_reported() {
        let mut sh = Interpreter::default();
        run_line(&mut sh, "sleep 5 &");
        let mut out = Vec::new();
        assert!(sh.reap_background(&mut out).unwrap().is_empty());
        assert!(out.is_empty());
        assert_eq!(sh.env().jobs.len(), 1);

        run_line(&mut sh, "exit");
        assert!(sh.should_exit());
        let report = reap_until_idle(&mut sh);
        assert!(report.ends_with("is done: terminated by signal 15\n"));
    }

    #[test]
    fn test_limit_rejects_extra_children() {
        let config = ShellConfig {
            max_children: 1,
            ..ShellConfig::default()
        };
        let mut sh = Interpreter::with_config(config);
        run_line(&mut sh, "sleep 5 &");
        run_line(&mut sh, "true");
        assert_eq!(sh.env().status.get(), ExitStatus::Exited(1));
        assert_eq!(sh.env().jobs.len(), 1);

        sh.shutdown();
        reap_until_idle(&mut sh);
    }

    #[test]
    fn test_shutdown_signals_jobs_without_waiting() {
        let mut sh = Interpreter::default();
        run_line(&mut sh, "sleep 30 &");
        sh.shutdown();
        assert!(sh.should_exit());
        // still tracked: exit does not drain
        assert_eq!(sh.env().jobs.len(), 1);
        reap_until_idle(&mut sh);
    }

    #[test]
    fn test_job_collected_elsewhere_frees_its_slot() {
        let config = ShellConfig {
            max_children: 1,
            ..ShellConfig::default()
        };
        let mut sh = Interpreter::with_config(config);
        let out = run_line(&mut sh, "true &");
        let pid: i32 = out.trim().rsplit(' ').next().unwrap().parse().unwrap();
        nix::sys::wait::waitpid(nix::unistd::Pid::from_raw(pid), None).unwrap();

        let mut report = Vec::new();
        assert!(sh.reap_background(&mut report).unwrap().is_empty());
        assert!(report.is_empty());
        assert!(sh.env().jobs.is_empty());
        assert_eq!(sh.env().children.live(), 0);

        run_line(&mut sh, "true");
        assert_eq!(sh.env().status.get(), ExitStatus::Exited(0));
    }

    #[test]
    fn test_empty_request_is_rejected_without_panicking() {
        let mut sh = Interpreter::default();
        let mut out = Vec::new();
        assert!(sh.run(&CommandRequest::default(), &mut out).is_err());
        assert!(out.is_empty());
        assert_eq!(sh.env().children.live(), 0);
    }

    #[test]
    fn test_unknown_command_without_factories() {
        let mut sh = Interpreter::new(ShellConfig::default(), Vec::new());
        let mut out = Vec::new();
        assert!(sh.execute_line("ls", &mut out).is_err());
    }
}
