use crate::launcher::ChildLimit;
use argh::FromArgs;

pub const DEFAULT_PROMPT: &str = ": ";
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Runtime settings for an [`Interpreter`](crate::Interpreter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Printed before every input line.
    pub prompt: String,
    /// Ceiling on simultaneously live child processes, foreground and background.
    pub max_children: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            max_children: ChildLimit::DEFAULT_MAX,
        }
    }
}

#[derive(FromArgs, Debug)]
/// A small interactive shell with background jobs and I/O redirection.
pub struct ShellOptions {
    #[argh(option, default = "ChildLimit::DEFAULT_MAX")]
    /// maximum number of live child processes
    pub max_children: usize,

    #[argh(option, default = "DEFAULT_PROMPT.to_string()")]
    /// prompt printed before each command
    pub prompt: String,

    #[argh(option, default = "String::from(DEFAULT_LOG_LEVEL)")]
    /// log filter used when RUST_LOG is unset (e.g. info, debug)
    pub log_level: String,
}

impl ShellOptions {
    pub fn config(&self) -> ShellConfig {
        ShellConfig {
            prompt: self.prompt.clone(),
            max_children: self.max_children,
        }
    }
}
