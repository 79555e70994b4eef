//! A small interactive shell built around a process-launch and job-control core.
//!
//! Each input line is parsed into a [`parser::CommandRequest`] and handed to the
//! first [`command::CommandFactory`] that recognizes it: the builtins `exit`, `cd`
//! and `status`, or the external launcher, which forks, wires up `<`/`>`
//! redirection and SIGINT disposition in the child, and execs the program.
//! Foreground commands are waited for; background commands (`&`) are tracked in
//! a [`jobs::JobTable`] and reaped once per prompt.
//!
//! The main entry point is [`Interpreter`].

mod builtin;
pub mod command;
pub mod config;
pub mod env;
mod external;
mod interpreter;
pub mod jobs;
pub mod launcher;
pub mod parser;
pub mod status;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::{Interpreter, ignore_interrupts};
