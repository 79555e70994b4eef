//! Turns one input line into a [`CommandLine`].
//!
//! Words are separated by runs of whitespace; there is no quoting. The control
//! tokens are `&` (only as the last word), `<` and `>`, each of the latter two
//! followed by a file name.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Kind of redirection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `<`: standard input is read from the file.
    Input,
    /// `>`: standard output is written to the file, truncating it.
    Output,
}

impl RedirectKind {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "<" => Some(RedirectKind::Input),
            ">" => Some(RedirectKind::Output),
            _ => None,
        }
    }
}

impl fmt::Display for RedirectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedirectKind::Input => f.write_str("<"),
            RedirectKind::Output => f.write_str(">"),
        }
    }
}

/// A command with its control tokens already stripped out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandRequest {
    /// Program name followed by its arguments.
    pub argv: Vec<String>,
    pub background: bool,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl CommandRequest {
    pub fn name(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }
}

/// Result of parsing a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Nothing but whitespace.
    Empty,
    /// First word starts with `#`.
    Comment,
    Command(CommandRequest),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsingError {
    #[error("expected a file name after `{0}`")]
    MissingRedirectTarget(RedirectKind),
    #[error("missing command name")]
    MissingCommand,
}

/// Split a line into words, dropping all surrounding whitespace.
pub fn split_into_tokens(line: &str) -> Vec<&str> {
    line.split([' ', '\t', '\r', '\n'])
        .filter(|word| !word.is_empty())
        .collect()
}

/// Build a [`CommandLine`] from the words of one line.
///
/// Arguments stop at the first redirection marker; every marker is still
/// honored, and a repeated one overrides the earlier file.
pub fn construct_command(mut tokens: Vec<&str>) -> Result<CommandLine, ParsingError> {
    let Some(first) = tokens.first() else {
        return Ok(CommandLine::Empty);
    };
    if first.starts_with('#') {
        return Ok(CommandLine::Comment);
    }

    let background = tokens.last() == Some(&"&");
    if background {
        tokens.pop();
    }

    let mut request = CommandRequest {
        background,
        ..Default::default()
    };
    let mut in_redirects = false;
    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        match RedirectKind::from_token(token) {
            Some(kind) => {
                in_redirects = true;
                let target = iter
                    .next()
                    .ok_or(ParsingError::MissingRedirectTarget(kind))?;
                let target = Some(PathBuf::from(target));
                match kind {
                    RedirectKind::Input => request.input = target,
                    RedirectKind::Output => request.output = target,
                }
            }
            None if !in_redirects => request.argv.push(token.to_string()),
            None => {}
        }
    }

    if request.argv.is_empty() {
        return Err(ParsingError::MissingCommand);
    }
    Ok(CommandLine::Command(request))
}

/// Tokenize and parse a raw input line.
pub fn parse_line(line: &str) -> Result<CommandLine, ParsingError> {
    construct_command(split_into_tokens(line))
}
