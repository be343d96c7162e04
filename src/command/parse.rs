//! Structured commands
//!
//! Console input is tokenized once into a verb and argument list. From then
//! on arguments travel as separate RESP bulk strings, so nothing needs shell
//! quoting. `Display` re-quotes arguments for logs and error messages in a
//! form that [`Command::parse`] reads back to the same argument list.

use std::borrow::Cow;
use std::fmt;

use serde::Serialize;

use crate::utils::{ConsoleError, Result};

const RAW_FLAG: &str = "--raw";

/// How replies are rendered when no verb-specific decoding applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// valkey-cli style: `"quoted"`, `(integer) 1`, numbered arrays
    #[default]
    Formatted,
    /// Bare values, one per line
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    args: Vec<String>,
    output_mode: OutputMode,
}

impl Command {
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            args: Vec::new(),
            output_mode: OutputMode::Formatted,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    /// Build from already separated tokens, e.g. command-line arguments
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self> {
        let mut tokens = tokens.into_iter();
        let mut verb = tokens
            .next()
            .ok_or_else(|| ConsoleError::InvalidCommand("empty command".to_string()))?;
        let mut output_mode = OutputMode::Formatted;
        if verb == RAW_FLAG {
            output_mode = OutputMode::Raw;
            verb = tokens.next().ok_or_else(|| {
                ConsoleError::InvalidCommand("missing command after --raw".to_string())
            })?;
        }
        Ok(Self {
            verb,
            args: tokens.collect(),
            output_mode,
        })
    }

    /// Parse console input such as `--raw HGETALL "user 1"`
    pub fn parse(line: &str) -> Result<Self> {
        let tokens = tokenize(line).map_err(ConsoleError::InvalidCommand)?;
        Self::from_tokens(tokens)
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    /// Verb followed by arguments, as sent on the wire
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.verb.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Case-insensitive verb comparison
    pub fn is(&self, verb: &str) -> bool {
        self.verb.eq_ignore_ascii_case(verb)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.output_mode == OutputMode::Raw {
            write!(f, "{} ", RAW_FLAG)?;
        }
        f.write_str(&quote_arg(&self.verb))?;
        for arg in &self.args {
            write!(f, " {}", quote_arg(arg))?;
        }
        Ok(())
    }
}

/// Quote one argument so [`tokenize`] reads it back unchanged
///
/// Glob characters pass through untouched, so a quoted SCAN pattern keeps
/// matching the same keys.
pub fn quote_arg(arg: &str) -> Cow<'_, str> {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'));
    if !needs_quotes {
        return Cow::Borrowed(arg);
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

/// Split a command line into arguments, handling quotes and backslash escapes
pub fn tokenize(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    // Distinguishes `""` (an empty argument) from no argument at all
    let mut in_token = false;
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for ch in line.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if !in_single_quote => {
                escape_next = true;
                in_token = true;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                in_token = true;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                in_token = true;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            _ => {
                current.push(ch);
                in_token = true;
            }
        }
    }

    if in_single_quote || in_double_quote {
        return Err("unbalanced quotes".to_string());
    }
    if escape_next {
        return Err("trailing backslash".to_string());
    }
    if in_token {
        args.push(current);
    }

    Ok(args)
}
