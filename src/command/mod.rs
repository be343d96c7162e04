//! Structured commands, reply decoding and outcome classification

pub mod decode;
pub mod outcome;
pub mod parse;

pub use decode::{normalize, render_line, render_reply, CommandResult};
pub use outcome::{CommandOutcome, RedirectTarget};
pub use parse::{quote_arg, tokenize, Command, OutputMode};
