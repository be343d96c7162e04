//! Pipelined batches of independent read commands
//!
//! A batch is not a transaction: every command is answered on its own and a
//! failed command only affects its own output line.

use std::sync::Arc;

use tracing::debug;

use super::executor::CommandExecutor;
use crate::command::{render_line, Command};
use crate::utils::{RespValue, Result};

pub struct BatchExecutor {
    executor: Arc<CommandExecutor>,
}

impl BatchExecutor {
    pub fn new(executor: Arc<CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Run every line over one pipelined connection to the configured endpoint
    ///
    /// Returns one single-line output per input line, in input order. Lines
    /// that do not parse are not sent and yield an `(error) ...` line.
    pub fn execute_batch(&self, lines: &[String], connection_id: &str) -> Result<Vec<String>> {
        let parsed: Vec<Result<Command>> = lines.iter().map(|l| Command::parse(l)).collect();
        let commands: Vec<Command> = parsed
            .iter()
            .filter_map(|c| c.as_ref().ok().cloned())
            .collect();

        let replies = self.execute_commands(&commands, connection_id)?;
        let mut replies = replies.iter();

        Ok(parsed
            .iter()
            .map(|command| match command {
                Ok(_) => replies.next().map(render_line).unwrap_or_default(),
                Err(e) => format!("(error) {}", e),
            })
            .collect())
    }

    /// Pipeline structured commands, one raw reply per command
    pub fn execute_commands(
        &self,
        commands: &[Command],
        connection_id: &str,
    ) -> Result<Vec<RespValue>> {
        let config = self.executor.connection_config(connection_id)?;
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Batch of {} commands for {}", commands.len(), connection_id);
        self.executor.pipeline_to(commands, &config, &config.address())
    }

    /// `TYPE` of every key, as `(key, type)` pairs
    ///
    /// Keys whose lookup failed (for example because the seed node does not
    /// own them) report `unknown`.
    pub fn sample_types(
        &self,
        keys: &[String],
        connection_id: &str,
    ) -> Result<Vec<(String, String)>> {
        let commands: Vec<Command> = keys
            .iter()
            .map(|key| Command::new("TYPE").arg(key.as_str()))
            .collect();
        let replies = self.execute_commands(&commands, connection_id)?;

        Ok(keys
            .iter()
            .zip(replies)
            .map(|(key, reply)| {
                let key_type = match reply {
                    RespValue::Error(_) => None,
                    other => other.to_text(),
                };
                (key.clone(), key_type.unwrap_or_else(|| "unknown".to_string()))
            })
            .collect())
    }
}
