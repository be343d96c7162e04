//! Entry point bundling every console operation over one executor

use std::sync::Arc;

use tracing::debug;

use crate::cluster::{ClusterTopologyResolver, KeyLocator, ScanAggregator};
use crate::command::{Command, CommandResult};
use crate::config::{ConnectionConfigProvider, ExecutorConfig, ServerAddress};
use crate::dispatch::{BatchExecutor, CommandExecutor};
use crate::utils::{ConsoleError, Result};

pub struct Console {
    executor: Arc<CommandExecutor>,
    topology: ClusterTopologyResolver,
    scanner: ScanAggregator,
    locator: KeyLocator,
    batch: BatchExecutor,
}

impl Console {
    pub fn new(provider: Arc<dyn ConnectionConfigProvider>, settings: ExecutorConfig) -> Self {
        Self::with_executor(Arc::new(CommandExecutor::new(provider, settings)))
    }

    pub fn with_executor(executor: Arc<CommandExecutor>) -> Self {
        Self {
            topology: ClusterTopologyResolver::new(executor.clone()),
            scanner: ScanAggregator::new(executor.clone()),
            locator: KeyLocator::new(executor.clone()),
            batch: BatchExecutor::new(executor.clone()),
            executor,
        }
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub fn topology(&self) -> &ClusterTopologyResolver {
        &self.topology
    }

    pub fn scanner(&self) -> &ScanAggregator {
        &self.scanner
    }

    pub fn locator(&self) -> &KeyLocator {
        &self.locator
    }

    pub fn batch(&self) -> &BatchExecutor {
        &self.batch
    }

    /// Run a command, retrying once against the target of a `MOVED` reply
    ///
    /// With an explicit `node` the command goes there and a redirect is
    /// returned as an error.
    pub fn execute_command(
        &self,
        command: &Command,
        connection_id: &str,
        node: Option<&ServerAddress>,
    ) -> Result<CommandResult> {
        if node.is_some() {
            return self.executor.execute_command(command, connection_id, node);
        }

        match self.executor.execute_command(command, connection_id, None) {
            Err(ConsoleError::Redirect(target)) => {
                debug!("Following redirect for '{}': {}", command, target);
                self.executor
                    .execute_command(command, connection_id, Some(&target.address()))
            }
            other => other,
        }
    }
}
