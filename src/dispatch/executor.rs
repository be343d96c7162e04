//! Single-command dispatch
//!
//! Each call resolves the environment, opens a fresh connection to the
//! target node, sends one command (or one pipeline) and drops the connection.
//! Nothing is retained between calls.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::client::{BoxedConnection, ControlPlaneExt, NodeConnector, TcpConnector};
use crate::command::{normalize, Command, CommandOutcome, CommandResult};
use crate::config::{ConnectionConfig, ConnectionConfigProvider, ExecutorConfig, ServerAddress};
use crate::utils::{ConsoleError, RespValue, Result};

pub struct CommandExecutor {
    provider: Arc<dyn ConnectionConfigProvider>,
    connector: Arc<dyn NodeConnector>,
    settings: ExecutorConfig,
}

impl CommandExecutor {
    /// Executor that connects over TCP/TLS
    pub fn new(provider: Arc<dyn ConnectionConfigProvider>, settings: ExecutorConfig) -> Self {
        let connector = Arc::new(TcpConnector::new(
            settings.connect_timeout,
            settings.tls.clone(),
        ));
        Self::with_connector(provider, connector, settings)
    }

    pub fn with_connector(
        provider: Arc<dyn ConnectionConfigProvider>,
        connector: Arc<dyn NodeConnector>,
        settings: ExecutorConfig,
    ) -> Self {
        Self {
            provider,
            connector,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutorConfig {
        &self.settings
    }

    /// Look up an environment; unknown ids fail with `ConfigNotFound`
    pub fn connection_config(&self, connection_id: &str) -> Result<ConnectionConfig> {
        self.provider.get_config(connection_id)
    }

    /// Parse and run console input, returning the normalized result
    ///
    /// Sent to `node` when given, otherwise to the configured endpoint.
    /// A `MOVED` reply fails with [`ConsoleError::Redirect`]; retrying is up
    /// to the caller.
    pub fn execute(
        &self,
        command_text: &str,
        connection_id: &str,
        node: Option<&ServerAddress>,
    ) -> Result<CommandResult> {
        let command = Command::parse(command_text)?;
        self.execute_command(&command, connection_id, node)
    }

    pub fn execute_command(
        &self,
        command: &Command,
        connection_id: &str,
        node: Option<&ServerAddress>,
    ) -> Result<CommandResult> {
        let reply = self.dispatch(command, connection_id, node)?.into_reply()?;
        Ok(normalize(command, &reply))
    }

    /// Run a command and report how it went
    ///
    /// Only an unknown environment is an `Err`; everything that happens on
    /// the wire is described by the returned outcome.
    pub fn dispatch(
        &self,
        command: &Command,
        connection_id: &str,
        node: Option<&ServerAddress>,
    ) -> Result<CommandOutcome> {
        let config = self.connection_config(connection_id)?;
        let address = node.cloned().unwrap_or_else(|| config.address());
        Ok(self.dispatch_to(command, &config, &address))
    }

    /// Run a command against one node of an already resolved environment
    pub fn dispatch_to(
        &self,
        command: &Command,
        config: &ConnectionConfig,
        address: &ServerAddress,
    ) -> CommandOutcome {
        debug!("{} <- {}", address, command);
        let mut conn = match self.connect(config, address, self.settings.command_timeout) {
            Ok(conn) => conn,
            Err(e) => return e.into(),
        };
        let outcome = CommandOutcome::classify(command, address, conn.execute(&command.argv()));
        if !outcome.is_success() {
            debug!("{} -> {:?}", address, outcome);
        }
        outcome
    }

    /// [`dispatch_to`](Self::dispatch_to) with non-success outcomes as errors
    pub fn query(
        &self,
        command: &Command,
        config: &ConnectionConfig,
        address: &ServerAddress,
    ) -> Result<RespValue> {
        self.dispatch_to(command, config, address).into_reply()
    }

    /// Send all commands over one connection and read one reply per command
    ///
    /// Bounded by the batch timeout. Server error replies stay in place;
    /// a transport failure fails the whole pipeline.
    pub fn pipeline_to(
        &self,
        commands: &[Command],
        config: &ConnectionConfig,
        address: &ServerAddress,
    ) -> Result<Vec<RespValue>> {
        let argvs: Vec<Vec<&str>> = commands.iter().map(Command::argv).collect();
        debug!("{} <- pipeline of {} commands", address, argvs.len());
        self.with_connection(config, address, self.settings.batch_timeout, |conn| {
            conn.execute_pipeline(&argvs)
        })
    }

    /// Raw `CLUSTER NODES` text from one node
    pub fn cluster_nodes(&self, config: &ConnectionConfig, address: &ServerAddress) -> Result<String> {
        self.with_connection(config, address, self.settings.command_timeout, |conn| {
            conn.cluster_nodes()
        })
    }

    pub fn ping(&self, connection_id: &str, node: Option<&ServerAddress>) -> Result<bool> {
        let config = self.connection_config(connection_id)?;
        let address = node.cloned().unwrap_or_else(|| config.address());
        self.with_connection(&config, &address, self.settings.command_timeout, |conn| {
            conn.ping()
        })
    }

    fn connect(
        &self,
        config: &ConnectionConfig,
        address: &ServerAddress,
        io_timeout: Duration,
    ) -> Result<BoxedConnection> {
        Ok(self.connector.connect(address, config, io_timeout)?)
    }

    fn with_connection<T>(
        &self,
        config: &ConnectionConfig,
        address: &ServerAddress,
        io_timeout: Duration,
        op: impl FnOnce(&mut BoxedConnection) -> io::Result<T>,
    ) -> Result<T> {
        let mut conn = self.connect(config, address, io_timeout)?;
        op(&mut conn).map_err(|e| ConsoleError::transport(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockCluster, MockNode, MockValue};
    use crate::config::StaticConfigProvider;
    use crate::utils::TransportCode;

    fn executor(cluster: &MockCluster, config: ConnectionConfig) -> CommandExecutor {
        let provider = StaticConfigProvider::new().with("env", config);
        CommandExecutor::with_connector(
            Arc::new(provider),
            Arc::new(cluster.clone()),
            ExecutorConfig::default(),
        )
    }

    fn standalone() -> (MockCluster, CommandExecutor) {
        let node = MockNode::new("127.0.0.1", 6379)
            .with_value("greeting", MockValue::string("hello"))
            .with_value(
                "user:1",
                MockValue::Hash(vec![
                    ("name".into(), "ada".into()),
                    ("lang".into(), "en".into()),
                ]),
            );
        let cluster = MockCluster::new(vec![node], None);
        let exec = executor(&cluster, ConnectionConfig::new("127.0.0.1", 6379));
        (cluster, exec)
    }

    #[test]
    fn test_execute_get() {
        let (_, exec) = standalone();
        let result = exec.execute("GET greeting", "env", None).unwrap();
        assert_eq!(result, CommandResult::Text("hello".into()));
    }

    #[test]
    fn test_execute_hgetall_raw() {
        let (cluster, exec) = standalone();
        let result = exec.execute("--raw HGETALL user:1", "env", None).unwrap();
        assert_eq!(
            result,
            CommandResult::Lines(vec!["name: ada".into(), "lang: en".into()])
        );
        // The output flag never reaches the server
        assert_eq!(cluster.commands(), vec!["127.0.0.1:6379 HGETALL user:1"]);
    }

    #[test]
    fn test_unknown_environment_is_fatal() {
        let (cluster, exec) = standalone();
        let err = exec.execute("PING", "nope", None).unwrap_err();
        assert!(matches!(err, ConsoleError::ConfigNotFound(_)));
        assert_eq!(cluster.connections(), 0);
    }

    #[test]
    fn test_protocol_error_keeps_command() {
        let (_, exec) = standalone();
        match exec.execute("GET user:1", "env", None).unwrap_err() {
            ConsoleError::Protocol { message, command } => {
                assert!(message.starts_with("WRONGTYPE"));
                assert_eq!(command, "GET user:1");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(matches!(
            exec.execute("NOSUCHCMD", "env", None),
            Err(ConsoleError::Protocol { .. })
        ));
    }

    #[test]
    fn test_refused_connection_is_transport_error() {
        let (_, exec) = standalone();
        let elsewhere = ServerAddress::new("127.0.0.1", 6390);
        match exec.execute("PING", "env", Some(&elsewhere)).unwrap_err() {
            ConsoleError::Transport { code, .. } => {
                assert_eq!(code, TransportCode::ConnectionRefused)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_redirect_is_reported_not_followed() {
        let a = MockNode::new("10.0.0.1", 7000).redirecting();
        let b = MockNode::new("10.0.0.2", 7001).with_value("k", MockValue::string("v"));
        let cluster = MockCluster::new(vec![a, b], None);
        let exec = executor(&cluster, ConnectionConfig::new("10.0.0.1", 7000).cluster(true));

        let outcome = exec.dispatch(&Command::new("GET").arg("k"), "env", None).unwrap();
        let target = match outcome {
            CommandOutcome::Redirect(target) => target,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(target.address(), ServerAddress::new("10.0.0.2", 7001));
        assert_eq!(cluster.commands().len(), 1);

        // The caller retries once against the target
        let result = exec.execute("GET k", "env", Some(&target.address())).unwrap();
        assert_eq!(result.as_text(), Some("v"));
    }

    #[test]
    fn test_pipeline_keeps_order_and_errors() {
        let (cluster, exec) = standalone();
        let config = exec.connection_config("env").unwrap();
        let commands = vec![
            Command::new("TYPE").arg("greeting"),
            Command::new("BOGUS"),
            Command::new("TYPE").arg("user:1"),
        ];
        let replies = exec.pipeline_to(&commands, &config, &config.address()).unwrap();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0], RespValue::SimpleString("string".into()));
        assert!(replies[1].is_error());
        assert_eq!(replies[2], RespValue::SimpleString("hash".into()));
        assert_eq!(cluster.connections(), 1);
    }

    #[test]
    fn test_single_commands_and_pipelines_use_their_own_timeouts() {
        let (cluster, exec) = standalone();
        let config = exec.connection_config("env").unwrap();
        exec.execute("GET greeting", "env", None).unwrap();
        exec.pipeline_to(&[Command::new("PING")], &config, &config.address())
            .unwrap();
        exec.ping("env", None).unwrap();
        assert_eq!(
            cluster.timeouts(),
            vec![
                Duration::from_secs(10),
                Duration::from_secs(120),
                Duration::from_secs(10),
            ]
        );
    }

    #[test]
    fn test_slow_node_is_cut_off_at_command_timeout() {
        use std::io::{Read, Write};
        use std::net::TcpListener;
        use std::thread;
        use std::time::Instant;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut request = [0u8; 64];
            let _ = socket.read(&mut request);
            for byte in b"+PONG\r\n" {
                thread::sleep(Duration::from_millis(400));
                if socket.write_all(&[*byte]).is_err() {
                    break;
                }
            }
        });

        let provider =
            StaticConfigProvider::new().with("env", ConnectionConfig::new("127.0.0.1", port));
        let settings = ExecutorConfig {
            command_timeout: Duration::from_secs(1),
            ..ExecutorConfig::default()
        };
        let exec = CommandExecutor::new(Arc::new(provider), settings);

        let started = Instant::now();
        match exec.execute("PING", "env", None).unwrap_err() {
            ConsoleError::Transport { code, .. } => assert_eq!(code, TransportCode::TimedOut),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_millis(1800));
    }

    #[test]
    fn test_ping() {
        let (_, exec) = standalone();
        assert!(exec.ping("env", None).unwrap());
    }

    #[test]
    fn test_auth_failure() {
        let node = MockNode::new("127.0.0.1", 6379).with_password("s3cret");
        let cluster = MockCluster::new(vec![node], None);
        let mut config = ConnectionConfig::new("127.0.0.1", 6379);
        config.password = Some("wrong".into());
        let exec = executor(&cluster, config);

        match exec.execute("PING", "env", None).unwrap_err() {
            ConsoleError::Transport { code, .. } => assert_eq!(code, TransportCode::AuthFailed),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
