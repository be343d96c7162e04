//! In-memory nodes for exercising dispatch, topology and scan logic

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::connector::{BoxedConnection, NodeConnector};
use super::control_plane::ControlPlane;
use crate::config::{ConnectionConfig, ServerAddress};
use crate::utils::{ConnectionError, RespValue};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
pub(crate) enum MockValue {
    Str(String),
    Hash(Vec<(String, String)>),
    List(Vec<String>),
    Set(Vec<String>),
    ZSet(Vec<(String, String)>),
    Stream,
}

impl MockValue {
    pub fn string(value: &str) -> Self {
        MockValue::Str(value.to_string())
    }

    fn type_name(&self) -> &'static str {
        match self {
            MockValue::Str(_) => "string",
            MockValue::Hash(_) => "hash",
            MockValue::List(_) => "list",
            MockValue::Set(_) => "set",
            MockValue::ZSet(_) => "zset",
            MockValue::Stream => "stream",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockNode {
    pub address: ServerAddress,
    keys: BTreeMap<String, MockValue>,
    ttl: HashMap<String, RespValue>,
    password: Option<String>,
    refuse: bool,
    broken: bool,
    redirect_foreign: bool,
}

impl MockNode {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            address: ServerAddress::new(host, port),
            keys: BTreeMap::new(),
            ttl: HashMap::new(),
            password: None,
            refuse: false,
            broken: false,
            redirect_foreign: false,
        }
    }

    pub fn with_value(mut self, key: &str, value: MockValue) -> Self {
        self.keys.insert(key.to_string(), value);
        self
    }

    /// Plain string keys, one per name
    pub fn with_keys(mut self, keys: &[&str]) -> Self {
        for key in keys {
            self.keys.insert(key.to_string(), MockValue::string("v"));
        }
        self
    }

    pub fn with_ttl(mut self, key: &str, seconds: i64) -> Self {
        self.ttl.insert(key.to_string(), RespValue::Integer(seconds));
        self
    }

    /// Answer `TTL key` with an arbitrary reply
    pub fn with_ttl_reply(mut self, key: &str, reply: RespValue) -> Self {
        self.ttl.insert(key.to_string(), reply);
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Refuse every connection attempt
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }

    /// Accept connections but reset on the first command
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Answer key commands for keys held elsewhere with `MOVED`
    pub fn redirecting(mut self) -> Self {
        self.redirect_foreign = true;
        self
    }
}

struct Inner {
    nodes: Vec<MockNode>,
    cluster_nodes: Option<String>,
    log: Mutex<Vec<String>>,
    timeouts: Mutex<Vec<Duration>>,
    connections: AtomicUsize,
}

/// A set of in-memory nodes reachable through [`NodeConnector`]
#[derive(Clone)]
pub(crate) struct MockCluster {
    inner: Arc<Inner>,
}

impl MockCluster {
    /// `cluster_nodes` is what every node answers to `CLUSTER NODES`;
    /// `None` makes them behave as standalone servers.
    pub fn new(nodes: Vec<MockNode>, cluster_nodes: Option<&str>) -> Self {
        Self {
            inner: Arc::new(Inner {
                nodes,
                cluster_nodes: cluster_nodes.map(str::to_string),
                log: Mutex::new(Vec::new()),
                timeouts: Mutex::new(Vec::new()),
                connections: AtomicUsize::new(0),
            }),
        }
    }

    /// Every command received so far as `host:port VERB args...`
    pub fn commands(&self) -> Vec<String> {
        self.inner.log.lock().unwrap().clone()
    }

    /// Commands received by one node, without the address prefix
    pub fn commands_on(&self, address: &str) -> Vec<String> {
        let prefix = format!("{} ", address);
        self.commands()
            .into_iter()
            .filter_map(|line| line.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Call timeout handed to each connection attempt, in order
    pub fn timeouts(&self) -> Vec<Duration> {
        self.inner.timeouts.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    fn node(&self, index: usize) -> &MockNode {
        &self.inner.nodes[index]
    }

    fn handle(&self, index: usize, args: &[&str]) -> io::Result<RespValue> {
        let node = self.node(index);
        self.inner
            .log
            .lock()
            .unwrap()
            .push(format!("{} {}", node.address, args.join(" ")));

        if node.broken {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset));
        }
        let Some(verb) = args.first() else {
            return Ok(RespValue::Error("ERR empty command".into()));
        };
        let verb = verb.to_ascii_uppercase();

        let reply = match verb.as_str() {
            "PING" => RespValue::SimpleString("PONG".into()),
            "CLUSTER" => match &self.inner.cluster_nodes {
                Some(text) => RespValue::bulk(text.clone()),
                None => RespValue::Error(
                    "ERR This instance has cluster support disabled".into(),
                ),
            },
            "SCAN" => scan(node, &args[1..]),
            "EXISTS" | "TYPE" | "TTL" | "GET" | "HGETALL" | "LRANGE" | "SSCAN" | "ZRANGE"
            | "DEL" => match args.get(1) {
                Some(key) => self.key_command(node, &verb, key, &args[2..]),
                None => RespValue::Error(format!(
                    "ERR wrong number of arguments for '{}' command",
                    verb.to_lowercase()
                )),
            },
            _ => RespValue::Error(format!("ERR unknown command '{}'", args[0])),
        };
        Ok(reply)
    }

    fn key_command(&self, node: &MockNode, verb: &str, key: &str, rest: &[&str]) -> RespValue {
        if node.redirect_foreign && !node.keys.contains_key(key) {
            if let Some(owner) = self.inner.nodes.iter().find(|n| n.keys.contains_key(key)) {
                return RespValue::Error(format!("MOVED 500 {}", owner.address));
            }
        }
        let value = node.keys.get(key);

        match verb {
            "EXISTS" => RespValue::Integer(value.is_some() as i64),
            "TYPE" => RespValue::SimpleString(value.map_or("none", MockValue::type_name).into()),
            "TTL" => match value {
                Some(_) => node.ttl.get(key).cloned().unwrap_or(RespValue::Integer(-1)),
                None => RespValue::Integer(-2),
            },
            // Answered the way some proxies do
            "DEL" => RespValue::SimpleString("OK".into()),
            "GET" => match value {
                None => RespValue::Null,
                Some(MockValue::Str(s)) => RespValue::bulk(s.clone()),
                Some(_) => RespValue::Error(WRONGTYPE.into()),
            },
            "HGETALL" => match value {
                None => RespValue::Array(Vec::new()),
                Some(MockValue::Hash(pairs)) => flatten(pairs),
                Some(_) => RespValue::Error(WRONGTYPE.into()),
            },
            "LRANGE" => match value {
                None => RespValue::Array(Vec::new()),
                Some(MockValue::List(items)) => lrange(items, rest),
                Some(_) => RespValue::Error(WRONGTYPE.into()),
            },
            "SSCAN" => match value {
                None => scan_reply(0, Vec::new()),
                Some(MockValue::Set(members)) => scan_reply(0, members.clone()),
                Some(_) => RespValue::Error(WRONGTYPE.into()),
            },
            "ZRANGE" => match value {
                None => RespValue::Array(Vec::new()),
                Some(MockValue::ZSet(pairs)) => flatten(pairs),
                Some(_) => RespValue::Error(WRONGTYPE.into()),
            },
            _ => RespValue::Error(format!("ERR unknown command '{}'", verb)),
        }
    }
}

impl NodeConnector for MockCluster {
    fn connect(
        &self,
        address: &ServerAddress,
        config: &ConnectionConfig,
        io_timeout: Duration,
    ) -> Result<BoxedConnection, ConnectionError> {
        self.inner.timeouts.lock().unwrap().push(io_timeout);
        let index = self
            .inner
            .nodes
            .iter()
            .position(|n| &n.address == address && !n.refuse)
            .ok_or_else(|| ConnectionError::ConnectFailed {
                host: address.host.clone(),
                port: address.port,
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            })?;
        self.inner.connections.fetch_add(1, Ordering::SeqCst);

        if let Some(expected) = &self.node(index).password {
            if config.password.as_ref() != Some(expected) {
                return Err(ConnectionError::AuthFailed(
                    "WRONGPASS invalid username-password pair".into(),
                ));
            }
        }
        Ok(Box::new(MockConnection {
            cluster: self.clone(),
            index,
        }))
    }
}

struct MockConnection {
    cluster: MockCluster,
    index: usize,
}

impl ControlPlane for MockConnection {
    fn execute(&mut self, args: &[&str]) -> io::Result<RespValue> {
        self.cluster.handle(self.index, args)
    }

    fn execute_pipeline(&mut self, commands: &[Vec<&str>]) -> io::Result<Vec<RespValue>> {
        commands.iter().map(|args| self.execute(args)).collect()
    }
}

/// `SCAN cursor [MATCH pattern] [COUNT n]`; the cursor indexes the sorted keyspace
fn scan(node: &MockNode, args: &[&str]) -> RespValue {
    let Some(cursor) = args.first().and_then(|c| c.parse::<usize>().ok()) else {
        return RespValue::Error("ERR invalid cursor".into());
    };
    let mut pattern = "*";
    let mut count = 10usize;
    for pair in args[1..].chunks(2) {
        match (pair[0].to_ascii_uppercase().as_str(), pair.get(1)) {
            ("MATCH", Some(p)) => pattern = *p,
            ("COUNT", Some(n)) => count = n.parse().unwrap_or(10).max(1),
            _ => return RespValue::Error("ERR syntax error".into()),
        }
    }

    let keys: Vec<&String> = node.keys.keys().collect();
    let end = cursor.saturating_add(count).min(keys.len());
    let matched = keys
        .get(cursor..end)
        .unwrap_or_default()
        .iter()
        .filter(|k| glob_match(pattern, k))
        .map(|k| k.to_string())
        .collect();
    let next = if end >= keys.len() { 0 } else { end };
    scan_reply(next, matched)
}

fn scan_reply(cursor: usize, items: Vec<String>) -> RespValue {
    RespValue::Array(vec![
        RespValue::bulk(cursor.to_string()),
        RespValue::Array(items.into_iter().map(RespValue::bulk).collect()),
    ])
}

fn flatten(pairs: &[(String, String)]) -> RespValue {
    RespValue::Array(
        pairs
            .iter()
            .flat_map(|(a, b)| [RespValue::bulk(a.clone()), RespValue::bulk(b.clone())])
            .collect(),
    )
}

fn lrange(items: &[String], args: &[&str]) -> RespValue {
    let bound = |i: Option<&&str>| i.and_then(|s| s.parse::<i64>().ok());
    let (Some(start), Some(stop)) = (bound(args.first()), bound(args.get(1))) else {
        return RespValue::Error("ERR value is not an integer or out of range".into());
    };
    let len = items.len() as i64;
    let resolve = |i: i64| if i < 0 { (len + i).max(0) } else { i };
    let (start, stop) = (resolve(start), resolve(stop).min(len - 1));
    if start > stop || len == 0 {
        return RespValue::Array(Vec::new());
    }
    RespValue::Array(
        items[start as usize..=stop as usize]
            .iter()
            .map(|s| RespValue::bulk(s.clone()))
            .collect(),
    )
}

/// Glob matching with `*` and `?`
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    fn go(p: &[char], t: &[char]) -> bool {
        match p.split_first() {
            None => t.is_empty(),
            Some(('*', rest)) => (0..=t.len()).any(|i| go(rest, &t[i..])),
            Some(('?', rest)) => !t.is_empty() && go(rest, &t[1..]),
            Some((c, rest)) => t.first() == Some(c) && go(rest, &t[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    go(&p, &t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ControlPlaneExt;

    fn connect(cluster: &MockCluster, port: u16) -> BoxedConnection {
        cluster
            .connect(
                &ServerAddress::new("n", port),
                &ConnectionConfig::new("n", port),
                Duration::from_secs(1),
            )
            .map_err(|e| e.to_string())
            .unwrap()
    }

    #[test]
    fn test_glob() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("user:*", "user:1"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(!glob_match("user:*", "session:1"));
    }

    #[test]
    fn test_scan_walks_keyspace() {
        let node = MockNode::new("n", 1).with_keys(&["a", "b", "c", "x"]);
        let cluster = MockCluster::new(vec![node], None);
        let mut conn = connect(&cluster, 1);

        let first = conn.execute(&["SCAN", "0", "MATCH", "*", "COUNT", "3"]).unwrap();
        assert_eq!(first, scan_reply(3, vec!["a".into(), "b".into(), "c".into()]));
        let second = conn.execute(&["SCAN", "3", "MATCH", "?", "COUNT", "3"]).unwrap();
        assert_eq!(second, scan_reply(0, vec!["x".into()]));
        assert!(conn.ping().unwrap());
    }

    #[test]
    fn test_lrange_bounds() {
        let items: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(lrange(&items, &["0", "-1"]).as_array().unwrap().len(), 3);
        assert_eq!(lrange(&items, &["1", "999"]).as_array().unwrap().len(), 2);
        assert_eq!(lrange(&[], &["0", "999"]), RespValue::Array(Vec::new()));
    }
}
