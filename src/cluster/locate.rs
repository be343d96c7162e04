//! Finding the node that owns a key and reading it in full

use std::sync::Arc;
use std::thread;

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use super::node::ClusterNode;
use super::topology::ClusterTopologyResolver;
use crate::command::decode::{decode_pairs, decode_scan, decode_strings};
use crate::command::{Command, CommandOutcome, RedirectTarget};
use crate::config::{ConnectionConfig, ServerAddress};
use crate::dispatch::CommandExecutor;
use crate::utils::{ConsoleError, RespValue, Result};

/// Upper bound on list elements read for one record
pub const LIST_READ_LIMIT: usize = 1000;
/// Upper bound on set members read for one record
pub const SET_READ_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyType {
    String,
    Hash,
    List,
    Set,
    Zset,
    Other(String),
}

impl KeyType {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "string" => KeyType::String,
            "hash" => KeyType::Hash,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            "zset" => KeyType::Zset,
            other => KeyType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            KeyType::String => "string",
            KeyType::Hash => "hash",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::Zset => "zset",
            KeyType::Other(name) => name,
        }
    }
}

impl Serialize for KeyType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Value of a key, shaped by its type
///
/// Lists and sets may be truncated to [`LIST_READ_LIMIT`] / [`SET_READ_LIMIT`].
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    String(String),
    /// Field/value pairs in server order
    Hash(Vec<(String, String)>),
    List(Vec<String>),
    Set(Vec<String>),
    /// Members with their scores, lowest score first
    Zset(Vec<(String, f64)>),
    /// Description of a value of a type that is not read
    Placeholder(String),
}

impl Serialize for KeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            KeyValue::String(s) | KeyValue::Placeholder(s) => serializer.serialize_str(s),
            KeyValue::Hash(pairs) => {
                let mut map = serializer.serialize_map(Some(pairs.len()))?;
                for (field, value) in pairs {
                    map.serialize_entry(field, value)?;
                }
                map.end()
            }
            KeyValue::List(items) | KeyValue::Set(items) => serializer.collect_seq(items),
            KeyValue::Zset(members) => serializer.collect_seq(members.iter().map(
                |(member, score)| ScoredMember { member, score: *score },
            )),
        }
    }
}

struct ScoredMember<'a> {
    member: &'a str,
    score: f64,
}

impl Serialize for ScoredMember<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ScoredMember", 2)?;
        s.serialize_field("member", self.member)?;
        s.serialize_field("score", &self.score)?;
        s.end()
    }
}

/// A key with its type, value and TTL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyRecord {
    pub key: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub value: KeyValue,
    /// Seconds to live: `-1` without expiry, `-2` when the key is gone
    #[serde(rename = "ttl")]
    pub ttl_seconds: i64,
    /// Node the record was read from (cluster mode only)
    #[serde(rename = "nodeId", skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

/// Where an `EXISTS` probe found the key
enum Probe {
    Here,
    Moved(RedirectTarget),
    Absent,
}

pub struct KeyLocator {
    executor: Arc<CommandExecutor>,
    topology: ClusterTopologyResolver,
}

impl KeyLocator {
    pub fn new(executor: Arc<CommandExecutor>) -> Self {
        let topology = ClusterTopologyResolver::new(executor.clone());
        Self { executor, topology }
    }

    /// Find `key` and read its full record
    ///
    /// In cluster mode every master is probed concurrently. Probes are then
    /// considered in node order; a `MOVED` answer is followed by one direct
    /// probe of the target, and a record found that way is tagged with the
    /// target's `host:port`. Probe failures count as "not on this node".
    pub fn locate(&self, key: &str, connection_id: &str) -> Result<KeyRecord> {
        let config = self.executor.connection_config(connection_id)?;

        if !config.cluster_enabled {
            let address = config.address();
            return match self.probe(&config, &address, key)? {
                Probe::Here => self.fetch_record(&config, &address, key),
                _ => Err(ConsoleError::KeyNotFound(key.to_string())),
            };
        }

        let nodes = self.topology.nodes_for(&config);
        let probes = self.probe_all(&config, &nodes, key);

        for (node, probe) in nodes.iter().zip(probes) {
            let found = match probe {
                Probe::Here => self
                    .fetch_record(&config, &node.address(), key)
                    .map(|record| tag(record, node.id.clone())),
                Probe::Moved(target) => match self.probe(&config, &target.address(), key) {
                    Ok(Probe::Here) => self
                        .fetch_record(&config, &target.address(), key)
                        .map(|record| tag(record, target.node_id())),
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("{}", e.on_node(target.node_id()));
                        continue;
                    }
                },
                Probe::Absent => continue,
            };

            match found {
                // Removed between probe and read
                Err(ConsoleError::KeyNotFound(_)) => continue,
                other => return other,
            }
        }

        Err(ConsoleError::KeyNotFound(key.to_string()))
    }

    fn probe_all(&self, config: &ConnectionConfig, nodes: &[ClusterNode], key: &str) -> Vec<Probe> {
        thread::scope(|s| {
            let handles: Vec<_> = nodes
                .iter()
                .map(|node| {
                    s.spawn(move || {
                        self.probe(config, &node.address(), key).unwrap_or_else(|e| {
                            warn!("{}", e.on_node(node.id.clone()));
                            Probe::Absent
                        })
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(Probe::Absent))
                .collect()
        })
    }

    fn probe(&self, config: &ConnectionConfig, address: &ServerAddress, key: &str) -> Result<Probe> {
        let command = Command::new("EXISTS").arg(key);
        match self.executor.dispatch_to(&command, config, address) {
            CommandOutcome::Redirect(target) => {
                debug!("EXISTS {} on {} redirected: {}", key, address, target);
                Ok(Probe::Moved(target))
            }
            outcome => {
                let reply = outcome.into_reply()?;
                if reply.as_i64().unwrap_or(0) > 0 {
                    Ok(Probe::Here)
                } else {
                    Ok(Probe::Absent)
                }
            }
        }
    }

    /// Read type, TTL and value of a key known to live on `address`
    pub fn fetch_record(
        &self,
        config: &ConnectionConfig,
        address: &ServerAddress,
        key: &str,
    ) -> Result<KeyRecord> {
        let type_reply = self.query(config, address, Command::new("TYPE").arg(key))?;
        let type_name = type_reply.to_text().unwrap_or_default();
        if type_name == "none" {
            return Err(ConsoleError::KeyNotFound(key.to_string()));
        }
        let key_type = KeyType::from_type_name(&type_name);

        let ttl_command = Command::new("TTL").arg(key);
        let ttl_reply = self.query(config, address, ttl_command.clone())?;
        let ttl_seconds = ttl_reply.as_i64().ok_or_else(|| ConsoleError::Protocol {
            message: format!("Unexpected TTL reply: {:?}", ttl_reply),
            command: ttl_command.to_string(),
        })?;

        let value = self.fetch_value(config, address, key, &key_type)?;

        Ok(KeyRecord {
            key: key.to_string(),
            key_type,
            value,
            ttl_seconds,
            node_id: None,
        })
    }

    fn fetch_value(
        &self,
        config: &ConnectionConfig,
        address: &ServerAddress,
        key: &str,
        key_type: &KeyType,
    ) -> Result<KeyValue> {
        let command = match key_type {
            KeyType::String => Command::new("GET").arg(key),
            KeyType::Hash => Command::new("HGETALL").arg(key),
            KeyType::List => Command::new("LRANGE")
                .arg(key)
                .arg("0")
                .arg((LIST_READ_LIMIT - 1).to_string()),
            KeyType::Set => Command::new("SSCAN")
                .arg(key)
                .arg("0")
                .arg("COUNT")
                .arg(SET_READ_LIMIT.to_string()),
            KeyType::Zset => Command::new("ZRANGE")
                .arg(key)
                .arg("0")
                .arg("-1")
                .arg("WITHSCORES"),
            KeyType::Other(name) => {
                return Ok(KeyValue::Placeholder(format!(
                    "<{} value not displayed>",
                    name
                )))
            }
        };

        let reply = self.query(config, address, command.clone())?;
        let unexpected = || ConsoleError::Protocol {
            message: format!("Unexpected reply for {} key: {:?}", key_type.as_str(), reply),
            command: command.to_string(),
        };

        match key_type {
            KeyType::String => match &reply {
                RespValue::Null => Err(ConsoleError::KeyNotFound(key.to_string())),
                other => other.to_text().map(KeyValue::String).ok_or_else(unexpected),
            },
            KeyType::Hash => decode_pairs(&reply).map(KeyValue::Hash).ok_or_else(unexpected),
            KeyType::List => decode_strings(&reply).map(KeyValue::List).ok_or_else(unexpected),
            KeyType::Set => decode_scan(&reply)
                .map(|(_, mut members)| {
                    members.truncate(SET_READ_LIMIT);
                    KeyValue::Set(members)
                })
                .ok_or_else(unexpected),
            KeyType::Zset => decode_pairs(&reply)
                .and_then(|pairs| {
                    pairs
                        .into_iter()
                        .map(|(member, score)| Some((member, score.parse::<f64>().ok()?)))
                        .collect::<Option<Vec<_>>>()
                })
                .map(KeyValue::Zset)
                .ok_or_else(unexpected),
            KeyType::Other(_) => Err(unexpected()),
        }
    }

    fn query(
        &self,
        config: &ConnectionConfig,
        address: &ServerAddress,
        command: Command,
    ) -> Result<RespValue> {
        self.executor.query(&command, config, address)
    }
}

fn tag(mut record: KeyRecord, node_id: String) -> KeyRecord {
    record.node_id = Some(node_id);
    record
}
