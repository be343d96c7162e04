//! Reply decoding
//!
//! A few verbs have a documented output shape that callers depend on:
//!
//! - `GET` yields the bare value, without surrounding quotes
//! - `HGETALL` yields `"field: value"` lines; an empty hash renders as usual
//! - `SCAN` yields the next cursor and the matched keys
//! - `DEL` answered with `OK` (seen behind some proxies) yields `1`
//!
//! Everything else is rendered like valkey-cli would print it.

use std::fmt;

use serde::Serialize;

use super::parse::{Command, OutputMode};
use crate::utils::RespValue;

/// Normalized result of one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CommandResult {
    Text(String),
    Lines(Vec<String>),
    Scan { cursor: String, keys: Vec<String> },
}

impl CommandResult {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CommandResult::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Text(s) => f.write_str(s),
            CommandResult::Lines(lines) => f.write_str(&lines.join("\n")),
            CommandResult::Scan { cursor, keys } => {
                f.write_str(cursor)?;
                for key in keys {
                    write!(f, "\n{}", key)?;
                }
                Ok(())
            }
        }
    }
}

/// Apply the verb-specific output contract to a successful reply
pub fn normalize(command: &Command, reply: &RespValue) -> CommandResult {
    if command.is("GET") {
        if let RespValue::BulkString(_) | RespValue::SimpleString(_) = reply {
            if let Some(value) = reply.to_text() {
                return CommandResult::Text(value);
            }
        }
    } else if command.is("HGETALL") {
        if let Some(pairs) = decode_pairs(reply).filter(|pairs| !pairs.is_empty()) {
            return CommandResult::Lines(
                pairs
                    .into_iter()
                    .map(|(field, value)| format!("{}: {}", field, value))
                    .collect(),
            );
        }
    } else if command.is("SCAN") {
        if let Some((cursor, keys)) = decode_scan(reply) {
            return CommandResult::Scan { cursor, keys };
        }
    } else if command.is("DEL") {
        if matches!(reply, RespValue::SimpleString(s) if s == "OK") {
            return CommandResult::Text("1".to_string());
        }
    }

    CommandResult::Text(render_reply(reply, command.output_mode()))
}

/// Split a `[cursor, [key, ...]]` SCAN-family reply
pub fn decode_scan(reply: &RespValue) -> Option<(String, Vec<String>)> {
    match reply.as_array()? {
        [cursor, RespValue::Array(keys)] => {
            let cursor = cursor.to_text()?;
            let keys = keys.iter().map(|k| k.to_text()).collect::<Option<Vec<_>>>()?;
            Some((cursor, keys))
        }
        _ => None,
    }
}

/// Pair up a flat `[a, b, c, d]` reply into `[(a, b), (c, d)]`
///
/// Returns `None` for non-arrays and for arrays of odd length.
pub fn decode_pairs(reply: &RespValue) -> Option<Vec<(String, String)>> {
    let items = reply.as_array()?;
    if items.len() % 2 != 0 {
        return None;
    }
    items
        .chunks_exact(2)
        .map(|pair| Some((pair[0].to_text()?, pair[1].to_text()?)))
        .collect()
}

/// Flat array of scalars as strings
pub fn decode_strings(reply: &RespValue) -> Option<Vec<String>> {
    reply.as_array()?.iter().map(|v| v.to_text()).collect()
}

/// Render a reply as valkey-cli prints it
pub fn render_reply(reply: &RespValue, mode: OutputMode) -> String {
    let mut lines = Vec::new();
    match mode {
        OutputMode::Formatted => render_formatted(&mut lines, reply, ""),
        OutputMode::Raw => render_raw(&mut lines, reply),
    }
    lines.join("\n")
}

/// Raw rendering squeezed onto a single line
pub fn render_line(reply: &RespValue) -> String {
    let mut lines = Vec::new();
    render_raw(&mut lines, reply);
    lines.join(" ").replace(['\r', '\n'], " ")
}

fn render_raw(lines: &mut Vec<String>, reply: &RespValue) {
    match reply {
        RespValue::SimpleString(s) | RespValue::Error(s) => lines.push(s.clone()),
        RespValue::Integer(n) => lines.push(n.to_string()),
        RespValue::BulkString(data) => lines.push(String::from_utf8_lossy(data).into_owned()),
        RespValue::Null => lines.push(String::new()),
        RespValue::Array(items) => {
            for item in items {
                render_raw(lines, item);
            }
        }
    }
}

fn render_formatted(lines: &mut Vec<String>, reply: &RespValue, prefix: &str) {
    match reply {
        RespValue::Array(items) if !items.is_empty() => {
            let nested_prefix = format!("{}   ", prefix);
            for (i, item) in items.iter().enumerate() {
                match item {
                    RespValue::Array(inner) if !inner.is_empty() => {
                        lines.push(format!("{}{})", prefix, i + 1));
                        render_formatted(lines, item, &nested_prefix);
                    }
                    _ => lines.push(format!("{}{}) {}", prefix, i + 1, format_scalar(item))),
                }
            }
        }
        other => lines.push(format!("{}{}", prefix, format_scalar(other))),
    }
}

fn format_scalar(reply: &RespValue) -> String {
    match reply {
        RespValue::SimpleString(s) => s.clone(),
        RespValue::Error(e) => format!("(error) {}", e),
        RespValue::Integer(n) => format!("(integer) {}", n),
        RespValue::BulkString(data) => match std::str::from_utf8(data) {
            // Multi-line text (INFO, CLUSTER NODES) is printed as-is
            Ok(s) if s.contains('\n') => s.to_string(),
            Ok(s) => format!("\"{}\"", s),
            Err(_) => format!("(binary) {} bytes", data.len()),
        },
        RespValue::Null => "(nil)".to_string(),
        RespValue::Array(_) => "(empty array)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(line: &str) -> Command {
        Command::parse(line).unwrap()
    }

    #[test]
    fn test_get_unwraps_value() {
        let reply = RespValue::bulk("hello");
        assert_eq!(normalize(&cmd("GET k"), &reply), CommandResult::Text("hello".into()));
        assert_eq!(render_reply(&reply, OutputMode::Formatted), "\"hello\"");

        // Only one layer: quotes that are part of the value stay
        let quoted = RespValue::bulk("\"inner\"");
        assert_eq!(
            normalize(&cmd("get k"), &quoted),
            CommandResult::Text("\"inner\"".into())
        );
    }

    #[test]
    fn test_get_missing_key() {
        assert_eq!(
            normalize(&cmd("GET k"), &RespValue::Null),
            CommandResult::Text("(nil)".into())
        );
        assert_eq!(
            normalize(&cmd("--raw GET k"), &RespValue::Null),
            CommandResult::Text(String::new())
        );
    }

    #[test]
    fn test_hgetall_pairs_fields() {
        let reply = RespValue::Array(vec![
            RespValue::bulk("name"),
            RespValue::bulk("ada"),
            RespValue::bulk("lang"),
            RespValue::bulk("en"),
        ]);
        assert_eq!(
            normalize(&cmd("HGETALL user:1"), &reply),
            CommandResult::Lines(vec!["name: ada".into(), "lang: en".into()])
        );
    }

    #[test]
    fn test_hgetall_empty_renders_generically() {
        let reply = RespValue::Array(Vec::new());
        assert_eq!(
            normalize(&cmd("HGETALL missing"), &reply),
            CommandResult::Text("(empty array)".into())
        );
    }

    #[test]
    fn test_hgetall_odd_length_is_not_paired() {
        let reply = RespValue::Array(vec![
            RespValue::bulk("a"),
            RespValue::bulk("b"),
            RespValue::bulk("c"),
        ]);
        assert_eq!(
            normalize(&cmd("--raw HGETALL h"), &reply),
            CommandResult::Text("a\nb\nc".into())
        );
    }

    #[test]
    fn test_scan_splits_cursor_and_keys() {
        let reply = RespValue::Array(vec![
            RespValue::bulk("17"),
            RespValue::Array(vec![RespValue::bulk("a:1"), RespValue::bulk("a \"2\"")]),
        ]);
        assert_eq!(
            normalize(&cmd("SCAN 0 MATCH a:* COUNT 10"), &reply),
            CommandResult::Scan {
                cursor: "17".into(),
                keys: vec!["a:1".into(), "a \"2\"".into()],
            }
        );
    }

    #[test]
    fn test_del_ok_becomes_one() {
        let ok = RespValue::SimpleString("OK".into());
        assert_eq!(normalize(&cmd("DEL k"), &ok), CommandResult::Text("1".into()));
        assert_eq!(
            normalize(&cmd("DEL k"), &RespValue::Integer(1)),
            CommandResult::Text("(integer) 1".into())
        );
        assert_eq!(normalize(&cmd("SET k v"), &ok), CommandResult::Text("OK".into()));
    }

    #[test]
    fn test_formatted_nested_arrays() {
        let reply = RespValue::Array(vec![
            RespValue::bulk("0"),
            RespValue::Array(vec![RespValue::bulk("k1"), RespValue::Integer(2)]),
            RespValue::Array(vec![]),
            RespValue::Null,
        ]);
        assert_eq!(
            render_reply(&reply, OutputMode::Formatted),
            "1) \"0\"\n2)\n   1) \"k1\"\n   2) (integer) 2\n3) (empty array)\n4) (nil)"
        );
        assert_eq!(render_reply(&reply, OutputMode::Raw), "0\nk1\n2\n");
    }

    #[test]
    fn test_render_line_is_single_line() {
        let reply = RespValue::Array(vec![RespValue::bulk("a\nb"), RespValue::Integer(3)]);
        assert_eq!(render_line(&reply), "a b 3");
        assert_eq!(render_line(&RespValue::Error("ERR no".into())), "ERR no");
    }

    #[test]
    fn test_result_serializes_untagged() {
        let json = serde_json::to_value(CommandResult::Scan {
            cursor: "0".into(),
            keys: vec!["k".into()],
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"cursor": "0", "keys": ["k"]}));
        let json = serde_json::to_value(CommandResult::Text("v".into())).unwrap();
        assert_eq!(json, serde_json::json!("v"));
    }
}
