//! keyscope - cluster-aware Redis/Valkey console
//!
//! Every subcommand prints one JSON document on stdout; logs go to stderr.

use std::fs;
use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use keyscope::cluster::PageLimits;
use keyscope::command::{Command, OutputMode};
use keyscope::config::{
    CliArgs, ConsoleCommand, ExecutorConfig, ServerAddress, StaticConfigProvider, CLI_ENVIRONMENT,
};
use keyscope::{Console, ConsoleError};

fn setup_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn parse_node(node: Option<&str>) -> Result<Option<ServerAddress>> {
    node.map(|n| ServerAddress::parse(n).ok_or_else(|| anyhow!("Invalid node address: {}", n)))
        .transpose()
}

fn read_batch(file: &std::path::Path) -> Result<Vec<String>> {
    let text = if file.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?
    };

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(args: CliArgs) -> Result<()> {
    args.validate()
        .map_err(|e| anyhow!("Configuration error: {}", e))?;

    let provider = match &args.config {
        Some(path) => StaticConfigProvider::from_file(path)?,
        None => StaticConfigProvider::new().with(CLI_ENVIRONMENT, args.connection_config()),
    };
    let console = Console::new(Arc::new(provider), ExecutorConfig::from_cli(&args));
    let env = args.env.as_str();

    match &args.command {
        ConsoleCommand::Exec { node, raw, args } => {
            let mut command = Command::from_tokens(args.clone())?;
            if *raw {
                command = command.with_output_mode(OutputMode::Raw);
            }
            let node = parse_node(node.as_deref())?;
            let result = console.execute_command(&command, env, node.as_ref())?;
            print_json(&json!({ "command": command.to_string(), "result": result }))
        }
        ConsoleCommand::Scan {
            pattern,
            cursors,
            count,
            min_keys,
            max_iterations,
        } => {
            let count = *count as usize;
            let page = match min_keys {
                Some(min_keys) => console.scanner().scan_page(
                    pattern,
                    cursors,
                    count,
                    env,
                    PageLimits {
                        min_keys: *min_keys,
                        max_iterations: *max_iterations,
                    },
                )?,
                None => console.scanner().scan(pattern, cursors, count, env)?,
            };
            print_json(&page)
        }
        ConsoleCommand::Get { key } => print_json(&console.locator().locate(key, env)?),
        ConsoleCommand::Batch { file } => {
            let lines = read_batch(file)?;
            let outputs = console.batch().execute_batch(&lines, env)?;
            let results: Vec<_> = lines
                .iter()
                .zip(outputs)
                .map(|(command, output)| json!({ "command": command, "output": output }))
                .collect();
            print_json(&results)
        }
        ConsoleCommand::Types { keys } => {
            let types: Vec<_> = console
                .batch()
                .sample_types(keys, env)?
                .into_iter()
                .map(|(key, key_type)| json!({ "key": key, "type": key_type }))
                .collect();
            print_json(&types)
        }
        ConsoleCommand::Nodes => print_json(&console.topology().resolve_nodes(env)?),
        ConsoleCommand::Ping { node } => {
            let node = parse_node(node.as_deref())?;
            let pong = console.executor().ping(env, node.as_ref())?;
            print_json(&json!({ "pong": pong }))
        }
    }
}

fn main() {
    let args = CliArgs::parse_args();
    setup_logging(args.verbose, args.quiet);

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        let report = match e.downcast_ref::<ConsoleError>() {
            Some(err) => json!({
                "error": err.to_string(),
                "kind": format!("{:?}", err.kind()),
                "status": err.http_status(),
            }),
            None => json!({ "error": format!("{:#}", e) }),
        };
        println!("{}", report);
        std::process::exit(1);
    }
}
