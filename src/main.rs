// src/main.rs

//! A small command runner for the client facade.
//!
//! Commands run against an in-process store, one quoted argument per
//! command, and every reply is printed as a JSON line:
//!
//! ```text
//! spineldb-client [--config client.toml] [--batch ops.json] "set age 23" "incr age" "get age"
//! ```

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Value, json};
use spineldb_client::config::ClientConfig;
use spineldb_client::core::batch::BatchDescriptor;
use spineldb_client::core::storage::MemoryBackend;
use spineldb_client::core::{ConnectionState, KvClient};
use spineldb_client::supervisor::ReconnectSupervisor;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|arg| arg == "--version") {
        println!("spineldb-client version {VERSION}");
        return Ok(());
    }

    let mut config_path = None;
    let mut batch_path = None;
    let mut commands = Vec::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                config_path = Some(iter.next().ok_or_else(|| anyhow!("--config flag requires a value"))?)
            }
            "--batch" => {
                batch_path = Some(iter.next().ok_or_else(|| anyhow!("--batch flag requires a value"))?)
            }
            _ => commands.push(arg),
        }
    }

    let config = match &config_path {
        Some(path) => match ClientConfig::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{path}\": {e:#}");
                std::process::exit(1);
            }
        },
        None => ClientConfig::default(),
    };

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .compact()
        .with_ansi(true)
        .init();

    if let Err(e) = run(config, batch_path, commands).await {
        error!("Client runtime error: {e:#}");
        return Err(e);
    }
    Ok(())
}

async fn run(config: ClientConfig, batch_path: Option<String>, commands: Vec<String>) -> Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let client = config.builder().build(backend);

    let (shutdown_tx, _) = broadcast::channel(1);
    let supervisor = config.reconnect.enabled.then(|| {
        ReconnectSupervisor::new(client.connection().clone())
            .with_jitter(config.reconnect.jitter)
            .spawn(shutdown_tx.subscribe())
    });

    client.connect().await?;
    if !client
        .wait_for_state(ConnectionState::Ready, Duration::from_secs(5))
        .await
    {
        bail!("store did not become ready (state: {})", client.state());
    }
    info!("Connected to {}:{}", config.host, config.port);

    if let Some(path) = batch_path {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read batch file at '{path}'"))?;
        let descriptors: Vec<BatchDescriptor> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse batch descriptors from '{path}'"))?;
        let replies = client.batch(&descriptors).await?;
        println!("{}", serde_json::to_string(&replies)?);
    }

    for line in &commands {
        match run_command(&client, line).await {
            Ok(output) => println!("{output}"),
            Err(e) => println!("{}", json!({ "command": line, "error": format!("{e:#}") })),
        }
    }

    println!("{}", serde_json::to_string(&client.metrics())?);

    let _ = client.disconnect().await;
    let _ = shutdown_tx.send(());
    if let Some(handle) = supervisor {
        let _ = handle.await;
    }
    Ok(())
}

async fn run_command(client: &KvClient, line: &str) -> Result<Value> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((name, args)) = parts.split_first() else {
        bail!("empty command");
    };
    let arg = |i: usize| {
        args.get(i)
            .copied()
            .ok_or_else(|| anyhow!("'{name}' expects at least {} argument(s)", i + 1))
    };
    let text = |b: Option<bytes::Bytes>| b.map(|b| String::from_utf8_lossy(&b).into_owned());
    let texts = |v: Vec<bytes::Bytes>| {
        v.iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect::<Vec<_>>()
    };

    let value = match name.to_ascii_lowercase().as_str() {
        "get" => json!(text(client.get(arg(0)?).await?)),
        "set" => {
            let expiry = args.get(2).map(|s| s.parse::<u64>()).transpose()?;
            json!(client.set(arg(0)?, arg(1)?, expiry).await?)
        }
        "del" => json!(client.delete(arg(0)?).await?),
        "incr" => json!(client.increment(arg(0)?).await?),
        "decr" => json!(client.decrement(arg(0)?).await?),
        "ttl" => json!(client.get_ttl(arg(0)?).await?),
        "expire" => json!(client.expire(arg(0)?, arg(1)?.parse()?).await?),
        "rpush" => {
            let max_len = args.get(2).map(|s| s.parse::<usize>()).transpose()?;
            json!(client.set_list(arg(0)?, arg(1)?.to_string(), max_len).await?)
        }
        "lrange" => json!(texts(client.get_list(arg(0)?).await?)),
        "lpop" => json!(text(client.pop_list(arg(0)?).await?)),
        "zadd" => json!(
            client
                .add_sorted_set(arg(0)?, arg(2)?.to_string(), arg(1)?.parse()?)
                .await?
        ),
        "zrange" => json!(texts(client.get_sorted_set(arg(0)?).await?)),
        "sadd" => json!(client.add_set(arg(0)?, arg(1)?.to_string()).await?),
        "smembers" => json!(texts(client.get_set(arg(0)?).await?)),
        "flushdb" => {
            client.delete_all().await?;
            json!("OK")
        }
        "mget" => json!(client.mget(args).await?),
        "mdel" => json!(client.mdel(args).await?),
        "metrics" => serde_json::to_value(client.metrics())?,
        other => bail!("unknown command '{other}'"),
    };
    Ok(json!({ "command": line, "result": value }))
}
