use anyhow::Context;
use clap::{value_parser, Arg, ArgMatches, Command};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use replistore::{Config, Node, PeerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "replistore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let matches = Command::new("replistore")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Distributed replicated object store node")
        .arg(
            Arg::new("ip")
                .long("ip")
                .help("IP address to bind the HTTP API to")
                .value_parser(value_parser!(IpAddr))
                .default_value("0.0.0.0")
        )
        .arg(
            Arg::new("port")
                .long("port")
                .help("Port to listen on")
                .value_parser(value_parser!(u16))
                .default_value("8080")
        )
        .arg(
            Arg::new("peers")
                .long("peers")
                .help("Comma-separated list of peers as id=url")
                .required(false)
        )
        .arg(
            Arg::new("storage-path")
                .long("storage-path")
                .help("Directory holding objects and the catalog")
                .value_parser(value_parser!(PathBuf))
        )
        .arg(
            Arg::new("replication-factor")
                .long("replication-factor")
                .help("Target number of copies per object, including the local one")
                .value_parser(value_parser!(usize))
        )
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .env("STORAGE_NODE_ENDPOINT")
                .help("Base URL peers use to reach this node")
        )
        .arg(
            Arg::new("heartbeat-ms")
                .long("heartbeat-ms")
                .help("Health probe interval in milliseconds")
                .value_parser(value_parser!(u64))
        )
        .arg(
            Arg::new("replication-ms")
                .long("replication-ms")
                .help("Replication drain interval in milliseconds")
                .value_parser(value_parser!(u64))
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .help("Timeout for every node-to-node request in milliseconds")
                .value_parser(value_parser!(u64))
        )
        .get_matches();

    let config = build_config(&matches)?;
    config.validate().context("invalid configuration")?;

    info!("Node configuration: {:?}", config);

    let node = Node::new(config).await.context("failed to initialize node")?;
    Arc::new(node).serve().await?;

    Ok(())
}

fn build_config(matches: &ArgMatches) -> anyhow::Result<Config> {
    let ip = *matches.get_one::<IpAddr>("ip").context("missing --ip")?;
    let port = *matches.get_one::<u16>("port").context("missing --port")?;
    let mut config = Config::new(ip, port);

    if let Some(peers) = matches.get_one::<String>("peers") {
        config.peers = peers
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<PeerConfig>())
            .collect::<Result<Vec<_>, _>>()?;
    }

    if let Some(path) = matches.get_one::<PathBuf>("storage-path") {
        config.storage_path = path.clone();
    }
    if let Some(factor) = matches.get_one::<usize>("replication-factor") {
        config.replication_factor = *factor;
    }
    if let Some(endpoint) = matches.get_one::<String>("endpoint") {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(ms) = matches.get_one::<u64>("heartbeat-ms") {
        config.heartbeat_interval_ms = *ms;
    }
    if let Some(ms) = matches.get_one::<u64>("replication-ms") {
        config.replication_interval_ms = *ms;
    }
    if let Some(ms) = matches.get_one::<u64>("timeout-ms") {
        config.request_timeout_ms = *ms;
    }

    Ok(config)
}
