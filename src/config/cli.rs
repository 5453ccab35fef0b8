use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use uuid::Uuid;

use crate::domain::ContentId;

/// Command-line arguments for the cachewire binary.
#[derive(Debug, Parser)]
#[command(name = "cachewire", version, about = "Cluster cache refresher node")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CACHEWIRE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a cluster node.
    Serve(Box<ServeArgs>),
    /// Ask a running node to broadcast a cache notification.
    Publish(PublishArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override this node's cluster name.
    #[arg(long = "cluster-node-id", value_name = "NAME")]
    pub cluster_node_id: Option<String>,

    /// Replace the peer list; repeat for several peers.
    #[arg(long = "cluster-peer", value_name = "URL")]
    pub cluster_peers: Vec<String>,

    /// Override delivery attempts per peer.
    #[arg(long = "cluster-delivery-attempts", value_name = "COUNT")]
    pub cluster_delivery_attempts: Option<u32>,

    /// Override the TOML file the in-memory content store is seeded from.
    #[arg(long = "content-seed-file", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub content_seed_file: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct PublishArgs {
    /// Base URL of the node that originates the broadcast.
    #[arg(long = "node", env = "CACHEWIRE_NODE", value_name = "URL")]
    pub node: String,

    /// Refresher that should handle the notification; defaults to the content refresher.
    #[arg(long = "refresher-id", value_name = "UUID")]
    pub refresher_id: Option<Uuid>,

    #[command(subcommand)]
    pub action: PublishAction,
}

#[derive(Debug, Subcommand, Clone)]
pub enum PublishAction {
    /// Flush every cache layer on every node.
    #[command(name = "refresh-all")]
    RefreshAll,
    /// Refresh content items by id.
    Refresh {
        #[arg(value_name = "ID", required = true, num_args = 1..)]
        ids: Vec<ContentId>,
    },
    /// Remove content items by id.
    Remove {
        #[arg(value_name = "ID", required = true, num_args = 1..)]
        ids: Vec<ContentId>,
    },
    /// Broadcast a change payload read from a JSON file.
    Payload {
        #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
}
