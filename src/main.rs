use clap::Parser;
use tracing_subscriber::EnvFilter;

use raft_election::config::{BackoffConfig, ChaosConfig, NodeConfig, DEFAULT_BASE_PORT};
use raft_election::node::Node;
use raft_election::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "raft-election")]
#[command(version)]
#[command(about = "Raft leader election over gRPC")]
struct Args {
    /// Total number of nodes in the cluster
    #[arg(long, short = 'n', default_value = "3")]
    nodes: usize,

    /// This node's id, in 0..nodes
    #[arg(long, short = 'i')]
    id: u64,

    /// Host every node listens on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Node i listens on base_port + i
    #[arg(long, default_value_t = DEFAULT_BASE_PORT)]
    base_port: u16,

    /// Lower bound of the randomized election timeout
    #[arg(long, default_value = "150")]
    election_timeout_min_ms: u64,

    /// Upper bound of the randomized election timeout
    #[arg(long, default_value = "300")]
    election_timeout_max_ms: u64,

    /// Interval between leader heartbeats
    #[arg(long, default_value = "30")]
    heartbeat_interval_ms: u64,

    /// Deadline for a single peer RPC
    #[arg(long, default_value = "100")]
    rpc_timeout_ms: u64,

    /// Cap on the delay between peer connection attempts
    #[arg(long, default_value = "2000")]
    connect_backoff_max_ms: u64,

    /// Once elected, crash this node after the given delay
    #[arg(long)]
    chaos_kill_after_ms: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<NodeConfig, Box<dyn std::error::Error>> {
        let mut config = NodeConfig::for_cluster(self.id, self.nodes, &self.host, self.base_port)?
            .with_election_timeout(self.election_timeout_min_ms, self.election_timeout_max_ms);
        config.heartbeat_interval_ms = self.heartbeat_interval_ms;
        config.rpc_timeout_ms = self.rpc_timeout_ms;
        config.connect_backoff = BackoffConfig {
            max_ms: self.connect_backoff_max_ms,
            ..Default::default()
        };
        if let Some(kill_leader_after_ms) = self.chaos_kill_after_ms {
            config = config.with_chaos(ChaosConfig {
                kill_leader_after_ms,
            });
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.into_config()?;
    let shutdown = install_shutdown_handler()?;

    let node = Node::new(config, shutdown)?;
    node.run().await?;
    Ok(())
}
