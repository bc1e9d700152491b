//! Recognition Engine - CLI
//!
//! Inspect weighted trees and recognition across a peer network described in YAML.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recognition_engine::hierarchy::Hierarchy;
use recognition_engine::network::{NetworkSpec, PeerNetwork};
use recognition_engine::recognition::{ShareMap, SocialDistribution, TraversalConfig};
use recognition_engine::store::{MemoryStore, Store};
use recognition_engine::tree::{desire, fulfilled, WeightedTree};
use recognition_engine::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "recognition")]
#[command(about = "Contribution recognition across peer hierarchies")]
struct Cli {
    /// Path to the YAML config (defaults to ./recognition.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print weights, fulfillment and recognition of each hierarchy
    Inspect {
        /// Network description
        #[arg(short, long)]
        file: PathBuf,

        /// Only this peer
        #[arg(short, long)]
        peer: Option<String>,
    },

    /// Print a peer's mutual and social distributions
    Social {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        peer: String,

        /// Transitive hops (overrides traversal.max_depth)
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Run every peer as a live hierarchy over an in-memory store and print
    /// the distributions they converge to
    Live {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        peer: String,

        #[arg(short, long)]
        depth: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,recognition_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Inspect { file, peer } => run_inspect(&file, peer.as_deref()),
        Commands::Social { file, peer, depth } => {
            let traversal = traversal_config(&config, depth);
            run_social(&file, &peer, &traversal).await
        }
        Commands::Live { file, peer, depth } => run_live(&config, &file, &peer, depth).await,
    }
}

fn traversal_config(config: &Config, depth: Option<usize>) -> TraversalConfig {
    let mut traversal = config.traversal.clone();
    if let Some(depth) = depth {
        traversal.max_depth = depth;
    }
    traversal
}

fn load_network(file: &Path) -> Result<PeerNetwork> {
    let spec = NetworkSpec::from_file(file)?;
    PeerNetwork::from_spec(&spec).with_context(|| format!("building network from {}", file.display()))
}

fn run_inspect(file: &Path, only: Option<&str>) -> Result<()> {
    let network = load_network(file)?;
    let peers: Vec<String> = match only {
        Some(peer) => vec![peer.to_string()],
        None => network.peers().map(str::to_string).collect(),
    };

    for peer in peers {
        let tree = network
            .tree(&peer)
            .with_context(|| format!("unknown peer '{peer}'"))?;
        println!("== {} ({}) ==", tree.root().name, peer);
        println!(
            "{:<32} {:>8} {:>8} {:>9} {:>8}",
            "node", "weight", "share", "fulfilled", "desire"
        );
        print_node(tree, tree.root_id(), 0);
        println!();
        print_shares("recognition", &network.recognition_map(&peer));
        println!();
    }
    Ok(())
}

fn print_node(tree: &WeightedTree, id: &str, depth: usize) {
    let Some(node) = tree.get(id) else {
        return;
    };
    let mut label = format!("{}{}", "  ".repeat(depth), node.name);
    if !node.contributors.is_empty() {
        let contributors: Vec<&str> = node.contributors.iter().map(String::as_str).collect();
        label.push_str(&format!(" [{}]", contributors.join(", ")));
    }
    println!(
        "{:<32} {:>8.4} {:>8.4} {:>9.4} {:>8.4}",
        label,
        tree.weight(id),
        tree.share_of_parent(id),
        fulfilled(tree, id),
        desire(tree, id)
    );
    for child in &node.children {
        print_node(tree, child, depth + 1);
    }
}

fn print_shares(title: &str, shares: &ShareMap) {
    println!("{title}:");
    if shares.is_empty() {
        println!("  (none)");
    }
    let mut entries: Vec<_> = shares.iter().collect();
    entries.sort_by(|a, b| b.1.total_cmp(a.1));
    for (peer, share) in entries {
        println!("  {:<24} {:>8.4}", peer, share);
    }
}

fn print_social(social: &SocialDistribution) {
    print_shares("social distribution", &social.shares);
    for (peer, hops) in &social.hops {
        println!("  {peer} reached at hop {hops}");
    }
    if !social.unresolved.is_empty() {
        println!("  unresolved: {}", social.unresolved.join(", "));
    }
}

async fn run_social(file: &Path, peer: &str, traversal: &TraversalConfig) -> Result<()> {
    let network = load_network(file)?;
    if network.tree(peer).is_none() {
        anyhow::bail!("unknown peer '{peer}'");
    }

    print_shares("mutual distribution", &network.mutual_distribution(peer));
    println!();
    let social = network.social_distribution(peer, traversal).await;
    print_social(&social);
    Ok(())
}

async fn run_live(config: &Config, file: &Path, peer: &str, depth: Option<usize>) -> Result<()> {
    let network = load_network(file)?;
    let store = Arc::new(MemoryStore::new());
    let writes = network.persist(store.as_ref()).await?;
    tracing::info!(writes, "Network persisted to in-memory store");

    let mut hierarchies = Vec::new();
    for id in network.peers() {
        let shared: Arc<dyn Store> = store.clone();
        hierarchies.push(Hierarchy::load(id, shared, config).await?);
    }

    // Two rounds: recognition maps first, then distributions that include reciprocals
    for _ in 0..2 {
        for hierarchy in &hierarchies {
            hierarchy.publish_now().await?;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let target = hierarchies
        .iter()
        .find(|h| h.root_id() == peer)
        .with_context(|| format!("unknown peer '{peer}'"))?;

    print_shares("mutual distribution", &target.mutual_fulfillment_distribution().await);
    println!();
    let depth = traversal_config(config, depth).max_depth;
    print_social(&target.social_distribution_detailed(depth).await);

    for hierarchy in &hierarchies {
        hierarchy.shutdown().await;
    }
    Ok(())
}
