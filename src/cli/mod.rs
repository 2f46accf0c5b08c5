pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "shardctl")]
#[command(about = "shardctl - inspect shard routing, health and tokens for shardgate")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Show which shard each restaurant id routes to")]
    Route {
        #[arg(required = true, help = "Restaurant ids")]
        ids: Vec<i64>,
        #[arg(long, help = "Shard count (defaults to the configured shards)")]
        shards: Option<usize>,
    },

    #[command(about = "Distribution of a range of restaurant ids across shards")]
    Distribution {
        #[arg(long, default_value_t = 1000, help = "How many ids to hash")]
        count: u32,
        #[arg(long, default_value_t = 1, help = "First restaurant id")]
        start: i64,
        #[arg(long, help = "Shard count (defaults to the configured shards)")]
        shards: Option<usize>,
    },

    #[command(about = "Which restaurants would move if the shard count changed")]
    Moves {
        #[arg(long, help = "Current shard count")]
        from: usize,
        #[arg(long, help = "New shard count")]
        to: usize,
        #[arg(long, default_value_t = 1000, help = "How many ids to check")]
        count: u32,
        #[arg(long, default_value_t = 1, help = "First restaurant id")]
        start: i64,
    },

    #[command(about = "List configured shards")]
    Shards,

    #[command(about = "Probe every configured shard")]
    Health,

    #[command(about = "Issue and inspect access tokens")]
    Token {
        #[command(subcommand)]
        cmd: commands::token::TokenCommands,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Route { ids, shards } => commands::route::route(&ids, shards, output_format),
        Commands::Distribution { count, start, shards } => {
            commands::route::distribution(start, count, shards, output_format)
        }
        Commands::Moves { from, to, count, start } => commands::route::moves(from, to, start, count, output_format),
        Commands::Shards => commands::cluster::shards(output_format),
        Commands::Health => commands::cluster::health(output_format).await,
        Commands::Token { cmd } => commands::token::handle(cmd, output_format),
    }
}
