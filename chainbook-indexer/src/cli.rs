use clap::{Args, Parser, Subcommand};

/// Chainbook Indexer
///
/// Ingests blocks from a Tron family node and maintains a per-address
/// reverse index in an embedded RocksDB store.
#[derive(Parser, PartialEq, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    global_args: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn args(&self) -> GlobalArgs {
        self.global_args.clone()
    }

    pub fn command(&self) -> Command {
        self.command.clone()
    }
}

#[derive(Subcommand, Clone, PartialEq, Debug)]
pub enum Command {
    /// Starts the indexing service.
    Index(IndexArgs),
    /// Disconnects a block range from the index.
    Rollback(RollbackArgs),
}

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(version, about, long_about = None)]
pub struct GlobalArgs {
    /// Chain configuration file (JSON)
    #[clap(long, env = "CHAINBOOK_CONFIG", default_value = "./config.json")]
    pub config: String,

    /// Directory of the index database
    #[clap(long, env = "CHAINBOOK_DB", default_value = "./data/index")]
    pub db_path: String,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct IndexArgs {
    /// First block to connect
    ///
    /// Optional. When not provided, indexing resumes after the best block
    /// already in the store.
    #[clap(long)]
    pub start_block: Option<u32>,

    /// Last block to connect
    ///
    /// Optional. When not provided, the indexer follows the chain tip.
    #[clap(long)]
    pub stop_block: Option<u32>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct RollbackArgs {
    /// Lowest block of the disconnected range
    #[clap(long)]
    pub lower: u32,

    /// Highest block of the disconnected range
    #[clap(long)]
    pub higher: u32,
}
