use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use chainbook_chain::tron::{Configuration, TronClient};
use chainbook_core::traits::ChainClient;
use chainbook_indexer::{
    cli::{Cli, Command, GlobalArgs, IndexArgs, RollbackArgs},
    sync::SyncWorker,
};
use chainbook_storage::db::IndexStore;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let global_args = cli.args();

    match cli.command() {
        Command::Index(index_args) => run_indexer(global_args, index_args).await,
        Command::Rollback(rollback_args) => run_rollback(global_args, rollback_args).await,
    }
}

fn open_chain_and_store(
    global_args: &GlobalArgs,
) -> Result<(Arc<TronClient>, Arc<IndexStore>), anyhow::Error> {
    let config_path = PathBuf::from(&global_args.config);
    let config = Configuration::from_file(&config_path)?;

    let chain = TronClient::new(
        config,
        Some(config_path),
        Arc::new(|notification| {
            tracing::debug!(?notification, "chain notification");
        }),
    )?;

    let store = Arc::new(IndexStore::open(
        PathBuf::from(&global_args.db_path).as_path(),
        chain.parser(),
    )?);

    Ok((chain, store))
}

async fn run_indexer(global_args: GlobalArgs, index_args: IndexArgs) -> Result<(), anyhow::Error> {
    info!("starting chainbook");
    let (chain, store) = open_chain_and_store(&global_args)?;
    chain.initialize().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = SyncWorker::new(chain.clone(), store);

    let chain_for_shutdown = chain.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("ctrl-c handler");
        info!("shutting down");
        chain_for_shutdown.shutdown();
        let _ = shutdown_tx.send(true);
    });

    worker
        .run(index_args.start_block, index_args.stop_block, shutdown_rx)
        .await
}

async fn run_rollback(
    global_args: GlobalArgs,
    rollback_args: RollbackArgs,
) -> Result<(), anyhow::Error> {
    let (chain, store) = open_chain_and_store(&global_args)?;
    store.disconnect_block_range_tron_type(rollback_args.lower, rollback_args.higher)?;
    chain.shutdown();
    Ok(())
}
