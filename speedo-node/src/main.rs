use std::sync::Arc;

use clap::Parser;
use envconfig::Envconfig;
use speedo::{
    config::SpeedoConfig,
    control::{submit, ControlNode},
    pipeline::PipelineRunner,
    store::{log_changes, MemoryStore, Namespace, Store, StoreError},
    window::WindowConfigError,
};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod source;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    match main_inner().await {
        Ok(_) => (),
        Err(e) => {
            panic!("{:?}", eyre::Report::new(e))
        }
    }
}

async fn main_inner() -> Result<(), Error> {
    let args = cli::SpeedoNode::parse();
    debug!("Got the following args: {args:?}");
    let config = SpeedoConfig::init_from_env()?;
    debug!("Loaded config: {config:?}");
    let settings = config.engine_settings()?;

    let store = Arc::new(MemoryStore::new());
    if config.control.log_positions {
        let positions = store.subscribe(Namespace::Position).await?;
        tokio::spawn(log_changes(positions));
    }

    let sources = Arc::new(source::FileSources::new(args.source.clone()));
    let runner = Arc::new(PipelineRunner::new(store.clone(), sources, settings));
    let node = ControlNode::start(
        store.as_ref(),
        runner,
        PipelineRunner::<MemoryStore>::registry(),
        config.control.dispatch_partitions,
    )
    .await?;

    for job in args.start.iter() {
        submit(store.as_ref(), job, "START", None).await?;
    }

    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = commands.next_line() => match line? {
                Some(line) => submit_line(store.as_ref(), &line).await?,
                None => {
                    debug!("stdin closed, waiting for interrupt");
                    tokio::signal::ctrl_c().await?;
                    break;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }

    info!("Shutting down");
    node.shutdown().await;
    Ok(())
}

/// Submit a `<job> <verb> [args]` line as command
async fn submit_line(store: &MemoryStore, line: &str) -> Result<(), StoreError> {
    let mut parts = line.split_whitespace();
    let (Some(target), Some(verb)) = (parts.next(), parts.next()) else {
        if !line.trim().is_empty() {
            warn!("Expected `<job> <START|STOP> [args]`, got `{line}`");
        }
        return Ok(());
    };
    let args = parts.collect::<Vec<_>>().join(" ");
    let args = Some(args.as_str()).filter(|a| !a.is_empty());
    submit(store, target, verb, args).await
}

#[derive(Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(#[from] envconfig::Error),
    #[error(transparent)]
    Window(#[from] WindowConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
