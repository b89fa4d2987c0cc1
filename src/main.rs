use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;

use customer_registry::config::{AppConfig, LogFormat, StoreBackend};
use customer_registry::report::{ReportService, SystemViewer};
use customer_registry::{BackendContext, DocumentStore, FileStore, MemoryStore, spawn_backend};

#[derive(Parser, Debug)]
#[command(name = "customer-registry", about = "Customer registry backend")]
struct Cli {
    /// TOML file layered over the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Serve the command channel over stdin/stdout, one JSON message per line.
    Serve,
    /// Write the customer report as PDF and open it.
    Report {
        /// Only write the file and print its path.
        #[arg(long)]
        no_open: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    // stdout carries the wire protocol; logs go to stderr.
    let level = config.observability.log_level.as_str();
    match config.observability.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(level)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(level)
            .with_writer(std::io::stderr)
            .init(),
    }

    match config.store.backend {
        StoreBackend::File => {
            let store = FileStore::new(&config.store.data_dir);
            tracing::info!(path = %store.path().display(), "using file store");
            run(cli.command, store, &config).await
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; records are lost on exit");
            run(cli.command, MemoryStore::new(), &config).await
        }
    }
}

async fn run<S: DocumentStore>(command: Cmd, store: S, config: &AppConfig) -> anyhow::Result<()> {
    let ctx = BackendContext::new(store);
    match command {
        Cmd::Serve => serve(ctx, config).await,
        Cmd::Report { no_open } => report(ctx, config, no_open).await,
    }
}

async fn serve<S: DocumentStore>(ctx: BackendContext<S>, config: &AppConfig) -> anyhow::Result<()> {
    tracing::info!("backend starting");
    let (ui, backend) = spawn_backend(ctx, config.orchestrator());

    let served = customer_registry::wire::serve(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        ui,
    )
    .await;

    backend
        .shutdown()
        .await
        .context("failed to shut down the store")?;
    served.context("transport failed")?;
    tracing::info!("backend stopped");
    Ok(())
}

async fn report<S: DocumentStore>(
    ctx: BackendContext<S>,
    config: &AppConfig,
    no_open: bool,
) -> anyhow::Result<()> {
    ctx.gateway
        .connect()
        .await
        .context("failed to connect to the store")?;

    let service = ReportService::new(
        ctx.repository.clone(),
        config.report.layout.clone(),
        config.report.output_dir.clone(),
    );
    let result = if no_open {
        service.generate().await
    } else {
        service.generate_and_open(&SystemViewer).await
    };

    ctx.gateway
        .disconnect()
        .await
        .context("failed to close the store")?;
    let path = result.context("failed to generate report")?;
    println!("{}", path.display());
    Ok(())
}
