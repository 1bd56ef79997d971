mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use cyrec_bridge::browser::ExtensionBrowser;
use cyrec_bridge::server::BridgeServer;
use cyrec_engine::config::{ConfigLoader, RecorderConfig};
use cyrec_engine::preferences::SelectorPreferences;
use cyrec_engine::protocol::ContentType;
use cyrec_engine::session::{SessionController, SessionHandle};
use cyrec_engine::storage::FileStore;
use cyrec_engine::store::BlockStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cyrec", version, about = "Record browser interactions as Cypress tests")]
struct Args {
    /// Config file (defaults to ./cyrec.yaml, then ~/.cyrec/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State file overriding the configured storage path
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the recorder and wait for the browser extension
    Serve {
        /// WebSocket port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the recorded session
    Export {
        #[arg(long, value_enum, default_value_t = Format::Code)]
        format: Format,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List recorded blocks with their index
    Blocks {
        #[arg(long)]
        json: bool,
    },
    /// Remove the block at INDEX
    Delete { index: usize },
    /// Move the block at FROM to TO
    Move { from: usize, to: usize },
    /// Clear all blocks and turn recording off
    Reset,
    /// Show the recording state
    State,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Code,
    Prompt,
}

impl From<Format> for ContentType {
    fn from(format: Format) -> Self {
        match format {
            Format::Code => ContentType::Code,
            Format::Prompt => ContentType::Prompt,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so exports can be piped from stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ConfigLoader::load_from(path).await,
        None => ConfigLoader::load_default().await,
    }
    .context("Failed to load config")?;

    let state_path = args.state_file.unwrap_or_else(|| config.storage.path.clone());
    let storage = Arc::new(
        FileStore::open(&state_path)
            .await
            .with_context(|| format!("Failed to open state file {}", state_path.display()))?,
    );

    let store = BlockStore::new(storage.clone());
    let output = match args.command {
        Command::Serve { port } => return serve(config, storage, port).await,
        Command::Export { format, out } => {
            let rendered = commands::export(&store, format.into(), &config.export).await?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, rendered)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    format!("Exported to {}", path.display())
                }
                None => rendered.trim_end().to_string(),
            }
        }
        Command::Blocks { json } => commands::list_blocks(&store, json).await?,
        Command::Delete { index } => commands::delete(&store, index).await?,
        Command::Move { from, to } => commands::move_block(&store, from, to).await?,
        Command::Reset => commands::reset(&store).await?,
        Command::State => commands::state(&store).await?,
    };
    println!("{}", output);
    Ok(())
}

async fn serve(
    config: RecorderConfig,
    storage: Arc<FileStore>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    // Store the selector lists so the extension receives them on connect.
    let preferences = SelectorPreferences::load(storage.as_ref(), &config.selectors).await?;
    preferences.save(storage.as_ref()).await?;

    let browser = ExtensionBrowser::new();
    let (handle, events) = SessionHandle::channel();
    let controller = SessionController::new(browser.clone(), storage.clone())
        .with_checkpoints(config.session.checkpoint_on_navigation);
    let session = tokio::spawn(controller.run(events));

    let port = port.unwrap_or(config.bridge.port);
    let running = BridgeServer::new(port, browser, handle, storage).start().await?;
    println!(
        "Please connect the browser extension to ws://{}",
        running.local_addr
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    running.accept_task.abort();
    session.abort();
    Ok(())
}
