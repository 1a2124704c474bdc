use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tether_runtime::{HostLoader, LifecycleManager, TetherConfig};
use tracing_subscriber::{EnvFilter, fmt};

mod inspect;
mod watch;

#[derive(Parser)]
#[command(name = "tether", about = "Tether: managed types for a native reflection framework")]
struct Cli {
    /// Config file (defaults to ~/.tether/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Load a metadata directory and print every type and what it waits on
    Inspect {
        /// Metadata directory (overrides modules.metadata_dir)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Locate hostfxr and optionally boot and shut down the managed host
    HostCheck {
        /// Initialize the managed runtime as well
        #[arg(long)]
        init: bool,
    },
    /// Reload modules as their metadata changes and reinstance replaced types
    Watch {
        /// Metadata directory (overrides modules.metadata_dir)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Run without a managed host
        #[arg(long)]
        detached: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output on stdout stays parseable
    let subscriber = fmt()
        .with_env_filter(EnvFilter::from_env("TETHER_LOG"))
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let mut config = TetherConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Command::Inspect { dir, json } => {
            if let Some(dir) = dir {
                config.modules.metadata_dir = dir;
            }
            let manager = LifecycleManager::detached(config)?;
            inspect::run(manager, json)
        }
        Command::HostCheck { init } => host_check(&config, init),
        Command::Watch { dir, detached } => {
            if let Some(dir) = dir {
                config.modules.metadata_dir = dir;
            }
            let manager = if detached {
                LifecycleManager::detached(config)?
            } else {
                LifecycleManager::start(config).context("Failed to start the managed host")?
            };
            watch::run(manager).await
        }
    }
}

fn host_check(config: &TetherConfig, init: bool) -> Result<()> {
    let mut host = HostLoader::new(&config.host);
    let settings = host.settings();
    println!("mode:        {:?}", settings.mode);
    println!("dotnet root: {}", settings.dotnet_root.display());
    println!("assembly:    {}", settings.assembly_path.display());
    println!("entry point: {}::{}", settings.entry_type, settings.entry_method);

    let hostfxr = host.locate_hostfxr().context("Managed host is not available")?;
    println!("hostfxr:     {}", hostfxr.display());

    if init {
        host.initialize().context("Managed host failed to initialize")?;
        println!("managed host initialized");
        host.shutdown();
    }
    Ok(())
}
