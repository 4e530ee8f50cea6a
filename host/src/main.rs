use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use widget_plugin_host::plugin::LoadSummary;
use widget_plugin_host::report::ScanReport;
use widget_plugin_host::{HostConfig, PluginHost};

/// Widget plugin host - loads and drives native device-API plugins
#[derive(Parser, Debug)]
#[command(name = "widget-plugin-host")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load plugins and print a JSON report of what was found
    Scan {
        /// Plugin files or directories (defaults to the configured ones)
        paths: Vec<PathBuf>,
    },

    /// Load plugins, then run one widget start/stop cycle through them
    Lifecycle {
        /// Widget identifier passed to the callbacks
        #[arg(long = "widget-id")]
        widget_id: i32,
    },
}

fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        info!(path = %config_path.display(), "Loading configuration");
        HostConfig::from_file(&config_path)
            .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?
    } else {
        HostConfig::from_env().context("Failed to load configuration from environment")?
    };

    let host = PluginHost::builder(config).build()?;

    match cli.command {
        Commands::Scan { paths } => {
            let summary = if paths.is_empty() {
                host.load_plugins()?
            } else {
                load_explicit(&host, &paths)?
            };

            let report = ScanReport::new(host.registry(), summary);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Lifecycle { widget_id } => {
            let summary = host.load_plugins()?;
            info!(loaded = summary.loaded, skipped = summary.skipped, "Plugins ready");

            let reports = [host.start_widget(widget_id), host.stop_widget(widget_id)];
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
    }

    host.shutdown();
    Ok(())
}

/// Load each path as a directory or a single module file.
fn load_explicit(host: &PluginHost, paths: &[PathBuf]) -> anyhow::Result<LoadSummary> {
    let mut summary = LoadSummary::default();
    for path in paths {
        if path.is_dir() {
            let loaded = host
                .registry()
                .load_directory(path)
                .with_context(|| format!("Failed to scan {}", path.display()))?;
            summary.merge(loaded);
        } else {
            summary.merge(host.registry().load_paths([path]));
        }
    }
    Ok(summary)
}
