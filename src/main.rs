//! layerconf
//!
//! Resolves values from layered config files from the command line.

use anyhow::Result;
use clap::Parser;
use layerconf::cli::{Cli, Command, GetArgs, load_config, parse_tags, render_value};
use layerconf::engine::ConfigProvider;
use layerconf::node::NodeRef;
use layerconf::watcher::{SourceChangeEvent, WatcherConfig, start_source_watcher};
use layerconf::{Config, ConfigError};
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on --log option
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    match cli.log.as_str() {
        "0" | "off" => {
            // No logging
        }
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            // Log to file (append mode)
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    if let Err(err) = run(&cli).await {
        if let Some(config_err) = err.downcast_ref::<ConfigError>() {
            error!(code = %config_err.code(), "{}", config_err);
        }
        return Err(err);
    }
    Ok(())
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Get(args) => {
            let config = load_config(cli, &args.files)?;
            println!("{}", resolve(&config, args)?);
        }
        Command::Dump(args) => {
            let config = load_config(cli, &args.files)?;
            let tags = parse_tags(&args.tags).map_err(anyhow::Error::msg)?;
            let root = config.get_config::<NodeRef>("", &tags)?;
            println!("{}", root.render(!args.show_secrets));
        }
        Command::Watch(args) => {
            let config = Arc::new(load_config(cli, &args.files)?);
            run_watch(config, args).await?;
        }
    }

    Ok(())
}

fn resolve(config: &Config, args: &GetArgs) -> Result<String> {
    let tags = parse_tags(&args.tags).map_err(anyhow::Error::msg)?;
    let value = config.get_config_for(&args.path, &args.kind.descriptor(), &tags)?;
    Ok(render_value(&value, true))
}

async fn run_watch(config: Arc<Config>, args: &GetArgs) -> Result<()> {
    println!("{}", resolve(&config, args)?);

    let mut handle = start_source_watcher(Arc::clone(&config), WatcherConfig::default())?;
    info!(path = %args.path, "Watching for config changes");
    while let Some(event) = handle.wait_for_change().await {
        match event {
            SourceChangeEvent::Reloaded { path, .. } => {
                info!(file = %path.display(), "Config source reloaded");
                match resolve(&config, args) {
                    Ok(value) => println!("{}", value),
                    Err(e) => warn!(error = %e, "Value no longer resolves"),
                }
            }
            SourceChangeEvent::ReloadFailed { path, reason, .. } => {
                warn!(file = %path.display(), reason = %reason, "Reload failed, keeping previous value");
            }
            SourceChangeEvent::Error(e) => {
                warn!(error = %e, "Watcher error");
            }
        }
    }
    Ok(())
}
