//! Preview audition tool (sonicmap-preview) - Main entry point
//!
//! Loads a preview catalog and drives the hover preview engine from stdin, so
//! a catalog can be auditioned without the map UI.
//!
//! Commands: `play <key>`, `stop`, `preload <key>`, `keys`, `quit`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sonicmap_common::Catalog;
use sonicmap_preview::{OutputBackend, PlayOutcome, PreviewConfig, PreviewEngine, PreviewEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for sonicmap-preview
#[derive(Parser, Debug)]
#[command(name = "sonicmap-preview")]
#[command(about = "Audition hover previews from a Sonic Map catalog")]
#[command(version)]
struct Args {
    /// Preview catalog (TOML or JSON)
    #[arg(short, long, env = "SONICMAP_CATALOG")]
    catalog: PathBuf,

    /// Engine config file (overrides SONICMAP_PREVIEW_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run without an audio device
    #[arg(long)]
    headless: bool,
}

enum Command {
    Play(String),
    Stop,
    Preload(String),
    Keys,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?;
    let argument = parts.next().map(str::to_string);

    match (command, argument) {
        ("play", Some(key)) => Some(Command::Play(key)),
        ("preload", Some(key)) => Some(Command::Preload(key)),
        ("stop", _) => Some(Command::Stop),
        ("keys", _) => Some(Command::Keys),
        ("quit" | "exit", _) => Some(Command::Quit),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sonicmap_preview=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let catalog = Catalog::load(&args.catalog)
        .with_context(|| format!("Failed to load catalog {}", args.catalog.display()))?;
    info!("Loaded {} previews from {}", catalog.len(), args.catalog.display());

    let mut config = PreviewConfig::load(args.config.as_deref());
    if args.headless {
        config.output = OutputBackend::Headless;
    }

    let engine = PreviewEngine::new(catalog, config).context("Failed to initialize preview engine")?;

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                PreviewEvent::SessionStarted { info } => info!(
                    "▶ {} ({}, {:.1}s from {:.1}s)",
                    info.key, info.id, info.duration_secs, info.offset_secs
                ),
                PreviewEvent::SessionEnded { session, key } => info!("■ {} ({})", key, session),
                PreviewEvent::TornDown => break,
                other => info!("{:?}", other),
            }
        }
    });

    if !engine.activate() {
        warn!("No audio output available; play commands will be ignored");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = shutdown_signal() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_command(&line) {
            Some(Command::Play(key)) => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    let outcome = engine.play(&key).await;
                    if !matches!(outcome, PlayOutcome::Started(_)) {
                        info!("play {}: {:?}", key, outcome);
                    }
                });
            }
            Some(Command::Stop) => engine.stop(),
            Some(Command::Preload(key)) => {
                let cached = engine.preload(&key).await;
                info!("preload {}: {}", key, if cached { "cached" } else { "not available" });
            }
            Some(Command::Keys) => {
                for key in engine.catalog().keys() {
                    println!("{}", key);
                }
            }
            Some(Command::Quit) => break,
            None if line.trim().is_empty() => {}
            None => warn!("Unknown command: {}", line.trim()),
        }
    }

    engine.teardown();
    info!("Shutdown complete");
    Ok(())
}

/// Ctrl+C ends the session like `quit`
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert!(matches!(parse_command("play jazz"), Some(Command::Play(k)) if k == "jazz"));
        assert!(matches!(parse_command("  preload blues "), Some(Command::Preload(k)) if k == "blues"));
        assert!(matches!(parse_command("stop"), Some(Command::Stop)));
        assert!(matches!(parse_command("keys"), Some(Command::Keys)));
        assert!(matches!(parse_command("exit"), Some(Command::Quit)));
        assert!(parse_command("play").is_none());
        assert!(parse_command("").is_none());
    }
}
