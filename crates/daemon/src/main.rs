// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! lumed: the lume daemon binary

use anyhow::Context;
use clap::Parser;
use lume_daemon::{run_daemon, Config, RunOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Declarative, event-driven smart-light daemon
#[derive(Parser, Debug)]
#[command(name = "lumed", version)]
struct Args {
    /// Path to the YAML configuration file
    config: PathBuf,

    /// Clear all stored desired state before starting
    #[arg(long)]
    reset_state: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime
        .block_on(run_daemon(config, RunOptions { reset_state: args.reset_state }))
        .context("daemon terminated")?;
    Ok(())
}
