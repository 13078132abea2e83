// SPDX-License-Identifier: Apache-2.0
//! `scribe watch` — start, set up, or tear down CDC ingestion.

use anyhow::{bail, Context, Result};
use clap::Args;
use scribe_cdc::{CdcConfig, CdcMode, Monitor};
use scribe_objects::FsObjectStore;
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for `scribe watch`.
#[derive(Debug, Args)]
#[command(group(clap::ArgGroup::new("action").args(["setup_only", "cleanup_only"])))]
pub struct WatchArgs {
    /// Upstream PostgreSQL connection string.
    #[arg(short = 'c', long = "connection")]
    pub connection: String,
    /// Comma-separated list of tables to watch.
    #[arg(short = 't', long = "tables", value_delimiter = ',')]
    pub tables: Vec<String>,
    /// Capture mechanism: `trigger` or `logical`.
    #[arg(short = 'm', long = "mode")]
    pub mode: String,
    /// Poll interval in milliseconds.
    #[arg(short = 'i', long = "interval-ms", default_value_t = 1000)]
    pub interval_ms: u64,
    /// Replication slot name (`logical` mode only).
    #[arg(short = 's', long = "slot", default_value = "scribe_slot")]
    pub slot: String,
    /// Only install triggers/slot, then exit.
    #[arg(short = 'S', long = "setup-only")]
    pub setup_only: bool,
    /// Only tear down triggers/slot, then exit.
    #[arg(short = 'C', long = "cleanup-only")]
    pub cleanup_only: bool,
}

/// Start (or set up / tear down) a CDC watch session against the
/// repository's commit store.
///
/// # Errors
/// Returns an error if not run inside a repository, `--mode` is not
/// `trigger`/`logical`, or the upstream connection/setup/teardown fails.
pub async fn run(args: WatchArgs) -> Result<()> {
    let mode = match args.mode.as_str() {
        "trigger" => CdcMode::Trigger,
        "logical" => CdcMode::Logical,
        other => bail!("unknown --mode {other:?}, expected \"trigger\" or \"logical\""),
    };

    let mut config = CdcConfig::new(args.connection, args.tables, mode);
    config.poll_interval_ms = args.interval_ms;
    config.slot_name = args.slot;

    if args.cleanup_only {
        scribe_cdc::monitor::teardown(&config).await?;
        println!("capture torn down");
        return Ok(());
    }

    if args.setup_only {
        scribe_cdc::monitor::setup_only(&config).await?;
        println!("capture installed");
        return Ok(());
    }

    let repo = scribe_core::Repository::open(None).await.context("scribe watch")?;
    let store = Arc::new(repo.store().clone());
    let objects = Arc::new(FsObjectStore::new(repo.objects_path()));
    let monitor = Monitor::new(config);

    let (stop_tx, stop_rx) = watch::channel(false);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let monitor_handle = tokio::spawn(async move { monitor.run(store, Some(objects), stop_rx).await });

    (&mut ctrl_c).await.context("waiting for ctrl-c")?;
    let _ = stop_tx.send(true);
    monitor_handle.await.map_err(|e| anyhow::anyhow!("monitor task panicked: {e}"))??;
    Ok(())
}
