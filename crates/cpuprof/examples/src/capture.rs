//! Captures a 10 second profile of a mostly idle worker and renders an HTML
//! report.
//!
//! Pass `--idle` to skip the work entirely, the report then states that no
//! samples were collected.

use std::time::Duration;

use anyhow::Context;
use rand::seq::SliceRandom;
use scuffle_cpuprof::{ProfilerConfig, ProfilingSession};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Sort a shuffled batch every 100ms.
async fn worker() {
    let mut batch: Vec<u32> = (0..200_000).collect();

    loop {
        batch.shuffle(&mut rand::thread_rng());
        batch.sort_unstable();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("set_global_default")?;

    let session = ProfilingSession::new(ProfilerConfig {
        filename: "capture".into(),
        generate_html: true,
        auto_hooks: false,
        frequency: 1000,
        ..Default::default()
    });

    if !std::env::args().any(|arg| arg == "--idle") {
        tokio::spawn(worker());
    }

    let artifacts = session
        .capture_for(Duration::from_secs(10))
        .await
        .context("capture")?
        .context("profiler was not running")?;

    println!("snapshot: {}", artifacts.snapshot.path.display());
    if let Some(report) = artifacts.report {
        println!("report: {}", report.path.display());
    }

    Ok(())
}
