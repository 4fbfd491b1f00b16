//! Profiles a simulated request handler until the process receives SIGINT,
//! SIGTERM or SIGQUIT.
//!
//! The configuration is read from `cpuprof.toml` if it exists and from
//! `CPUPROF_*` environment variables.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use scuffle_cpuprof::{ProfilerConfig, ProfilingSession};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Compress a request body, the CPU heavy part of every request.
fn handle_request(body: &[u8]) -> std::io::Result<usize> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::best());
    encoder.write_all(body)?;
    Ok(encoder.finish()?.len())
}

async fn serve() -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(5));
    let mut served = 0u64;

    loop {
        ticker.tick().await;

        let size = rand::thread_rng().gen_range(16usize..256) * 1024;
        let body: Vec<u8> = (0..size).map(|i| (i % 251) as u8 ^ (rand::random::<u8>() & 0x0f)).collect();
        let compressed = tokio::task::spawn_blocking(move || handle_request(&body)).await??;

        served += 1;
        if served % 1000 == 0 {
            tracing::info!(served, compressed, "served requests");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("scuffle_cpuprof=info".parse()?))
        .try_init()
        .context("set_global_default")?;

    let file = Path::new("cpuprof.toml");
    let config = ProfilerConfig::load(file.exists().then_some(file)).context("config")?;

    let session = ProfilingSession::new(config).install().context("install")?;
    session.start().await.context("start")?;

    tracing::info!("profiling, press ctrl-c to write the profile and exit");

    // The shutdown hook stops the session and exits the process.
    serve().await
}
