use anyhow::Context;
use clap::Parser;
use config::Config;
use flume::bounded;
use metrics::Calibration;
use recorder::domain::{ActivityInfo, Profile};
use session_replay::{
    cli::Cli,
    replay::{Replay, ReplayOptions, read_plan, read_samples},
    signals::wait_for_signal,
};
use std::io::{self, Write};
use tracing::{debug, error, info};
use tracing_log::AsTrace;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity.log_level_filter().as_trace())
        .with_writer(io::stderr)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    debug!(config = ?cli);

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        _ => Config::new(),
    };
    if let Some(store) = &cli.store {
        config.persistence.store_path = Some(store.clone());
    }

    if cli.dump_config {
        writeln!(io::stdout().lock(), "{}", config.to_toml()?)?;
        return Ok(());
    }

    let samples_path = cli
        .samples
        .as_deref()
        .context("no samples file given")?;
    let samples = read_samples(samples_path)?;
    let plan = cli.plan.as_deref().map(read_plan).transpose()?;
    info!(samples = samples.len(), path = %samples_path.display(), "loaded samples");

    let options = ReplayOptions {
        profile: Profile::new(
            cli.profile.clone(),
            Calibration {
                ftp_w: cli.ftp,
                threshold_hr_bpm: cli.threshold_hr,
                max_hr_bpm: cli.max_hr,
            },
        ),
        activity: ActivityInfo::new(cli.activity.clone()),
        plan,
        keep_chunks: cli.keep_chunks,
    };

    let (events_tx, events_rx) = bounded(8);
    let signals = tokio::spawn(async move {
        if let Err(err) = wait_for_signal(&events_tx).await {
            error!(error = ?err, "Error while waiting for signal");
        }
    });

    let report = Replay::new(config).await?.run(samples, options, events_rx).await;
    signals.abort();
    let report = report?;

    let json = serde_json::to_string_pretty(&report.submission)?;
    match &cli.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => writeln!(io::stdout().lock(), "{json}")?,
    }
    info!(
        snapshots = report.snapshots,
        steps = report.steps.len(),
        interrupted = report.interrupted,
        "replay complete"
    );
    Ok(())
}
