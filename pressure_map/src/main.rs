// Headless runner: drives the pipeline for a fixed number of ticks and logs each
// channel's metric as a viewer with the given threshold would see it.

use anyhow::Context;
use clap::Parser;
use pressure_map::cli::{PipelineArgs, init_tracing};
use pressure_map::pipeline::DashboardPipeline;
use pressure_map::presentation::{RenderSession, Threshold};
use pressure_map::scheduler::{Scheduler, SchedulerConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "pressure_map", about = "Run the pressure map pipeline without a UI")]
struct Cli {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Number of ticks to run before exiting
    #[arg(long, default_value_t = 100)]
    ticks: u64,

    /// Threshold (0-100) used to colour the logged metric
    #[arg(long, default_value_t = 50)]
    threshold: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    let cli = Cli::parse();

    let threshold = Threshold::new(cli.threshold)?;
    let config = cli.pipeline.to_config();
    let pipeline = tokio::task::spawn_blocking(move || DashboardPipeline::from_config(&config))
        .await?
        .context("failed to start the pipeline")?;
    let channels = pipeline.channels().len();
    let tick_interval = std::time::Duration::from_millis(cli.pipeline.tick_ms);

    let mut updates = pipeline.bus().subscribe();
    let scheduler = Scheduler::spawn(
        pipeline,
        SchedulerConfig {
            tick_interval,
            max_ticks: Some(cli.ticks),
            start_playing: true,
        },
    );

    let mut sessions = vec![RenderSession::new(threshold); channels];
    let logger = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(published) => {
                    let Some(session) = sessions.get_mut(published.channel.0) else {
                        continue;
                    };
                    if let Err(error) = session.apply_payload(Some(&published.payload)) {
                        warn!(channel = %published.channel, %error, "could not render snapshot");
                        continue;
                    }
                    if let Some(rendering) = session.rendering() {
                        info!(
                            channel = %published.channel,
                            tick = published.tick,
                            active = rendering.line_chart.y.last().copied().unwrap_or_default(),
                            percent = %rendering.metric.percent_text(),
                            color = rendering.metric.color.css(),
                            "metric"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "logger fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let summary = scheduler.join().await?;
    // The bus closes once the scheduler is gone, which ends the logger.
    logger.await?;
    info!(?summary, "run complete");
    Ok(())
}
