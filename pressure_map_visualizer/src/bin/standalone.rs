use anyhow::Context;
use clap::Parser;
use pressure_map::cli::{PipelineArgs, init_tracing};
use pressure_map::pipeline::DashboardPipeline;
use pressure_map::scheduler::{Scheduler, SchedulerConfig};
use pressure_map_visualizer::{ServerConfig, start_server};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "standalone", about = "Serve the live pressure map dashboard")]
struct Cli {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Address the web server listens on
    #[arg(long, env = "PM_BIND", default_value = "127.0.0.1:8051")]
    bind: String,

    /// Start with playback paused
    #[arg(long, env = "PM_START_PAUSED")]
    paused: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    let cli = Cli::parse();

    let config = cli.pipeline.to_config();
    let tick_interval = config.tick_interval;
    // Resolving UDP streams blocks until they answer or time out.
    let pipeline = tokio::task::spawn_blocking(move || DashboardPipeline::from_config(&config))
        .await?
        .context("failed to start the pipeline")?;

    let mut cfg = ServerConfig::new(cli.bind, pipeline.channels().len());
    cfg.channel_labels = pipeline.channels().iter().map(|c| c.label.clone()).collect();

    let scheduler = Scheduler::spawn(
        pipeline,
        SchedulerConfig {
            tick_interval,
            max_ticks: None,
            start_playing: !cli.paused,
        },
    );

    let server = start_server(scheduler.bus(), cfg, scheduler.control()).await?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("shutting down");
    server.abort();
    let summary = scheduler.shutdown().await?;
    info!(?summary, "scheduler stopped");
    Ok(())
}
