// Acquisition stream probe.
//
// `listen` resolves one named stream and prints each reading reshaped onto the
// grid, which is the quickest way to check a sensor bridge before pointing the
// dashboard at it. `emit` plays the bridge's part, sending synthetic readings
// so the dashboard's UDP source can be tried without hardware.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pressure_map::cli::init_tracing;
use pressure_map::core_modules::acquisition::{StreamDatagram, UdpStreamSource};
use pressure_map::core_modules::aggregator::aggregate;
use pressure_map::core_modules::sample_source::{
    NoiseParams, SampleSource, SourceError, SyntheticSource,
};
use pressure_map::GridShape;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "stream_probe", about = "Listen to or emit pressure map acquisition streams")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print readings from one named stream
    Listen(ListenArgs),
    /// Send synthetic readings as a named stream
    Emit(EmitArgs),
}

#[derive(Args, Debug)]
struct GridArgs {
    /// Stream name
    #[arg(long, default_value = "PressureSensor_1")]
    stream: String,

    /// Grid rows of each reading
    #[arg(long, default_value_t = 16)]
    rows: usize,

    /// Grid columns of each reading
    #[arg(long, default_value_t = 6)]
    cols: usize,

    /// Stop after this many readings
    #[arg(long)]
    samples: Option<u64>,
}

#[derive(Args, Debug)]
struct ListenArgs {
    #[command(flatten)]
    grid: GridArgs,

    /// Local UDP address to listen on
    #[arg(long, env = "PM_UDP_BIND", default_value = "0.0.0.0:5005")]
    bind: SocketAddr,

    /// How long to wait for the stream to appear, in milliseconds
    #[arg(long, default_value_t = 5000)]
    resolve_ms: u64,

    /// How long each pull waits for a reading, in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,
}

#[derive(Args, Debug)]
struct EmitArgs {
    #[command(flatten)]
    grid: GridArgs,

    /// Where the dashboard listens for this stream
    #[arg(long, default_value = "127.0.0.1:5005")]
    target: SocketAddr,

    /// Delay between readings, in milliseconds
    #[arg(long, default_value_t = 50)]
    interval_ms: u64,

    /// Seed for reproducible readings
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    match Cli::parse().command {
        Command::Listen(args) => tokio::task::spawn_blocking(move || listen(args)).await?,
        Command::Emit(args) => emit(args).await,
    }
}

fn listen(args: ListenArgs) -> anyhow::Result<()> {
    let shape = GridShape::new(args.grid.rows, args.grid.cols);
    let mut source = UdpStreamSource::resolve(
        args.bind,
        args.grid.stream.clone(),
        shape,
        Duration::from_millis(args.resolve_ms),
        Duration::from_millis(args.poll_ms),
    )
    .context("no acquisition stream to listen to")?;

    let mut received = 0u64;
    while args.grid.samples.is_none_or(|limit| received < limit) {
        let grid = match source.produce(None) {
            Ok(grid) => grid,
            Err(SourceError::Timeout { .. }) => {
                debug!(stream = %args.grid.stream, "no reading this pull");
                continue;
            }
            Err(SourceError::Reshape(err)) => {
                warn!(stream = %args.grid.stream, %err, "reading does not fit the grid");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        received += 1;
        let active = aggregate(&grid, Vec::new()).count;
        println!("sample {received}: {} grid, {active} active", grid.shape());
        for row in grid.rows() {
            let line: Vec<String> = row.iter().map(|v| format!("{v:8.2}")).collect();
            println!("  {}", line.join(" "));
        }
    }
    Ok(())
}

async fn emit(args: EmitArgs) -> anyhow::Result<()> {
    let shape = GridShape::new(args.grid.rows, args.grid.cols);
    let params = NoiseParams::default();
    let mut source = match args.seed {
        Some(seed) => SyntheticSource::seeded(shape, params, seed)?,
        None => SyntheticSource::new(shape, params)?,
    };
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0")
        .await
        .context("binding emitter socket")?;
    info!(stream = %args.grid.stream, target = %args.target, "emitting synthetic readings");

    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut sent = 0u64;
    while args.grid.samples.is_none_or(|limit| sent < limit) {
        interval.tick().await;
        let grid = source.produce(None)?;
        let datagram = StreamDatagram {
            stream: args.grid.stream.clone(),
            values: grid.cells().to_vec(),
        };
        let bytes = serde_json::to_vec(&datagram)?;
        socket
            .send_to(&bytes, args.target)
            .await
            .with_context(|| format!("sending to {}", args.target))?;
        sent += 1;
    }
    info!(sent, "emitter finished");
    Ok(())
}
