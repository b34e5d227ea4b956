// Command-line and environment configuration shared by the dashboard binaries.

use crate::config::{DashboardConfig, SourceKind};
use crate::core_modules::acquisition::AcquisitionConfig;
use crate::core_modules::grid::GridShape;
use crate::core_modules::sample_source::NoiseParams;
use clap::{Args, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    /// Normally distributed noise.
    Synthetic,
    /// Named UDP streams from a sensor bridge.
    Udp,
}

/// Pipeline settings. Each flag can also be set through its `PM_*` variable.
#[derive(Debug, Clone, Args)]
pub struct PipelineArgs {
    /// Grid rows
    #[arg(long, env = "PM_ROWS", default_value_t = 8)]
    pub rows: usize,

    /// Grid columns
    #[arg(long, env = "PM_COLS", default_value_t = 6)]
    pub cols: usize,

    /// Number of independent channels
    #[arg(long, env = "PM_CHANNELS", default_value_t = 2)]
    pub channels: usize,

    /// Tick interval in milliseconds
    #[arg(long, env = "PM_TICK_MS", default_value_t = 50)]
    pub tick_ms: u64,

    /// Mean of the synthetic cell readings
    #[arg(long, env = "PM_MEAN", default_value_t = 100.0)]
    pub mean: f64,

    /// Standard deviation of the synthetic cell readings
    #[arg(long, env = "PM_STD_DEV", default_value_t = 200.0)]
    pub std_dev: f64,

    /// Smoothing coefficient; 1.0 disables smoothing
    #[arg(long, env = "PM_ALPHA", default_value_t = 1.0)]
    pub alpha: f64,

    /// Seed for reproducible synthetic runs
    #[arg(long, env = "PM_SEED")]
    pub seed: Option<u64>,

    /// Where samples come from
    #[arg(long, env = "PM_SOURCE", value_enum, default_value_t = SourceArg::Synthetic)]
    pub source: SourceArg,

    /// UDP address of the first acquisition stream (channel i uses port + i)
    #[arg(long, env = "PM_UDP_BIND", default_value = "0.0.0.0:5005")]
    pub udp_bind: SocketAddr,

    /// Stream name prefix; channel i resolves `<prefix>_<i+1>`
    #[arg(long, env = "PM_STREAM_PREFIX", default_value = "PressureSensor")]
    pub stream_prefix: String,

    /// How long to wait for each stream at startup, in milliseconds
    #[arg(long, env = "PM_RESOLVE_MS", default_value_t = 5000)]
    pub resolve_ms: u64,
}

impl PipelineArgs {
    pub fn to_config(&self) -> DashboardConfig {
        let source = match self.source {
            SourceArg::Synthetic => SourceKind::Synthetic,
            SourceArg::Udp => SourceKind::UdpStream(AcquisitionConfig {
                bind_addr: self.udp_bind,
                stream_prefix: self.stream_prefix.clone(),
                resolve_timeout: Duration::from_millis(self.resolve_ms),
                ..AcquisitionConfig::default()
            }),
        };

        DashboardConfig {
            shape: GridShape::new(self.rows, self.cols),
            channels: self.channels,
            noise: NoiseParams {
                mean: self.mean,
                std_dev: self.std_dev,
                alpha: self.alpha,
            },
            tick_interval: Duration::from_millis(self.tick_ms),
            seed: self.seed,
            source,
            ..DashboardConfig::default()
        }
    }
}

/// Installs the `tracing` subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        pipeline: PipelineArgs,
    }

    #[test]
    fn defaults_map_to_default_config() {
        let cli = TestCli::parse_from(["test"]);
        let config = cli.pipeline.to_config();
        let defaults = DashboardConfig::default();
        assert_eq!(config.shape, defaults.shape);
        assert_eq!(config.channels, defaults.channels);
        assert_eq!(config.noise, defaults.noise);
        assert_eq!(config.tick_interval, defaults.tick_interval);
        assert_eq!(config.source, SourceKind::Synthetic);
    }

    #[test]
    fn udp_flags_build_acquisition_config() {
        let cli = TestCli::parse_from([
            "test",
            "--source",
            "udp",
            "--udp-bind",
            "127.0.0.1:6000",
            "--stream-prefix",
            "Mat",
            "--rows",
            "16",
        ]);
        let config = cli.pipeline.to_config();
        assert_eq!(config.shape, GridShape::new(16, 6));
        let SourceKind::UdpStream(acquisition) = config.source else {
            panic!("expected a UDP source");
        };
        assert_eq!(acquisition.channel_endpoint(0).1, "Mat_1");
        assert_eq!(acquisition.bind_addr.port(), 6000);
    }
}
