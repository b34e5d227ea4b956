// THEORY:
// `DashboardConfig` gathers every tunable of the pipeline in one place. Its
// defaults reproduce the reference dashboard (two 8x6 channels, Normal(100, 200)
// noise, no smoothing, a 50 ms tick), so `DashboardConfig::default()` is a working
// setup. Binaries fill it from command-line flags and `PM_*` environment variables.

use crate::core_modules::acquisition::AcquisitionConfig;
use crate::core_modules::grid::GridShape;
use crate::core_modules::sample_source::NoiseParams;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("grid must have at least one row and one column, got {0}")]
    EmptyGrid(GridShape),
    #[error("at least one channel is required")]
    NoChannels,
    #[error("smoothing alpha must lie in [0, 1], got {0}")]
    AlphaOutOfRange(f64),
    #[error("noise parameters must be finite with a non-negative spread (mean={mean}, std_dev={std_dev})")]
    InvalidNoise { mean: f64, std_dev: f64 },
    #[error("tick interval must be positive")]
    ZeroTickInterval,
    #[error("{channels} channels starting at UDP port {first_port} run past port 65535")]
    PortRangeExceeded { first_port: u16, channels: usize },
}

/// Where channels get their samples from.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SourceKind {
    #[default]
    Synthetic,
    UdpStream(AcquisitionConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub shape: GridShape,
    pub channels: usize,
    pub noise: NoiseParams,
    pub tick_interval: Duration,
    /// Seed for the synthetic sources. Channel `i` uses `seed + i`.
    pub seed: Option<u64>,
    pub source: SourceKind,
    /// Capacity of the broadcast stream that feeds live render sessions.
    pub bus_capacity: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            shape: GridShape::default(),
            channels: 2,
            noise: NoiseParams::default(),
            tick_interval: Duration::from_millis(50),
            seed: None,
            source: SourceKind::Synthetic,
            bus_capacity: 64,
        }
    }
}

impl DashboardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shape.cell_count() == 0 {
            return Err(ConfigError::EmptyGrid(self.shape));
        }
        if self.channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        if !(0.0..=1.0).contains(&self.noise.alpha) {
            return Err(ConfigError::AlphaOutOfRange(self.noise.alpha));
        }
        let NoiseParams { mean, std_dev, .. } = self.noise;
        if !mean.is_finite() || !std_dev.is_finite() || std_dev < 0.0 {
            return Err(ConfigError::InvalidNoise { mean, std_dev });
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        if let SourceKind::UdpStream(acquisition) = &self.source {
            let first_port = acquisition.bind_addr.port();
            // Port 0 lets the OS pick, so every channel gets its own port anyway.
            let last = usize::from(first_port).saturating_add(self.channels - 1);
            if first_port != 0 && last > usize::from(u16::MAX) {
                return Err(ConfigError::PortRangeExceeded {
                    first_port,
                    channels: self.channels,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_dashboard() {
        let config = DashboardConfig::default();
        assert_eq!(config.shape.cell_count(), 48);
        assert_eq!(config.channels, 2);
        assert_eq!(config.noise.alpha, 1.0);
        assert_eq!(config.tick_interval, Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let base = DashboardConfig::default();

        let mut config = base.clone();
        config.noise.alpha = 1.5;
        assert_eq!(config.validate(), Err(ConfigError::AlphaOutOfRange(1.5)));

        let mut config = base.clone();
        config.channels = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoChannels));

        let mut config = base.clone();
        config.shape = GridShape::new(0, 6);
        assert!(matches!(config.validate(), Err(ConfigError::EmptyGrid(_))));

        let mut config = base.clone();
        config.noise.std_dev = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidNoise { .. })));

        let mut config = base;
        config.tick_interval = Duration::ZERO;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTickInterval));
    }

    #[test]
    fn udp_channels_must_fit_the_port_range() {
        let udp = |port: u16, channels: usize| DashboardConfig {
            channels,
            source: SourceKind::UdpStream(AcquisitionConfig {
                bind_addr: std::net::SocketAddr::from(([127, 0, 0, 1], port)),
                ..AcquisitionConfig::default()
            }),
            ..DashboardConfig::default()
        };

        assert!(udp(65_534, 2).validate().is_ok());
        assert_eq!(
            udp(65_534, 3).validate(),
            Err(ConfigError::PortRangeExceeded {
                first_port: 65_534,
                channels: 3,
            })
        );
        assert!(udp(0, 100_000).validate().is_ok());
    }
}
