// THEORY:
// The `pipeline` module is the top-level API of the dashboard core. It owns every
// channel (its sample source plus its `ChannelState`) and runs one complete tick:
//
//     sample -> aggregate -> encode -> publish
//
// for each channel in turn. It is deliberately synchronous. A tick is a short,
// sequential piece of work, so the same code serves the async `Scheduler`, the
// headless runner, and plain unit tests without a runtime.
//
// A failure in one channel skips that channel's publication for the tick and is
// reported back to the caller. The other channels still update, and the failing
// channel's state is left exactly as it was.

use crate::config::{ConfigError, DashboardConfig, SourceKind};
use crate::core_modules::acquisition::{AcquisitionError, UdpStreamSource};
use crate::core_modules::aggregator::{ChannelState, TickSummary};
use crate::core_modules::grid::GridShape;
use crate::core_modules::sample_source::{SampleSource, SourceError, SyntheticSource};
use crate::core_modules::snapshot::{self, CodecError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::bus::{ChannelId, PublishedSnapshot, SnapshotBus};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error("invalid noise distribution: {0}")]
    Distribution(#[from] rand_distr::NormalError),
    #[error("sample source `{source_name}` failed: {error}")]
    Source {
        source_name: String,
        #[source]
        error: SourceError,
    },
    #[error("sample shape {actual} does not match the configured grid {expected}")]
    ShapeMismatch { expected: GridShape, actual: GridShape },
    #[error("sample contains non-finite readings")]
    NonFiniteSample,
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A sample source boxed for use inside the pipeline.
pub type BoxedSource = Box<dyn SampleSource + Send>;

/// One independent sensor pipeline.
pub struct Channel {
    pub id: ChannelId,
    pub label: String,
    source: BoxedSource,
    state: ChannelState,
}

impl Channel {
    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }
}

/// What happened during one pipeline tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Pipeline-wide tick number, starting at 1.
    pub tick: u64,
    pub published: Vec<(ChannelId, TickSummary)>,
    pub failures: Vec<(ChannelId, PipelineError)>,
}

impl TickReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct DashboardPipeline {
    shape: GridShape,
    channels: Vec<Channel>,
    bus: SnapshotBus,
    ticks: u64,
}

impl DashboardPipeline {
    /// Builds a pipeline from `(label, source)` pairs. Channel ids follow their order.
    pub fn new(shape: GridShape, sources: Vec<(String, BoxedSource)>, bus_capacity: usize) -> Self {
        let bus = SnapshotBus::new(sources.len(), bus_capacity);
        let channels = sources
            .into_iter()
            .enumerate()
            .map(|(i, (label, source))| Channel {
                id: ChannelId(i),
                label,
                source,
                state: ChannelState::new(),
            })
            .collect();
        Self {
            shape,
            channels,
            bus,
            ticks: 0,
        }
    }

    /// Builds the sources described by `config`. Acquisition streams are resolved
    /// here, so an unreachable stream fails startup rather than a tick.
    pub fn from_config(config: &DashboardConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let mut sources: Vec<(String, BoxedSource)> = Vec::with_capacity(config.channels);
        for i in 0..config.channels {
            let label = format!("Pressure Map {}", i + 1);
            let source: BoxedSource = match &config.source {
                SourceKind::Synthetic => match config.seed {
                    Some(seed) => Box::new(SyntheticSource::seeded(
                        config.shape,
                        config.noise,
                        seed.wrapping_add(i as u64),
                    )?),
                    None => Box::new(SyntheticSource::new(config.shape, config.noise)?),
                },
                SourceKind::UdpStream(acquisition) => {
                    let (addr, stream) = acquisition.channel_endpoint(i);
                    Box::new(UdpStreamSource::resolve(
                        addr,
                        stream,
                        config.shape,
                        acquisition.resolve_timeout,
                        acquisition.poll_timeout,
                    )?)
                }
            };
            sources.push((label, source));
        }

        Ok(Self::new(config.shape, sources, config.bus_capacity))
    }

    /// Runs one sample -> aggregate -> encode -> publish cycle for every channel.
    pub fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        let mut report = TickReport {
            tick: self.ticks,
            ..TickReport::default()
        };

        for channel in &mut self.channels {
            match Self::tick_channel(self.shape, channel) {
                Ok((summary, payload)) => {
                    self.bus.publish(PublishedSnapshot {
                        channel: channel.id,
                        tick: summary.ticks,
                        payload,
                    });
                    debug!(
                        channel = %channel.id,
                        count = summary.count,
                        average = summary.average,
                        "published snapshot"
                    );
                    report.published.push((channel.id, summary));
                }
                Err(error) => {
                    warn!(channel = %channel.id, %error, "tick skipped for channel");
                    report.failures.push((channel.id, error));
                }
            }
        }

        report
    }

    fn tick_channel(shape: GridShape, channel: &mut Channel) -> Result<(TickSummary, Arc<str>), PipelineError> {
        // Stage 1: Sample
        let sample = channel
            .source
            .produce(channel.state.previous())
            .map_err(|error| PipelineError::Source {
                source_name: channel.source.name().to_string(),
                error,
            })?;

        // Stage 1.5: Reject anything that would corrupt the channel's history.
        if sample.shape() != shape {
            return Err(PipelineError::ShapeMismatch {
                expected: shape,
                actual: sample.shape(),
            });
        }
        if !sample.is_finite() {
            return Err(PipelineError::NonFiniteSample);
        }

        // Stage 2: Aggregate
        let recorded = channel.state.record(sample);

        // Stage 3: Encode
        let payload = snapshot::encode(recorded.grid, recorded.history, recorded.summary.average)?;

        Ok((recorded.summary, Arc::from(payload)))
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id.0)
    }

    /// A handle to the bus the pipeline publishes on.
    pub fn bus(&self) -> SnapshotBus {
        self.bus.clone()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
