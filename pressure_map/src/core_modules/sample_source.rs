// THEORY:
// A `SampleSource` is where every tick begins. It produces exactly one `GridSample`
// per call, either by simulating the mat or by pulling from an acquisition stream.
//
// The source does not own the smoothing memory. Each channel keeps its own
// "previous sample" slot in its `ChannelState` and lends it to the source on every
// call, so two channels can never overwrite each other's smoothing term.

use crate::core_modules::grid::{GridError, GridSample, GridShape};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, NormalError};
use std::time::Duration;
use thiserror::Error;

/// Per-tick failures of a sample source. None of these are fatal to the process.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no sample from stream `{stream}` within {waited:?}")]
    Timeout { stream: String, waited: Duration },
    #[error("sample could not be reshaped into the grid: {0}")]
    Reshape(#[from] GridError),
    #[error("acquisition socket failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("source `{0}` has no samples to give")]
    Exhausted(String),
}

/// Parameters of the synthetic noise model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseParams {
    pub mean: f64,
    pub std_dev: f64,
    /// Mixing coefficient for exponential smoothing. `1.0` keeps only the new draw.
    pub alpha: f64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            mean: 100.0,
            std_dev: 200.0,
            alpha: 1.0,
        }
    }
}

/// Anything that can produce one grid reading per tick.
pub trait SampleSource {
    /// Produces the next sample. `previous` is the channel's last recorded sample, if any.
    fn produce(&mut self, previous: Option<&GridSample>) -> Result<GridSample, SourceError>;

    /// A short human-readable name used in logs.
    fn name(&self) -> &str;
}

/// Simulates the mat with normally distributed cell values, optionally smoothed.
pub struct SyntheticSource {
    shape: GridShape,
    params: NoiseParams,
    normal: Normal<f64>,
    rng: StdRng,
}

impl SyntheticSource {
    /// Creates a source seeded from OS entropy.
    pub fn new(shape: GridShape, params: NoiseParams) -> Result<Self, NormalError> {
        Self::with_rng(shape, params, StdRng::from_entropy())
    }

    /// Creates a deterministic source. Equal seeds yield equal sample sequences.
    pub fn seeded(shape: GridShape, params: NoiseParams, seed: u64) -> Result<Self, NormalError> {
        Self::with_rng(shape, params, StdRng::seed_from_u64(seed))
    }

    fn with_rng(shape: GridShape, params: NoiseParams, rng: StdRng) -> Result<Self, NormalError> {
        Ok(Self {
            shape,
            params,
            normal: Normal::new(params.mean, params.std_dev)?,
            rng,
        })
    }

    pub fn params(&self) -> NoiseParams {
        self.params
    }

    fn draw(&mut self) -> Result<GridSample, GridError> {
        let cells = (0..self.shape.cell_count())
            .map(|_| self.normal.sample(&mut self.rng))
            .collect();
        GridSample::from_cells(self.shape, cells)
    }
}

impl SampleSource for SyntheticSource {
    fn produce(&mut self, previous: Option<&GridSample>) -> Result<GridSample, SourceError> {
        let fresh = self.draw()?;

        // The first tick of a channel blends against a draw of its own, like the
        // mat was already live before the dashboard started.
        let seeded_previous;
        let previous = match previous {
            Some(p) if p.shape() == self.shape => p,
            _ => {
                seeded_previous = self.draw()?;
                &seeded_previous
            }
        };

        Ok(match fresh.blend(previous, self.params.alpha) {
            Some(blended) => blended,
            None => fresh,
        })
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Plays back a fixed list of samples, repeating the last one once exhausted.
pub struct ReplaySource {
    samples: Vec<GridSample>,
    cursor: usize,
}

impl ReplaySource {
    pub fn new(samples: Vec<GridSample>) -> Self {
        Self { samples, cursor: 0 }
    }
}

impl SampleSource for ReplaySource {
    fn produce(&mut self, _previous: Option<&GridSample>) -> Result<GridSample, SourceError> {
        let Some(last) = self.samples.len().checked_sub(1) else {
            return Err(SourceError::Exhausted(self.name().to_string()));
        };
        let sample = self.samples[self.cursor.min(last)].clone();
        self.cursor += 1;
        Ok(sample)
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> GridShape {
        GridShape::new(8, 6)
    }

    #[test]
    fn produces_configured_shape() {
        let mut source = SyntheticSource::seeded(shape(), NoiseParams::default(), 7).unwrap();
        let sample = source.produce(None).unwrap();
        assert_eq!(sample.shape(), shape());
        assert!(sample.is_finite());
    }

    #[test]
    fn equal_seeds_give_equal_samples() {
        let mut a = SyntheticSource::seeded(shape(), NoiseParams::default(), 42).unwrap();
        let mut b = SyntheticSource::seeded(shape(), NoiseParams::default(), 42).unwrap();
        assert_eq!(a.produce(None).unwrap(), b.produce(None).unwrap());
    }

    #[test]
    fn zero_alpha_holds_previous_sample() {
        let params = NoiseParams {
            alpha: 0.0,
            ..NoiseParams::default()
        };
        let mut source = SyntheticSource::seeded(shape(), params, 3).unwrap();
        let previous = GridSample::filled(shape(), 12.5).unwrap();
        assert_eq!(source.produce(Some(&previous)).unwrap(), previous);
    }

    #[test]
    fn zero_spread_with_half_alpha_is_midpoint() {
        let params = NoiseParams {
            mean: 10.0,
            std_dev: 0.0,
            alpha: 0.5,
        };
        let mut source = SyntheticSource::seeded(shape(), params, 1).unwrap();
        let previous = GridSample::filled(shape(), -10.0).unwrap();
        let sample = source.produce(Some(&previous)).unwrap();
        assert!(sample.cells().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn rejects_invalid_distribution() {
        let params = NoiseParams {
            std_dev: -1.0,
            ..NoiseParams::default()
        };
        assert!(SyntheticSource::new(shape(), params).is_err());
    }

    #[test]
    fn replay_repeats_last_sample() {
        let a = GridSample::filled(GridShape::new(1, 1), 1.0).unwrap();
        let b = GridSample::filled(GridShape::new(1, 1), 2.0).unwrap();
        let mut source = ReplaySource::new(vec![a.clone(), b.clone()]);
        assert_eq!(source.produce(None).unwrap(), a);
        assert_eq!(source.produce(None).unwrap(), b);
        assert_eq!(source.produce(None).unwrap(), b);

        assert!(matches!(
            ReplaySource::new(Vec::new()).produce(None),
            Err(SourceError::Exhausted(name)) if name == "replay"
        ));
    }
}
