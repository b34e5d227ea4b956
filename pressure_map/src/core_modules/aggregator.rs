// THEORY:
// The `aggregator` turns a stream of grid samples into the one scalar the dashboard
// tracks over time: how many cells are active. It is the stateful heart of a
// channel.
//
// Key architectural principles:
// 1.  **Pure Core**: `aggregate` is a free function with no hidden state. Given a
//     sample and the history so far it returns the count, the extended history,
//     and the mean of that history.
// 2.  **Owned Channel Memory**: `ChannelState` owns everything a channel remembers
//     between ticks: the previous sample (lent to the sample source for smoothing),
//     the append-only count history, and the current average.
// 3.  **Constant-Time Updates**: The history grows without bound, so the state keeps
//     an exact integer running sum. Dividing it by the history length gives the
//     same value as summing the whole history every tick, at O(1) cost.

use crate::core_modules::grid::GridSample;

/// The result of folding one sample into a history.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub count: u64,
    pub history: Vec<u64>,
    pub average: f64,
}

/// Counts the active cells of `sample`, appends the count to `history`, and
/// averages the result.
pub fn aggregate(sample: &GridSample, mut history: Vec<u64>) -> Aggregation {
    let count = sample.active_cells() as u64;
    history.push(count);
    let average = mean(&history).unwrap_or(count as f64);
    Aggregation {
        count,
        history,
        average,
    }
}

/// The arithmetic mean of a count history, or `None` when it is empty.
pub fn mean(history: &[u64]) -> Option<f64> {
    if history.is_empty() {
        return None;
    }
    let sum: u128 = history.iter().map(|&c| c as u128).sum();
    Some(sum as f64 / history.len() as f64)
}

/// What a single tick changed in a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSummary {
    pub count: u64,
    pub average: f64,
    /// How many ticks this channel has processed, including this one.
    pub ticks: u64,
}

/// A view of the channel right after a sample was recorded.
#[derive(Debug)]
pub struct Recorded<'a> {
    pub summary: TickSummary,
    pub grid: &'a GridSample,
    pub history: &'a [u64],
}

/// Everything a channel remembers for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    previous: Option<GridSample>,
    counts: Vec<u64>,
    running_sum: u128,
    average: f64,
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a new sample into the channel and keeps it as the smoothing reference.
    pub fn record(&mut self, sample: GridSample) -> Recorded<'_> {
        let count = sample.active_cells() as u64;
        self.counts.push(count);
        self.running_sum += count as u128;
        self.average = self.running_sum as f64 / self.counts.len() as f64;

        let summary = TickSummary {
            count,
            average: self.average,
            ticks: self.counts.len() as u64,
        };
        Recorded {
            summary,
            grid: self.previous.insert(sample),
            history: &self.counts,
        }
    }

    /// The last recorded sample.
    pub fn previous(&self) -> Option<&GridSample> {
        self.previous.as_ref()
    }

    pub fn history(&self) -> &[u64] {
        &self.counts
    }

    pub fn average(&self) -> f64 {
        self.average
    }

    pub fn ticks(&self) -> u64 {
        self.counts.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::grid::GridShape;

    fn grid_with_active(active: usize) -> GridSample {
        let shape = GridShape::new(8, 6);
        let cells = (0..shape.cell_count())
            .map(|i| if i < active { 1.0 } else { -1.0 })
            .collect();
        GridSample::from_cells(shape, cells).unwrap()
    }

    #[test]
    fn first_tick_average_is_the_count() {
        let result = aggregate(&grid_with_active(30), Vec::new());
        assert_eq!(result.count, 30);
        assert_eq!(result.history, vec![30]);
        assert_eq!(result.average, 30.0);
    }

    #[test]
    fn second_tick_extends_history() {
        let first = aggregate(&grid_with_active(20), Vec::new());
        let second = aggregate(&grid_with_active(40), first.history);
        assert_eq!(second.history, vec![20, 40]);
        assert_eq!(second.average, 30.0);
    }

    #[test]
    fn mean_of_empty_history_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[7]), Some(7.0));
    }

    #[test]
    fn channel_state_matches_full_recomputation() {
        let mut state = ChannelState::new();
        let mut history = Vec::new();
        for active in [0, 48, 13, 7, 29, 29, 1] {
            let sample = grid_with_active(active);
            let expected = aggregate(&sample, history);
            let recorded = state.record(sample);

            assert_eq!(recorded.summary.count, expected.count);
            assert_eq!(recorded.summary.average, expected.average);
            assert_eq!(recorded.history, expected.history.as_slice());
            history = expected.history;
        }
        assert_eq!(state.ticks(), 7);
        assert_eq!(state.previous().map(GridSample::active_cells), Some(1));
    }
}
