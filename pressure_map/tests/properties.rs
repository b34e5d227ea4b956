//! Property tests for the aggregator and the snapshot codec.

use pressure_map::core_modules::aggregator::{ChannelState, aggregate, mean};
use pressure_map::core_modules::grid::{GridSample, GridShape};
use pressure_map::{decode, decode_payload, encode};
use proptest::prelude::*;

fn grid_strategy() -> impl Strategy<Value = GridSample> {
    (1usize..12, 1usize..12).prop_flat_map(|(rows, cols)| {
        prop::collection::vec(
            prop_oneof![
                Just(0.0),
                Just(-0.0),
                -1.0e6f64..1.0e6,
                prop::num::f64::NORMAL,
            ],
            rows * cols,
        )
        .prop_map(move |cells| GridSample::from_cells(GridShape::new(rows, cols), cells).unwrap())
    })
}

proptest! {
    /// The count is exactly the number of strictly positive cells.
    #[test]
    fn count_matches_positive_cells(grid in grid_strategy(), history in prop::collection::vec(0u64..100, 0..20)) {
        let expected = grid.cells().iter().filter(|&&v| v > 0.0).count() as u64;
        let result = aggregate(&grid, history.clone());
        prop_assert_eq!(result.count, expected);
        prop_assert_eq!(result.history.len(), history.len() + 1);
        prop_assert_eq!(*result.history.last().unwrap(), expected);
    }

    /// All-zero grids have no active cells; all-positive grids are fully active.
    #[test]
    fn extreme_grids(rows in 1usize..10, cols in 1usize..10, value in 1.0e-9f64..1.0e9) {
        let shape = GridShape::new(rows, cols);
        prop_assert_eq!(aggregate(&GridSample::filled(shape, 0.0).unwrap(), Vec::new()).count, 0);
        prop_assert_eq!(
            aggregate(&GridSample::filled(shape, value).unwrap(), Vec::new()).count,
            shape.cell_count() as u64
        );
    }

    /// The average is the exact arithmetic mean of the history.
    #[test]
    fn average_is_exact_mean(history in prop::collection::vec(0u64..10_000, 1..2_000)) {
        let reference = history.iter().sum::<u64>() as f64 / history.len() as f64;
        prop_assert_eq!(mean(&history), Some(reference));
    }

    /// The running state agrees with recomputing from the full history every tick.
    #[test]
    fn running_state_agrees_with_recomputation(actives in prop::collection::vec(0usize..=48, 1..200)) {
        let shape = GridShape::new(8, 6);
        let mut state = ChannelState::new();
        let mut history = Vec::new();
        for active in actives {
            let cells = (0..48).map(|i| if i < active { 1.0 } else { 0.0 }).collect();
            let grid = GridSample::from_cells(shape, cells).unwrap();
            let expected = aggregate(&grid, history);
            let recorded = state.record(grid);
            prop_assert_eq!(recorded.summary.average, expected.average);
            history = expected.history;
        }
        prop_assert_eq!(state.history(), history.as_slice());
    }

    /// decode(encode(..)) reproduces grid, history, and average exactly.
    #[test]
    fn codec_round_trip(
        grid in grid_strategy(),
        counts in prop::collection::vec(any::<u64>(), 0..50),
        average in prop::num::f64::NORMAL | prop::num::f64::ZERO,
    ) {
        let payload = encode(&grid, &counts, average).unwrap();
        let snapshot = decode(&payload).unwrap().unwrap();
        prop_assert_eq!(&snapshot.grid, &grid);
        for (a, b) in snapshot.grid.cells().iter().zip(grid.cells()) {
            prop_assert_eq!(a.to_bits(), b.to_bits());
        }
        prop_assert_eq!(snapshot.counts, counts);
        prop_assert_eq!(snapshot.average.to_bits(), average.to_bits());
    }

    /// Whitespace-only payloads never raise; they mean "no update".
    #[test]
    fn blank_payloads_are_no_update(blank in "[ \t\r\n]{0,8}") {
        prop_assert!(decode(&blank).unwrap().is_none());
        prop_assert!(decode_payload(Some(&blank)).unwrap().is_none());
    }
}
