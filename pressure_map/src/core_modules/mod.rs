pub mod acquisition;
pub mod aggregator;
pub mod bus;
pub mod grid;
pub mod sample_source;
pub mod snapshot;
