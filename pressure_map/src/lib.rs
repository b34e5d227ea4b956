// THEORY:
// This file is the main entry point for the `pressure_map` library crate. It
// exposes the dashboard core as a small public API:
//
// - `pipeline::DashboardPipeline` runs one sample -> aggregate -> encode -> publish
//   tick over every channel,
// - `scheduler::Scheduler` drives that pipeline on a fixed period in the background,
// - `presentation` turns published snapshots into figure descriptions for a viewer.
//
// The building blocks (grids, sample sources, the aggregator, the snapshot codec,
// the bus) live in `core_modules` and are public for callers that want to compose
// their own driver.

pub mod cli;
pub mod config;
pub mod core_modules;
pub mod pipeline;
pub mod presentation;
pub mod scheduler;

pub use config::{ConfigError, DashboardConfig, SourceKind};
pub use core_modules::grid::{GridSample, GridShape};
pub use core_modules::snapshot::{Snapshot, decode, decode_payload, encode};
