// THEORY:
// The `presentation` module is the boundary between the pipeline and whatever
// actually draws the dashboard. It does not draw anything itself. It turns a
// decoded `Snapshot` and a user-chosen `Threshold` into plain, serializable
// descriptions:
//
// - a heatmap figure (the grid plus a colour-scale name),
// - a line chart of the active-cell count per tick,
// - a metric fragment: the percentage of active cells, coloured by whether it
//   clears the threshold.
//
// A `RenderSession` plays the role of one viewer. Feeding it an empty payload
// keeps the previous rendering; feeding it a malformed one fails that render
// without disturbing what is already on screen.

use crate::core_modules::snapshot::{self, CodecError, Snapshot};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const HEATMAP_COLORSCALE: &str = "Viridis";
pub const LINE_COLOR: &str = "#2D708EFF";
pub const LINE_CHART_TITLE: &str = "Count of Active Cells";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresentationError {
    #[error("threshold must be between 0 and 100, got {0}")]
    ThresholdOutOfRange(i64),
}

/// A per-channel percentage threshold in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Threshold(u8);

impl Threshold {
    pub fn new(value: i64) -> Result<Self, PresentationError> {
        if (0..=100).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(PresentationError::ThresholdOutOfRange(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Threshold {
    /// The slider's starting position.
    fn default() -> Self {
        Self(50)
    }
}

impl TryFrom<i64> for Threshold {
    type Error = PresentationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Threshold> for u8 {
    fn from(threshold: Threshold) -> Self {
        threshold.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricColor {
    AboveThreshold,
    BelowThreshold,
}

impl MetricColor {
    pub fn css(self) -> &'static str {
        match self {
            MetricColor::AboveThreshold => "green",
            MetricColor::BelowThreshold => "red",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapFigure {
    pub z: Vec<Vec<f64>>,
    pub colorscale: String,
    pub show_scale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineChartFigure {
    pub x: Vec<usize>,
    pub y: Vec<u64>,
    pub line_color: String,
    pub title: String,
    pub x_title: String,
    pub y_title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFragment {
    pub total_cells: usize,
    pub percent_active: f64,
    pub color: MetricColor,
}

impl MetricFragment {
    /// Colours the active percentage against `threshold`. A percentage equal to the
    /// threshold does not clear it.
    pub fn new(average: f64, total_cells: usize, threshold: Threshold) -> Self {
        let percent_active = active_percent(average, total_cells);
        let color = if percent_active <= f64::from(threshold.value()) {
            MetricColor::BelowThreshold
        } else {
            MetricColor::AboveThreshold
        };
        Self {
            total_cells,
            percent_active,
            color,
        }
    }

    pub fn total_text(&self) -> String {
        format!("Total Cells: {}", self.total_cells)
    }

    pub fn percent_text(&self) -> String {
        format!("{:.2}%", self.percent_active)
    }

    /// The fragment as HTML, with the percentage wrapped in a coloured span.
    pub fn to_html(&self) -> String {
        format!(
            "<p>{}</p><p>Percent of Cells Active: <span style=\"color: {}\">{}</span></p>",
            self.total_text(),
            self.color.css(),
            self.percent_text()
        )
    }
}

/// `average` active cells as a percentage of `total_cells`.
pub fn active_percent(average: f64, total_cells: usize) -> f64 {
    if total_cells == 0 {
        return 0.0;
    }
    100.0 * average / total_cells as f64
}

/// Everything a viewer shows for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rendering {
    pub heatmap: HeatmapFigure,
    pub line_chart: LineChartFigure,
    pub metric: MetricFragment,
}

pub fn heatmap_figure(snapshot: &Snapshot) -> HeatmapFigure {
    HeatmapFigure {
        z: snapshot.grid.to_rows(),
        colorscale: HEATMAP_COLORSCALE.to_string(),
        show_scale: false,
    }
}

pub fn line_chart_figure(snapshot: &Snapshot) -> LineChartFigure {
    LineChartFigure {
        x: (0..snapshot.counts.len()).collect(),
        y: snapshot.counts.clone(),
        line_color: LINE_COLOR.to_string(),
        title: LINE_CHART_TITLE.to_string(),
        x_title: "Row".to_string(),
        y_title: "Count".to_string(),
    }
}

pub fn render(snapshot: &Snapshot, threshold: Threshold) -> Rendering {
    Rendering {
        heatmap: heatmap_figure(snapshot),
        line_chart: line_chart_figure(snapshot),
        metric: MetricFragment::new(snapshot.average, snapshot.grid.shape().cell_count(), threshold),
    }
}

/// One viewer's view of one channel.
#[derive(Debug, Clone, Default)]
pub struct RenderSession {
    threshold: Threshold,
    snapshot: Option<Snapshot>,
    rendering: Option<Rendering>,
}

impl RenderSession {
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Applies a published payload. An empty payload keeps the current rendering.
    /// Returns `Ok(true)` when the rendering changed.
    pub fn apply_payload(&mut self, payload: Option<&str>) -> Result<bool, CodecError> {
        match snapshot::decode_payload(payload)? {
            Some(snapshot) => {
                self.rendering = Some(render(&snapshot, self.threshold));
                self.snapshot = Some(snapshot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Changes the threshold and recolours the metric. Figures are unaffected.
    pub fn set_threshold(&mut self, threshold: Threshold) {
        self.threshold = threshold;
        if let (Some(snapshot), Some(rendering)) = (&self.snapshot, &mut self.rendering) {
            rendering.metric =
                MetricFragment::new(snapshot.average, snapshot.grid.shape().cell_count(), threshold);
        }
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    pub fn rendering(&self) -> Option<&Rendering> {
        self.rendering.as_ref()
    }
}
