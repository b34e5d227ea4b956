// THEORY:
// A `Snapshot` is the complete, self-contained state of a channel after a tick:
// the grid that was just read, every count so far, and the running average. It is
// what crosses the boundary between the pipeline and whoever renders it.
//
// The transport format is JSON text with exactly three fields:
//
//     {"data": [[f64, ...], ...], "counts": [u64, ...], "average": f64}
//
// Floats are written in shortest round-trip form and parsed with `serde_json`'s
// `float_roundtrip` feature, so a decode reproduces the encoded values bit for bit.
//
// An empty or missing payload is not an error. It means "nothing published yet",
// and `decode` reports it as `Ok(None)` so renderers can keep what they already show.

use crate::core_modules::grid::GridSample;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("snapshot average must be finite, got {0}")]
    NonFiniteAverage(f64),
    #[error("snapshot grid contains non-finite values")]
    NonFiniteGrid,
    #[error("malformed snapshot payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The decoded state of one channel after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "data")]
    pub grid: GridSample,
    pub counts: Vec<u64>,
    pub average: f64,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    data: &'a GridSample,
    counts: &'a [u64],
    average: f64,
}

/// Serializes a channel's state into the transport payload.
pub fn encode(grid: &GridSample, counts: &[u64], average: f64) -> Result<String, CodecError> {
    // serde_json would silently write NaN and infinities as `null`.
    if !average.is_finite() {
        return Err(CodecError::NonFiniteAverage(average));
    }
    if !grid.is_finite() {
        return Err(CodecError::NonFiniteGrid);
    }
    Ok(serde_json::to_string(&SnapshotRef {
        data: grid,
        counts,
        average,
    })?)
}

/// Parses a transport payload. Blank and `null` payloads mean "no update yet".
pub fn decode(payload: &str) -> Result<Option<Snapshot>, CodecError> {
    let payload = payload.trim();
    if payload.is_empty() || payload == "null" {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(payload)?))
}

/// Like [`decode`], for a slot that may not hold a payload at all.
pub fn decode_payload(payload: Option<&str>) -> Result<Option<Snapshot>, CodecError> {
    match payload {
        Some(payload) => decode(payload),
        None => Ok(None),
    }
}

impl Snapshot {
    pub fn encode(&self) -> Result<String, CodecError> {
        encode(&self.grid, &self.counts, self.average)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::grid::GridShape;

    #[test]
    fn encodes_the_three_named_fields() {
        let grid = GridSample::from_rows(vec![vec![1.5, -2.0], vec![0.0, 3.25]]).unwrap();
        let text = encode(&grid, &[2, 4], 3.0).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["data"], serde_json::json!([[1.5, -2.0], [0.0, 3.25]]));
        assert_eq!(value["counts"], serde_json::json!([2, 4]));
        assert_eq!(value["average"], serde_json::json!(3.0));
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn round_trips_awkward_floats() {
        let grid = GridSample::from_cells(
            GridShape::new(1, 4),
            vec![0.1 + 0.2, -1e-300, 123456.78901234567, f64::MAX],
        )
        .unwrap();
        let average = 2.0 / 3.0;
        let decoded = decode(&encode(&grid, &[1, 2, 3], average).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(decoded.grid, grid);
        assert_eq!(decoded.counts, vec![1, 2, 3]);
        assert_eq!(decoded.average.to_bits(), average.to_bits());
    }

    #[test]
    fn empty_payload_is_no_update() {
        assert!(decode("").unwrap().is_none());
        assert!(decode("   \n").unwrap().is_none());
        assert!(decode("null").unwrap().is_none());
        assert!(decode_payload(None).unwrap().is_none());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(matches!(decode("{\"data\": 3}"), Err(CodecError::Malformed(_))));
        assert!(matches!(decode("not json"), Err(CodecError::Malformed(_))));
        assert!(matches!(
            decode(r#"{"data": [[1.0], [2.0, 3.0]], "counts": [], "average": 0.0}"#),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn refuses_to_encode_non_finite_values() {
        let grid = GridSample::filled(GridShape::new(1, 1), 1.0).unwrap();
        assert!(matches!(
            encode(&grid, &[1], f64::NAN),
            Err(CodecError::NonFiniteAverage(_))
        ));
        let bad = GridSample::filled(GridShape::new(1, 1), f64::INFINITY).unwrap();
        assert!(matches!(encode(&bad, &[1], 1.0), Err(CodecError::NonFiniteGrid)));
    }
}
