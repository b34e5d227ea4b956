// Server-side rendering of a channel's grid as a Viridis PNG, for clients that
// want a picture instead of figure data.

use image::error::{LimitError, LimitErrorKind};
use image::{ImageEncoder, ImageError};
use pressure_map::{GridSample, GridShape};

/// Viridis sampled at nine evenly spaced stops.
pub const VIRIDIS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [71, 45, 123],
    [59, 82, 139],
    [44, 114, 142],
    [33, 145, 140],
    [40, 174, 128],
    [94, 201, 98],
    [173, 220, 48],
    [253, 231, 37],
];

/// Maps `t` in `[0, 1]` onto the Viridis scale. Values outside are clamped.
pub fn viridis(t: f64) -> [u8; 3] {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (VIRIDIS.len() - 1) as f64;
    let lower = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = scaled - lower as f64;
    let (a, b) = (VIRIDIS[lower], VIRIDIS[lower + 1]);
    let mut out = [0u8; 3];
    for (i, channel) in out.iter_mut().enumerate() {
        let value = f64::from(a[i]) + (f64::from(b[i]) - f64::from(a[i])) * frac;
        *channel = value.round() as u8;
    }
    out
}

/// Scales the grid's values onto `[0, 1]` by its own min and max. A flat grid
/// sits in the middle of the scale.
fn normalizer(grid: &GridSample) -> impl Fn(f64) -> f64 {
    let (min, max) = grid
        .cells()
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;
    move |v| {
        if span > 0.0 && span.is_finite() {
            (v - min) / span
        } else {
            0.5
        }
    }
}

/// Largest image the renderer produces, in pixels.
pub const MAX_PIXELS: u64 = 4096 * 4096;

fn dimension_error() -> ImageError {
    ImageError::Limits(LimitError::from_kind(LimitErrorKind::DimensionError))
}

/// The cell edge actually used for `shape`: `cell_px`, shrunk until the whole
/// image fits in `max_pixels`. Fails when even one pixel per cell is too many.
pub fn fit_cell_px(shape: GridShape, cell_px: u32, max_pixels: u64) -> Result<u32, ImageError> {
    let cells = u64::try_from(shape.rows)
        .ok()
        .zip(u64::try_from(shape.cols).ok())
        .and_then(|(rows, cols)| rows.checked_mul(cols))
        .filter(|&cells| cells > 0 && cells <= max_pixels)
        .ok_or_else(dimension_error)?;
    let fit = (max_pixels / cells).isqrt();
    Ok(cell_px.max(1).min(u32::try_from(fit).unwrap_or(u32::MAX)))
}

/// Raw RGB pixels for `grid`, each cell drawn as a `cell_px` square (shrunk to
/// stay within `MAX_PIXELS`). Row 0 is drawn at the bottom, the way the
/// dashboard's heatmaps lay out their y axis.
pub fn rgb_pixels(grid: &GridSample, cell_px: u32) -> Result<(u32, u32, Vec<u8>), ImageError> {
    let shape = grid.shape();
    let cell_px = fit_cell_px(shape, cell_px, MAX_PIXELS)?;
    let edge = |cells: usize| {
        u64::try_from(cells)
            .ok()
            .and_then(|cells| cells.checked_mul(u64::from(cell_px)))
            .and_then(|px| u32::try_from(px).ok())
            .ok_or_else(dimension_error)
    };
    let width = edge(shape.cols)?;
    let height = edge(shape.rows)?;
    let len = usize::try_from(u64::from(width) * u64::from(height) * 3)
        .map_err(|_| dimension_error())?;
    let normalize = normalizer(grid);

    let mut buffer = Vec::with_capacity(len);
    for y in 0..height {
        let row = shape.rows - 1 - (y / cell_px) as usize;
        for x in 0..width {
            let col = (x / cell_px) as usize;
            let value = grid.get(row, col).unwrap_or(0.0);
            buffer.extend_from_slice(&viridis(normalize(value)));
        }
    }
    Ok((width, height, buffer))
}

/// Encodes `grid` as a PNG image.
pub fn render_png(grid: &GridSample, cell_px: u32) -> Result<Vec<u8>, ImageError> {
    let (width, height, buffer) = rgb_pixels(grid, cell_px)?;
    let mut out = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut out);
    encoder.write_image(&buffer, width, height, image::ExtendedColorType::Rgb8)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_endpoints() {
        assert_eq!(viridis(0.0), VIRIDIS[0]);
        assert_eq!(viridis(1.0), VIRIDIS[8]);
        assert_eq!(viridis(0.5), VIRIDIS[4]);
        assert_eq!(viridis(-3.0), VIRIDIS[0]);
        assert_eq!(viridis(7.0), VIRIDIS[8]);
        assert_eq!(viridis(f64::NAN), VIRIDIS[0]);
    }

    #[test]
    fn png_has_grid_proportions() {
        let grid = GridSample::filled(GridShape::new(8, 6), 3.0).unwrap();
        let png = render_png(&grid, 10).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.width(), 60);
        assert_eq!(decoded.height(), 80);
        // A flat grid is drawn in the middle of the scale.
        assert_eq!(decoded.get_pixel(0, 0).0, VIRIDIS[4]);
    }

    #[test]
    fn first_row_is_drawn_at_the_bottom() {
        let grid = GridSample::from_rows(vec![vec![0.0], vec![1.0]]).unwrap();
        let png = render_png(&grid, 4).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0).0, VIRIDIS[8]);
        assert_eq!(decoded.get_pixel(0, 7).0, VIRIDIS[0]);
    }

    #[test]
    fn cell_size_shrinks_to_fit_the_pixel_budget() {
        assert_eq!(fit_cell_px(GridShape::new(8, 6), 40, MAX_PIXELS).unwrap(), 40);
        assert_eq!(fit_cell_px(GridShape::new(2, 2), 40, 64).unwrap(), 4);
        assert_eq!(fit_cell_px(GridShape::new(2, 2), 0, 64).unwrap(), 1);
        assert!(matches!(
            fit_cell_px(GridShape::new(10, 10), 40, 99),
            Err(ImageError::Limits(_))
        ));
    }

    #[test]
    fn large_grid_renders_within_budget() {
        let grid = GridSample::filled(GridShape::new(1000, 1000), 1.0).unwrap();
        let (width, height, buffer) = rgb_pixels(&grid, 40).unwrap();
        assert_eq!((width, height), (4000, 4000));
        assert_eq!(buffer.len(), 4000 * 4000 * 3);
        assert!(u64::from(width) * u64::from(height) <= MAX_PIXELS);
    }
}
