//! Heatmap rendering.
//!
//! The artifact pipeline only depends on the [Renderer] trait. [HeatmapRenderer] is the default
//! implementation: it maps each grid cell to a block of pixels using a perceptually uniform
//! gradient and writes a PNG.

use std::path::{Path, PathBuf};

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgba, RgbaImage};
use ndarray::ArrayView2;
use rayon::prelude::*;
use thiserror::Error;

/// Errors raised by a [Renderer].
#[derive(Debug, Error)]
pub enum RenderError {
    /// Error writing the image file
    #[error("failed to write image")]
    Io(#[from] std::io::Error),

    /// Error encoding the image
    #[error("failed to encode image")]
    Image(#[from] image::ImageError),

    /// The image would exceed the maximum supported size
    #[error("grid of {rows}x{cols} cells is too large to render")]
    TooLarge { rows: usize, cols: usize },

    /// The render task stopped without reporting a result
    #[error("render task stopped before completing")]
    Interrupted,
}

/// Renders a 2-D grid to an image file.
///
/// A renderer may return before the destination file is complete. Callers must not assume the
/// file is readable just because the call returned.
pub trait Renderer: Send + Sync {
    /// Render `grid` as a heatmap to `destination`.
    ///
    /// Row 0 of the grid is drawn at the top of the image.
    fn render_heatmap(&self, grid: ArrayView2<'_, f64>, destination: &Path)
        -> Result<(), RenderError>;
}

/// Gradient stops, from low to high values.
const GRADIENT: [[u8; 3]; 5] = [
    [68, 1, 84],
    [59, 82, 139],
    [33, 145, 140],
    [94, 201, 98],
    [253, 231, 37],
];

/// Largest image edge in pixels.
const MAX_EDGE: usize = 16384;

/// PNG heatmap renderer.
#[derive(Clone, Debug)]
pub struct HeatmapRenderer {
    /// Edge length in pixels of the square drawn for each cell
    cell_size: u32,
}

impl Default for HeatmapRenderer {
    fn default() -> Self {
        Self::new(16)
    }
}

impl HeatmapRenderer {
    pub fn new(cell_size: u32) -> Self {
        Self {
            cell_size: cell_size.max(1),
        }
    }
}

/// Interpolate the gradient at `t` in `[0, 1]`.
fn gradient_color(t: f64) -> Rgba<u8> {
    let t = t.clamp(0.0, 1.0);
    let scaled = t * (GRADIENT.len() - 1) as f64;
    let lower = (scaled.floor() as usize).min(GRADIENT.len() - 2);
    let frac = scaled - lower as f64;
    let (a, b) = (GRADIENT[lower], GRADIENT[lower + 1]);
    let mix = |i: usize| (a[i] as f64 + (b[i] as f64 - a[i] as f64) * frac).round() as u8;
    Rgba([mix(0), mix(1), mix(2), 255])
}

/// Returns the minimum and maximum of the finite values in `grid`.
fn value_range(grid: &ArrayView2<'_, f64>) -> Option<(f64, f64)> {
    grid.iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |range, v| match range {
            None => Some((v, v)),
            Some((min, max)) => Some((min.min(v), max.max(v))),
        })
}

/// Map every cell of `grid` to a color, in row-major order.
///
/// Non-finite values are transparent.
fn cell_colors(grid: &ArrayView2<'_, f64>) -> Vec<Rgba<u8>> {
    let range = value_range(grid);
    let (rows, _) = grid.dim();
    (0..rows)
        .into_par_iter()
        .flat_map_iter(|i| {
            grid.row(i)
                .iter()
                .map(|v| match range {
                    _ if !v.is_finite() => Rgba([0, 0, 0, 0]),
                    Some((min, max)) if max > min => gradient_color((v - min) / (max - min)),
                    _ => gradient_color(0.5),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Path used while the image is being written.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

impl Renderer for HeatmapRenderer {
    fn render_heatmap(
        &self,
        grid: ArrayView2<'_, f64>,
        destination: &Path,
    ) -> Result<(), RenderError> {
        let (rows, cols) = grid.dim();
        let cell = self.cell_size as usize;
        if rows.saturating_mul(cell) > MAX_EDGE || cols.saturating_mul(cell) > MAX_EDGE {
            return Err(RenderError::TooLarge { rows, cols });
        }
        let colors = cell_colors(&grid);
        let image = RgbaImage::from_fn(
            (cols * cell) as u32,
            (rows * cell) as u32,
            |x, y| colors[(y / self.cell_size) as usize * cols + (x / self.cell_size) as usize],
        );
        let mut buf = Vec::new();
        PngEncoder::new(&mut buf).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ColorType::Rgba8,
        )?;
        // Rename so that readers never observe a partially written image.
        let partial = partial_path(destination);
        std::fs::write(&partial, &buf)?;
        std::fs::rename(&partial, destination)?;
        tracing::debug!("Rendered {}x{} heatmap to {}", rows, cols, destination.display());
        Ok(())
    }
}
