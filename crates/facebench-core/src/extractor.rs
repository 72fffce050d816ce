//! Feature extractors: image → fixed-length feature vector.
//!
//! The output dimension of every extractor depends only on its parameters,
//! never on the size or content of the input image.

use crate::selector::{named_selector, ConfigError};
use crate::types::{FeatureError, FeatureVector};
use facebench_img::GrayImage;
use image::imageops::FilterType;
use std::sync::OnceLock;

const LBP_BINS: usize = 256;
const LBPU_BINS: usize = 59;
const GRAD_BINS: usize = 9;

/// Clockwise 3×3 neighbourhood starting at the top-left pixel.
const NEIGHBOURS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

named_selector! {
    /// Feature extraction algorithm.
    ExtractorKind("extractor") {
        Pixels => "Pixels",
        Lbp => "Lbp",
        LbpUniform => "LbpU",
        Gradient => "Grad",
    }
}

/// Construction parameters shared by all extractor variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorParams {
    /// Output size of the pixel extractor's resize.
    pub pixel_size: (u32, u32),
    /// Histogram grid (columns, rows) of the texture extractors.
    pub grid: (u32, u32),
}

impl Default for ExtractorParams {
    fn default() -> Self {
        Self {
            pixel_size: (120, 120),
            grid: (8, 8),
        }
    }
}

/// Image → feature vector. Deterministic and side-effect-free.
pub trait Extractor {
    fn extract(&self, image: &GrayImage) -> Result<FeatureVector, FeatureError>;

    /// Length of every vector this extractor produces.
    fn dimension(&self) -> usize;
}

pub fn create_extractor(
    kind: ExtractorKind,
    params: &ExtractorParams,
) -> Result<Box<dyn Extractor>, ConfigError> {
    let (gx, gy) = params.grid;
    if gx == 0 || gy == 0 {
        return Err(ConfigError::InvalidParameter {
            name: "grid",
            reason: format!("{gx}x{gy} has an empty axis"),
        });
    }
    let (pw, ph) = params.pixel_size;
    if pw == 0 || ph == 0 {
        return Err(ConfigError::InvalidParameter {
            name: "pixel_size",
            reason: format!("{pw}x{ph} has an empty axis"),
        });
    }
    let grid = Grid { cols: gx, rows: gy };
    let cells = (gx as usize).checked_mul(gy as usize);
    let dimension = match kind {
        ExtractorKind::Pixels => (pw as usize).checked_mul(ph as usize),
        ExtractorKind::Lbp => cells.and_then(|c| c.checked_mul(LBP_BINS)),
        ExtractorKind::LbpUniform => cells.and_then(|c| c.checked_mul(LBPU_BINS)),
        ExtractorKind::Gradient => cells.and_then(|c| c.checked_mul(GRAD_BINS)),
    };
    if dimension.is_none() {
        return Err(ConfigError::InvalidParameter {
            name: if kind == ExtractorKind::Pixels { "pixel_size" } else { "grid" },
            reason: "feature dimension overflows".into(),
        });
    }
    let extractor: Box<dyn Extractor> = match kind {
        ExtractorKind::Pixels => Box::new(PixelExtractor {
            width: pw,
            height: ph,
        }),
        ExtractorKind::Lbp => Box::new(LbpExtractor {
            grid,
            uniform: false,
        }),
        ExtractorKind::LbpUniform => Box::new(LbpExtractor {
            grid,
            uniform: true,
        }),
        ExtractorKind::Gradient => Box::new(GradientExtractor { grid }),
    };
    Ok(extractor)
}

/// Resizes the image and emits its intensities scaled to [0, 1].
pub struct PixelExtractor {
    width: u32,
    height: u32,
}

impl Extractor for PixelExtractor {
    fn extract(&self, image: &GrayImage) -> Result<FeatureVector, FeatureError> {
        ensure_not_empty(image)?;
        let resized = image::imageops::resize(image, self.width, self.height, FilterType::Triangle);
        Ok(resized.as_raw().iter().map(|&p| p as f32 / 255.0).collect::<Vec<_>>().into())
    }

    fn dimension(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Spatial histogram grid over the image.
#[derive(Debug, Clone, Copy)]
struct Grid {
    cols: u32,
    rows: u32,
}

impl Grid {
    fn cells(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    /// Cell index of pixel (x, y) in an image of size (w, h).
    fn cell_of(&self, x: u32, y: u32, w: u32, h: u32) -> usize {
        let cx = (x as u64 * self.cols as u64 / w as u64) as usize;
        let cy = (y as u64 * self.rows as u64 / h as u64) as usize;
        cy * self.cols as usize + cx
    }
}

/// Grid of local-binary-pattern histograms, each normalized by its cell's
/// pixel count.
pub struct LbpExtractor {
    grid: Grid,
    uniform: bool,
}

impl LbpExtractor {
    fn bins(&self) -> usize {
        if self.uniform {
            LBPU_BINS
        } else {
            LBP_BINS
        }
    }
}

impl Extractor for LbpExtractor {
    fn extract(&self, image: &GrayImage) -> Result<FeatureVector, FeatureError> {
        ensure_not_empty(image)?;
        let (w, h) = image.dimensions();
        let bins = self.bins();
        let mut hist = vec![0f32; self.grid.cells() * bins];
        let mut counts = vec![0u32; self.grid.cells()];
        let table = uniform_table();

        for y in 1..h.saturating_sub(1) {
            for x in 1..w.saturating_sub(1) {
                let center = image.get_pixel(x, y)[0];
                let mut code = 0u8;
                for (bit, (dx, dy)) in NEIGHBOURS.iter().enumerate() {
                    let nx = (x as i32 + dx) as u32;
                    let ny = (y as i32 + dy) as u32;
                    if image.get_pixel(nx, ny)[0] >= center {
                        code |= 1 << bit;
                    }
                }
                let bin = if self.uniform {
                    table[code as usize] as usize
                } else {
                    code as usize
                };
                let cell = self.grid.cell_of(x, y, w, h);
                hist[cell * bins + bin] += 1.0;
                counts[cell] += 1;
            }
        }

        normalize_cells(&mut hist, &counts, bins);
        Ok(hist.into())
    }

    fn dimension(&self) -> usize {
        self.grid.cells() * self.bins()
    }
}

/// Grid of unsigned gradient-orientation histograms, magnitude weighted and
/// normalized per cell by pixel count.
pub struct GradientExtractor {
    grid: Grid,
}

impl Extractor for GradientExtractor {
    fn extract(&self, image: &GrayImage) -> Result<FeatureVector, FeatureError> {
        ensure_not_empty(image)?;
        let (w, h) = image.dimensions();
        let mut hist = vec![0f32; self.grid.cells() * GRAD_BINS];
        let mut counts = vec![0u32; self.grid.cells()];
        let px = |x: u32, y: u32| image.get_pixel(x, y)[0] as f32;

        for y in 1..h.saturating_sub(1) {
            for x in 1..w.saturating_sub(1) {
                let gx = px(x + 1, y) - px(x - 1, y);
                let gy = px(x, y + 1) - px(x, y - 1);
                let magnitude = (gx * gx + gy * gy).sqrt() / 255.0;
                // Fold the angle into [0, π).
                let angle = gy.atan2(gx).rem_euclid(std::f32::consts::PI);
                let bin = ((angle / std::f32::consts::PI * GRAD_BINS as f32) as usize).min(GRAD_BINS - 1);
                let cell = self.grid.cell_of(x, y, w, h);
                hist[cell * GRAD_BINS + bin] += magnitude;
                counts[cell] += 1;
            }
        }

        normalize_cells(&mut hist, &counts, GRAD_BINS);
        Ok(hist.into())
    }

    fn dimension(&self) -> usize {
        self.grid.cells() * GRAD_BINS
    }
}

fn ensure_not_empty(image: &GrayImage) -> Result<(), FeatureError> {
    if image.width() == 0 || image.height() == 0 {
        Err(FeatureError::EmptyImage)
    } else {
        Ok(())
    }
}

fn normalize_cells(hist: &mut [f32], counts: &[u32], bins: usize) {
    for (cell, &count) in counts.iter().enumerate() {
        if count > 0 {
            for v in &mut hist[cell * bins..(cell + 1) * bins] {
                *v /= count as f32;
            }
        }
    }
}

/// Maps each 8-bit LBP code to one of 58 uniform-pattern bins (at most two
/// 0/1 transitions around the circle) or to the shared bin 58.
fn uniform_table() -> &'static [u8; 256] {
    static TABLE: OnceLock<[u8; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [(LBPU_BINS - 1) as u8; 256];
        let mut next = 0u8;
        for (code, slot) in table.iter_mut().enumerate() {
            let rotated = (code as u8).rotate_left(1);
            if (code as u8 ^ rotated).count_ones() <= 2 {
                *slot = next;
                next += 1;
            }
        }
        table
    })
}
