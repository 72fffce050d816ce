//! Image preprocessing strategies applied before feature extraction.
//!
//! Every strategy maps a grayscale image to a grayscale image of the same
//! size, except the border crop, which removes a fixed margin on all sides.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const CLAHE_TILES: usize = 8;
/// Histogram clip limit as a fraction of the tile's pixel count.
const CLAHE_CLIP: f32 = 0.02;

const TT_GAMMA: f32 = 0.2;
const TT_SIGMA_INNER: f32 = 1.0;
const TT_SIGMA_OUTER: f32 = 2.0;
const TT_ALPHA: f32 = 0.1;
const TT_TAU: f32 = 10.0;

const RETINA_SIGMA: f32 = 3.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown preprocessing selector: {0}")]
pub struct UnknownPreprocess(pub String);

/// Named preprocessing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PreprocessKind {
    None,
    EqHist,
    Clahe,
    Retina,
    TanTriggs,
    Crop,
}

impl PreprocessKind {
    pub const ALL: [PreprocessKind; 6] = [
        PreprocessKind::None,
        PreprocessKind::EqHist,
        PreprocessKind::Clahe,
        PreprocessKind::Retina,
        PreprocessKind::TanTriggs,
        PreprocessKind::Crop,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PreprocessKind::None => "none",
            PreprocessKind::EqHist => "eqhist",
            PreprocessKind::Clahe => "clahe",
            PreprocessKind::Retina => "retina",
            PreprocessKind::TanTriggs => "tantriggs",
            PreprocessKind::Crop => "crop",
        }
    }

    /// Look up a strategy by its numeric selector.
    pub fn from_index(index: usize) -> Result<Self, UnknownPreprocess> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or_else(|| UnknownPreprocess(index.to_string()))
    }
}

impl fmt::Display for PreprocessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts either a display name (case-insensitive) or a numeric selector.
impl FromStr for PreprocessKind {
    type Err = UnknownPreprocess;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(index) = s.parse::<usize>() {
            return Self::from_index(index);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownPreprocess(s.to_string()))
    }
}

impl TryFrom<String> for PreprocessKind {
    type Error = UnknownPreprocess;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PreprocessKind> for String {
    fn from(kind: PreprocessKind) -> Self {
        kind.name().to_string()
    }
}

/// A configured preprocessing step: an optional border crop followed by one
/// strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
    kind: PreprocessKind,
    crop: u32,
}

impl Preprocessor {
    pub fn new(kind: PreprocessKind, crop: u32) -> Self {
        Self { kind, crop }
    }

    pub fn kind(&self) -> PreprocessKind {
        self.kind
    }

    pub fn crop(&self) -> u32 {
        self.crop
    }

    pub fn process(&self, img: &GrayImage) -> GrayImage {
        let mut out = if self.crop > 0 {
            crop_border(img, self.crop)
        } else {
            img.clone()
        };
        match self.kind {
            PreprocessKind::None | PreprocessKind::Crop => {}
            PreprocessKind::EqHist => equalize_hist(&mut out),
            PreprocessKind::Clahe => clahe(&mut out, CLAHE_TILES, CLAHE_CLIP),
            PreprocessKind::Retina => out = retina(&out),
            PreprocessKind::TanTriggs => out = tan_triggs(&out),
        }
        out
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(PreprocessKind::None, 0)
    }
}

/// Remove `margin` pixels from every side. Images too small to keep any
/// pixel are returned unchanged.
pub fn crop_border(img: &GrayImage, margin: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    if margin.saturating_mul(2) >= w || margin.saturating_mul(2) >= h {
        tracing::warn!(width = w, height = h, margin, "crop margin exceeds image; skipping crop");
        return img.clone();
    }
    image::imageops::crop_imm(img, margin, margin, w - 2 * margin, h - 2 * margin).to_image()
}

/// Global histogram equalization in place.
pub fn equalize_hist(img: &mut GrayImage) {
    let total = img.as_raw().len();
    if total == 0 {
        return;
    }
    let mut hist = [0usize; 256];
    for &p in img.as_raw() {
        hist[p as usize] += 1;
    }
    let mut cdf = [0usize; 256];
    let mut running = 0;
    for (bin, count) in hist.iter().enumerate() {
        running += count;
        cdf[bin] = running;
    }
    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let denom = total - cdf_min;
    if denom == 0 {
        return;
    }
    let mut lut = [0u8; 256];
    for (bin, value) in lut.iter_mut().enumerate() {
        let scaled = (cdf[bin].saturating_sub(cdf_min)) as f32 / denom as f32 * 255.0;
        *value = scaled.round().clamp(0.0, 255.0) as u8;
    }
    for p in img.iter_mut() {
        *p = lut[*p as usize];
    }
}

/// Contrast-limited adaptive histogram equalization in place, on a square
/// `tiles × tiles` grid with bilinear blending between tile mappings.
pub fn clahe(img: &mut GrayImage, tiles: usize, clip_fraction: f32) {
    let (w, h) = (img.width() as usize, img.height() as usize);
    if tiles == 0 || w < tiles || h < tiles {
        return;
    }
    let tile_w = w / tiles;
    let tile_h = h / tiles;
    let tile_pixels = (tile_w * tile_h) as f32;
    let clip = ((clip_fraction * tile_pixels) as u32).max(1);

    let mut mappings: Vec<[f32; 256]> = Vec::with_capacity(tiles * tiles);
    for ty in 0..tiles {
        for tx in 0..tiles {
            let mut hist = [0u32; 256];
            for y in ty * tile_h..(ty + 1) * tile_h {
                for x in tx * tile_w..(tx + 1) * tile_w {
                    hist[img.get_pixel(x as u32, y as u32)[0] as usize] += 1;
                }
            }

            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let share = excess / 256;
            let remainder = (excess % 256) as usize;
            for (i, bin) in hist.iter_mut().enumerate() {
                *bin += share + u32::from(i < remainder);
            }

            let mut mapping = [0f32; 256];
            let mut acc = 0f32;
            for (i, &count) in hist.iter().enumerate() {
                acc += count as f32;
                mapping[i] = acc;
            }
            let lowest = mapping.iter().copied().find(|&v| v > 0.0).unwrap_or(0.0);
            let span = tile_pixels - lowest;
            if span > 0.0 {
                for v in mapping.iter_mut() {
                    *v = ((*v - lowest) / span * 255.0).clamp(0.0, 255.0);
                }
            }
            mappings.push(mapping);
        }
    }

    let last = (tiles - 1) as f32;
    for y in 0..h {
        let fy = (y as f32 / tile_h as f32 - 0.5).clamp(0.0, last);
        let r0 = fy as usize;
        let r1 = (r0 + 1).min(tiles - 1);
        let dy = fy - r0 as f32;
        for x in 0..w {
            let fx = (x as f32 / tile_w as f32 - 0.5).clamp(0.0, last);
            let c0 = fx as usize;
            let c1 = (c0 + 1).min(tiles - 1);
            let dx = fx - c0 as f32;

            let pixel = img.get_pixel(x as u32, y as u32)[0] as usize;
            let top = mappings[r0 * tiles + c0][pixel] * (1.0 - dx) + mappings[r0 * tiles + c1][pixel] * dx;
            let bottom = mappings[r1 * tiles + c0][pixel] * (1.0 - dx) + mappings[r1 * tiles + c1][pixel] * dx;
            let value = top * (1.0 - dy) + bottom * dy;
            img.put_pixel(x as u32, y as u32, image::Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
}

/// Tan & Triggs illumination normalization: gamma correction, difference of
/// Gaussians, two-stage contrast equalization and tanh compression.
pub fn tan_triggs(img: &GrayImage) -> GrayImage {
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w == 0 || h == 0 {
        return img.clone();
    }
    let gamma: Vec<f32> = img.as_raw().iter().map(|&p| (p as f32).powf(TT_GAMMA)).collect();
    let inner = gaussian_blur(&gamma, w, h, TT_SIGMA_INNER);
    let outer = gaussian_blur(&gamma, w, h, TT_SIGMA_OUTER);
    let mut dog: Vec<f32> = inner.iter().zip(&outer).map(|(a, b)| a - b).collect();

    let n = dog.len() as f32;
    let m1 = (dog.iter().map(|v| v.abs().powf(TT_ALPHA)).sum::<f32>() / n).powf(1.0 / TT_ALPHA);
    if m1 > 0.0 {
        dog.iter_mut().for_each(|v| *v /= m1);
    }
    let m2 = (dog
        .iter()
        .map(|v| v.abs().min(TT_TAU).powf(TT_ALPHA))
        .sum::<f32>()
        / n)
        .powf(1.0 / TT_ALPHA);
    if m2 > 0.0 {
        dog.iter_mut().for_each(|v| *v /= m2);
    }
    dog.iter_mut().for_each(|v| *v = TT_TAU * (*v / TT_TAU).tanh());

    to_gray(&dog, w, h)
}

/// Simplified retina model: photoreceptor-style local adaptation against a
/// blurred luminance estimate, then contrast stretch.
pub fn retina(img: &GrayImage) -> GrayImage {
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w == 0 || h == 0 {
        return img.clone();
    }
    let input: Vec<f32> = img.as_raw().iter().map(|&p| p as f32).collect();
    let local = gaussian_blur(&input, w, h, RETINA_SIGMA);
    let adapted: Vec<f32> = input
        .iter()
        .zip(&local)
        .map(|(&i, &l)| {
            let denom = i + l + 1.0;
            i * (255.0 + l) / denom
        })
        .collect();
    to_gray(&adapted, w, h)
}

/// Separable Gaussian blur on a float buffer with clamped borders.
fn gaussian_blur(data: &[f32], w: usize, h: usize, sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as isize;
    let kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let norm: f32 = kernel.iter().sum();

    let mut horizontal = vec![0f32; data.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = (x as isize + k as isize - radius).clamp(0, w as isize - 1) as usize;
                acc += weight * data[y * w + sx];
            }
            horizontal[y * w + x] = acc / norm;
        }
    }

    let mut out = vec![0f32; data.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = (y as isize + k as isize - radius).clamp(0, h as isize - 1) as usize;
                acc += weight * horizontal[sy * w + x];
            }
            out[y * w + x] = acc / norm;
        }
    }
    out
}

/// Min-max stretch a float buffer into an 8-bit image.
fn to_gray(data: &[f32], w: usize, h: usize) -> GrayImage {
    let (lo, hi) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi - lo;
    let pixels: Vec<u8> = data
        .iter()
        .map(|&v| {
            if range > 0.0 {
                ((v - lo) / range * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                0
            }
        })
        .collect();
    // Buffer length is w * h by construction.
    GrayImage::from_fn(w as u32, h as u32, |x, y| image::Luma([pixels[y as usize * w + x as usize]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn stddev(img: &GrayImage) -> f32 {
        let data = img.as_raw();
        let n = data.len() as f32;
        let mean = data.iter().map(|&b| b as f32).sum::<f32>() / n;
        (data.iter().map(|&b| (b as f32 - mean).powi(2)).sum::<f32>() / n).sqrt()
    }

    fn low_contrast(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([100 + ((x + y * w) % 11) as u8]))
    }

    #[test]
    fn test_kind_names_and_indices() {
        for (i, kind) in PreprocessKind::ALL.iter().enumerate() {
            assert_eq!(PreprocessKind::from_index(i).unwrap(), *kind);
            assert_eq!(kind.name().parse::<PreprocessKind>().unwrap(), *kind);
        }
        assert_eq!("CLAHE".parse::<PreprocessKind>().unwrap(), PreprocessKind::Clahe);
        assert_eq!("4".parse::<PreprocessKind>().unwrap(), PreprocessKind::TanTriggs);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(PreprocessKind::from_index(6).is_err());
        assert_eq!(
            "sharpen".parse::<PreprocessKind>(),
            Err(UnknownPreprocess("sharpen".into()))
        );
    }

    #[test]
    fn test_crop_border() {
        let img = GrayImage::from_fn(10, 8, |x, y| Luma([(x + 10 * y) as u8]));
        let out = crop_border(&img, 2);
        assert_eq!(out.dimensions(), (6, 4));
        assert_eq!(out.get_pixel(0, 0)[0], 22);
    }

    #[test]
    fn test_crop_border_too_large_keeps_image() {
        let img = GrayImage::new(4, 4);
        assert_eq!(crop_border(&img, 2).dimensions(), (4, 4));
    }

    #[test]
    fn test_equalize_hist_stretches_range() {
        let mut img = low_contrast(16, 16);
        equalize_hist(&mut img);
        let min = *img.as_raw().iter().min().unwrap();
        let max = *img.as_raw().iter().max().unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_equalize_hist_uniform_image_unchanged() {
        let mut img = GrayImage::from_pixel(4, 4, Luma([77]));
        equalize_hist(&mut img);
        assert!(img.as_raw().iter().all(|&p| p == 77));
    }

    #[test]
    fn test_clahe_increases_contrast() {
        let mut img = low_contrast(16, 16);
        let before = stddev(&img);
        clahe(&mut img, 2, 0.02);
        assert!(stddev(&img) > before);
    }

    #[test]
    fn test_preprocessor_preserves_size() {
        let img = low_contrast(24, 20);
        for kind in PreprocessKind::ALL {
            let out = Preprocessor::new(kind, 0).process(&img);
            assert_eq!(out.dimensions(), (24, 20), "{kind}");
        }
    }

    #[test]
    fn test_preprocessor_applies_crop_first() {
        let img = low_contrast(24, 20);
        let out = Preprocessor::new(PreprocessKind::EqHist, 3).process(&img);
        assert_eq!(out.dimensions(), (18, 14));
    }

    #[test]
    fn test_tan_triggs_spans_full_range() {
        let img = GrayImage::from_fn(16, 16, |x, _| Luma([if x < 8 { 40 } else { 200 }]));
        let out = tan_triggs(&img);
        assert_eq!(*out.as_raw().iter().max().unwrap(), 255);
        assert_eq!(*out.as_raw().iter().min().unwrap(), 0);
    }

    #[test]
    fn test_filters_handle_empty_image() {
        let empty = GrayImage::new(0, 0);
        assert_eq!(tan_triggs(&empty).dimensions(), (0, 0));
        assert_eq!(retina(&empty).dimensions(), (0, 0));
        let mut e = empty.clone();
        equalize_hist(&mut e);
        clahe(&mut e, 8, 0.02);
    }
}
