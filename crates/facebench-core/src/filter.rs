//! Optional post-extraction feature transforms.

use crate::extractor::Extractor;
use crate::selector::{named_selector, ConfigError};
use crate::types::{FeatureError, FeatureVector};
use facebench_img::GrayImage;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::OnceCell;

named_selector! {
    /// Post-extraction feature transform. `None` means no filter stage.
    FilterKind("filter") {
        None => "none",
        Sqrt => "sqrt",
        L2Norm => "l2norm",
        RandomProjection => "rproj",
    }
}

impl Default for FilterKind {
    fn default() -> Self {
        FilterKind::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParams {
    /// Output dimension of the random projection.
    pub projection_dim: usize,
    /// Seed of the random projection matrix.
    pub seed: u64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            projection_dim: 128,
            seed: 0x5eed,
        }
    }
}

/// Feature vector → feature vector. May change the dimension.
pub trait Filter {
    fn filter(&self, feature: FeatureVector) -> Result<FeatureVector, FeatureError>;
}

/// Build the filter stage for `kind`; `FilterKind::None` yields no stage.
pub fn create_filter(
    kind: FilterKind,
    params: &FilterParams,
) -> Result<Option<Box<dyn Filter>>, ConfigError> {
    let filter: Box<dyn Filter> = match kind {
        FilterKind::None => return Ok(None),
        FilterKind::Sqrt => Box::new(SqrtFilter),
        FilterKind::L2Norm => Box::new(L2NormFilter),
        FilterKind::RandomProjection => {
            if params.projection_dim == 0 {
                return Err(ConfigError::InvalidParameter {
                    name: "projection_dim",
                    reason: "must be at least 1".into(),
                });
            }
            Box::new(RandomProjection::new(params.projection_dim, params.seed))
        }
    };
    Ok(Some(filter))
}

/// Extractor followed by the optional filter stage. Every vector that is
/// stored or compared goes through [`FeatureChain::features`].
#[derive(Clone, Copy)]
pub struct FeatureChain<'a> {
    extractor: &'a dyn Extractor,
    filter: Option<&'a dyn Filter>,
}

impl<'a> FeatureChain<'a> {
    pub fn new(extractor: &'a dyn Extractor, filter: Option<&'a dyn Filter>) -> Self {
        Self { extractor, filter }
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    pub fn features(&self, image: &GrayImage) -> Result<FeatureVector, FeatureError> {
        let raw = self.extractor.extract(image)?;
        match self.filter {
            Some(filter) => filter.filter(raw),
            None => Ok(raw),
        }
    }
}

/// Element-wise signed square root, turning L2 comparisons of histograms
/// into Hellinger comparisons.
pub struct SqrtFilter;

impl Filter for SqrtFilter {
    fn filter(&self, feature: FeatureVector) -> Result<FeatureVector, FeatureError> {
        let mut values = feature.into_vec();
        for v in values.iter_mut() {
            *v = v.signum() * v.abs().sqrt();
        }
        Ok(values.into())
    }
}

/// Scales to unit Euclidean length. Zero vectors pass through unchanged.
pub struct L2NormFilter;

impl Filter for L2NormFilter {
    fn filter(&self, feature: FeatureVector) -> Result<FeatureVector, FeatureError> {
        let mut values = feature.into_vec();
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            values.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(values.into())
    }
}

/// Seeded random ±1 projection to a fixed dimension.
///
/// The projection matrix is drawn on first use, when the input dimension
/// becomes known; later inputs must have that same dimension.
pub struct RandomProjection {
    output_dim: usize,
    seed: u64,
    matrix: OnceCell<Array2<f32>>,
}

impl RandomProjection {
    pub fn new(output_dim: usize, seed: u64) -> Self {
        Self {
            output_dim,
            seed,
            matrix: OnceCell::new(),
        }
    }

    fn draw(&self, input_dim: usize) -> Array2<f32> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let scale = 1.0 / (self.output_dim as f32).sqrt();
        tracing::debug!(input_dim, output_dim = self.output_dim, "drawing projection matrix");
        Array2::from_shape_fn((self.output_dim, input_dim), |_| {
            if rng.gen::<bool>() {
                scale
            } else {
                -scale
            }
        })
    }
}

impl Filter for RandomProjection {
    fn filter(&self, feature: FeatureVector) -> Result<FeatureVector, FeatureError> {
        if feature.is_empty() {
            return Err(FeatureError::EmptyVector);
        }
        let matrix = self.matrix.get_or_init(|| self.draw(feature.len()));
        if matrix.ncols() != feature.len() {
            return Err(FeatureError::DimensionMismatch {
                expected: matrix.ncols(),
                actual: feature.len(),
            });
        }
        Ok(matrix.dot(&feature.view()).to_vec().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(values: &[f32]) -> FeatureVector {
        FeatureVector::new(values.to_vec())
    }

    #[test]
    fn test_none_builds_no_stage() {
        assert!(create_filter(FilterKind::None, &FilterParams::default())
            .unwrap()
            .is_none());
        assert_eq!(FilterKind::default(), FilterKind::None);
    }

    #[test]
    fn test_sqrt_keeps_sign() {
        let out = SqrtFilter.filter(fv(&[4.0, -9.0, 0.0])).unwrap();
        assert_eq!(out.as_slice(), &[2.0, -3.0, 0.0]);
    }

    #[test]
    fn test_l2norm_unit_length() {
        let out = L2NormFilter.filter(fv(&[3.0, 4.0])).unwrap();
        assert!((out.as_slice()[0] - 0.6).abs() < 1e-6);
        assert!((out.as_slice()[1] - 0.8).abs() < 1e-6);
        assert_eq!(L2NormFilter.filter(fv(&[0.0, 0.0])).unwrap().as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn test_projection_reduces_dimension_deterministically() {
        let a = RandomProjection::new(4, 7);
        let b = RandomProjection::new(4, 7);
        let input = fv(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]);
        let out_a = a.filter(input.clone()).unwrap();
        let out_b = b.filter(input).unwrap();
        assert_eq!(out_a.len(), 4);
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn test_projection_rejects_changed_input_dimension() {
        let p = RandomProjection::new(2, 1);
        p.filter(fv(&[1.0, 2.0, 3.0])).unwrap();
        assert_eq!(
            p.filter(fv(&[1.0, 2.0])),
            Err(FeatureError::DimensionMismatch { expected: 3, actual: 2 })
        );
    }

    #[test]
    fn test_chain_applies_filter_when_present() {
        use crate::extractor::{create_extractor, ExtractorKind, ExtractorParams};
        use image::Luma;

        let params = ExtractorParams {
            pixel_size: (2, 2),
            ..ExtractorParams::default()
        };
        let extractor = create_extractor(ExtractorKind::Pixels, &params).unwrap();
        let img = GrayImage::from_pixel(4, 4, Luma([255]));

        let plain = FeatureChain::new(extractor.as_ref(), None);
        assert!(!plain.has_filter());
        assert_eq!(plain.features(&img).unwrap().as_slice(), &[1.0; 4]);

        let norm = L2NormFilter;
        let chained = FeatureChain::new(extractor.as_ref(), Some(&norm));
        assert!(chained.has_filter());
        assert_eq!(chained.features(&img).unwrap().as_slice(), &[0.5; 4]);
    }

    #[test]
    fn test_zero_projection_dim_rejected() {
        let params = FilterParams {
            projection_dim: 0,
            ..FilterParams::default()
        };
        assert!(create_filter(FilterKind::RandomProjection, &params).is_err());
    }
}
