//! Closed-set classifiers: trained on labelled feature rows, predict the
//! identity label of a new feature vector.

use crate::metric::Metric;
use crate::selector::named_selector;
use crate::types::{FeatureError, FeatureMatrix, FeatureVector};
use facebench_img::Label;
use ndarray::Array2;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("{labels} labels for {rows} feature rows")]
    LabelCountMismatch { rows: usize, labels: usize },
    #[error("training failed: {0}")]
    TrainingFailed(String),
    #[error("model used before training")]
    NotTrained,
    #[error(transparent)]
    Feature(#[from] FeatureError),
}

named_selector! {
    /// Comparison used by a classifier or verifier.
    ClassifierKind("classifier") {
        NormL2 => "NORM_L2",
        NormL1 => "NORM_L1",
        HistHellinger => "HIST_HELL",
        HistIntersection => "HIST_ISEC",
        HistChiSquare => "HIST_CHISQR",
        Cosine => "COSINE",
    }
}

impl ClassifierKind {
    pub fn metric(self) -> Metric {
        match self {
            ClassifierKind::NormL2 => Metric::L2,
            ClassifierKind::NormL1 => Metric::L1,
            ClassifierKind::HistHellinger => Metric::Hellinger,
            ClassifierKind::HistIntersection => Metric::Intersection,
            ClassifierKind::HistChiSquare => Metric::ChiSquare,
            ClassifierKind::Cosine => Metric::Cosine,
        }
    }
}

/// Trainable closed-set label predictor.
pub trait Classifier {
    /// Replace any previous model with one fit on `features`/`labels`.
    fn train(&mut self, features: &FeatureMatrix, labels: &[Label]) -> Result<(), ModelError>;

    fn predict(&self, feature: &FeatureVector) -> Result<Label, ModelError>;
}

pub fn create_classifier(kind: ClassifierKind) -> Box<dyn Classifier> {
    Box::new(NearestNeighbour::new(kind.metric()))
}

/// Shared training-input checks for classifiers and verifiers.
pub(crate) fn check_training_set(features: &FeatureMatrix, labels: &[Label]) -> Result<(), ModelError> {
    if features.is_empty() {
        return Err(ModelError::EmptyTrainingSet);
    }
    if features.rows() != labels.len() {
        return Err(ModelError::LabelCountMismatch {
            rows: features.rows(),
            labels: labels.len(),
        });
    }
    Ok(())
}

struct Gallery {
    features: Array2<f32>,
    labels: Vec<Label>,
}

/// 1-nearest-neighbour over the stored training rows.
pub struct NearestNeighbour {
    metric: Metric,
    gallery: Option<Gallery>,
}

impl NearestNeighbour {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            gallery: None,
        }
    }
}

impl Classifier for NearestNeighbour {
    fn train(&mut self, features: &FeatureMatrix, labels: &[Label]) -> Result<(), ModelError> {
        self.gallery = None;
        check_training_set(features, labels)?;
        self.gallery = Some(Gallery {
            features: features.view().to_owned(),
            labels: labels.to_vec(),
        });
        Ok(())
    }

    fn predict(&self, feature: &FeatureVector) -> Result<Label, ModelError> {
        let gallery = self.gallery.as_ref().ok_or(ModelError::NotTrained)?;
        if gallery.features.ncols() != feature.len() {
            return Err(FeatureError::DimensionMismatch {
                expected: gallery.features.ncols(),
                actual: feature.len(),
            }
            .into());
        }

        // Strict comparison keeps the earliest row on ties.
        let mut best_dist = f32::INFINITY;
        let mut best_label = gallery.labels[0];
        for (row, &label) in gallery.features.rows().into_iter().zip(&gallery.labels) {
            let dist = match row.as_slice() {
                Some(values) => self.metric.distance(values, feature.as_slice()),
                None => self.metric.distance(&row.to_vec(), feature.as_slice()),
            };
            if dist < best_dist {
                best_dist = dist;
                best_label = label;
            }
        }
        Ok(best_label)
    }
}
