//! Collect-then-train face pipeline controller.
//!
//! A [`FacePipeline`] owns a preprocessor, an extractor, an optional filter
//! and exactly one predictor (classifier or verifier). Training images are
//! accumulated into a feature matrix, the predictor is trained once, and the
//! matrix is released. Pair queries are answered only after training.

use crate::classifier::{create_classifier, Classifier, ClassifierKind, ModelError};
use crate::extractor::{create_extractor, Extractor, ExtractorKind, ExtractorParams};
use crate::filter::{create_filter, FeatureChain, Filter, FilterKind, FilterParams};
use crate::selector::{named_selector, ConfigError};
use crate::types::{FeatureError, FeatureMatrix, FeatureVector};
use crate::verifier::{create_verifier, Verifier};
use facebench_img::{GrayImage, Label, PreprocessKind, Preprocessor};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Training pairs in the LFW development list.
const DEV_TRAIN_IMAGES: usize = 4400;
/// Training pairs across nine LFW test splits.
const SPLIT_TRAIN_IMAGES: usize = 10800;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("cannot {operation} while pipeline is {state}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },
}

named_selector! {
    /// Where the pair benchmark takes its training pairs from.
    TrainMethod("train method") {
        /// The development training list.
        Dev => "dev",
        /// All test splits except the one being evaluated.
        Split => "split",
    }
}

impl Default for TrainMethod {
    fn default() -> Self {
        TrainMethod::Dev
    }
}

/// Which predictor family answers pair queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictorMode {
    /// Predict a label for each image and compare the labels.
    Classifier,
    /// Decide same/different directly.
    #[default]
    Verifier,
}

impl fmt::Display for PredictorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictorMode::Classifier => f.write_str("classifier"),
            PredictorMode::Verifier => f.write_str("verifier"),
        }
    }
}

/// The single trainable stage of a pipeline.
pub enum Predictor {
    Classifier(Box<dyn Classifier>),
    Verifier(Box<dyn Verifier>),
}

impl Predictor {
    pub fn create(kind: ClassifierKind, mode: PredictorMode) -> Self {
        match mode {
            PredictorMode::Classifier => Predictor::Classifier(create_classifier(kind)),
            PredictorMode::Verifier => Predictor::Verifier(create_verifier(kind)),
        }
    }

    pub fn mode(&self) -> PredictorMode {
        match self {
            Predictor::Classifier(_) => PredictorMode::Classifier,
            Predictor::Verifier(_) => PredictorMode::Verifier,
        }
    }

    fn train(&mut self, features: &FeatureMatrix, labels: &[Label]) -> Result<(), ModelError> {
        match self {
            Predictor::Classifier(c) => c.train(features, labels),
            Predictor::Verifier(v) => v.train(features, labels),
        }
    }

    fn same(&self, a: &FeatureVector, b: &FeatureVector) -> Result<bool, ModelError> {
        match self {
            Predictor::Verifier(v) => v.same(a, b),
            Predictor::Classifier(c) => Ok(c.predict(a)? == c.predict(b)?),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub extractor: ExtractorKind,
    pub extractor_params: ExtractorParams,
    pub filter: FilterKind,
    pub filter_params: FilterParams,
    /// Comparison of the classifier or verifier.
    pub comparator: ClassifierKind,
    pub mode: PredictorMode,
    pub preprocess: PreprocessKind,
    /// Border margin removed before preprocessing; 0 disables cropping.
    pub crop: u32,
    pub train_method: TrainMethod,
    /// Stride over training and test pairs.
    pub skip: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorKind::LbpUniform,
            extractor_params: ExtractorParams::default(),
            filter: FilterKind::None,
            filter_params: FilterParams::default(),
            comparator: ClassifierKind::HistHellinger,
            mode: PredictorMode::Verifier,
            preprocess: PreprocessKind::None,
            crop: 0,
            train_method: TrainMethod::Dev,
            skip: 80,
        }
    }
}

impl PipelineConfig {
    /// Expected number of training rows for the train method and stride.
    pub fn capacity_hint(&self) -> usize {
        capacity_hint(self.train_method, self.skip)
    }
}

fn capacity_hint(method: TrainMethod, skip: usize) -> usize {
    let images = match method {
        TrainMethod::Dev => DEV_TRAIN_IMAGES,
        TrainMethod::Split => SPLIT_TRAIN_IMAGES,
    };
    images / skip.max(1) + 1
}

/// Observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Empty,
    Accumulating,
    Trained,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Empty => f.write_str("empty"),
            PipelineState::Accumulating => f.write_str("accumulating"),
            PipelineState::Trained => f.write_str("trained"),
        }
    }
}

enum Phase {
    Empty,
    Accumulating {
        features: FeatureMatrix,
        labels: Vec<Label>,
    },
    Trained,
}

pub struct FacePipeline {
    preprocessor: Preprocessor,
    extractor: Box<dyn Extractor>,
    filter: Option<Box<dyn Filter>>,
    predictor: Predictor,
    train_method: TrainMethod,
    /// Stride over training and test pairs, at least 1.
    skip: usize,
    phase: Phase,
}

impl FacePipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigError> {
        if config.skip == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "skip",
                reason: "must be at least 1".into(),
            });
        }
        let extractor = create_extractor(config.extractor, &config.extractor_params)?;
        let filter = create_filter(config.filter, &config.filter_params)?;
        let predictor = Predictor::create(config.comparator, config.mode);
        tracing::info!(
            extractor = %config.extractor,
            filter = %config.filter,
            comparator = %config.comparator,
            mode = %config.mode,
            preprocess = %config.preprocess,
            crop = config.crop,
            train_method = %config.train_method,
            skip = config.skip,
            "pipeline configured"
        );
        Ok(Self {
            preprocessor: Preprocessor::new(config.preprocess, config.crop),
            extractor,
            filter,
            predictor,
            train_method: config.train_method,
            skip: config.skip,
            phase: Phase::Empty,
        })
    }

    pub fn state(&self) -> PipelineState {
        match self.phase {
            Phase::Empty => PipelineState::Empty,
            Phase::Accumulating { .. } => PipelineState::Accumulating,
            Phase::Trained => PipelineState::Trained,
        }
    }

    /// Rows collected since the last training; 0 outside accumulation.
    pub fn accumulated_rows(&self) -> usize {
        match &self.phase {
            Phase::Accumulating { features, .. } => features.rows(),
            _ => 0,
        }
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    pub fn mode(&self) -> PredictorMode {
        self.predictor.mode()
    }

    /// Where the pair benchmark takes training pairs from.
    pub fn train_method(&self) -> TrainMethod {
        self.train_method
    }

    pub fn skip(&self) -> usize {
        self.skip
    }

    /// Preprocess, extract and filter `image`, then append it as a training
    /// row. Returns the number of accumulated rows. After training this
    /// starts a fresh accumulation.
    pub fn add_training(&mut self, image: &GrayImage, label: Label) -> Result<usize, PipelineError> {
        let feature = self.features(image)?;
        match &mut self.phase {
            Phase::Accumulating { features, labels } => {
                features.push(&feature)?;
                labels.push(label);
                Ok(features.rows())
            }
            _ => {
                let hint = capacity_hint(self.train_method, self.skip);
                let mut features = FeatureMatrix::with_capacity(hint);
                features.push(&feature)?;
                tracing::debug!(dimension = feature.len(), hint, "accumulation started");
                self.phase = Phase::Accumulating {
                    features,
                    labels: vec![label],
                };
                Ok(1)
            }
        }
    }

    /// Train the predictor on the accumulated rows and release them.
    ///
    /// On a training failure the pipeline is left empty.
    pub fn train(&mut self) -> Result<(), PipelineError> {
        let (features, labels) = match std::mem::replace(&mut self.phase, Phase::Empty) {
            Phase::Accumulating { features, labels } => (features, labels),
            other => {
                self.phase = other;
                return Err(PipelineError::InvalidState {
                    operation: "train",
                    state: self.state(),
                });
            }
        };
        let rows = features.rows();
        self.predictor.train(&features, &labels)?;
        tracing::info!(rows, dimension = features.cols(), mode = %self.predictor.mode(), "pipeline trained");
        self.phase = Phase::Trained;
        Ok(())
    }

    /// Whether `a` and `b` show the same person.
    pub fn same(&self, a: &GrayImage, b: &GrayImage) -> Result<bool, PipelineError> {
        if !matches!(self.phase, Phase::Trained) {
            return Err(PipelineError::InvalidState {
                operation: "compare",
                state: self.state(),
            });
        }
        let fa = self.features(a)?;
        let fb = self.features(b)?;
        Ok(self.predictor.same(&fa, &fb)?)
    }

    fn features(&self, image: &GrayImage) -> Result<FeatureVector, FeatureError> {
        let processed = self.preprocessor.process(image);
        FeatureChain::new(self.extractor.as_ref(), self.filter.as_deref()).features(&processed)
    }
}
