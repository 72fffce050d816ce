//! facebench-core: Face recognition pipeline evaluation.
//!
//! Pluggable extractor, filter, classifier and verifier stages, per-person
//! cross-validation, randomized ROC sampling and the LFW pair benchmark
//! driven by a collect-then-train pipeline controller.

pub mod benchmark;
pub mod classifier;
pub mod eval;
pub mod extractor;
pub mod filter;
pub mod folds;
pub mod metric;
pub mod metrics;
pub mod pipeline;
pub mod presets;
pub mod report;
pub mod samples;
pub mod selector;
pub mod types;
pub mod verifier;

pub use benchmark::{run_pair_benchmark, BenchError, PairBenchmark, SplitResult};
pub use classifier::{create_classifier, Classifier, ClassifierKind, ModelError};
pub use eval::{cross_validate, random_roc, CrossSummary, CrossValidation, EvalError};
pub use extractor::{create_extractor, Extractor, ExtractorKind, ExtractorParams};
pub use filter::{create_filter, FeatureChain, Filter, FilterKind, FilterParams};
pub use metrics::{ConfusionMatrix, RocPoint};
pub use pipeline::{FacePipeline, PipelineConfig, PipelineError, PipelineState, PredictorMode, TrainMethod};
pub use presets::{find_preset, presets, Preset};
pub use samples::{SampleError, SampleSet};
pub use selector::ConfigError;
pub use types::{FeatureError, FeatureMatrix, FeatureVector};
pub use verifier::{create_verifier, Verifier};
