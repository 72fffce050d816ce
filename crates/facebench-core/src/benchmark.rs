//! LFW-protocol pairwise verification benchmark.

use crate::metrics::ratio;
use crate::pipeline::{FacePipeline, PipelineError, TrainMethod};
use facebench_img::{ImageError, ImageSource, ImagePair, LabelMap, PairDataset};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("failed to load {key}")]
    Image {
        key: String,
        #[source]
        source: ImageError,
    },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("dataset has no test splits")]
    NoSplits,
}

/// Outcome of one test split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SplitResult {
    pub split: usize,
    pub correct_same: u32,
    pub incorrect_same: u32,
    pub correct_diff: u32,
    pub incorrect_diff: u32,
    pub accuracy: f64,
    pub tpr: f64,
    pub fpr: f64,
}

impl SplitResult {
    fn record(&mut self, expected_same: bool, predicted_same: bool) {
        match (expected_same, expected_same == predicted_same) {
            (true, true) => self.correct_same += 1,
            (true, false) => self.incorrect_same += 1,
            (false, true) => self.correct_diff += 1,
            (false, false) => self.incorrect_diff += 1,
        }
    }

    pub fn evaluated(&self) -> u32 {
        self.correct_same + self.incorrect_same + self.correct_diff + self.incorrect_diff
    }

    fn finish(&mut self) {
        let correct = u64::from(self.correct_same + self.correct_diff);
        self.accuracy = ratio(correct, u64::from(self.evaluated()));
        self.tpr = ratio(
            u64::from(self.correct_same),
            u64::from(self.correct_same + self.incorrect_same),
        );
        self.fpr = ratio(
            u64::from(self.incorrect_diff),
            u64::from(self.correct_diff + self.incorrect_diff),
        );
    }
}

/// All split results plus their summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairBenchmark {
    pub train_method: TrainMethod,
    pub skip: usize,
    pub splits: Vec<SplitResult>,
    pub mean_accuracy: f64,
    /// Standard error of the per-split accuracy.
    pub std_error: f64,
    pub mean_tpr: f64,
    pub mean_fpr: f64,
    pub elapsed_secs: f64,
}

/// Train `pipeline` per its train method and evaluate every `skip`-th pair
/// of each test split, with the stride the pipeline was configured with.
pub fn run_pair_benchmark(
    pipeline: &mut FacePipeline,
    dataset: &PairDataset,
    source: &dyn ImageSource,
) -> Result<PairBenchmark, BenchError> {
    let method = pipeline.train_method();
    let skip = pipeline.skip();
    if dataset.num_splits() == 0 {
        return Err(BenchError::NoSplits);
    }
    let started = Instant::now();
    let mut names = LabelMap::new();

    if method == TrainMethod::Dev {
        // The last `skip` pairs of the development list are never used.
        let end = dataset.train().len().saturating_sub(skip);
        let pairs = dataset.train()[..end].iter().step_by(skip);
        add_pairs(pipeline, source, &mut names, pairs)?;
        pipeline.train()?;
    }

    let mut splits = Vec::with_capacity(dataset.num_splits());
    for split in 0..dataset.num_splits() {
        if method == TrainMethod::Split {
            for other in (0..dataset.num_splits()).filter(|&j| j != split) {
                add_pairs(pipeline, source, &mut names, dataset.test(other).iter().step_by(skip))?;
            }
            pipeline.train()?;
        }

        let mut result = SplitResult {
            split,
            ..SplitResult::default()
        };
        for pair in dataset.test(split).iter().step_by(skip) {
            let a = load(source, &pair.image1)?;
            let b = load(source, &pair.image2)?;
            result.record(pair.same, pipeline.same(&a, &b)?);
        }
        result.finish();
        tracing::info!(
            split,
            evaluated = result.evaluated(),
            accuracy = result.accuracy,
            tpr = result.tpr,
            fpr = result.fpr,
            "split evaluated"
        );
        splits.push(result);
    }

    let n = splits.len() as f64;
    let mean_accuracy = splits.iter().map(|s| s.accuracy).sum::<f64>() / n;
    let sigma = (splits
        .iter()
        .map(|s| (s.accuracy - mean_accuracy).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();
    Ok(PairBenchmark {
        train_method: method,
        skip,
        mean_accuracy,
        std_error: sigma / n.sqrt(),
        mean_tpr: splits.iter().map(|s| s.tpr).sum::<f64>() / n,
        mean_fpr: splits.iter().map(|s| s.fpr).sum::<f64>() / n,
        elapsed_secs: started.elapsed().as_secs_f64(),
        splits,
    })
}

fn add_pairs<'a>(
    pipeline: &mut FacePipeline,
    source: &dyn ImageSource,
    names: &mut LabelMap,
    pairs: impl Iterator<Item = &'a ImagePair>,
) -> Result<(), BenchError> {
    for pair in pairs {
        for key in [&pair.image1, &pair.image2] {
            let image = load(source, key)?;
            let rows = pipeline.add_training(&image, names.label_for_path(key))?;
            tracing::trace!(rows, key = %key, "training image added");
        }
    }
    Ok(())
}

fn load(source: &dyn ImageSource, key: &str) -> Result<facebench_img::GrayImage, BenchError> {
    source.load(key).map_err(|source| BenchError::Image {
        key: key.to_string(),
        source,
    })
}
