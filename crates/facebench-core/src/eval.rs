//! Closed-set evaluation harnesses: per-person k-fold cross-validation and
//! randomized ROC sampling.

use crate::classifier::{Classifier, ModelError};
use crate::filter::FeatureChain;
use crate::folds::{FoldPlan, PersonGroups};
use crate::metrics::{ConfusionMatrix, LabelOutOfRange, RocCounts, RocPoint};
use crate::samples::SampleSet;
use crate::selector::ConfigError;
use crate::types::{FeatureError, FeatureMatrix, FeatureVector};
use facebench_img::Label;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Label(#[from] LabelOutOfRange),
    #[error("sample {0} missing from the sample set")]
    MissingSample(usize),
}

/// Counts of one cross-validation fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FoldStats {
    pub fold: usize,
    pub train: usize,
    pub test: usize,
    pub correct: u64,
    pub errors: u64,
}

/// Final table row of a cross-validation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossSummary {
    pub name: String,
    pub errors: u64,
    pub total: u64,
    pub accuracy: f64,
}

#[derive(Debug, Clone)]
pub struct CrossValidation {
    pub name: String,
    /// Fold count actually used.
    pub folds: usize,
    pub confusion: ConfusionMatrix,
    pub fold_stats: Vec<FoldStats>,
}

impl CrossValidation {
    pub fn summary(&self) -> CrossSummary {
        CrossSummary {
            name: self.name.clone(),
            errors: self.confusion.errors(),
            total: self.confusion.total(),
            accuracy: self.confusion.accuracy(),
        }
    }
}

/// Fold count used for a sample set: the requested count, capped at the
/// average number of samples per person.
pub fn effective_folds(requested: usize, samples: &SampleSet) -> usize {
    let per_person = samples.len() / samples.persons().max(1);
    requested.min(per_person.max(1))
}

/// Per-person k-fold cross-validation of `classifier` over `samples`.
///
/// Features are extracted again for every fold. Persons with fewer samples
/// than folds are left out entirely; folds without test samples are skipped.
pub fn cross_validate(
    name: &str,
    chain: FeatureChain<'_>,
    classifier: &mut dyn Classifier,
    samples: &SampleSet,
    folds: usize,
) -> Result<CrossValidation, EvalError> {
    if folds == 0 {
        return Err(ConfigError::InvalidParameter {
            name: "folds",
            reason: "must be at least 1".into(),
        }
        .into());
    }
    let folds = effective_folds(folds, samples);
    let groups = PersonGroups::from_labels(samples.labels());
    let plan = FoldPlan::new(&groups, folds)?;
    tracing::info!(
        run = name,
        folds,
        persons = groups.len(),
        included = plan.included_groups(),
        images = samples.len(),
        "cross-validation started"
    );

    let mut confusion = ConfusionMatrix::new(groups.len());
    let mut fold_stats = Vec::with_capacity(folds);
    for fold in 0..folds {
        let split = plan.split(fold);
        if split.test.is_empty() {
            tracing::debug!(run = name, fold, "fold has no test samples; skipped");
            continue;
        }

        let (train_features, train_labels) = feature_rows(chain, samples, &split.train)?;
        classifier.train(&train_features, &train_labels)?;
        drop(train_features);

        let mut fold_confusion = ConfusionMatrix::new(groups.len());
        for &index in &split.test {
            let (feature, ground) = feature_of(chain, samples, index)?;
            let predicted = classifier.predict(&feature)?;
            fold_confusion.record(ground, predicted)?;
        }
        confusion.merge(&fold_confusion)?;

        let stats = FoldStats {
            fold,
            train: split.train.len(),
            test: split.test.len(),
            correct: fold_confusion.correct(),
            errors: fold_confusion.errors(),
        };
        tracing::debug!(
            run = name,
            fold,
            correct = stats.correct,
            errors = stats.errors,
            "fold evaluated"
        );
        fold_stats.push(stats);
    }

    tracing::info!(
        run = name,
        total = confusion.total(),
        errors = confusion.errors(),
        accuracy = confusion.accuracy(),
        "cross-validation finished"
    );
    Ok(CrossValidation {
        name: name.to_string(),
        folds,
        confusion,
        fold_stats,
    })
}

/// Randomized ROC sampling: one (tpr, fpr) point per trial.
///
/// Each trial puts every sample into the test set with probability
/// `1/ratio`, trains on the rest, picks one test label as the positive
/// identity and scores every test prediction against it. A trial that draws
/// no test samples, or no training samples, yields the point (0, 0).
pub fn random_roc<R: Rng + ?Sized>(
    name: &str,
    chain: FeatureChain<'_>,
    classifier: &mut dyn Classifier,
    samples: &SampleSet,
    ratio: u32,
    iterations: usize,
    rng: &mut R,
) -> Result<Vec<RocPoint>, EvalError> {
    // ratio 1 would put every sample into every test set.
    if ratio < 2 {
        return Err(ConfigError::InvalidParameter {
            name: "ratio",
            reason: format!("{ratio} leaves no training samples; must be at least 2"),
        }
        .into());
    }

    let mut features = Vec::with_capacity(samples.len());
    for index in 0..samples.len() {
        features.push(feature_of(chain, samples, index)?);
    }
    tracing::info!(run = name, ratio, iterations, images = features.len(), "roc sampling started");

    let mut points = Vec::with_capacity(iterations);
    for trial in 0..iterations {
        let mut train = FeatureMatrix::with_capacity(features.len());
        let mut train_labels = Vec::with_capacity(features.len());
        let mut test: Vec<&(FeatureVector, Label)> = Vec::new();
        for sample in &features {
            if rng.gen_range(0..ratio) == 0 {
                test.push(sample);
            } else {
                train.push(&sample.0)?;
                train_labels.push(sample.1);
            }
        }

        if test.is_empty() || train.is_empty() {
            tracing::warn!(
                run = name,
                trial,
                test = test.len(),
                train = train.rows(),
                "trial drew an empty split"
            );
            points.push(RocPoint::default());
            continue;
        }
        classifier.train(&train, &train_labels)?;
        drop(train);

        let query = test[rng.gen_range(0..test.len())].1;
        let mut counts = RocCounts::default();
        for (feature, ground) in &test {
            let predicted = classifier.predict(feature)?;
            counts.record(*ground == query, predicted == query);
        }
        tracing::debug!(
            run = name,
            trial,
            query,
            tp = counts.tp,
            fp = counts.fp,
            tn = counts.tn,
            fn_ = counts.fn_,
            "trial scored"
        );
        points.push(counts.point());
    }
    Ok(points)
}

fn feature_of(
    chain: FeatureChain<'_>,
    samples: &SampleSet,
    index: usize,
) -> Result<(FeatureVector, Label), EvalError> {
    let (image, label) = samples
        .image(index)
        .zip(samples.label(index))
        .ok_or(EvalError::MissingSample(index))?;
    Ok((chain.features(image)?, label))
}

fn feature_rows(
    chain: FeatureChain<'_>,
    samples: &SampleSet,
    indices: &[usize],
) -> Result<(FeatureMatrix, Vec<Label>), EvalError> {
    let mut matrix = FeatureMatrix::with_capacity(indices.len());
    let mut labels = Vec::with_capacity(indices.len());
    for &index in indices {
        let (feature, label) = feature_of(chain, samples, index)?;
        matrix.push(&feature)?;
        labels.push(label);
    }
    Ok((matrix, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::NearestNeighbour;
    use crate::extractor::{create_extractor, Extractor, ExtractorKind, ExtractorParams};
    use crate::metric::Metric;
    use facebench_img::{GrayImage, LabelMap};
    use image::Luma;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// `persons` identities with `per_person` images each; every identity has
    /// its own flat intensity so nearest-neighbour is always right.
    fn samples(persons: usize, per_person: usize) -> SampleSet {
        let mut names = LabelMap::new();
        let mut images = Vec::new();
        let mut labels = Vec::new();
        for p in 0..persons {
            let label = names.label_for(&format!("p{p}"));
            for i in 0..per_person {
                let value = (p * 60 + i) as u8;
                images.push(GrayImage::from_pixel(4, 4, Luma([value])));
                labels.push(label);
            }
        }
        SampleSet::new(images, labels, names).unwrap()
    }

    fn pixels() -> Box<dyn Extractor> {
        let params = ExtractorParams {
            pixel_size: (2, 2),
            ..ExtractorParams::default()
        };
        create_extractor(ExtractorKind::Pixels, &params).unwrap()
    }

    #[test]
    fn test_three_by_ten_five_folds_counts_42() {
        let set = samples(3, 10);
        let extractor = pixels();
        let mut nn = NearestNeighbour::new(Metric::L2);
        let result = cross_validate("pixels", FeatureChain::new(extractor.as_ref(), None), &mut nn, &set, 5).unwrap();
        assert_eq!(result.folds, 5);
        assert_eq!(result.confusion.total(), 42);
        let per_fold: u64 = result.fold_stats.iter().map(|s| s.correct + s.errors).sum();
        assert_eq!(per_fold, result.confusion.total());
        let summary = result.summary();
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.accuracy, 1.0);
    }

    #[test]
    fn test_folds_capped_by_samples_per_person() {
        let set = samples(2, 3);
        assert_eq!(effective_folds(10, &set), 3);
        assert_eq!(effective_folds(2, &set), 2);
    }

    #[test]
    fn test_zero_folds_is_config_error() {
        let set = samples(2, 3);
        let extractor = pixels();
        let mut nn = NearestNeighbour::new(Metric::L2);
        let err = cross_validate("x", FeatureChain::new(extractor.as_ref(), None), &mut nn, &set, 0).unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
    }

    #[test]
    fn test_single_fold_evaluates_nothing() {
        let set = samples(2, 4);
        let extractor = pixels();
        let mut nn = NearestNeighbour::new(Metric::L2);
        let result = cross_validate("x", FeatureChain::new(extractor.as_ref(), None), &mut nn, &set, 1).unwrap();
        assert_eq!(result.confusion.total(), 0);
        assert!(result.fold_stats.is_empty());
    }

    #[test]
    fn test_roc_points_in_unit_square() {
        let set = samples(4, 6);
        let extractor = pixels();
        let mut nn = NearestNeighbour::new(Metric::L1);
        let mut rng = StdRng::seed_from_u64(11);
        let points = random_roc(
            "pixels",
            FeatureChain::new(extractor.as_ref(), None),
            &mut nn,
            &set,
            4,
            25,
            &mut rng,
        )
        .unwrap();
        assert_eq!(points.len(), 25);
        for p in &points {
            assert!((0.0..=1.0).contains(&p.tpr) && (0.0..=1.0).contains(&p.fpr));
        }
    }

    #[test]
    fn test_roc_is_reproducible_with_seed() {
        let set = samples(3, 5);
        let extractor = pixels();
        let run = |seed| {
            let mut nn = NearestNeighbour::new(Metric::L2);
            let mut rng = StdRng::seed_from_u64(seed);
            random_roc("x", FeatureChain::new(extractor.as_ref(), None), &mut nn, &set, 3, 10, &mut rng).unwrap()
        };
        assert_eq!(run(5), run(5));
    }

    #[test]
    fn test_roc_zero_ratio_rejected() {
        let set = samples(2, 2);
        let extractor = pixels();
        let mut nn = NearestNeighbour::new(Metric::L2);
        let mut rng = StdRng::seed_from_u64(0);
        let err = random_roc("x", FeatureChain::new(extractor.as_ref(), None), &mut nn, &set, 0, 1, &mut rng)
            .unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
    }

    #[test]
    fn test_roc_ratio_one_rejected() {
        let set = samples(2, 2);
        let extractor = pixels();
        let mut nn = NearestNeighbour::new(Metric::L2);
        let mut rng = StdRng::seed_from_u64(0);
        let err = random_roc("x", FeatureChain::new(extractor.as_ref(), None), &mut nn, &set, 1, 1, &mut rng)
            .unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
    }

    #[test]
    fn test_roc_empty_split_trials_yield_origin() {
        // A single sample lands either in test (no training data) or in
        // train (no test data) on every trial.
        let set = samples(1, 1);
        let extractor = pixels();
        let mut nn = NearestNeighbour::new(Metric::L2);
        let mut rng = StdRng::seed_from_u64(3);
        let points = random_roc("x", FeatureChain::new(extractor.as_ref(), None), &mut nn, &set, 2, 20, &mut rng)
            .unwrap();
        assert_eq!(points.len(), 20);
        assert!(points.iter().all(|p| *p == RocPoint::default()));
    }
}
