//! Pairwise verifiers: decide whether two feature vectors show the same
//! person without naming who.

use crate::classifier::{check_training_set, ClassifierKind, ModelError};
use crate::metric::Metric;
use crate::types::{FeatureError, FeatureMatrix, FeatureVector};
use facebench_img::Label;

/// Upper bound on the pairwise distances held while learning a threshold.
const MAX_SCORED_PAIRS: usize = 1 << 20;

/// Trainable same/different decider.
pub trait Verifier {
    fn train(&mut self, features: &FeatureMatrix, labels: &[Label]) -> Result<(), ModelError>;

    fn same(&self, a: &FeatureVector, b: &FeatureVector) -> Result<bool, ModelError>;
}

pub fn create_verifier(kind: ClassifierKind) -> Box<dyn Verifier> {
    Box::new(ThresholdVerifier::new(kind.metric()))
}

#[derive(Debug, Clone, Copy)]
struct Decision {
    threshold: f32,
    dimension: usize,
}

/// Distance threshold learned from the training pairs: pairs at or below the
/// threshold are "same". Beyond `MAX_SCORED_PAIRS` pairs a weighted strided
/// subset is scored instead of every pair.
pub struct ThresholdVerifier {
    metric: Metric,
    decision: Option<Decision>,
}

impl ThresholdVerifier {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            decision: None,
        }
    }

    pub fn threshold(&self) -> Option<f32> {
        self.decision.map(|d| d.threshold)
    }

    /// Distances of a strided subset of all training pairs, at most
    /// `max_pairs / 2` per kind. Each kept pair is weighted by its kind's
    /// stride so both kinds keep their true proportions.
    fn score_pairs(
        &self,
        features: &FeatureMatrix,
        labels: &[Label],
        max_pairs: usize,
    ) -> Result<Vec<ScoredPair>, ModelError> {
        let n = features.rows();
        let mut same_total = 0u64;
        let mut diff_total = 0u64;
        for i in 0..n {
            for j in (i + 1)..n {
                if labels[i] == labels[j] {
                    same_total += 1;
                } else {
                    diff_total += 1;
                }
            }
        }
        if same_total == 0 || diff_total == 0 {
            return Err(ModelError::TrainingFailed(format!(
                "need both matched and mismatched pairs, got {same_total} matched / {diff_total} mismatched"
            )));
        }

        let per_kind = (max_pairs / 2).max(1) as u64;
        let same_stride = same_total.div_ceil(per_kind);
        let diff_stride = diff_total.div_ceil(per_kind);
        let kept = (same_total.div_ceil(same_stride) + diff_total.div_ceil(diff_stride)) as usize;
        let mut scored = Vec::with_capacity(kept);
        let (mut same_seen, mut diff_seen) = (0u64, 0u64);
        for i in 0..n {
            let a = row_of(features, i)?;
            for j in (i + 1)..n {
                let same = labels[i] == labels[j];
                let (seen, stride) = if same {
                    (&mut same_seen, same_stride)
                } else {
                    (&mut diff_seen, diff_stride)
                };
                let keep = *seen % stride == 0;
                *seen += 1;
                if keep {
                    scored.push(ScoredPair {
                        distance: self.metric.distance(a, row_of(features, j)?),
                        same,
                        weight: stride,
                    });
                }
            }
        }
        tracing::debug!(
            same_total,
            diff_total,
            scored = scored.len(),
            same_stride,
            diff_stride,
            "training pairs scored"
        );
        Ok(scored)
    }
}

/// Distance of one training pair, standing in for `weight` pairs of its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScoredPair {
    distance: f32,
    same: bool,
    weight: u64,
}

impl Verifier for ThresholdVerifier {
    fn train(&mut self, features: &FeatureMatrix, labels: &[Label]) -> Result<(), ModelError> {
        self.decision = None;
        check_training_set(features, labels)?;

        let mut scored = self.score_pairs(features, labels, MAX_SCORED_PAIRS)?;
        let threshold = best_threshold(&mut scored);
        tracing::debug!(threshold, pairs = scored.len(), "verifier threshold learned");
        self.decision = Some(Decision {
            threshold,
            dimension: features.cols(),
        });
        Ok(())
    }

    fn same(&self, a: &FeatureVector, b: &FeatureVector) -> Result<bool, ModelError> {
        let decision = self.decision.ok_or(ModelError::NotTrained)?;
        for v in [a, b] {
            if v.len() != decision.dimension {
                return Err(FeatureError::DimensionMismatch {
                    expected: decision.dimension,
                    actual: v.len(),
                }
                .into());
            }
        }
        Ok(self.metric.distance(a.as_slice(), b.as_slice()) <= decision.threshold)
    }
}

fn row_of(features: &FeatureMatrix, index: usize) -> Result<&[f32], ModelError> {
    features
        .row_slice(index)
        .ok_or_else(|| ModelError::TrainingFailed(format!("feature row {index} is not contiguous")))
}

/// Threshold maximising weighted pair accuracy under the rule
/// `distance <= t ⇒ same`.
///
/// Candidates sit midway between consecutive sorted distances; the lowest
/// candidate wins ties.
fn best_threshold(scored: &mut [ScoredPair]) -> f32 {
    scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    let total_diff: u64 = scored.iter().filter(|p| !p.same).map(|p| p.weight).sum();

    // Cut k = number of pairs predicted "same" (the k smallest distances).
    let mut correct = total_diff;
    let mut best_correct = correct;
    let mut best_cut = 0;
    for (k, pair) in scored.iter().enumerate() {
        if pair.same {
            correct += pair.weight;
        } else {
            correct -= pair.weight;
        }
        if correct > best_correct {
            best_correct = correct;
            best_cut = k + 1;
        }
    }

    match best_cut {
        0 => f32::NEG_INFINITY,
        k if k == scored.len() => scored[k - 1].distance,
        k => (scored[k - 1].distance + scored[k].distance) / 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[f32]]) -> FeatureMatrix {
        let mut m = FeatureMatrix::new();
        for r in rows {
            m.push(&FeatureVector::new(r.to_vec())).unwrap();
        }
        m
    }

    fn fv(values: &[f32]) -> FeatureVector {
        FeatureVector::new(values.to_vec())
    }

    #[test]
    fn test_same_before_train_fails() {
        let v = ThresholdVerifier::new(Metric::L2);
        assert_eq!(v.same(&fv(&[0.0]), &fv(&[0.0])), Err(ModelError::NotTrained));
    }

    #[test]
    fn test_learns_separating_threshold() {
        let mut v = ThresholdVerifier::new(Metric::L2);
        let m = matrix(&[&[0.0], &[0.2], &[5.0], &[5.3]]);
        v.train(&m, &[0, 0, 1, 1]).unwrap();
        let t = v.threshold().unwrap();
        assert!(t > 0.3 && t < 4.7, "threshold {t}");
        assert!(v.same(&fv(&[1.0]), &fv(&[1.1])).unwrap());
        assert!(!v.same(&fv(&[0.0]), &fv(&[5.0])).unwrap());
    }

    #[test]
    fn test_single_identity_cannot_train() {
        let mut v = ThresholdVerifier::new(Metric::L1);
        let m = matrix(&[&[0.0], &[1.0]]);
        assert!(matches!(v.train(&m, &[4, 4]), Err(ModelError::TrainingFailed(_))));
        assert!(v.threshold().is_none());
    }

    #[test]
    fn test_single_row_cannot_train() {
        let mut v = ThresholdVerifier::new(Metric::L1);
        assert!(matches!(
            v.train(&matrix(&[&[0.0]]), &[0]),
            Err(ModelError::TrainingFailed(_))
        ));
    }

    #[test]
    fn test_same_rejects_wrong_dimension() {
        let mut v = ThresholdVerifier::new(Metric::L2);
        v.train(&matrix(&[&[0.0, 0.0], &[0.0, 0.1], &[3.0, 3.0]]), &[0, 0, 1])
            .unwrap();
        assert!(matches!(
            v.same(&fv(&[0.0]), &fv(&[0.0, 0.0])),
            Err(ModelError::Feature(FeatureError::DimensionMismatch { .. }))
        ));
    }

    fn pair(distance: f32, same: bool) -> ScoredPair {
        ScoredPair {
            distance,
            same,
            weight: 1,
        }
    }

    #[test]
    fn test_best_threshold_edges() {
        // Matched pairs farther than every mismatched pair: reject everything.
        let mut scored = vec![pair(2.0, false), pair(1.0, false), pair(3.0, true)];
        assert_eq!(best_threshold(&mut scored), f32::NEG_INFINITY);

        let mut scored = vec![pair(3.0, false), pair(1.0, true), pair(2.0, true)];
        assert_eq!(best_threshold(&mut scored), 2.5);

        let mut scored = vec![pair(1.0, true), pair(2.0, true)];
        assert_eq!(best_threshold(&mut scored), 2.0);
    }

    #[test]
    fn test_best_threshold_respects_weights() {
        let heavy_same = ScoredPair {
            weight: 3,
            ..pair(2.0, true)
        };
        let mut scored = vec![pair(1.0, false), heavy_same];
        assert_eq!(best_threshold(&mut scored), 2.0);
    }

    #[test]
    fn test_scored_pairs_bounded_per_kind() {
        // 40 rows over 4 identities: 180 matched and 600 mismatched pairs.
        let mut m = FeatureMatrix::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            m.push(&fv(&[i as f32])).unwrap();
            labels.push(i % 4);
        }
        let v = ThresholdVerifier::new(Metric::L1);

        let all = v.score_pairs(&m, &labels, usize::MAX).unwrap();
        assert_eq!(all.len(), 780);
        assert!(all.iter().all(|p| p.weight == 1));

        let capped = v.score_pairs(&m, &labels, 64).unwrap();
        let same: Vec<_> = capped.iter().filter(|p| p.same).collect();
        let diff: Vec<_> = capped.iter().filter(|p| !p.same).collect();
        assert!(!same.is_empty() && same.len() <= 32);
        assert!(!diff.is_empty() && diff.len() <= 32);
        let same_weight: u64 = same.iter().map(|p| p.weight).sum();
        let diff_weight: u64 = diff.iter().map(|p| p.weight).sum();
        assert!(same_weight >= 180 && same_weight < 180 + same[0].weight);
        assert!(diff_weight >= 600 && diff_weight < 600 + diff[0].weight);
    }
}
