//! Confusion-matrix and ROC accounting.

use facebench_img::Label;
use ndarray::Array2;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("label {label} outside a {classes}-class confusion matrix")]
pub struct LabelOutOfRange {
    pub label: Label,
    pub classes: usize,
}

/// Square (ground truth, predicted) count grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: Array2<u64>,
}

impl ConfusionMatrix {
    pub fn new(classes: usize) -> Self {
        Self {
            counts: Array2::zeros((classes, classes)),
        }
    }

    pub fn classes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn record(&mut self, ground: Label, predicted: Label) -> Result<(), LabelOutOfRange> {
        let classes = self.classes();
        for label in [ground, predicted] {
            if label >= classes {
                return Err(LabelOutOfRange { label, classes });
            }
        }
        self.counts[[ground, predicted]] += 1;
        Ok(())
    }

    /// Add `other`'s counts into `self`. Both must have the same class count.
    pub fn merge(&mut self, other: &ConfusionMatrix) -> Result<(), LabelOutOfRange> {
        if other.classes() != self.classes() {
            return Err(LabelOutOfRange {
                label: other.classes().saturating_sub(1),
                classes: self.classes(),
            });
        }
        self.counts += &other.counts;
        Ok(())
    }

    pub fn get(&self, ground: Label, predicted: Label) -> u64 {
        self.counts.get([ground, predicted]).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.sum()
    }

    pub fn correct(&self) -> u64 {
        self.counts.diag().sum()
    }

    /// Off-diagonal sum.
    pub fn errors(&self) -> u64 {
        self.total() - self.correct()
    }

    /// `1 - errors / total`; 0 for an empty matrix.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        1.0 - self.errors() as f64 / total as f64
    }

    pub fn to_rows(&self) -> Vec<Vec<u64>> {
        self.counts.outer_iter().map(|row| row.to_vec()).collect()
    }
}

/// Positive/negative tallies against one query identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RocCounts {
    pub tp: u64,
    pub fp: u64,
    pub tn: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
}

impl RocCounts {
    /// Tally one prediction. Positive means "is the query identity".
    pub fn record(&mut self, actual_positive: bool, predicted_positive: bool) {
        match (actual_positive, predicted_positive) {
            (true, true) => self.tp += 1,
            (false, true) => self.fp += 1,
            (false, false) => self.tn += 1,
            (true, false) => self.fn_ += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.tp + self.fp + self.tn + self.fn_
    }

    /// `tp / (tp + fn)`, 0 without positives.
    pub fn tpr(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// `fp / (fp + tn)`, 0 without negatives.
    pub fn fpr(&self) -> f64 {
        ratio(self.fp, self.fp + self.tn)
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn point(&self) -> RocPoint {
        RocPoint {
            tpr: self.tpr(),
            fpr: self.fpr(),
        }
    }
}

/// One (true positive rate, false positive rate) sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RocPoint {
    pub tpr: f64,
    pub fpr: f64,
}

pub(crate) fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_matches_formula() {
        let mut m = ConfusionMatrix::new(3);
        m.record(0, 0).unwrap();
        m.record(1, 1).unwrap();
        m.record(2, 0).unwrap();
        m.record(2, 2).unwrap();
        assert_eq!(m.total(), 4);
        assert_eq!(m.errors(), 1);
        assert!((m.accuracy() - 0.75).abs() < 1e-12);
        assert_eq!(m.get(2, 0), 1);
        assert_eq!(m.get(5, 0), 0);
    }

    #[test]
    fn test_degenerate_accuracy() {
        let mut all_right = ConfusionMatrix::new(2);
        all_right.record(0, 0).unwrap();
        all_right.record(1, 1).unwrap();
        assert_eq!(all_right.accuracy(), 1.0);

        let mut all_wrong = ConfusionMatrix::new(2);
        all_wrong.record(0, 1).unwrap();
        all_wrong.record(1, 0).unwrap();
        assert_eq!(all_wrong.accuracy(), 0.0);

        assert_eq!(ConfusionMatrix::new(2).accuracy(), 0.0);
    }

    #[test]
    fn test_record_rejects_unknown_label() {
        let mut m = ConfusionMatrix::new(2);
        assert_eq!(m.record(0, 2), Err(LabelOutOfRange { label: 2, classes: 2 }));
        assert_eq!(m.total(), 0);
    }

    #[test]
    fn test_merge_accumulates() {
        let mut total = ConfusionMatrix::new(2);
        let mut fold = ConfusionMatrix::new(2);
        fold.record(0, 1).unwrap();
        fold.record(1, 1).unwrap();
        total.merge(&fold).unwrap();
        total.merge(&fold).unwrap();
        assert_eq!(total.to_rows(), vec![vec![0, 2], vec![0, 2]]);
        assert!(total.merge(&ConfusionMatrix::new(3)).is_err());
    }

    #[test]
    fn test_roc_rates_and_empty_denominators() {
        let mut c = RocCounts::default();
        c.record(true, true);
        c.record(true, false);
        c.record(false, true);
        c.record(false, false);
        c.record(false, false);
        assert_eq!(c.tpr(), 0.5);
        assert!((c.fpr() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(c.accuracy(), 0.6);

        let mut negatives_only = RocCounts::default();
        negatives_only.record(false, true);
        assert_eq!(negatives_only.point(), RocPoint { tpr: 0.0, fpr: 1.0 });

        let mut positives_only = RocCounts::default();
        positives_only.record(true, true);
        assert_eq!(positives_only.point(), RocPoint { tpr: 1.0, fpr: 0.0 });
    }
}
