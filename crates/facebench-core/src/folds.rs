//! Per-person fold partitioning for cross-validation.

use crate::selector::ConfigError;
use facebench_img::Label;

/// Sample indices grouped by identity label, in sample order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonGroups {
    groups: Vec<Vec<usize>>,
}

impl PersonGroups {
    /// Group sample indices by label. Labels are dense (`0..persons`), so the
    /// group of label `l` sits at index `l`.
    pub fn from_labels(labels: &[Label]) -> Self {
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (index, &label) in labels.iter().enumerate() {
            if label >= groups.len() {
                groups.resize_with(label + 1, Vec::new);
            }
            groups[label].push(index);
        }
        Self { groups }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group(&self, label: Label) -> &[usize] {
        self.groups.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.groups.iter().map(Vec::as_slice)
    }
}

/// One fold's sample indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Deterministic test windows over person groups for a fixed fold count.
#[derive(Debug, Clone)]
pub struct FoldPlan<'a> {
    groups: &'a PersonGroups,
    folds: usize,
}

impl<'a> FoldPlan<'a> {
    pub fn new(groups: &'a PersonGroups, folds: usize) -> Result<Self, ConfigError> {
        if folds == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "folds",
                reason: "must be at least 1".into(),
            });
        }
        Ok(Self { groups, folds })
    }

    pub fn folds(&self) -> usize {
        self.folds
    }

    /// Groups large enough to take part (`m >= folds`).
    pub fn included_groups(&self) -> usize {
        self.groups.iter().filter(|g| g.len() >= self.folds).count()
    }

    /// Train/test split of fold `fold`.
    ///
    /// Groups with fewer samples than folds are left out of both sets. For
    /// group size `m` and `r = m / folds`, sample `n` is test iff
    /// `folds > 1 && fold*r <= n <= (fold+1)*r`. Both bounds are inclusive, so
    /// adjacent folds share their boundary sample.
    pub fn split(&self, fold: usize) -> FoldSplit {
        let mut split = FoldSplit::default();
        for group in self.groups.iter() {
            let m = group.len();
            if m < self.folds {
                continue;
            }
            let r = m / self.folds;
            for (n, &index) in group.iter().enumerate() {
                if self.folds > 1 && fold * r <= n && n <= (fold + 1) * r {
                    split.test.push(index);
                } else {
                    split.train.push(index);
                }
            }
        }
        split
    }
}
