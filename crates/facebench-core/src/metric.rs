//! Distances between feature vectors. Smaller always means more similar.

/// Distance used by the nearest-neighbour classifier and the threshold verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Euclidean distance.
    L2,
    /// Manhattan distance.
    L1,
    /// Hellinger distance between (non-negative) histograms, in [0, 1].
    Hellinger,
    /// Negated histogram intersection.
    Intersection,
    /// Symmetric chi-square distance.
    ChiSquare,
    /// One minus cosine similarity, in [0, 2].
    Cosine,
}

impl Metric {
    /// Distance over the common prefix of `a` and `b`; callers check lengths.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        let pairs = a.iter().zip(b.iter());
        match self {
            Metric::L2 => pairs.map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt(),
            Metric::L1 => pairs.map(|(x, y)| (x - y).abs()).sum(),
            Metric::Hellinger => {
                let (mut bc, mut sum_a, mut sum_b) = (0.0f32, 0.0f32, 0.0f32);
                for (x, y) in pairs {
                    bc += (x * y).max(0.0).sqrt();
                    sum_a += x;
                    sum_b += y;
                }
                let denom = (sum_a * sum_b).sqrt();
                if denom > 0.0 {
                    (1.0 - bc / denom).max(0.0).sqrt()
                } else {
                    1.0
                }
            }
            Metric::Intersection => -pairs.map(|(x, y)| x.min(*y)).sum::<f32>(),
            Metric::ChiSquare => pairs
                .map(|(x, y)| {
                    let s = x + y;
                    if s.abs() > f32::EPSILON {
                        (x - y).powi(2) / s.abs()
                    } else {
                        0.0
                    }
                })
                .sum(),
            Metric::Cosine => {
                let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
                for (x, y) in pairs {
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                let denom = norm_a.sqrt() * norm_b.sqrt();
                if denom > 0.0 {
                    1.0 - dot / denom
                } else {
                    1.0
                }
            }
        }
    }
}
