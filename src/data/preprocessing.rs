use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-column statistics for z-score standardization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    /// Mean value for each feature
    pub means: Vec<f32>,
    /// Standard deviation for each feature
    pub stds: Vec<f32>,
}

impl FeatureStats {
    /// Compute statistics from a row-major `[rows, num_features]` matrix
    pub fn compute(values: &[f32], num_features: usize) -> Self {
        let mut means = vec![0.0f32; num_features];
        let mut stds = vec![1.0f32; num_features];

        if num_features == 0 {
            return Self { means, stds };
        }

        let rows = values.len() / num_features;
        for row in values.chunks_exact(num_features) {
            for (i, &value) in row.iter().enumerate() {
                means[i] += value;
            }
        }

        if rows == 0 {
            return Self { means, stds };
        }

        for mean in means.iter_mut() {
            *mean /= rows as f32;
        }

        if rows > 1 {
            let mut variances = vec![0.0f32; num_features];
            for row in values.chunks_exact(num_features) {
                for (i, &value) in row.iter().enumerate() {
                    let diff = value - means[i];
                    variances[i] += diff * diff;
                }
            }
            for (std, variance) in stds.iter_mut().zip(variances) {
                *std = (variance / (rows - 1) as f32).sqrt();
            }
        }

        // Constant columns are left centred but unscaled
        for std in stds.iter_mut() {
            if *std < 1e-8 {
                *std = 1.0;
            }
        }

        Self { means, stds }
    }

    /// Number of feature columns covered
    pub fn num_features(&self) -> usize {
        self.means.len()
    }

    /// Standardize a row-major matrix in place
    pub fn standardize(&self, values: &mut [f32]) {
        let num_features = self.means.len();
        if num_features == 0 {
            return;
        }
        for row in values.chunks_exact_mut(num_features) {
            for (i, value) in row.iter_mut().enumerate() {
                *value = (*value - self.means[i]) / self.stds[i];
            }
        }
    }
}

/// Fit statistics on the matrix and standardize it in place
pub fn standardize_features(values: &mut [f32], num_features: usize) -> FeatureStats {
    let stats = FeatureStats::compute(values, num_features);
    stats.standardize(values);
    debug!("Standardized {} feature columns", num_features);
    stats
}
