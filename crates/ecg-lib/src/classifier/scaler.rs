use crate::error::{EcgError, EcgResult};
use crate::features::stats;
use serde::{Deserialize, Serialize};

/// Per-feature z-score transform fitted from one training batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit column means and population standard deviations.
    ///
    /// Constant columns get a scale of `1.0` so they map to zero instead of NaN.
    /// Rows must already share one length.
    pub fn fit(rows: &[Vec<f64>]) -> EcgResult<Self> {
        let width = rows.first().map(Vec::len).ok_or(EcgError::InsufficientData)?;
        let mut mean = Vec::with_capacity(width);
        let mut scale = Vec::with_capacity(width);
        let mut column = Vec::with_capacity(rows.len());
        for j in 0..width {
            column.clear();
            column.extend(rows.iter().map(|row| row[j]));
            mean.push(stats::mean(&column));
            let sd = stats::std_dev(&column);
            scale.push(if sd > 0.0 { sd } else { 1.0 });
        }
        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> EcgResult<Vec<f64>> {
        if row.len() != self.n_features() {
            return Err(EcgError::FeatureDimensionMismatch {
                expected: self.n_features(),
                found: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> EcgResult<Vec<Vec<f64>>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }
}
