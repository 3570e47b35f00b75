//! Supervised event-type classification over feature vectors.

pub mod ecg;
pub mod forest;
pub mod scaler;

pub use ecg::{EcgClassifier, FittedModel, MODEL_FORMAT_VERSION};
pub use forest::{ForestParams, RandomForest};
pub use scaler::StandardScaler;

use crate::error::EcgResult;
use crate::features::FeatureVector;
use std::path::Path;

/// Capability set shared by every estimator the pipeline can drive.
///
/// Prediction takes `&self` and never alters fitted state, so a fitted
/// instance may serve concurrent readers. `train` and `load` replace state
/// and need exclusive access.
pub trait Classifier: Send + Sync {
    /// Fit on `features` rows with the parallel `labels`, replacing prior state.
    fn train(&mut self, features: &[FeatureVector], labels: &[String]) -> EcgResult<()>;

    /// One label per row.
    fn predict(&self, features: &[FeatureVector]) -> EcgResult<Vec<String>>;

    /// One probability per known class per row, ordered as [`Classifier::classes`].
    fn predict_proba(&self, features: &[FeatureVector]) -> EcgResult<Vec<Vec<f64>>>;

    /// Ordered class labels, or `None` before the model is fitted.
    fn classes(&self) -> Option<&[String]>;

    fn save(&self, path: &Path) -> EcgResult<()>;

    /// Replace in-memory state with the model stored at `path`.
    fn load(&mut self, path: &Path) -> EcgResult<()>;

    fn is_fitted(&self) -> bool {
        self.classes().is_some()
    }

    fn predict_one(&self, features: &[f64]) -> EcgResult<String> {
        let mut labels = self.predict(&[features.to_vec()])?;
        Ok(labels.remove(0))
    }

    fn predict_proba_one(&self, features: &[f64]) -> EcgResult<Vec<f64>> {
        let mut rows = self.predict_proba(&[features.to_vec()])?;
        Ok(rows.remove(0))
    }
}
