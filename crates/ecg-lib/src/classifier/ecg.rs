use super::{
    forest::{argmax, ForestParams, RandomForest},
    scaler::StandardScaler,
    Classifier,
};
use crate::error::{EcgError, EcgResult};
use crate::features::FeatureVector;
use log::info;
use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};

/// Leading bytes of every persisted model file.
const MODEL_MAGIC: &[u8; 4] = b"ECGM";
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Scaler, forest and class labels fitted together and persisted as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub scaler: StandardScaler,
    pub forest: RandomForest,
    /// Sorted, unique; position `i` matches forest class `i`.
    pub classes: Vec<String>,
}

impl FittedModel {
    fn predict_proba(&self, rows: &[FeatureVector]) -> EcgResult<Vec<Vec<f64>>> {
        rows.iter()
            .map(|row| {
                let scaled = self.scaler.transform_row(row)?;
                Ok(self.forest.predict_proba_row(&scaled))
            })
            .collect()
    }

    fn validate(&self) -> Result<(), String> {
        self.forest.validate()?;
        if self.scaler.n_features() != self.forest.n_features() {
            return Err(format!(
                "scaler expects {} features but forest expects {}",
                self.scaler.n_features(),
                self.forest.n_features()
            ));
        }
        if self.scaler.mean.len() != self.scaler.scale.len() {
            return Err("scaler mean/scale lengths differ".into());
        }
        if self.classes.len() != self.forest.n_classes() {
            return Err(format!(
                "{} class labels but forest has {} classes",
                self.classes.len(),
                self.forest.n_classes()
            ));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct ModelBlob {
    format_version: u32,
    model: FittedModel,
}

/// Z-score scaler followed by a random forest.
#[derive(Debug, Clone, Default)]
pub struct EcgClassifier {
    params: ForestParams,
    fitted: Option<FittedModel>,
}

impl EcgClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: ForestParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    /// Build a classifier straight from a model file.
    pub fn from_file(path: &Path) -> EcgResult<Self> {
        let mut classifier = Self::new();
        classifier.load(path)?;
        Ok(classifier)
    }

    pub fn fitted(&self) -> Option<&FittedModel> {
        self.fitted.as_ref()
    }

    fn model(&self) -> EcgResult<&FittedModel> {
        self.fitted.as_ref().ok_or(EcgError::ModelNotFitted)
    }
}

impl Classifier for EcgClassifier {
    fn train(&mut self, features: &[FeatureVector], labels: &[String]) -> EcgResult<()> {
        if features.is_empty() {
            return Err(EcgError::InsufficientData);
        }
        if features.len() != labels.len() {
            return Err(EcgError::LabelCountMismatch {
                rows: features.len(),
                labels: labels.len(),
            });
        }
        let width = features[0].len();
        if let Some(row) = features.iter().find(|row| row.len() != width) {
            return Err(EcgError::FeatureDimensionMismatch {
                expected: width,
                found: row.len(),
            });
        }
        if let Some(idx) = features
            .iter()
            .position(|row| row.iter().any(|v| !v.is_finite()))
        {
            return Err(EcgError::InvalidWaveform(format!(
                "feature row {} has a non-finite value",
                idx
            )));
        }

        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();
        let y: Vec<usize> = labels
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or_default())
            .collect();

        let scaler = StandardScaler::fit(features)?;
        let scaled = scaler.transform(features)?;
        let forest = RandomForest::fit(&scaled, &y, classes.len(), self.params);
        info!(
            "trained forest: {} rows, {} features, {} classes, {} trees",
            features.len(),
            width,
            classes.len(),
            forest.trees().len()
        );
        self.fitted = Some(FittedModel {
            scaler,
            forest,
            classes,
        });
        Ok(())
    }

    fn predict(&self, features: &[FeatureVector]) -> EcgResult<Vec<String>> {
        let model = self.model()?;
        Ok(model
            .predict_proba(features)?
            .iter()
            .map(|p| model.classes[argmax(p)].clone())
            .collect())
    }

    fn predict_proba(&self, features: &[FeatureVector]) -> EcgResult<Vec<Vec<f64>>> {
        self.model()?.predict_proba(features)
    }

    fn classes(&self) -> Option<&[String]> {
        self.fitted.as_ref().map(|m| m.classes.as_slice())
    }

    fn save(&self, path: &Path) -> EcgResult<()> {
        let model = self.model()?;
        let blob = ModelBlob {
            format_version: MODEL_FORMAT_VERSION,
            model: model.clone(),
        };
        let mut bytes = MODEL_MAGIC.to_vec();
        let body = bincode::serialize(&blob)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        bytes.extend_from_slice(&body);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        info!("saved model to {}", path.display());
        Ok(())
    }

    fn load(&mut self, path: &Path) -> EcgResult<()> {
        let bytes = fs::read(path)
            .map_err(|e| EcgError::ModelLoad(format!("reading {}: {}", path.display(), e)))?;
        let body = bytes
            .strip_prefix(MODEL_MAGIC.as_slice())
            .ok_or_else(|| EcgError::ModelLoad(format!("{} is not a model file", path.display())))?;
        let blob: ModelBlob = bincode::deserialize(body)
            .map_err(|e| EcgError::ModelLoad(format!("decoding {}: {}", path.display(), e)))?;
        if blob.format_version != MODEL_FORMAT_VERSION {
            return Err(EcgError::ModelLoad(format!(
                "unsupported model format version {} (expected {})",
                blob.format_version, MODEL_FORMAT_VERSION
            )));
        }
        blob.model.validate().map_err(EcgError::ModelLoad)?;
        info!(
            "loaded model from {} ({} classes)",
            path.display(),
            blob.model.classes.len()
        );
        self.fitted = Some(blob.model);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_LEN;
    use tempfile::tempdir;

    fn dataset() -> (Vec<FeatureVector>, Vec<String>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            let offset = (i % 6) as f64 * 0.05;
            let (base, label) = match i % 3 {
                0 => (-4.0, "AFIB"),
                1 => (0.0, "Brady"),
                _ => (4.0, "Tachy"),
            };
            x.push((0..FEATURE_LEN).map(|j| base + offset + j as f64).collect());
            y.push(label.to_string());
        }
        (x, y)
    }

    fn quick() -> EcgClassifier {
        EcgClassifier::with_params(ForestParams {
            n_estimators: 20,
            ..ForestParams::default()
        })
    }

    #[test]
    fn train_rejects_empty_batch() {
        let mut clf = quick();
        assert!(matches!(clf.train(&[], &[]), Err(EcgError::InsufficientData)));
        assert!(!clf.is_fitted());
    }

    #[test]
    fn predict_before_fit_fails() {
        let clf = quick();
        let row = vec![0.0; FEATURE_LEN];
        assert!(matches!(clf.predict_one(&row), Err(EcgError::ModelNotFitted)));
        assert!(matches!(
            clf.predict_proba(&[row]),
            Err(EcgError::ModelNotFitted)
        ));
    }

    #[test]
    fn label_count_must_match() {
        let (x, mut y) = dataset();
        y.pop();
        let err = quick().train(&x, &y).unwrap_err();
        assert!(matches!(err, EcgError::LabelCountMismatch { rows: 30, labels: 29 }));
    }

    #[test]
    fn predicts_training_classes() {
        let (x, y) = dataset();
        let mut clf = quick();
        clf.train(&x, &y).unwrap();
        assert_eq!(clf.classes().unwrap(), ["AFIB", "Brady", "Tachy"]);
        assert_eq!(clf.predict(&x).unwrap(), y);
    }

    #[test]
    fn predictions_reuse_training_scaler() {
        let (x, y) = dataset();
        let mut clf = quick();
        clf.train(&x, &y).unwrap();
        let fitted_scaler = StandardScaler::fit(&x).unwrap();
        assert_eq!(clf.fitted().unwrap().scaler, fitted_scaler);

        // a lone row has no spread of its own; any refit would change its scaling
        let batch = clf.predict_proba(&x).unwrap();
        for (row, expected) in x.iter().zip(&batch) {
            assert_eq!(&clf.predict_proba_one(row).unwrap(), expected);
        }
        assert_eq!(clf.fitted().unwrap().scaler, fitted_scaler);
    }

    #[test]
    fn non_finite_features_are_rejected() {
        let (mut x, y) = dataset();
        x[3][0] = f64::NAN;
        let mut clf = quick();
        let err = clf.train(&x, &y).unwrap_err();
        assert!(matches!(err, EcgError::InvalidWaveform(_)));
        assert!(!clf.is_fitted());
    }

    #[test]
    fn probabilities_follow_class_order() {
        let (x, y) = dataset();
        let mut clf = quick();
        clf.train(&x, &y).unwrap();
        let proba = clf.predict_proba(&x).unwrap();
        assert_eq!(proba.len(), x.len());
        for (row, label) in proba.iter().zip(&y) {
            assert_eq!(row.len(), 3);
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            let best = argmax(row);
            assert_eq!(&clf.classes().unwrap()[best], label);
        }
    }

    #[test]
    fn wrong_width_is_dimension_mismatch() {
        let (x, y) = dataset();
        let mut clf = quick();
        clf.train(&x, &y).unwrap();
        let err = clf.predict_one(&[0.0; 10]).unwrap_err();
        assert!(matches!(
            err,
            EcgError::FeatureDimensionMismatch {
                expected: 24,
                found: 10
            }
        ));
    }

    #[test]
    fn save_load_round_trip() {
        let (x, y) = dataset();
        let mut clf = quick();
        clf.train(&x, &y).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/model.bin");
        clf.save(&path).unwrap();

        let loaded = EcgClassifier::from_file(&path).unwrap();
        assert_eq!(loaded.fitted(), clf.fitted());
        assert_eq!(loaded.predict(&x).unwrap(), clf.predict(&x).unwrap());
        assert_eq!(
            loaded.predict_proba(&x).unwrap(),
            clf.predict_proba(&x).unwrap()
        );
    }

    #[test]
    fn load_replaces_previous_state() {
        let (x, y) = dataset();
        let mut clf = quick();
        clf.train(&x, &y).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        clf.save(&path).unwrap();

        let mut other = quick();
        let two: Vec<String> = y.iter().map(|l| if l == "AFIB" { l.clone() } else { "Other".into() }).collect();
        other.train(&x, &two).unwrap();
        other.load(&path).unwrap();
        assert_eq!(other.classes().unwrap(), ["AFIB", "Brady", "Tachy"]);
    }

    #[test]
    fn load_missing_file_is_load_error() {
        let dir = tempdir().unwrap();
        let mut clf = quick();
        let err = clf.load(&dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, EcgError::ModelLoad(_)));
        assert!(!clf.is_fitted());
    }

    #[test]
    fn load_corrupt_blob_is_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        fs::write(&path, b"not a model").unwrap();
        assert!(matches!(
            EcgClassifier::from_file(&path),
            Err(EcgError::ModelLoad(_))
        ));

        let (x, y) = dataset();
        let mut clf = quick();
        clf.train(&x, &y).unwrap();
        clf.save(&path).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(
            EcgClassifier::from_file(&path),
            Err(EcgError::ModelLoad(_))
        ));
    }

    #[test]
    fn save_unfitted_fails() {
        let dir = tempdir().unwrap();
        let err = quick().save(&dir.path().join("m.bin")).unwrap_err();
        assert!(matches!(err, EcgError::ModelNotFitted));
    }
}
