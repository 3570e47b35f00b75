use crate::{
    classifier::Classifier,
    error::{EcgError, EcgResult},
    features::{extract_features, FeatureVector},
    signal::Waveform,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A waveform paired with its event-type label.
#[derive(Debug, Clone)]
pub struct LabeledWaveform {
    pub waveform: Waveform,
    pub label: String,
}

/// Feature vector paired with its event-type label.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub features: FeatureVector,
    pub label: String,
}

/// Supplier of labeled recordings for training.
pub trait EventSource {
    fn labeled_waveforms(&mut self) -> EcgResult<Vec<LabeledWaveform>>;
}

impl EventSource for Vec<LabeledWaveform> {
    fn labeled_waveforms(&mut self) -> EcgResult<Vec<LabeledWaveform>> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub examples: usize,
    pub classes: Vec<String>,
    pub model_path: Option<PathBuf>,
}

/// Pulls every labeled event, extracts features and fits the classifier.
pub struct Trainer<S, C> {
    source: S,
    classifier: C,
}

impl<S: EventSource, C: Classifier> Trainer<S, C> {
    pub fn new(source: S, classifier: C) -> Self {
        Self { source, classifier }
    }

    pub fn prepare(&mut self) -> EcgResult<Vec<TrainingExample>> {
        let events = self.source.labeled_waveforms()?;
        Ok(events
            .into_iter()
            .map(|event| TrainingExample {
                features: extract_features(&event.waveform),
                label: event.label,
            })
            .collect())
    }

    /// Fit the classifier; zero available examples aborts with `NoTrainingData`.
    pub fn train(&mut self) -> EcgResult<TrainingSummary> {
        let examples = self.prepare()?;
        if examples.is_empty() {
            return Err(EcgError::NoTrainingData);
        }
        info!("training on {} example(s)", examples.len());
        let (features, labels): (Vec<FeatureVector>, Vec<String>) = examples
            .into_iter()
            .map(|ex| (ex.features, ex.label))
            .unzip();
        self.classifier.train(&features, &labels)?;
        Ok(TrainingSummary {
            examples: features.len(),
            classes: self.classifier.classes().unwrap_or_default().to_vec(),
            model_path: None,
        })
    }

    pub fn train_and_save(&mut self, path: &Path) -> EcgResult<TrainingSummary> {
        let mut summary = self.train()?;
        self.classifier.save(path)?;
        summary.model_path = Some(path.to_path_buf());
        Ok(summary)
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn into_parts(self) -> (S, C) {
        (self.source, self.classifier)
    }
}
