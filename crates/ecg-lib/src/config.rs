use crate::detectors::OnsetDetector;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_FILE: &str = "ecg_classifier.bin";
pub const DEFAULT_MODEL_DIR: &str = "./models";

/// Runtime settings: defaults, then an optional TOML file, then environment
/// variables (`DATA_PATH`, `MODEL_PATH`, `SAMPLING_RATE`).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_path: PathBuf,
    pub model_path: Option<PathBuf>,
    pub sampling_rate: u32,
    pub detector: OnsetDetector,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./data"),
            model_path: None,
            sampling_rate: 200,
            detector: OnsetDetector::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    data_path: Option<PathBuf>,
    #[serde(default)]
    model_path: Option<PathBuf>,
    #[serde(default)]
    sampling_rate: Option<u32>,
    #[serde(default)]
    detector: Option<DetectorSection>,
}

#[derive(Debug, Default, Deserialize)]
struct DetectorSection {
    #[serde(default)]
    window_size: Option<usize>,
    #[serde(default)]
    threshold_factor: Option<f64>,
}

impl Settings {
    /// Defaults overlaid with `config` (if any) and then the process environment.
    pub fn load(config: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(path) = config {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            settings.apply_toml(&text)
                .with_context(|| format!("invalid settings file {}", path.display()))?;
        }
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn apply_toml(&mut self, text: &str) -> Result<()> {
        let file: SettingsFile = toml::from_str(text)?;
        if let Some(data_path) = file.data_path {
            self.data_path = data_path;
        }
        if file.model_path.is_some() {
            self.model_path = file.model_path;
        }
        if let Some(rate) = file.sampling_rate {
            self.sampling_rate = rate;
        }
        if let Some(detector) = file.detector {
            if let Some(window_size) = detector.window_size {
                self.detector.window_size = window_size;
            }
            if let Some(factor) = detector.threshold_factor {
                self.detector.threshold_factor = factor;
            }
        }
        self.check()
    }

    /// Overlay variables looked up through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("DATA_PATH") {
            self.data_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("MODEL_PATH") {
            self.model_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("SAMPLING_RATE") {
            self.sampling_rate = value
                .trim()
                .parse()
                .with_context(|| format!("SAMPLING_RATE is not an integer: {}", value))?;
        }
        self.check()
    }

    fn check(&self) -> Result<()> {
        if self.sampling_rate == 0 {
            anyhow::bail!("sampling rate must be positive");
        }
        Ok(())
    }

    /// Where the model blob lives: `<model_path>/ecg_classifier.bin` when
    /// `model_path` is an existing directory, `model_path` itself otherwise,
    /// and `./models/ecg_classifier.bin` when unset.
    pub fn resolve_model_path(&self) -> PathBuf {
        match &self.model_path {
            Some(path) if path.is_dir() => path.join(DEFAULT_MODEL_FILE),
            Some(path) => path.clone(),
            None => Path::new(DEFAULT_MODEL_DIR).join(DEFAULT_MODEL_FILE),
        }
    }
}
