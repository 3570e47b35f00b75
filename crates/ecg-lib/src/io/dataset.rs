//! Event-folder dataset scanning.
//!
//! ```text
//! data_path/
//!   <folder>/                 an event folder itself, or
//!   <folder>/event_<n>/       one event folder per subfolder
//!     event_<n>.json          metadata
//!     <chunk>.txt ...         ch1,ch2 CSV chunks, concatenated in name order
//! ```

use super::chunks::{read_channel_file, ChannelPair};
use crate::{
    error::{EcgError, EcgResult},
    signal::Waveform,
    trainer::{EventSource, LabeledWaveform},
};
use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Offset assumed when the event timestamp cannot be parsed.
pub const DEFAULT_EVENT_OFFSET_S: f64 = 30.0;

/// Per-event metadata as exported by the recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(rename = "Patient_IR_ID", default)]
    pub patient_id: String,
    #[serde(rename = "Event_Name")]
    pub event_name: String,
    #[serde(rename = "EventOccuredTime", default)]
    pub event_time: String,
    #[serde(rename = "Approved", default)]
    pub approved: Option<Value>,
}

impl EventMetadata {
    pub fn is_approved(&self) -> bool {
        match &self.approved {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            Some(Value::String(s)) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "1" | "approved"
            ),
            _ => false,
        }
    }
}

/// Reviewer-annotated onset derived from the metadata timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedOnset {
    pub sample_index: usize,
    pub offset_seconds: f64,
    /// The timestamp was unparseable and [`DEFAULT_EVENT_OFFSET_S`] was used.
    pub defaulted: bool,
}

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub event_id: String,
    pub folder_name: String,
    pub metadata: EventMetadata,
    pub waveform: Waveform,
    pub chunk_lengths: Vec<usize>,
    pub annotated_onset: AnnotatedOnset,
}

/// Result of visiting one candidate event folder.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Loaded(Box<EventRecord>),
    Skipped { path: PathBuf, reason: String },
}

/// Seconds field of a `"YYYY-MM-DD HH:MM:SS.fff"` timestamp.
pub fn parse_event_offset(timestamp: &str) -> Option<f64> {
    let time = timestamp.split(' ').nth(1)?;
    let seconds = time.split(':').nth(2)?;
    seconds.trim().parse().ok()
}

pub struct DataLoader {
    data_path: PathBuf,
    sampling_rate: u32,
}

impl DataLoader {
    pub fn new(data_path: impl Into<PathBuf>, sampling_rate: u32) -> Self {
        Self {
            data_path: data_path.into(),
            sampling_rate,
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Visit every top-level folder in name order. A missing root is an empty scan.
    pub fn scan_dataset(&self) -> Vec<ScanOutcome> {
        let mut outcomes = Vec::new();
        if !self.data_path.exists() {
            warn!("data path {} does not exist", self.data_path.display());
            return outcomes;
        }
        let folders = match sorted_subdirs(&self.data_path, |_| true) {
            Ok(folders) => folders,
            Err(err) => {
                outcomes.push(skipped(&self.data_path, &err));
                return outcomes;
            }
        };
        for folder in folders {
            let folder_name = file_name(&folder);
            let subfolders = match sorted_subdirs(&folder, |name| name.starts_with("event_")) {
                Ok(subfolders) => subfolders,
                Err(err) => {
                    outcomes.push(skipped(&folder, &err));
                    continue;
                }
            };
            if subfolders.is_empty() {
                outcomes.push(self.visit(&folder, folder_name.clone(), &folder_name));
            } else {
                for sub in subfolders {
                    let event_id = format!("{}_{}", folder_name, file_name(&sub));
                    outcomes.push(self.visit(&sub, event_id, &folder_name));
                }
            }
        }
        let loaded = outcomes
            .iter()
            .filter(|o| matches!(o, ScanOutcome::Loaded(_)))
            .count();
        info!(
            "scanned {}: {} event(s) loaded, {} skipped",
            self.data_path.display(),
            loaded,
            outcomes.len() - loaded
        );
        outcomes
    }

    fn visit(&self, folder: &Path, event_id: String, folder_name: &str) -> ScanOutcome {
        match self.load_event(folder, event_id, folder_name) {
            Ok(record) => ScanOutcome::Loaded(Box::new(record)),
            Err(err) => skipped(folder, &err),
        }
    }

    pub fn load_event(&self, folder: &Path, event_id: String, folder_name: &str) -> Result<EventRecord> {
        let metadata = load_event_metadata(folder)?;

        let chunk_files = chunk_files(folder)?;
        if chunk_files.is_empty() {
            return Err(anyhow!("no ECG chunk files"));
        }
        let mut combined = ChannelPair::default();
        let mut chunk_lengths = Vec::with_capacity(chunk_files.len());
        for path in &chunk_files {
            let chunk = read_channel_file(path)?;
            chunk_lengths.push(chunk.len());
            combined.append(chunk);
        }
        let waveform = Waveform::new(combined.ch1, combined.ch2, self.sampling_rate)?;

        let (offset_seconds, defaulted) = match parse_event_offset(&metadata.event_time) {
            Some(offset) => (offset, false),
            None => {
                warn!(
                    "{}: unparseable event time {:?}, assuming {}s",
                    event_id, metadata.event_time, DEFAULT_EVENT_OFFSET_S
                );
                (DEFAULT_EVENT_OFFSET_S, true)
            }
        };
        let sample_index =
            chunk_lengths[0] + (offset_seconds * self.sampling_rate as f64) as usize;

        Ok(EventRecord {
            event_id,
            folder_name: folder_name.to_string(),
            metadata,
            waveform,
            chunk_lengths,
            annotated_onset: AnnotatedOnset {
                sample_index,
                offset_seconds,
                defaulted,
            },
        })
    }
}

/// Parse the first `event_*.json` file in `folder`.
pub fn load_event_metadata(folder: &Path) -> Result<EventMetadata> {
    let path = sorted_files(folder, |name| name.starts_with("event_") && name.ends_with(".json"))?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no event_*.json metadata"))?;
    let text =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid metadata {}", path.display()))
}

fn chunk_files(folder: &Path) -> Result<Vec<PathBuf>> {
    sorted_files(folder, |name| name.ends_with(".txt") && !name.starts_with("event_"))
}

fn sorted_files(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    sorted_entries(dir, false, keep)
}

fn sorted_subdirs(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    sorted_entries(dir, true, keep)
}

fn sorted_entries(dir: &Path, dirs: bool, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() != dirs {
            continue;
        }
        if keep(&file_name(&path)) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn skipped(path: &Path, err: &anyhow::Error) -> ScanOutcome {
    let reason = format!("{:#}", err);
    warn!("skipping {}: {}", path.display(), reason);
    ScanOutcome::Skipped {
        path: path.to_path_buf(),
        reason,
    }
}

/// Lazily scanned, cached view over a dataset directory.
pub struct EventRepository {
    loader: DataLoader,
    cache: Option<Vec<ScanOutcome>>,
}

impl EventRepository {
    pub fn new(loader: DataLoader) -> Self {
        Self {
            loader,
            cache: None,
        }
    }

    fn outcomes(&mut self, force_reload: bool) -> &[ScanOutcome] {
        if force_reload || self.cache.is_none() {
            self.cache = Some(self.loader.scan_dataset());
        }
        self.cache.as_deref().unwrap_or_default()
    }

    pub fn events(&mut self, force_reload: bool) -> Vec<&EventRecord> {
        self.outcomes(force_reload)
            .iter()
            .filter_map(|o| match o {
                ScanOutcome::Loaded(record) => Some(record.as_ref()),
                ScanOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    /// Folders that could not be loaded, with the reason.
    pub fn skipped(&mut self) -> Vec<(PathBuf, String)> {
        self.outcomes(false)
            .iter()
            .filter_map(|o| match o {
                ScanOutcome::Skipped { path, reason } => Some((path.clone(), reason.clone())),
                ScanOutcome::Loaded(_) => None,
            })
            .collect()
    }

    /// Match on event id first, then folder name.
    pub fn event_by_id(&mut self, id: &str) -> Option<&EventRecord> {
        let events = self.events(false);
        events
            .iter()
            .find(|e| e.event_id == id)
            .or_else(|| events.iter().find(|e| e.folder_name == id))
            .copied()
    }

    pub fn events_by_type(&mut self, event_type: &str) -> Vec<&EventRecord> {
        self.events(false)
            .into_iter()
            .filter(|e| e.metadata.event_name == event_type)
            .collect()
    }

    pub fn event_ids(&mut self) -> Vec<String> {
        self.events(false)
            .iter()
            .map(|e| e.event_id.clone())
            .collect()
    }
}

impl EventSource for EventRepository {
    fn labeled_waveforms(&mut self) -> EcgResult<Vec<LabeledWaveform>> {
        if !self.loader.data_path().exists() {
            return Err(EcgError::Dataset(format!(
                "data path {} does not exist",
                self.loader.data_path().display()
            )));
        }
        Ok(self
            .events(false)
            .into_iter()
            .map(|e| LabeledWaveform {
                waveform: e.waveform.clone(),
                label: e.metadata.event_name.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_event(dir: &Path, name: &str, event_time: &str, chunks: &[usize]) {
        fs::create_dir_all(dir).unwrap();
        let meta = serde_json::json!({
            "Patient_IR_ID": "P-001",
            "Event_Name": name,
            "EventOccuredTime": event_time,
            "Approved": true,
        });
        fs::write(dir.join("event_1.json"), meta.to_string()).unwrap();
        for (i, &len) in chunks.iter().enumerate() {
            let mut text = String::from("ch1,ch2\n");
            for s in 0..len {
                text.push_str(&format!("{},{}\n", s, -(s as f64)));
            }
            fs::write(dir.join(format!("chunk_{:02}.txt", i)), text).unwrap();
        }
    }

    #[test]
    fn parses_event_offset_seconds() {
        assert_eq!(parse_event_offset("2024-03-01 10:15:12.5"), Some(12.5));
        assert_eq!(parse_event_offset("10:15:12.5"), None);
        assert_eq!(parse_event_offset("2024-03-01 10:15"), None);
    }

    #[test]
    fn loads_flat_and_nested_layouts() {
        let root = tempdir().unwrap();
        write_event(&root.path().join("a_flat"), "AFIB", "2024-03-01 10:15:12.5", &[10, 5]);
        write_event(&root.path().join("b_nested/event_1"), "Brady", "bad", &[4]);
        write_event(&root.path().join("b_nested/event_2"), "Brady", "2024-03-01 00:00:01", &[4]);

        let mut repo = EventRepository::new(DataLoader::new(root.path(), 200));
        assert_eq!(
            repo.event_ids(),
            vec!["a_flat", "b_nested_event_1", "b_nested_event_2"]
        );

        let flat = repo.event_by_id("a_flat").unwrap();
        assert_eq!(flat.waveform.len(), 15);
        assert_eq!(flat.chunk_lengths, vec![10, 5]);
        // chunks concatenate in name order
        assert_eq!(flat.waveform.channel1()[10], 0.0);
        assert_eq!(flat.annotated_onset.sample_index, 10 + 2500);
        assert!(flat.metadata.is_approved());

        let defaulted = repo.event_by_id("b_nested_event_1").unwrap();
        assert!(defaulted.annotated_onset.defaulted);
        assert_eq!(defaulted.annotated_onset.sample_index, 4 + 6000);

        // folder name falls back to the first event in that folder
        assert_eq!(repo.event_by_id("b_nested").unwrap().event_id, "b_nested_event_1");
        assert_eq!(repo.events_by_type("Brady").len(), 2);
    }

    #[test]
    fn broken_folders_are_reported_not_dropped() {
        let root = tempdir().unwrap();
        write_event(&root.path().join("good"), "VT", "2024-03-01 00:00:01", &[8]);
        fs::create_dir_all(root.path().join("no_meta")).unwrap();
        fs::write(root.path().join("no_meta/chunk.txt"), "ch1,ch2\n1,2\n").unwrap();
        write_event(&root.path().join("bad_chunk"), "VT", "2024-03-01 00:00:01", &[]);
        fs::write(root.path().join("bad_chunk/chunk.txt"), "ch1,ch2\n1,oops\n").unwrap();

        let mut repo = EventRepository::new(DataLoader::new(root.path(), 200));
        assert_eq!(repo.events(false).len(), 1);
        let skipped = repo.skipped();
        assert_eq!(skipped.len(), 2);
        assert!(skipped.iter().any(|(_, reason)| reason.contains("metadata")));
        assert!(skipped.iter().any(|(_, reason)| reason.contains("not f64")));
    }

    #[test]
    fn non_finite_chunk_samples_skip_the_event() {
        let root = tempdir().unwrap();
        write_event(&root.path().join("clean"), "VT", "2024-03-01 00:00:01", &[8]);
        write_event(&root.path().join("gap"), "VT", "2024-03-01 00:00:01", &[]);
        fs::write(root.path().join("gap/chunk.txt"), "ch1,ch2
1.0,2.0
nan,2.5
").unwrap();

        let mut repo = EventRepository::new(DataLoader::new(root.path(), 200));
        assert_eq!(repo.event_ids(), vec!["clean"]);
        let skipped = repo.skipped();
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].1.contains("not finite"), "{}", skipped[0].1);
        assert_eq!(repo.labeled_waveforms().unwrap().len(), 1);
    }

    #[test]
    fn missing_root_scans_empty_but_cannot_train() {
        let root = tempdir().unwrap();
        let mut repo = EventRepository::new(DataLoader::new(root.path().join("absent"), 200));
        assert!(repo.events(false).is_empty());
        assert!(matches!(
            repo.labeled_waveforms(),
            Err(EcgError::Dataset(_))
        ));
    }

    #[test]
    fn labeled_waveforms_use_event_name() {
        let root = tempdir().unwrap();
        write_event(&root.path().join("x"), "Pause", "2024-03-01 00:00:01", &[6]);
        let mut repo = EventRepository::new(DataLoader::new(root.path(), 200));
        let labeled = repo.labeled_waveforms().unwrap();
        assert_eq!(labeled.len(), 1);
        assert_eq!(labeled[0].label, "Pause");
        assert_eq!(labeled[0].waveform.sampling_rate(), 200);
    }
}
