//! Recording container and loaders
//!
//! A WAV recording is accompanied by a marker file named
//! `<stem>-events.txt` in the same directory holding `key,timestamp` rows.

use crate::error::{Result, SpikeError};
use crate::session::SessionSnapshot;
use crate::types::{FileType, MarkerKey, MarkerMap};
use crate::wav::read_wav;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATATYPE: &str = "SpikerBox";
pub const DEFAULT_IDENTIFIER: &str = "001";
const MARKER_SUFFIX: &str = "-events.txt";

/// Multichannel samples sharing one framerate, plus marker events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub framerate: u32,
    pub channel_names: Vec<String>,
    pub samples: Vec<Vec<f64>>,
    pub markers: MarkerMap,
    pub datatype: String,
    pub identifier: String,
}

impl Recording {
    pub fn new(samples: Vec<Vec<f64>>, framerate: u32, markers: MarkerMap) -> Result<Self> {
        if framerate == 0 {
            return Err(SpikeError::Configuration(
                "Framerate must be greater than 0".to_string(),
            ));
        }
        if let Some(first) = samples.first() {
            if let Some((i, ch)) = samples.iter().enumerate().find(|(_, ch)| ch.len() != first.len()) {
                return Err(SpikeError::Format(format!(
                    "Channel {} has {} samples, channel 1 has {}",
                    i + 1,
                    ch.len(),
                    first.len()
                )));
            }
        }

        let channel_names = (1..=samples.len()).map(|n| format!("Channel {}", n)).collect();
        Ok(Self {
            framerate,
            channel_names,
            samples,
            markers,
            datatype: DEFAULT_DATATYPE.to_string(),
            identifier: DEFAULT_IDENTIFIER.to_string(),
        })
    }

    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    pub fn num_samples(&self) -> usize {
        self.samples.first().map_or(0, Vec::len)
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.num_samples() as f64 / self.framerate as f64
    }

    /// Timestamp of every sample in seconds.
    pub fn time_axis(&self) -> Vec<f64> {
        (0..self.num_samples())
            .map(|i| i as f64 / self.framerate as f64)
            .collect()
    }

    /// Replace the marker map wholesale.
    pub fn with_markers(mut self, markers: MarkerMap) -> Self {
        self.markers = markers;
        self
    }

    /// Keep only the given channels, numbered from 1, in the given order.
    pub fn select_channels(&self, numbers: &[usize]) -> Result<Recording> {
        if numbers.is_empty() {
            return Err(SpikeError::Configuration(
                "At least one channel must be selected".to_string(),
            ));
        }
        let mut samples = Vec::with_capacity(numbers.len());
        let mut channel_names = Vec::with_capacity(numbers.len());
        for &n in numbers {
            if n == 0 || n > self.num_channels() {
                return Err(SpikeError::Configuration(format!(
                    "Channel {} does not exist (recording has {} channel(s))",
                    n,
                    self.num_channels()
                )));
            }
            samples.push(self.samples[n - 1].clone());
            channel_names.push(self.channel_names[n - 1].clone());
        }

        Ok(Recording {
            samples,
            channel_names,
            ..self.clone()
        })
    }
}

/// Where the markers of a loaded recording came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MarkerStatus {
    Loaded { path: PathBuf, events: usize },
    /// No marker file next to the recording; markers are empty
    MissingFile { path: PathBuf },
    /// Markers restored from a session snapshot
    Snapshot,
}

#[derive(Debug, Clone)]
pub struct LoadedRecording {
    pub recording: Recording,
    pub marker_status: MarkerStatus,
}

/// `<dir>/<stem>-events.txt` for a recording path.
pub fn marker_path(recording: &Path) -> PathBuf {
    let stem = recording
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    recording.with_file_name(format!("{}{}", stem, MARKER_SUFFIX))
}

/// Parse `key,timestamp` rows. Lines starting with `#` are comments.
pub fn parse_markers<R: std::io::Read>(reader: R) -> Result<MarkerMap> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut pairs = Vec::new();
    for (row, record) in csv_reader.records().enumerate() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() != 2 {
            return Err(SpikeError::Format(format!(
                "Marker row {} has {} field(s), expected 2",
                row + 1,
                record.len()
            )));
        }
        let key = MarkerKey::parse(&record[0]).ok_or_else(|| {
            SpikeError::Format(format!(
                "Marker row {}: '{}' is not an integral marker code",
                row + 1,
                &record[0]
            ))
        })?;
        let time = record[1]
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .ok_or_else(|| {
                SpikeError::Format(format!(
                    "Marker row {}: '{}' is not a timestamp",
                    row + 1,
                    &record[1]
                ))
            })?;
        pairs.push((key, time));
    }

    Ok(MarkerMap::from_pairs(pairs))
}

/// Read the marker file beside a recording. A missing file is not an error.
pub fn load_markers(recording: &Path) -> Result<(MarkerMap, MarkerStatus)> {
    let path = marker_path(recording);
    if !path.exists() {
        log::warn!("No marker file found at {}", path.display());
        return Ok((MarkerMap::new(), MarkerStatus::MissingFile { path }));
    }

    let file = std::fs::File::open(&path)?;
    let markers = parse_markers(file)?;
    let events = markers.total_events();
    log::info!(
        "Loaded {} marker event(s) under {} key(s) from {}",
        events,
        markers.len(),
        path.display()
    );
    Ok((markers, MarkerStatus::Loaded { path, events }))
}

/// Load a recording by file extension: WAV plus marker file, or a session
/// snapshot.
pub fn load_recording(path: &Path) -> Result<LoadedRecording> {
    if !path.exists() {
        return Err(SpikeError::FileNotFound(path.display().to_string()));
    }

    let file_type = FileType::from_path(path).ok_or_else(|| {
        SpikeError::UnsupportedFileType(format!(
            "{} (supported: {})",
            path.display(),
            FileType::supported_extensions().join(", ")
        ))
    })?;

    match file_type {
        FileType::Wav => {
            let wav = read_wav(path)?;
            let (markers, marker_status) = load_markers(path)?;
            let recording = Recording::new(wav.samples, wav.format.sample_rate, markers)?;
            Ok(LoadedRecording {
                recording,
                marker_status,
            })
        }
        FileType::Snapshot => {
            let snapshot = SessionSnapshot::load(path)?;
            Ok(LoadedRecording {
                recording: snapshot.to_recording()?,
                marker_status: MarkerStatus::Snapshot,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_path() {
        assert_eq!(
            marker_path(Path::new("/data/rec 01.wav")),
            PathBuf::from("/data/rec 01-events.txt")
        );
    }

    #[test]
    fn test_parse_markers() {
        let text = "# Marker IDs can be changed\n1, 0.25\n2,1.5\n\n1.0, 0.1\n";
        let markers = parse_markers(text.as_bytes()).unwrap();
        assert_eq!(markers.get(MarkerKey(1)).unwrap(), &[0.1, 0.25]);
        assert_eq!(markers.get(MarkerKey(2)).unwrap(), &[1.5]);
    }

    #[test]
    fn test_parse_markers_rejects_bad_rows() {
        assert!(matches!(
            parse_markers("1,2,3\n".as_bytes()),
            Err(SpikeError::Format(_))
        ));
        assert!(matches!(
            parse_markers("1.5,2\n".as_bytes()),
            Err(SpikeError::Format(_))
        ));
        assert!(matches!(
            parse_markers("1,abc\n".as_bytes()),
            Err(SpikeError::Format(_))
        ));
    }

    #[test]
    fn test_recording_defaults() {
        let rec = Recording::new(vec![vec![0.0; 50], vec![1.0; 50]], 100, MarkerMap::new()).unwrap();
        assert_eq!(rec.channel_names, vec!["Channel 1", "Channel 2"]);
        assert_eq!(rec.datatype, DEFAULT_DATATYPE);
        assert_eq!(rec.identifier, DEFAULT_IDENTIFIER);
        assert_eq!(rec.duration(), 0.5);
        assert_eq!(rec.time_axis()[10], 0.1);
    }

    #[test]
    fn test_recording_rejects_ragged_channels() {
        let err = Recording::new(vec![vec![0.0; 5], vec![0.0; 4]], 100, MarkerMap::new());
        assert!(matches!(err, Err(SpikeError::Format(_))));
        let err = Recording::new(vec![vec![0.0; 5]], 0, MarkerMap::new());
        assert!(matches!(err, Err(SpikeError::Configuration(_))));
    }

    #[test]
    fn test_select_channels_is_one_based() {
        let rec = Recording::new(vec![vec![1.0], vec![2.0], vec![3.0]], 10, MarkerMap::new()).unwrap();
        let sub = rec.select_channels(&[3, 1]).unwrap();
        assert_eq!(sub.samples, vec![vec![3.0], vec![1.0]]);
        assert_eq!(sub.channel_names, vec!["Channel 3", "Channel 1"]);
        assert!(rec.select_channels(&[0]).is_err());
        assert!(rec.select_channels(&[4]).is_err());
        assert!(rec.select_channels(&[]).is_err());
    }

    #[test]
    fn test_with_markers_replaces_map() {
        let previous = MarkerMap::from_pairs(vec![(MarkerKey(1), 1.0)]);
        let manual = MarkerMap::from_pairs(vec![(MarkerKey(5), 2.0)]);
        let rec = Recording::new(vec![vec![0.0; 10]], 10, previous)
            .unwrap()
            .with_markers(manual.clone());
        assert_eq!(rec.markers, manual);
    }

    #[test]
    fn test_missing_marker_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (markers, status) = load_markers(&dir.path().join("rec.wav")).unwrap();
        assert!(markers.is_empty());
        assert!(matches!(status, MarkerStatus::MissingFile { .. }));
    }

    #[test]
    fn test_load_recording_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.wav");
        assert!(matches!(
            load_recording(&missing),
            Err(SpikeError::FileNotFound(_))
        ));

        let other = dir.path().join("notes.txt");
        std::fs::write(&other, "hello").unwrap();
        assert!(matches!(
            load_recording(&other),
            Err(SpikeError::UnsupportedFileType(_))
        ));
    }
}
