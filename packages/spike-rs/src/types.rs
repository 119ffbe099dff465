use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Numeric marker code as written by the acquisition software.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerKey(pub i64);

impl MarkerKey {
    /// Parse a marker code. Marker files store codes as floats (`1.0`), so
    /// any integral decimal is accepted.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(v) = text.parse::<i64>() {
            return Some(MarkerKey(v));
        }
        let v = text.parse::<f64>().ok()?;
        if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
            Some(MarkerKey(v as i64))
        } else {
            None
        }
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marker code → timestamps in seconds, each list kept ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerMap {
    events: BTreeMap<MarkerKey, Vec<f64>>,
}

impl MarkerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from `(key, timestamp)` rows in file order.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (MarkerKey, f64)>,
    {
        let mut map = Self::new();
        for (key, time) in pairs {
            map.insert(key, time);
        }
        map
    }

    /// Insert a timestamp, keeping the key's list ascending. Duplicates are
    /// kept; an equal timestamp goes after the existing ones.
    pub fn insert(&mut self, key: MarkerKey, time: f64) {
        let times = self.events.entry(key).or_default();
        let pos = times.partition_point(|&t| t <= time);
        times.insert(pos, time);
    }

    pub fn get(&self, key: MarkerKey) -> Option<&[f64]> {
        self.events.get(&key).map(|v| v.as_slice())
    }

    /// First recorded timestamp of a marker.
    pub fn first(&self, key: MarkerKey) -> Option<f64> {
        self.events.get(&key).and_then(|v| v.first().copied())
    }

    pub fn keys(&self) -> impl Iterator<Item = MarkerKey> + '_ {
        self.events.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MarkerKey, &[f64])> + '_ {
        self.events.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Number of marker keys.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of timestamps across all keys.
    pub fn total_events(&self) -> usize {
        self.events.values().map(|v| v.len()).sum()
    }

    /// New map holding only the timestamps accepted by `keep`; keys left
    /// without timestamps are dropped.
    pub fn retain_times<F>(&self, mut keep: F) -> MarkerMap
    where
        F: FnMut(f64) -> bool,
    {
        let events = self
            .events
            .iter()
            .filter_map(|(key, times)| {
                let kept: Vec<f64> = times.iter().copied().filter(|&t| keep(t)).collect();
                if kept.is_empty() {
                    None
                } else {
                    Some((*key, kept))
                }
            })
            .collect();
        MarkerMap { events }
    }
}

/// Input container types understood by the recording loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Waveform-audio recording (SpikeRecorder / SpikerBox output)
    Wav,
    /// Previously saved session snapshot
    Snapshot,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Some(FileType::Wav),
            "json" => Some(FileType::Snapshot),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn supported_extensions() -> &'static [&'static str] {
        &["wav", "wave", "json"]
    }
}
