//! Analysis session and JSON snapshots
//!
//! A [`Session`] carries a recording through the pipeline. Every stage
//! borrows the current session and returns a new one with the stage appended
//! to its history, so earlier versions stay valid.

use crate::error::{Result, SpikeError};
use crate::filter::{FilterOptions, PassBand, SignalFilter};
use crate::progress::Progress;
use crate::recording::{Recording, DEFAULT_DATATYPE, DEFAULT_IDENTIFIER};
use crate::sorter::{threshold_label, SortOptions, SortResult, SpikeSorter};
use crate::types::MarkerMap;
use crate::window::{resolve_windows, select_windows, total_duration, Selection, TimeWindow};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Framerate assumed for snapshots that do not record one
pub const DEFAULT_SNAPSHOT_FRAMERATE: u32 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    recording: Recording,
    filter: Option<FilterOptions>,
    selection: Option<Selection>,
    sorting: Option<SortResult>,
    history: Vec<String>,
}

fn describe_filter(options: &FilterOptions) -> String {
    let mut parts = Vec::new();
    if options.notch.enabled {
        parts.push(format!(
            "notch {} Hz (Q {})",
            options.notch.frequency, options.notch.quality
        ));
    }
    if options.band.enabled {
        let band = match options.band.pass_band() {
            Ok(PassBand::Bandpass { low, high }) => format!("bandpass {}-{} Hz", low, high),
            Ok(PassBand::Highpass { cutoff }) => format!("highpass {} Hz", cutoff),
            Ok(PassBand::Lowpass { cutoff }) => format!("lowpass {} Hz", cutoff),
            Err(_) => "band".to_string(),
        };
        parts.push(format!("{} (order {})", band, options.band.order));
    }
    parts.join(", ")
}

impl Session {
    pub fn new(recording: Recording) -> Self {
        Self {
            recording,
            filter: None,
            selection: None,
            sorting: None,
            history: Vec::new(),
        }
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    pub fn filter(&self) -> Option<&FilterOptions> {
        self.filter.as_ref()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn sorting(&self) -> Option<&SortResult> {
        self.sorting.as_ref()
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn framerate(&self) -> u32 {
        self.recording.framerate
    }

    /// Samples the next stage works on: the selection if one was made,
    /// otherwise the whole recording.
    pub fn samples(&self) -> &[Vec<f64>] {
        match &self.selection {
            Some(selection) => &selection.samples,
            None => &self.recording.samples,
        }
    }

    pub fn markers(&self) -> &MarkerMap {
        match &self.selection {
            Some(selection) => &selection.markers,
            None => &self.recording.markers,
        }
    }

    /// Selected windows, or the whole recording when nothing was selected.
    pub fn windows(&self) -> Vec<TimeWindow> {
        match &self.selection {
            Some(selection) => selection.windows.clone(),
            None => vec![TimeWindow {
                start: 0.0,
                stop: self.recording.duration(),
            }],
        }
    }

    /// Seconds of signal covered by the selection.
    pub fn selected_duration(&self) -> f64 {
        total_duration(&self.windows())
    }

    fn next(&self, entry: String) -> Self {
        log::info!("Session {}: {}", self.recording.identifier, entry);
        let mut next = self.clone();
        next.history.push(entry);
        next
    }

    /// Keep a subset of channels (numbered from 1). Later stages are reset.
    pub fn with_channels(&self, numbers: &[usize]) -> Result<Self> {
        let recording = self.recording.select_channels(numbers)?;
        let list: Vec<String> = numbers.iter().map(|n| n.to_string()).collect();
        let mut next = self.next(format!("Channels {}", list.join(", ")));
        next.recording = recording;
        next.selection = None;
        next.sorting = None;
        Ok(next)
    }

    /// Replace all markers. A previous selection is re-applied so its marker
    /// pruning reflects the new map.
    pub fn with_markers(&self, markers: MarkerMap) -> Self {
        let mut next = self.next(format!("Markers replaced ({} event(s))", markers.total_events()));
        next.recording.markers = markers;
        if let Some(selection) = &self.selection {
            next.selection = Some(select_windows(
                &next.recording.samples,
                &next.recording.markers,
                next.recording.framerate,
                &selection.windows,
            ));
        }
        next
    }

    /// Filter the working samples. Filtering after a selection keeps the
    /// unselected gaps empty.
    pub fn filtered(&self, options: &FilterOptions) -> Result<Self> {
        if !options.is_active() {
            return Ok(self.clone());
        }
        let filter = SignalFilter::new(options.clone());
        let filtered = filter.apply(self.samples(), self.framerate())?;

        let mut next = self.next(format!("Filtered: {}", describe_filter(options)));
        match &mut next.selection {
            Some(selection) => selection.samples = filtered,
            None => next.recording.samples = filtered,
        }
        next.filter = Some(options.clone());
        next.sorting = None;
        Ok(next)
    }

    /// Restrict the session to the windows described by `intervals`.
    pub fn select(&self, intervals: &str) -> Result<Self> {
        let windows = resolve_windows(
            &self.recording.markers,
            self.recording.framerate,
            self.recording.num_samples(),
            intervals,
        )?;
        let selection = select_windows(
            &self.recording.samples,
            &self.recording.markers,
            self.recording.framerate,
            &windows,
        );

        let label = if intervals.trim().is_empty() {
            "whole recording"
        } else {
            intervals.trim()
        };
        let mut next = self.next(format!("Selected {}", label));
        next.selection = Some(selection);
        next.sorting = None;
        Ok(next)
    }

    pub fn sort(&self, options: &SortOptions, progress: &dyn Progress) -> Result<Self> {
        let sorter = SpikeSorter::new(options.clone());
        let result = sorter.sort_with_progress(self.samples(), self.framerate(), progress)?;

        let thresholds: Vec<String> = sorter
            .thresholds()
            .iter()
            .map(|t| threshold_label(*t))
            .collect();
        let mut next = self.next(format!(
            "Sorted with thresholds {}: {} spike(s)",
            thresholds.join(", "),
            result.total_spikes()
        ));
        next.sorting = Some(result);
        Ok(next)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            datatype: self.recording.datatype.clone(),
            data: self.recording.samples.clone(),
            markers: self.recording.markers.clone(),
            clusters: self.sorting.clone(),
            time: self.recording.time_axis(),
            framerate: self.recording.framerate,
            history: self.history.clone(),
            identifier: self.recording.identifier.clone(),
            channels: self.recording.channel_names.clone(),
        }
    }

    /// Rebuild a session from a snapshot. Saved clusters are restored; the
    /// selection is not part of a snapshot.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Result<Self> {
        let recording = snapshot.to_recording()?;
        Ok(Self {
            recording,
            filter: None,
            selection: None,
            sorting: snapshot.clusters,
            history: snapshot.history,
        })
    }
}

fn default_datatype() -> String {
    DEFAULT_DATATYPE.to_string()
}

fn default_identifier() -> String {
    DEFAULT_IDENTIFIER.to_string()
}

fn default_framerate() -> u32 {
    DEFAULT_SNAPSHOT_FRAMERATE
}

/// Saved session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default = "default_datatype")]
    pub datatype: String,
    #[serde(default)]
    pub data: Vec<Vec<f64>>,
    #[serde(default)]
    pub markers: MarkerMap,
    #[serde(default)]
    pub clusters: Option<SortResult>,
    #[serde(default)]
    pub time: Vec<f64>,
    #[serde(default = "default_framerate")]
    pub framerate: u32,
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default = "default_identifier")]
    pub identifier: String,
    #[serde(default)]
    pub channels: Vec<String>,
}

impl SessionSnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let snapshot: SessionSnapshot = serde_json::from_str(&text)?;
        log::info!(
            "Loaded snapshot {} ({} channel(s), {} history entries)",
            path.display(),
            snapshot.data.len(),
            snapshot.history.len()
        );
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        log::info!("Saved snapshot to {}", path.display());
        Ok(())
    }

    pub fn to_recording(&self) -> Result<Recording> {
        let mut recording =
            Recording::new(self.data.clone(), self.framerate, self.markers.clone())?;
        if !self.channels.is_empty() {
            if self.channels.len() != self.data.len() {
                return Err(SpikeError::Format(format!(
                    "Snapshot names {} channel(s) but holds {}",
                    self.channels.len(),
                    self.data.len()
                )));
            }
            recording.channel_names = self.channels.clone();
        }
        recording.datatype = self.datatype.clone();
        recording.identifier = self.identifier.clone();
        Ok(recording)
    }
}
