//! Time-window selection
//!
//! Parses interval strings such as `"1 to 3 and 5 to m1"` into absolute
//! windows, cuts the selected samples out of a recording and prunes the
//! marker map to the selection.

use crate::error::{Result, SpikeError};
use crate::types::{MarkerKey, MarkerMap};
use serde::{Deserialize, Serialize};
use std::ops::Range;

const WINDOW_SEPARATOR: &str = "and";
const RANGE_SEPARATOR: &str = "to";

/// One side of a window as written by the user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// Literal time in seconds
    Seconds(f64),
    /// First timestamp of the referenced marker
    Marker(MarkerKey),
}

impl Endpoint {
    fn parse(token: &str) -> Result<Self> {
        if let Some(pos) = token.find(['m', 'M']) {
            let key_text = &token[pos + 1..];
            return MarkerKey::parse(key_text)
                .map(Endpoint::Marker)
                .ok_or_else(|| SpikeError::marker(token));
        }
        match token.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Endpoint::Seconds(v)),
            _ => Err(SpikeError::Format(format!(
                "'{}' is neither a time in seconds nor a marker reference",
                token
            ))),
        }
    }

    fn resolve(&self, markers: &MarkerMap) -> Result<f64> {
        match *self {
            Endpoint::Seconds(s) => Ok(s),
            Endpoint::Marker(key) => markers
                .first(key)
                .ok_or_else(|| SpikeError::marker(key.to_string())),
        }
    }
}

/// Absolute window in seconds, `start <= stop`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub stop: f64,
}

impl TimeWindow {
    pub fn new(start: f64, stop: f64) -> Result<Self> {
        if start > stop {
            return Err(SpikeError::Format(format!(
                "Window start ({}) lies after its stop ({})",
                start, stop
            )));
        }
        Ok(Self { start, stop })
    }

    pub fn duration(&self) -> f64 {
        self.stop - self.start
    }

    /// Inclusive on both ends.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.stop
    }

    /// Sample range covered by the window, clamped to `num_samples`.
    pub fn sample_range(&self, framerate: u32, num_samples: usize) -> Range<usize> {
        let start = seconds_to_index(self.start, framerate).min(num_samples);
        let stop = seconds_to_index(self.stop, framerate).min(num_samples);
        start..stop.max(start)
    }
}

/// Truncating seconds → sample conversion that tolerates float noise
/// (`10.01 * 100` must land on sample 1001, not 1000).
pub fn seconds_to_index(seconds: f64, framerate: u32) -> usize {
    let x = seconds * framerate as f64;
    if !x.is_finite() || x <= 0.0 {
        return 0;
    }
    let nearest = x.round();
    if (x - nearest).abs() <= 1e-9 * nearest.max(1.0) {
        nearest as usize
    } else {
        x.floor() as usize
    }
}

/// Summed duration of all windows in seconds.
pub fn total_duration(windows: &[TimeWindow]) -> f64 {
    windows.iter().map(TimeWindow::duration).sum()
}

/// Split an interval string into unresolved `(start, stop)` pairs.
/// An empty string yields no pairs.
pub fn parse_intervals(intervals: &str) -> Result<Vec<(Endpoint, Endpoint)>> {
    let tokens: Vec<&str> = intervals.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    tokens
        .split(|t| *t == WINDOW_SEPARATOR)
        .map(|window| match window {
            [start, sep, stop] if *sep == RANGE_SEPARATOR => {
                Ok((Endpoint::parse(start)?, Endpoint::parse(stop)?))
            }
            _ => Err(SpikeError::Format(format!(
                "Window '{}' must have the form '<start> to <stop>'",
                window.join(" ")
            ))),
        })
        .collect()
}

/// Resolve an interval string against the marker map. An empty string
/// selects the whole recording.
pub fn resolve_windows(
    markers: &MarkerMap,
    framerate: u32,
    num_samples: usize,
    intervals: &str,
) -> Result<Vec<TimeWindow>> {
    if framerate == 0 {
        return Err(SpikeError::Configuration(
            "Framerate must be greater than 0".to_string(),
        ));
    }

    let pairs = parse_intervals(intervals)?;
    if pairs.is_empty() {
        let length = num_samples as f64 / framerate as f64;
        return Ok(vec![TimeWindow {
            start: 0.0,
            stop: length,
        }]);
    }

    pairs
        .iter()
        .map(|(start, stop)| TimeWindow::new(start.resolve(markers)?, stop.resolve(markers)?))
        .collect()
}

/// Samples and markers restricted to a set of windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub windows: Vec<TimeWindow>,
    /// Same shape as the input; samples outside every window are NaN
    pub samples: Vec<Vec<f64>>,
    pub markers: MarkerMap,
}

impl Selection {
    pub fn total_duration(&self) -> f64 {
        total_duration(&self.windows)
    }

    /// Number of samples that fall inside at least one window.
    pub fn selected_samples(&self) -> usize {
        self.samples
            .first()
            .map(|ch| ch.iter().filter(|v| !v.is_nan()).count())
            .unwrap_or(0)
    }
}

/// Copy the windowed samples into fresh NaN-filled buffers and keep only
/// markers that fall inside a window. Overlapping windows select the union.
pub fn select_windows(
    samples: &[Vec<f64>],
    markers: &MarkerMap,
    framerate: u32,
    windows: &[TimeWindow],
) -> Selection {
    let mut selected: Vec<Vec<f64>> = samples
        .iter()
        .map(|channel| vec![f64::NAN; channel.len()])
        .collect();

    for window in windows {
        for (out, channel) in selected.iter_mut().zip(samples) {
            let range = window.sample_range(framerate, channel.len());
            out[range.clone()].copy_from_slice(&channel[range]);
        }
    }

    let pruned = markers.retain_times(|t| windows.iter().any(|w| w.contains(t)));

    log::debug!(
        "Selected {} window(s), {} of {} marker event(s) kept",
        windows.len(),
        pruned.total_events(),
        markers.total_events()
    );

    Selection {
        windows: windows.to_vec(),
        samples: selected,
        markers: pruned,
    }
}
