//! Aligned waveform averaging around marker events and detected spikes

use crate::error::{Result, SpikeError};
use crate::profile_scope;
use crate::sorter::Cluster;
use crate::types::{MarkerKey, MarkerMap};
use crate::window::seconds_to_index;
use serde::{Deserialize, Serialize};

fn default_pre_s() -> f64 {
    0.5
}

fn default_post_s() -> f64 {
    1.0
}

fn default_pre_ms() -> f64 {
    5.0
}

fn default_post_ms() -> f64 {
    10.0
}

/// Window around marker events, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragingOptions {
    #[serde(default = "default_pre_s")]
    pub pre_s: f64,
    #[serde(default = "default_post_s")]
    pub post_s: f64,
}

impl Default for AveragingOptions {
    fn default() -> Self {
        Self {
            pre_s: default_pre_s(),
            post_s: default_post_s(),
        }
    }
}

/// Window around detected spikes, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformOptions {
    #[serde(default = "default_pre_ms")]
    pub pre_ms: f64,
    #[serde(default = "default_post_ms")]
    pub post_ms: f64,
}

impl Default for WaveformOptions {
    fn default() -> Self {
        Self {
            pre_ms: default_pre_ms(),
            post_ms: default_post_ms(),
        }
    }
}

/// Elementwise mean over aligned windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageWaveform {
    /// Offset of every sample from the alignment point, in seconds
    pub time: Vec<f64>,
    pub mean: Vec<f64>,
    pub windows_used: usize,
    /// Windows that ran past the signal or contained missing samples
    pub windows_discarded: usize,
}

impl AverageWaveform {
    /// True when no window could be averaged ("not enough data").
    pub fn is_empty(&self) -> bool {
        self.windows_used == 0
    }

    /// Turn an empty average into `InsufficientData`.
    pub fn require_data(self) -> Result<Self> {
        if self.is_empty() {
            return Err(SpikeError::InsufficientData(format!(
                "none of {} window(s) fit inside the selected signal",
                self.windows_discarded
            )));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerAverage {
    pub marker: MarkerKey,
    pub waveform: AverageWaveform,
}

/// Event-related averages of one channel, one per marker key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEventAverages {
    pub channel: usize,
    pub averages: Vec<MarkerAverage>,
}

fn span_to_samples(seconds: f64, framerate: u32, name: &str) -> Result<usize> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(SpikeError::Configuration(format!(
            "Averaging {} must be a non-negative duration, got {}",
            name, seconds
        )));
    }
    Ok(seconds_to_index(seconds, framerate))
}

/// Average `signal[c - pre .. c + after]` over all centres whose window fits
/// and holds no NaN.
fn average_windows<I>(signal: &[f64], centers: I, pre: usize, after: usize, framerate: u32) -> AverageWaveform
where
    I: IntoIterator<Item = Option<usize>>,
{
    let width = match pre.checked_add(after) {
        Some(w) if w <= signal.len() => w,
        _ => {
            // no window of this width fits anywhere
            return AverageWaveform {
                time: Vec::new(),
                mean: Vec::new(),
                windows_used: 0,
                windows_discarded: centers.into_iter().count(),
            };
        }
    };
    let mut sum = vec![0.0; width];
    let mut used = 0;
    let mut discarded = 0;

    for center in centers {
        let window = center
            .filter(|&c| c >= pre)
            .and_then(|c| {
                c.checked_add(after)
                    .filter(|&end| end <= signal.len())
                    .map(|end| &signal[c - pre..end])
            })
            .filter(|w| w.iter().all(|v| !v.is_nan()));

        match window {
            Some(w) => {
                for (acc, v) in sum.iter_mut().zip(w) {
                    *acc += v;
                }
                used += 1;
            }
            None => discarded += 1,
        }
    }

    if used == 0 {
        return AverageWaveform {
            time: Vec::new(),
            mean: Vec::new(),
            windows_used: 0,
            windows_discarded: discarded,
        };
    }

    let time = (0..width)
        .map(|k| (k as f64 - pre as f64) / framerate as f64)
        .collect();
    let mean = sum.iter().map(|s| s / used as f64).collect();

    AverageWaveform {
        time,
        mean,
        windows_used: used,
        windows_discarded: discarded,
    }
}

fn check_framerate(framerate: u32) -> Result<()> {
    if framerate == 0 {
        return Err(SpikeError::Configuration(
            "Framerate must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Mean waveform around every marker event, per channel and marker key.
///
/// The window is `[-pre_s, +post_s]` with both ends included, so the time
/// axis runs from `-pre_s` to `+post_s`. Windows that do not fully fit the
/// signal, or that contain missing (unselected) samples, are discarded.
pub fn event_related_average(
    samples: &[Vec<f64>],
    markers: &MarkerMap,
    framerate: u32,
    options: &AveragingOptions,
) -> Result<Vec<ChannelEventAverages>> {
    profile_scope!("event_related_average");
    check_framerate(framerate)?;
    let pre = span_to_samples(options.pre_s, framerate, "pre-window")?;
    let post = span_to_samples(options.post_s, framerate, "post-window")?;
    let after = post.saturating_add(1);

    let result: Vec<ChannelEventAverages> = samples
        .iter()
        .enumerate()
        .map(|(channel, signal)| {
            let averages = markers
                .iter()
                .map(|(marker, times)| {
                    let centers = times
                        .iter()
                        .map(|&t| (t >= 0.0).then(|| seconds_to_index(t, framerate)));
                    let waveform = average_windows(signal, centers, pre, after, framerate);
                    if waveform.is_empty() {
                        log::warn!(
                            "Channel {}: no usable window around marker {}",
                            channel + 1,
                            marker
                        );
                    }
                    MarkerAverage { marker, waveform }
                })
                .collect();
            ChannelEventAverages { channel, averages }
        })
        .collect();

    Ok(result)
}

/// Mean spike shape of a cluster over `[-pre_ms, +post_ms)` around each peak.
/// Unlike the event-related average the window excludes its last sample.
pub fn cluster_average_waveform(
    signal: &[f64],
    cluster: &Cluster,
    framerate: u32,
    options: &WaveformOptions,
) -> Result<AverageWaveform> {
    check_framerate(framerate)?;
    let pre = span_to_samples(options.pre_ms / 1000.0, framerate, "pre-window")?;
    let post = span_to_samples(options.post_ms / 1000.0, framerate, "post-window")?;

    let waveform = average_windows(
        signal,
        cluster.indices.iter().map(|&i| Some(i)),
        pre,
        post,
        framerate,
    );
    log::debug!(
        "{}: averaged {} spike(s), skipped {}",
        cluster.label,
        waveform.windows_used,
        waveform.windows_discarded
    );
    Ok(waveform)
}
