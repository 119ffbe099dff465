//! Multi-threshold spike sorting
//!
//! Every channel is swept once per threshold, most extreme threshold first.
//! A sample index claimed by the cutoff pass or by an earlier threshold is
//! never assigned to a later cluster of the same channel.

use crate::error::{Result, SpikeError};
use crate::peak::{PeakDetector, DEFAULT_SUBTHRESH};
use crate::profile_scope;
use crate::progress::{NoProgress, Progress};
use crate::thresholds::order_thresholds;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

fn default_subthresh() -> f64 {
    DEFAULT_SUBTHRESH
}

/// Sorting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortOptions {
    #[serde(default)]
    pub thresholds: Vec<f64>,
    #[serde(default = "default_subthresh")]
    pub subthresh: f64,
    /// Detections at or beyond this level are treated as artifacts
    #[serde(default)]
    pub cutoff: Option<f64>,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            thresholds: Vec::new(),
            subthresh: DEFAULT_SUBTHRESH,
            cutoff: None,
        }
    }
}

impl SortOptions {
    pub fn new(thresholds: Vec<f64>) -> Self {
        Self {
            thresholds,
            ..Self::default()
        }
    }

    pub fn with_subthresh(mut self, subthresh: f64) -> Self {
        self.subthresh = subthresh;
        self
    }

    pub fn with_cutoff(mut self, cutoff: Option<f64>) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.subthresh.is_finite() && self.subthresh > 0.0 && self.subthresh <= 1.0) {
            return Err(SpikeError::Configuration(format!(
                "Subthreshold proportion must lie in (0, 1], got {}",
                self.subthresh
            )));
        }
        if let Some(th) = self.thresholds.iter().find(|t| !t.is_finite() || **t == 0.0) {
            return Err(SpikeError::Configuration(format!(
                "Threshold {} is not a usable amplitude level",
                th
            )));
        }
        if let Some(cutoff) = self.cutoff {
            if !cutoff.is_finite() || cutoff == 0.0 {
                return Err(SpikeError::Configuration(format!(
                    "Cutoff {} is not a usable amplitude level",
                    cutoff
                )));
            }
        }
        Ok(())
    }
}

/// Display label for a threshold, `700` rather than `700.0` for whole numbers.
pub fn threshold_label(threshold: f64) -> String {
    if threshold.fract() == 0.0 && threshold.abs() < 1e15 {
        format!("{}", threshold as i64)
    } else {
        format!("{}", threshold)
    }
}

/// Spikes attributed to one threshold on one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub threshold: f64,
    pub label: String,
    /// Position in the detection order, 0 for the most extreme threshold
    pub rank: usize,
    pub indices: Vec<usize>,
    pub times: Vec<f64>,
    pub amplitudes: Vec<f64>,
    /// Stacking heights for raster display only
    pub plot_heights: Vec<f64>,
}

impl Cluster {
    fn empty(threshold: f64, rank: usize) -> Self {
        Self {
            threshold,
            label: format!("Cluster threshold {}", threshold_label(threshold)),
            rank,
            indices: Vec::new(),
            times: Vec::new(),
            amplitudes: Vec::new(),
            plot_heights: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Spikes per second over `duration` seconds of selected signal.
    pub fn mean_firing_rate(&self, duration: f64) -> f64 {
        if duration > 0.0 {
            self.len() as f64 / duration
        } else {
            0.0
        }
    }
}

/// Sorting outcome for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelClusters {
    /// Position of the channel in the sorted input
    pub channel: usize,
    /// Largest finite sample of the channel, 0 when it has none
    pub channel_max: f64,
    /// Indices discarded by the cutoff pass
    pub cutoff_claimed: Vec<usize>,
    pub clusters: Vec<Cluster>,
}

impl ChannelClusters {
    pub fn total_spikes(&self) -> usize {
        self.clusters.iter().map(Cluster::len).sum()
    }

    /// Length of the longest cluster, the row count of a rectangular table.
    pub fn max_cluster_len(&self) -> usize {
        self.clusters.iter().map(Cluster::len).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortResult {
    pub id: String,
    pub framerate: u32,
    /// Thresholds in detection order
    pub thresholds: Vec<f64>,
    pub subthresh: f64,
    pub cutoff: Option<f64>,
    pub channels: Vec<ChannelClusters>,
    pub created_at: String,
}

impl SortResult {
    pub fn total_spikes(&self) -> usize {
        self.channels.iter().map(ChannelClusters::total_spikes).sum()
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelClusters> {
        self.channels.get(index)
    }
}

/// Runs the threshold detector over every channel and declusters the results
#[derive(Debug, Clone)]
pub struct SpikeSorter {
    options: SortOptions,
    ordered: Vec<f64>,
}

impl SpikeSorter {
    pub fn new(options: SortOptions) -> Self {
        let ordered = order_thresholds(&options.thresholds);
        Self { options, ordered }
    }

    pub fn options(&self) -> &SortOptions {
        &self.options
    }

    /// Thresholds in the order they claim samples.
    pub fn thresholds(&self) -> &[f64] {
        &self.ordered
    }

    pub fn sort(&self, channels: &[Vec<f64>], framerate: u32) -> Result<SortResult> {
        self.sort_with_progress(channels, framerate, &NoProgress)
    }

    /// Sort all channels, reporting one step per detection pass.
    pub fn sort_with_progress(
        &self,
        channels: &[Vec<f64>],
        framerate: u32,
        progress: &dyn Progress,
    ) -> Result<SortResult> {
        profile_scope!("SpikeSorter::sort");

        if framerate == 0 {
            return Err(SpikeError::Configuration(
                "Framerate must be greater than 0".to_string(),
            ));
        }
        self.options.validate()?;

        log::info!(
            "Sorting {} channel(s) at {} Hz with thresholds {:?} (subthresh {}, cutoff {:?})",
            channels.len(),
            framerate,
            self.ordered,
            self.options.subthresh,
            self.options.cutoff
        );

        let passes_per_channel = self.ordered.len() + usize::from(self.options.cutoff.is_some());
        let total = passes_per_channel * channels.len();
        let mut done = 0;

        let mut results = Vec::with_capacity(channels.len());
        for (ch, data) in channels.iter().enumerate() {
            if progress.is_cancelled() {
                log::warn!("Sorting cancelled before channel {}", ch + 1);
                return Err(SpikeError::Cancelled);
            }
            let sorted = self.sort_channel(ch, data, framerate, progress, &mut done, total)?;
            results.push(sorted);
        }

        let result = SortResult {
            id: Uuid::new_v4().to_string(),
            framerate,
            thresholds: self.ordered.clone(),
            subthresh: self.options.subthresh,
            cutoff: self.options.cutoff,
            channels: results,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        log::info!("Sorting finished: {} spike(s) assigned", result.total_spikes());
        Ok(result)
    }

    fn detector(&self, threshold: f64) -> PeakDetector {
        PeakDetector::new(threshold).with_subthresh(self.options.subthresh)
    }

    fn sort_channel(
        &self,
        channel: usize,
        data: &[f64],
        framerate: u32,
        progress: &dyn Progress,
        done: &mut usize,
        total: usize,
    ) -> Result<ChannelClusters> {
        let channel_max = data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
            .unwrap_or(0.0);

        let mut claimed: HashSet<usize> = HashSet::new();
        let mut cutoff_claimed = Vec::new();

        if let Some(cutoff) = self.options.cutoff {
            cutoff_claimed = self.detector(cutoff).find(data).iter().map(|p| p.index).collect();
            claimed.extend(cutoff_claimed.iter().copied());
            log::debug!(
                "Channel {}: cutoff {} claimed {} sample(s)",
                channel + 1,
                cutoff,
                cutoff_claimed.len()
            );
            *done += 1;
            progress.step(*done, total);
        }

        let mut clusters = Vec::with_capacity(self.ordered.len());
        for (rank, &threshold) in self.ordered.iter().enumerate() {
            if progress.is_cancelled() {
                return Err(SpikeError::Cancelled);
            }

            let peaks = self.detector(threshold).find(data);
            let height = channel_max + channel_max / 10.0 * (rank + 1) as f64;
            let mut cluster = Cluster::empty(threshold, rank);

            for peak in &peaks {
                if claimed.contains(&peak.index) {
                    continue;
                }
                cluster.indices.push(peak.index);
                cluster.times.push(peak.index as f64 / framerate as f64);
                cluster.amplitudes.push(peak.amplitude);
                cluster.plot_heights.push(height);
            }
            // everything this threshold saw is off limits for weaker ones
            claimed.extend(peaks.iter().map(|p| p.index));

            log::debug!(
                "Channel {}: threshold {} detected {} peak(s), kept {}",
                channel + 1,
                threshold_label(threshold),
                peaks.len(),
                cluster.len()
            );
            clusters.push(cluster);

            *done += 1;
            progress.step(*done, total);
        }

        Ok(ChannelClusters {
            channel,
            channel_max,
            cutoff_claimed,
            clusters,
        })
    }
}
