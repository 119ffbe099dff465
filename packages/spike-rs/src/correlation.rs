//! Correlograms and derived spike-train sequences
//!
//! Event series are sample ticks (sample indices), sorted ascending. A
//! correlogram with half-width `w` has `2w + 1` bins, bin `b - a + w` counting
//! the pairs with lag `b - a`.

use crate::error::{Result, SpikeError};
use crate::sorter::{ChannelClusters, Cluster};
use crate::types::{MarkerKey, MarkerMap};
use crate::window::seconds_to_index;
use serde::{Deserialize, Serialize};

fn default_interval_ms() -> f64 {
    100.0
}

/// Correlogram window in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationOptions {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: f64,
    #[serde(default)]
    pub preinterval_ms: f64,
}

impl Default for CorrelationOptions {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            preinterval_ms: 0.0,
        }
    }
}

impl CorrelationOptions {
    /// Interval and preinterval converted to sample ticks.
    pub fn to_ticks(&self, framerate: u32) -> Result<(usize, usize)> {
        let convert = |ms: f64, name: &str| -> Result<usize> {
            if !ms.is_finite() || ms < 0.0 {
                return Err(SpikeError::Configuration(format!(
                    "Correlation {} must be a non-negative number of milliseconds, got {}",
                    name, ms
                )));
            }
            Ok((ms * framerate as f64 / 1000.0).round() as usize)
        };
        Ok((
            convert(self.interval_ms, "interval")?,
            convert(self.preinterval_ms, "preinterval")?,
        ))
    }
}

/// Lag histogram between two event series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlogram {
    /// Largest lag covered, in ticks
    pub half_width: usize,
    pub counts: Vec<u64>,
    /// Number of events in the series, set for autocorrelograms whose
    /// zero-lag bin has been cleared
    pub spike_count: Option<usize>,
}

impl Correlogram {
    fn zeroed(half_width: usize) -> Result<Self> {
        let bins = half_width
            .checked_mul(2)
            .and_then(|w| w.checked_add(1))
            .ok_or_else(|| {
                SpikeError::Configuration(format!(
                    "Correlogram half-width of {} ticks is too large",
                    half_width
                ))
            })?;
        Ok(Self {
            half_width,
            counts: vec![0; bins],
            spike_count: None,
        })
    }

    pub fn center(&self) -> usize {
        self.half_width
    }

    /// Lag of every bin in ticks, from `-w` to `w`.
    pub fn lags(&self) -> impl Iterator<Item = i64> + '_ {
        let w = self.half_width as i64;
        (-w..=w).take(self.counts.len())
    }

    pub fn lag_seconds(&self, framerate: u32) -> Vec<f64> {
        self.lags().map(|lag| lag as f64 / framerate as f64).collect()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn is_symmetric(&self) -> bool {
        self.counts.iter().eq(self.counts.iter().rev())
    }
}

/// Count every pair `(a, b)` with `|b - a| <= max(interval, preinterval)`.
///
/// Both series must be sorted ascending. The lower bound into `series_b` only
/// ever moves forward, so the cost is linear in the input plus the number of
/// counted pairs.
pub fn cross_correlate(
    series_a: &[usize],
    series_b: &[usize],
    interval: usize,
    preinterval: usize,
) -> Result<Correlogram> {
    if interval == 0 {
        return Err(SpikeError::Configuration(
            "Correlation interval must span at least one sample".to_string(),
        ));
    }
    debug_assert!(series_a.windows(2).all(|w| w[0] <= w[1]));
    debug_assert!(series_b.windows(2).all(|w| w[0] <= w[1]));

    let half_width = interval.max(preinterval);
    let mut correlogram = Correlogram::zeroed(half_width)?;

    let mut lower = 0;
    for &a in series_a {
        let earliest = a.saturating_sub(half_width);
        while lower < series_b.len() && series_b[lower] < earliest {
            lower += 1;
        }

        let latest = a.saturating_add(half_width);
        for &b in &series_b[lower..] {
            if b > latest {
                break;
            }
            let bin = if b >= a {
                half_width + (b - a)
            } else {
                half_width - (a - b)
            };
            correlogram.counts[bin] += 1;
        }
    }

    Ok(correlogram)
}

/// Cross-correlate a series with itself. The zero-lag bin is cleared and the
/// event count reported in `spike_count` instead.
pub fn autocorrelogram(series: &[usize], interval: usize, preinterval: usize) -> Result<Correlogram> {
    let mut correlogram = cross_correlate(series, series, interval, preinterval)?;
    let center = correlogram.center();
    correlogram.counts[center] = 0;
    correlogram.spike_count = Some(series.len());
    Ok(correlogram)
}

/// Successive differences of the spike timestamps, in seconds.
pub fn interspike_intervals(cluster: &Cluster) -> Vec<f64> {
    cluster.times.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Peak amplitudes of a cluster.
pub fn amplitude_values(cluster: &Cluster) -> Vec<f64> {
    cluster.amplitudes.clone()
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Smallest and largest interspike interval over all clusters of a channel,
/// so every cluster can share one set of bins.
pub fn channel_isi_range(channel: &ChannelClusters) -> Option<(f64, f64)> {
    min_max(
        channel
            .clusters
            .iter()
            .flat_map(|c| interspike_intervals(c).into_iter()),
    )
}

pub fn channel_amplitude_range(channel: &ChannelClusters) -> Option<(f64, f64)> {
    min_max(
        channel
            .clusters
            .iter()
            .flat_map(|c| c.amplitudes.iter().copied()),
    )
}

/// Timestamps of one marker converted to sample ticks.
pub fn marker_ticks(markers: &MarkerMap, key: MarkerKey, framerate: u32) -> Result<Vec<usize>> {
    let times = markers
        .get(key)
        .ok_or_else(|| SpikeError::marker(key.to_string()))?;
    Ok(times
        .iter()
        .map(|&t| seconds_to_index(t, framerate))
        .collect())
}

/// Correlogram between two clusters of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPair {
    pub first: usize,
    pub second: usize,
    pub correlogram: Correlogram,
}

/// Correlogram between a cluster and marker events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerCorrelation {
    pub cluster: usize,
    pub marker: MarkerKey,
    pub correlogram: Correlogram,
}

/// Correlogram queries at a fixed window and framerate
#[derive(Debug, Clone, Copy)]
pub struct CorrelationEngine {
    interval: usize,
    preinterval: usize,
}

impl CorrelationEngine {
    /// Engine for a recording of `num_samples` samples. A window reaching
    /// past the whole recording is rejected.
    pub fn new(options: &CorrelationOptions, framerate: u32, num_samples: usize) -> Result<Self> {
        if framerate == 0 {
            return Err(SpikeError::Configuration(
                "Framerate must be greater than 0".to_string(),
            ));
        }
        let (interval, preinterval) = options.to_ticks(framerate)?;
        if interval == 0 {
            return Err(SpikeError::Configuration(format!(
                "Correlation interval of {} ms is shorter than one sample at {} Hz",
                options.interval_ms, framerate
            )));
        }
        let half_width = interval.max(preinterval);
        if half_width > num_samples {
            return Err(SpikeError::Configuration(format!(
                "Correlation window of {} ticks is longer than the recording ({} samples)",
                half_width, num_samples
            )));
        }
        Ok(Self {
            interval,
            preinterval,
        })
    }

    pub fn interval_ticks(&self) -> usize {
        self.interval
    }

    /// One autocorrelogram per cluster.
    pub fn autocorrelograms(&self, channel: &ChannelClusters) -> Result<Vec<Correlogram>> {
        channel
            .clusters
            .iter()
            .map(|c| autocorrelogram(&c.indices, self.interval, self.preinterval))
            .collect()
    }

    /// Correlograms for every unordered pair of distinct clusters.
    pub fn cross_correlograms(&self, channel: &ChannelClusters) -> Result<Vec<ClusterPair>> {
        let clusters = &channel.clusters;
        let mut pairs = Vec::new();
        for first in 0..clusters.len() {
            for second in first + 1..clusters.len() {
                let correlogram = cross_correlate(
                    &clusters[first].indices,
                    &clusters[second].indices,
                    self.interval,
                    self.preinterval,
                )?;
                pairs.push(ClusterPair {
                    first,
                    second,
                    correlogram,
                });
            }
        }
        Ok(pairs)
    }

    /// Lag of every marker event relative to the spikes of each cluster.
    pub fn against_marker(
        &self,
        channel: &ChannelClusters,
        markers: &MarkerMap,
        key: MarkerKey,
        framerate: u32,
    ) -> Result<Vec<MarkerCorrelation>> {
        let ticks = marker_ticks(markers, key, framerate)?;
        channel
            .clusters
            .iter()
            .enumerate()
            .map(|(cluster, c)| {
                Ok(MarkerCorrelation {
                    cluster,
                    marker: key,
                    correlogram: cross_correlate(&c.indices, &ticks, self.interval, self.preinterval)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorter::{SortOptions, SpikeSorter};

    fn brute_force(a: &[usize], b: &[usize], w: usize) -> Vec<u64> {
        let mut counts = vec![0; 2 * w + 1];
        for &x in a {
            for &y in b {
                let lag = y as i64 - x as i64;
                if lag.unsigned_abs() as usize <= w {
                    counts[(lag + w as i64) as usize] += 1;
                }
            }
        }
        counts
    }

    #[test]
    fn test_cross_correlate_matches_all_pairs() {
        let a = [3, 10, 11, 40, 41, 90];
        let b = [0, 5, 12, 12, 38, 60, 95];
        let c = cross_correlate(&a, &b, 6, 0).unwrap();
        assert_eq!(c.counts.len(), 13);
        assert_eq!(c.counts, brute_force(&a, &b, 6));
    }

    #[test]
    fn test_preinterval_widens_window() {
        let a = [50];
        let b = [40, 45, 55, 60];
        let c = cross_correlate(&a, &b, 5, 10).unwrap();
        assert_eq!(c.half_width, 10);
        assert_eq!(c.counts.len(), 21);
        assert_eq!(c.total(), 4);
        assert_eq!(c.counts[0], 1);
        assert_eq!(c.counts[20], 1);
    }

    #[test]
    fn test_lag_direction() {
        // b three ticks after a lands right of centre
        let c = cross_correlate(&[10], &[13], 5, 0).unwrap();
        assert_eq!(c.counts[c.center() + 3], 1);
        let lags: Vec<i64> = c.lags().collect();
        assert_eq!(lags.first(), Some(&-5));
        assert_eq!(lags.last(), Some(&5));
    }

    #[test]
    fn test_autocorrelogram_is_symmetric() {
        let series = [2, 7, 9, 15, 16, 30, 31, 33, 50];
        let c = autocorrelogram(&series, 10, 0).unwrap();
        assert_eq!(c.counts[c.center()], 0);
        assert_eq!(c.spike_count, Some(series.len()));
        assert!(c.is_symmetric());
    }

    #[test]
    fn test_empty_series_give_empty_histogram() {
        let c = cross_correlate(&[], &[1, 2, 3], 4, 0).unwrap();
        assert_eq!(c.counts, vec![0; 9]);
        let c = autocorrelogram(&[], 4, 0).unwrap();
        assert_eq!(c.spike_count, Some(0));
        assert_eq!(c.total(), 0);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert!(matches!(
            cross_correlate(&[1], &[1], 0, 0),
            Err(SpikeError::Configuration(_))
        ));
    }

    #[test]
    fn test_options_to_ticks() {
        let options = CorrelationOptions::default();
        assert_eq!(options.to_ticks(10_000).unwrap(), (1000, 0));
        let options = CorrelationOptions {
            interval_ms: -1.0,
            preinterval_ms: 0.0,
        };
        assert!(options.to_ticks(1000).is_err());
    }

    #[test]
    fn test_engine_rejects_window_longer_than_recording() {
        let huge = CorrelationOptions {
            interval_ms: 1e13,
            preinterval_ms: 0.0,
        };
        assert!(matches!(
            CorrelationEngine::new(&huge, 10_000, 30_000),
            Err(SpikeError::Configuration(_))
        ));

        let wide_pre = CorrelationOptions {
            interval_ms: 10.0,
            preinterval_ms: 5_000.0,
        };
        assert!(CorrelationEngine::new(&wide_pre, 1000, 4_000).is_err());
        assert!(CorrelationEngine::new(&wide_pre, 1000, 5_000).is_ok());
    }

    #[test]
    fn test_oversized_half_width_is_an_error() {
        assert!(matches!(
            cross_correlate(&[1], &[2], usize::MAX, 0),
            Err(SpikeError::Configuration(_))
        ));
    }

    #[test]
    fn test_interspike_intervals_and_ranges() {
        let mut data = vec![0.0; 200];
        for (c, h) in [(20, 40.0), (50, 15.0), (120, 45.0), (150, 12.0)] {
            data[c] = h;
        }
        let result = SpikeSorter::new(SortOptions::new(vec![30.0, 10.0]))
            .sort(&[data], 100)
            .unwrap();
        let ch = &result.channels[0];

        let isi = interspike_intervals(&ch.clusters[0]);
        assert_eq!(isi.len(), 1);
        assert!((isi[0] - 1.0).abs() < 1e-12);

        let (lo, hi) = channel_isi_range(ch).unwrap();
        assert!((lo - 1.0).abs() < 1e-12);
        assert!((hi - 1.0).abs() < 1e-12);
        assert_eq!(channel_amplitude_range(ch), Some((12.0, 45.0)));
        assert_eq!(amplitude_values(&ch.clusters[1]), vec![15.0, 12.0]);
    }

    #[test]
    fn test_marker_ticks() {
        let markers = MarkerMap::from_pairs(vec![(MarkerKey(4), 0.5), (MarkerKey(4), 1.25)]);
        assert_eq!(marker_ticks(&markers, MarkerKey(4), 100).unwrap(), vec![50, 125]);
        assert!(matches!(
            marker_ticks(&markers, MarkerKey(1), 100),
            Err(SpikeError::MarkerResolution { .. })
        ));
    }

    #[test]
    fn test_engine_pairs_and_markers() {
        let mut data = vec![0.0; 400];
        for (c, h) in [(50, 40.0), (60, 15.0), (250, 40.0), (262, 15.0)] {
            data[c] = h;
        }
        let result = SpikeSorter::new(SortOptions::new(vec![30.0, 10.0]))
            .sort(&[data], 1000)
            .unwrap();
        let engine = CorrelationEngine::new(&CorrelationOptions::default(), 1000, 400).unwrap();
        assert_eq!(engine.interval_ticks(), 100);

        let autos = engine.autocorrelograms(&result.channels[0]).unwrap();
        assert_eq!(autos.len(), 2);
        assert!(autos.iter().all(Correlogram::is_symmetric));

        let pairs = engine.cross_correlograms(&result.channels[0]).unwrap();
        assert_eq!(pairs.len(), 1);
        let pair = &pairs[0];
        assert_eq!(pair.correlogram.counts[100 + 10], 1);
        assert_eq!(pair.correlogram.counts[100 + 12], 1);
        assert_eq!(pair.correlogram.total(), 2);

        let markers = MarkerMap::from_pairs(vec![(MarkerKey(1), 0.045)]);
        let vs_marker = engine
            .against_marker(&result.channels[0], &markers, MarkerKey(1), 1000)
            .unwrap();
        assert_eq!(vs_marker[0].correlogram.counts[100 - 5], 1);
    }
}
