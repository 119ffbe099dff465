//! Threshold peak detection with hysteresis
//!
//! A peak is the highest local maximum of an excursion above the threshold.
//! It is emitted when the signal falls back through the subthreshold line
//! (`subthresh * threshold + offset`), and the detector only re-arms once the
//! signal has dipped below `threshold + offset` again. Negative thresholds
//! detect downward deflections.

use serde::{Deserialize, Serialize};

/// Default fraction of the threshold the signal must fall below to end a peak
pub const DEFAULT_SUBTHRESH: f64 = 0.8;

/// A detected peak
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Sample index of the maximum
    pub index: usize,
    /// Signal value at `index`, in the signal's own sign
    pub amplitude: f64,
}

/// Single-channel, single-threshold peak finder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakDetector {
    pub threshold: f64,
    pub subthresh: f64,
    pub offset: f64,
}

impl PeakDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            subthresh: DEFAULT_SUBTHRESH,
            offset: 0.0,
        }
    }

    pub fn with_subthresh(mut self, subthresh: f64) -> Self {
        self.subthresh = subthresh;
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Find all peaks in one forward pass. Peaks are never reported at the
    /// first or last sample. NaN samples neither arm the detector nor end a
    /// peak.
    pub fn find(&self, data: &[f64]) -> Vec<Peak> {
        let sign = if self.threshold < 0.0 { -1.0 } else { 1.0 };
        let threshold = self.threshold.abs();
        let upper = threshold + self.offset;
        let lower = self.subthresh * threshold + self.offset;
        let value = |i: usize| data[i] * sign;

        let last = data.len();
        let mut peaks = Vec::new();
        let mut armed = false;
        let mut best: Option<(usize, f64)> = None;

        for ii in 0..last {
            let v = value(ii);

            if v < upper {
                armed = true;
            }

            // local maximum above threshold, never the first or last sample
            if armed
                && ii > 0
                && ii + 1 < last
                && v >= upper
                && v >= value(ii - 1)
                && v >= value(ii + 1)
            {
                let higher = match best {
                    Some((_, max)) => v > max,
                    None => true,
                };
                if higher {
                    best = Some((ii, v));
                }
            }

            // falling edge through the subthreshold line
            if let Some((index, _)) = best {
                if armed && ii > 0 && value(ii - 1) >= lower && v < lower {
                    peaks.push(Peak {
                        index,
                        amplitude: data[index],
                    });
                    best = None;
                    armed = false;
                }
            }
        }

        peaks
    }
}

/// Convenience wrapper around [`PeakDetector::find`].
pub fn find_peaks(data: &[f64], threshold: f64, subthresh: f64, offset: f64) -> Vec<Peak> {
    PeakDetector::new(threshold)
        .with_subthresh(subthresh)
        .with_offset(offset)
        .find(data)
}
