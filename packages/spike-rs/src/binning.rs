//! Histogram binning for interspike-interval and amplitude distributions

use crate::error::{Result, SpikeError};

/// Shortest interspike interval binned, in milliseconds
pub const ISI_MIN_MS: f64 = 1.0;
/// Longest interspike interval binned, in milliseconds
pub const ISI_MAX_MS: f64 = 20_000.0;
pub const ISI_EDGE_COUNT: usize = 50;
pub const AMPLITUDE_BINS: usize = 40;

/// `count` edges spaced evenly on a log scale from `start` to `stop`.
pub fn log_spaced_edges(start: f64, stop: f64, count: usize) -> Result<Vec<f64>> {
    if !(start > 0.0 && stop > start && stop.is_finite()) || count < 2 {
        return Err(SpikeError::Configuration(format!(
            "Cannot build {} log-spaced edges between {} and {}",
            count, start, stop
        )));
    }
    let (lo, hi) = (start.log10(), stop.log10());
    let step = (hi - lo) / (count - 1) as f64;
    Ok((0..count)
        .map(|i| 10f64.powf(lo + step * i as f64))
        .collect())
}

/// Default interspike-interval edges in milliseconds.
pub fn isi_edges_ms() -> Vec<f64> {
    log_spaced_edges(ISI_MIN_MS, ISI_MAX_MS, ISI_EDGE_COUNT).unwrap_or_default()
}

/// `bins + 1` linear edges over `[min, max]` with both bounds rounded
/// outward to the nearest hundred.
pub fn amplitude_edges(min: f64, max: f64, bins: usize) -> Result<Vec<f64>> {
    if !(min.is_finite() && max.is_finite()) || min > max || bins == 0 {
        return Err(SpikeError::Configuration(format!(
            "Cannot build {} amplitude bins between {} and {}",
            bins, min, max
        )));
    }
    let lo = (min / 100.0).floor() * 100.0;
    let mut hi = (max / 100.0).ceil() * 100.0;
    if hi <= lo {
        hi = lo + 100.0;
    }
    let step = (hi - lo) / bins as f64;
    Ok((0..=bins).map(|i| lo + step * i as f64).collect())
}

/// Histogram where every value weighs `1 / values.len()`.
///
/// Bins are half-open `[e_i, e_i+1)` except the last, which also holds its
/// upper edge. Values outside the edges still count toward the total.
pub fn normalized_histogram(values: &[f64], edges: &[f64]) -> Vec<f64> {
    let bins = edges.len().saturating_sub(1);
    let mut counts = vec![0.0; bins];
    if bins == 0 || values.is_empty() {
        return counts;
    }

    let weight = 1.0 / values.len() as f64;
    let last = edges[bins];
    for &v in values {
        if v.is_nan() || v < edges[0] || v > last {
            continue;
        }
        // first edge strictly greater than v, minus one
        let bin = edges.partition_point(|&e| e <= v).saturating_sub(1).min(bins - 1);
        counts[bin] += weight;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_spaced_edges() {
        let edges = log_spaced_edges(1.0, 1000.0, 4).unwrap();
        let expected = [1.0, 10.0, 100.0, 1000.0];
        for (e, x) in edges.iter().zip(expected) {
            assert!((e - x).abs() < 1e-9 * x, "{} vs {}", e, x);
        }
        assert!(log_spaced_edges(0.0, 10.0, 5).is_err());
        assert!(log_spaced_edges(1.0, 10.0, 1).is_err());
    }

    #[test]
    fn test_default_isi_edges() {
        let edges = isi_edges_ms();
        assert_eq!(edges.len(), ISI_EDGE_COUNT);
        assert!((edges[0] - 1.0).abs() < 1e-12);
        assert!((edges[ISI_EDGE_COUNT - 1] - 20_000.0).abs() < 1e-6);
        assert!(edges.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_amplitude_edges_round_to_hundreds() {
        let edges = amplitude_edges(-130.0, 1250.0, 40).unwrap();
        assert_eq!(edges.len(), 41);
        assert_eq!(edges[0], -200.0);
        assert_eq!(edges[40], 1300.0);

        let flat = amplitude_edges(300.0, 300.0, 4).unwrap();
        assert_eq!(flat, vec![300.0, 325.0, 350.0, 375.0, 400.0]);
    }

    #[test]
    fn test_normalized_histogram() {
        let edges = [0.0, 1.0, 2.0, 3.0];
        let hist = normalized_histogram(&[0.5, 1.0, 1.5, 3.0, 7.0], &edges);
        assert_eq!(hist.len(), 3);
        assert!((hist[0] - 0.2).abs() < 1e-12);
        assert!((hist[1] - 0.4).abs() < 1e-12);
        // upper edge of the last bin is inclusive
        assert!((hist[2] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_empty_histogram() {
        assert_eq!(normalized_histogram(&[], &[0.0, 1.0]), vec![0.0]);
        assert!(normalized_histogram(&[1.0], &[0.0]).is_empty());
    }
}
