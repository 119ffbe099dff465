//! Threshold text grammar
//!
//! Thresholds are typed as free text; every integer in the text is a
//! threshold, whatever separates them (`"700,1200;800"`, `"700 1200 800"`).
//! Batch plans may carry several threshold sets as `"[700 800;1200]"`.

use crate::error::{Result, SpikeError};

/// Threshold used when no threshold text is given
pub const DEFAULT_THRESHOLD: i64 = 1;

/// Extract the unique integers of a threshold string in order of first
/// appearance. A `-` directly in front of a number makes it negative unless
/// it follows a digit. Blank text yields the default threshold.
pub fn parse_thresholds(text: &str) -> Result<Vec<i64>> {
    if text.trim().is_empty() {
        return Ok(vec![DEFAULT_THRESHOLD]);
    }

    let chars: Vec<char> = text.chars().collect();
    let mut values: Vec<i64> = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let digits: String = chars[start..i].iter().collect();
        let negative = start > 0
            && chars[start - 1] == '-'
            && (start < 2 || !chars[start - 2].is_ascii_digit());

        let magnitude = digits.parse::<i64>().map_err(|_| {
            SpikeError::Format(format!("Threshold '{}' is out of range", digits))
        })?;
        let value = if negative { -magnitude } else { magnitude };
        if !values.contains(&value) {
            values.push(value);
        }
    }

    if values.is_empty() {
        return Err(SpikeError::Format(format!(
            "No numeric threshold found in '{}'",
            text
        )));
    }
    Ok(values)
}

/// Split a threshold field into threshold sets. `"[a;b]"` holds one set per
/// `;`-separated part, anything else is a single set.
pub fn parse_threshold_sets(text: &str) -> Result<Vec<Vec<i64>>> {
    let trimmed = text.trim();
    match trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        Some(inner) => inner.split(';').map(parse_thresholds).collect(),
        None => Ok(vec![parse_thresholds(trimmed)?]),
    }
}

/// Detection order for thresholds: stable, descending by absolute value,
/// exact duplicates removed. An empty list becomes the default threshold.
pub fn order_thresholds(thresholds: &[f64]) -> Vec<f64> {
    let mut ordered: Vec<f64> = Vec::with_capacity(thresholds.len());
    for &th in thresholds {
        if !ordered.contains(&th) {
            ordered.push(th);
        }
    }
    if ordered.is_empty() {
        ordered.push(DEFAULT_THRESHOLD as f64);
    }
    ordered.sort_by(|a, b| b.abs().total_cmp(&a.abs()));
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_separators() {
        assert_eq!(
            parse_thresholds("700,1200;800 1300").unwrap(),
            vec![700, 1200, 800, 1300]
        );
        assert_eq!(parse_thresholds("700 1200 800").unwrap(), vec![700, 1200, 800]);
    }

    #[test]
    fn test_duplicates_collapse() {
        assert_eq!(parse_thresholds("5, 5;7 5").unwrap(), vec![5, 7]);
    }

    #[test]
    fn test_negative_numbers() {
        assert_eq!(parse_thresholds("-700, -300").unwrap(), vec![-700, -300]);
        // a dash between digits is a separator, not a sign
        assert_eq!(parse_thresholds("700-800").unwrap(), vec![700, 800]);
    }

    #[test]
    fn test_blank_text_defaults() {
        assert_eq!(parse_thresholds("").unwrap(), vec![DEFAULT_THRESHOLD]);
        assert_eq!(parse_thresholds("   ").unwrap(), vec![DEFAULT_THRESHOLD]);
    }

    #[test]
    fn test_text_without_numbers_is_format_error() {
        assert!(matches!(parse_thresholds("abc"), Err(SpikeError::Format(_))));
    }

    #[test]
    fn test_overflow_is_format_error() {
        assert!(parse_thresholds("99999999999999999999999").is_err());
    }

    #[test]
    fn test_threshold_sets() {
        assert_eq!(
            parse_threshold_sets("[700 800;1200]").unwrap(),
            vec![vec![700, 800], vec![1200]]
        );
        assert_eq!(parse_threshold_sets("700 800").unwrap(), vec![vec![700, 800]]);
    }

    #[test]
    fn test_order_descending_by_magnitude() {
        assert_eq!(
            order_thresholds(&[10.0, -40.0, 30.0, 10.0]),
            vec![-40.0, 30.0, 10.0]
        );
        assert_eq!(order_thresholds(&[]), vec![1.0]);
    }

    #[test]
    fn test_order_is_stable_for_equal_magnitude() {
        assert_eq!(order_thresholds(&[-30.0, 30.0]), vec![-30.0, 30.0]);
        assert_eq!(order_thresholds(&[30.0, -30.0]), vec![30.0, -30.0]);
    }
}
