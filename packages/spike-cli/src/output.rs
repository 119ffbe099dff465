use spike_rs::{EventAverageExport, SpikeTrainExport};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write JSON string to stdout or a file.
pub fn write_output(json: &str, output_path: Option<&str>) -> Result<(), String> {
    match output_path {
        Some(path) => std::fs::write(Path::new(path), json)
            .map_err(|e| format!("Failed to write output file '{}': {}", path, e)),
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .map_err(|e| format!("Failed to write to stdout: {}", e))
        }
    }
}

/// Serialize a value to JSON (pretty or compact).
pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, String> {
    if compact {
        serde_json::to_string(value).map_err(|e| format!("JSON serialization failed: {}", e))
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| format!("JSON serialization failed: {}", e))
    }
}

/// Serialize and write in one step.
pub fn emit<T: serde::Serialize>(
    value: &T,
    compact: bool,
    output_path: Option<&str>,
) -> Result<(), String> {
    let json = to_json(value, compact)?;
    write_output(&json, output_path)
}

fn write_csv(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<(), String> {
    let fail = |e: csv::Error| format!("Failed to write CSV '{}': {}", path.display(), e);
    let mut writer = csv::Writer::from_path(path).map_err(fail)?;
    writer.write_record(header).map_err(fail)?;
    for row in rows {
        writer.write_record(row).map_err(fail)?;
    }
    writer
        .flush()
        .map_err(|e| format!("Failed to write CSV '{}': {}", path.display(), e))
}

fn ensure_dir(dir: &str) -> Result<&Path, String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create output directory '{}': {}", dir, e))?;
    Ok(Path::new(dir))
}

/// Write one CSV per cluster and return the written paths.
pub fn write_spike_trains(dir: &str, exports: &[SpikeTrainExport]) -> Result<Vec<PathBuf>, String> {
    let dir = ensure_dir(dir)?;
    exports
        .iter()
        .map(|export| {
            let path = dir.join(&export.file_name);
            write_csv(&path, &export.header(), &export.rows())?;
            Ok(path)
        })
        .collect()
}

/// Write one CSV per channel and return the written paths.
pub fn write_event_averages(
    dir: &str,
    exports: &[EventAverageExport],
) -> Result<Vec<PathBuf>, String> {
    let dir = ensure_dir(dir)?;
    exports
        .iter()
        .map(|export| {
            let path = dir.join(&export.file_name);
            write_csv(&path, &export.header, &export.rows)?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_json_compact_and_pretty() {
        let value = serde_json::json!({ "a": [1, 2] });
        assert_eq!(to_json(&value, true).unwrap(), r#"{"a":[1,2]}"#);
        assert!(to_json(&value, false).unwrap().contains('\n'));
    }

    #[test]
    fn test_write_event_averages_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("out");
        let export = EventAverageExport {
            file_name: "event_average_rec_channel1.csv".to_string(),
            channel: 1,
            header: vec!["Time (s)".to_string(), "Marker 1".to_string()],
            rows: vec![
                vec!["0".to_string(), "1.5".to_string()],
                vec!["0.001".to_string(), "".to_string()],
            ],
        };

        let paths = write_event_averages(dir.to_str().unwrap(), &[export]).unwrap();
        assert_eq!(paths.len(), 1);
        let content = std::fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(content, "Time (s),Marker 1\n0,1.5\n0.001,\n");
    }
}
