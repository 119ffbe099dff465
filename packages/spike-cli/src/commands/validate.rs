use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use spike_rs::recording::{load_markers, marker_path};
use spike_rs::wav::read_wav;
use spike_rs::{FileType, MarkerMap, MarkerStatus, Recording, SessionSnapshot};
use std::path::Path;

/// What decoding the recording revealed
#[derive(Serialize)]
struct ContentCheck {
    framerate: u32,
    channels: usize,
    samples: usize,
    duration_s: f64,
    /// WAV sample encoding, e.g. `16-bit PCM`
    encoding: Option<String>,
    /// Snapshot only: whether sorted clusters were saved
    has_clusters: Option<bool>,
    history_entries: Option<usize>,
}

#[derive(Serialize)]
struct MarkerFileCheck {
    path: String,
    present: bool,
    events: usize,
    keys: usize,
    error: Option<String>,
}

#[derive(Serialize)]
struct ValidateOutput {
    file: String,
    file_type: Option<FileType>,
    size_bytes: Option<u64>,
    content: Option<ContentCheck>,
    marker_file: Option<MarkerFileCheck>,
    valid: bool,
    error: Option<String>,
}

fn summarize(recording: &Recording) -> ContentCheck {
    ContentCheck {
        framerate: recording.framerate,
        channels: recording.num_channels(),
        samples: recording.num_samples(),
        duration_s: recording.duration(),
        encoding: None,
        has_clusters: None,
        history_entries: None,
    }
}

fn check_content(path: &Path, file_type: FileType) -> spike_rs::Result<ContentCheck> {
    match file_type {
        FileType::Wav => {
            let wav = read_wav(path)?;
            let encoding = wav.format.encoding();
            let recording = Recording::new(wav.samples, wav.format.sample_rate, MarkerMap::new())?;
            Ok(ContentCheck {
                encoding: Some(encoding),
                ..summarize(&recording)
            })
        }
        FileType::Snapshot => {
            let snapshot = SessionSnapshot::load(path)?;
            let recording = snapshot.to_recording()?;
            Ok(ContentCheck {
                has_clusters: Some(snapshot.clusters.is_some()),
                history_entries: Some(snapshot.history.len()),
                ..summarize(&recording)
            })
        }
    }
}

/// Inspect `<stem>-events.txt`. A missing file is fine, a malformed one is not.
fn check_marker_file(path: &Path) -> MarkerFileCheck {
    let marker_file = marker_path(path).display().to_string();
    match load_markers(path) {
        Ok((markers, MarkerStatus::Loaded { .. })) => MarkerFileCheck {
            path: marker_file,
            present: true,
            events: markers.total_events(),
            keys: markers.len(),
            error: None,
        },
        Ok(_) => MarkerFileCheck {
            path: marker_file,
            present: false,
            events: 0,
            keys: 0,
            error: None,
        },
        Err(e) => MarkerFileCheck {
            path: marker_file,
            present: true,
            events: 0,
            keys: 0,
            error: Some(e.to_string()),
        },
    }
}

fn validate(path: &Path) -> ValidateOutput {
    let file = path.display().to_string();
    let mut report = ValidateOutput {
        file: file.clone(),
        file_type: FileType::from_path(path),
        size_bytes: None,
        content: None,
        marker_file: None,
        valid: false,
        error: None,
    };

    if !path.is_file() {
        report.error = Some(format!("File not found: {}", file));
        return report;
    }
    report.size_bytes = std::fs::metadata(path).ok().map(|m| m.len());

    let Some(file_type) = report.file_type else {
        report.error = Some(format!(
            "Unsupported file type: {}. Supported: {}",
            file,
            FileType::supported_extensions().join(", ")
        ));
        return report;
    };

    match check_content(path, file_type) {
        Ok(content) => report.content = Some(content),
        Err(e) => {
            report.error = Some(format!("Cannot decode {}: {}", file, e));
            return report;
        }
    }

    if file_type == FileType::Wav {
        let markers = check_marker_file(path);
        if let Some(ref err) = markers.error {
            report.error = Some(format!("Bad marker file {}: {}", markers.path, err));
        }
        report.marker_file = Some(markers);
    }

    report.valid = report.error.is_none();
    report
}

fn print_text(report: &ValidateOutput) {
    let Some(ref content) = report.content else {
        return;
    };
    println!(
        "File '{}' is valid: {} channel(s), {} Hz, {:.3} s",
        report.file, content.channels, content.framerate, content.duration_s
    );
    if let Some(ref encoding) = content.encoding {
        println!("  Encoding: {}", encoding);
    }
    if let Some(entries) = content.history_entries {
        let clusters = if content.has_clusters == Some(true) {
            "with clusters"
        } else {
            "without clusters"
        };
        println!("  Snapshot: {} history entries, {}", entries, clusters);
    }
    if let Some(ref markers) = report.marker_file {
        if markers.present {
            println!(
                "  Markers: {} event(s) under {} key(s) in {}",
                markers.events, markers.keys, markers.path
            );
        } else {
            println!("  Markers: none ({} not found)", markers.path);
        }
    }
}

pub fn execute(args: ValidateArgs) -> i32 {
    let report = validate(Path::new(&args.file));

    if args.json {
        let written = output::to_json(&report, false).and_then(|json| output::write_output(&json, None));
        if let Err(e) = written {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else if report.valid {
        print_text(&report);
    }

    match report.error {
        Some(ref err) => {
            if !args.json {
                eprintln!("Error: {}", err);
            }
            exit_codes::INPUT_ERROR
        }
        None => exit_codes::SUCCESS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_invalid() {
        let report = validate(Path::new("/nonexistent/rec.wav"));
        assert!(!report.valid);
        assert!(report.error.unwrap().contains("not found"));
    }

    #[test]
    fn test_undecodable_wav_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rec.wav");
        std::fs::write(&path, b"not a wav").unwrap();
        let report = validate(&path);
        assert!(!report.valid);
        assert!(report.content.is_none());
        assert!(report.error.unwrap().contains("Cannot decode"));
    }

    #[test]
    fn test_snapshot_contents_are_checked() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.json");
        std::fs::write(
            &path,
            r#"{"data": [[0.0, 1.0, 2.0, 3.0]], "framerate": 2, "history": ["Selected 0 to 1"]}"#,
        )
        .unwrap();
        let report = validate(&path);
        assert!(report.valid, "{:?}", report.error);
        let content = report.content.unwrap();
        assert_eq!(content.channels, 1);
        assert_eq!(content.samples, 4);
        assert_eq!(content.duration_s, 2.0);
        assert_eq!(content.history_entries, Some(1));
        assert_eq!(content.has_clusters, Some(false));
        assert!(report.marker_file.is_none());
    }
}
