use crate::cli::{FilterArgs, SelectionArgs};
use crate::exit_codes;
use spike_rs::{
    load_recording, parse_thresholds, BandOptions, FileType, FilterOptions, MarkerStatus,
    NotchOptions, Progress, Session, SessionSnapshot, SortOptions, SpikeError,
};
use std::path::Path;

/// Check that the file exists and has a supported extension.
pub fn validate_file(file_path: &str) -> Result<(), String> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {}", file_path));
    }
    if FileType::from_path(path).is_none() {
        return Err(format!(
            "Unsupported file type: {}. Supported: {}",
            file_path,
            FileType::supported_extensions().join(", ")
        ));
    }
    Ok(())
}

/// Map filter flags onto filter options. Flags left unset keep a stage
/// disabled.
pub fn filter_options(args: &FilterArgs) -> FilterOptions {
    let mut options = FilterOptions::default();
    if let Some(frequency) = args.notch {
        options.notch = NotchOptions {
            enabled: true,
            frequency,
            quality: args.notch_q,
        };
    }
    if args.low.is_some() || args.high.is_some() {
        options.band = BandOptions {
            enabled: true,
            low: args.low,
            high: args.high,
            order: args.order,
        };
    }
    options
}

/// Parse a threshold string. A missing string sorts with the default
/// threshold.
pub fn thresholds_from_text(text: Option<&str>) -> Result<Vec<i64>, String> {
    parse_thresholds(text.unwrap_or("")).map_err(|e| e.to_string())
}

pub fn sort_options(thresholds: &[i64], selection: &SelectionArgs) -> Result<SortOptions, String> {
    let options = SortOptions::new(thresholds.iter().map(|t| *t as f64).collect())
        .with_subthresh(selection.subthresh)
        .with_cutoff(selection.cutoff);
    options.validate().map_err(|e| e.to_string())?;
    Ok(options)
}

/// File stem used to name exports, e.g. `rec` for `data/rec.wav`.
pub fn output_stem(file_path: &str) -> String {
    Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

/// Open a recording as a session. Snapshots resume with their saved history
/// and clusters.
pub fn open_session(file_path: &str, quiet: bool) -> spike_rs::Result<Session> {
    let path = Path::new(file_path);
    if FileType::from_path(path) == Some(FileType::Snapshot) && path.is_file() {
        let session = Session::from_snapshot(SessionSnapshot::load(path)?)?;
        if !quiet {
            eprintln!("  Resumed snapshot ({} history entries)", session.history().len());
        }
        return Ok(session);
    }

    let loaded = load_recording(path)?;
    if !quiet {
        match &loaded.marker_status {
            MarkerStatus::Loaded { path, events } => {
                eprintln!("  Markers: {} event(s) from {}", events, path.display())
            }
            MarkerStatus::MissingFile { path } => {
                eprintln!("  Markers: none ({} not found)", path.display())
            }
            MarkerStatus::Snapshot => {}
        }
    }
    Ok(Session::new(loaded.recording))
}

/// Channel subset, filter, then window selection, in that order so the
/// filter sees contiguous signal.
pub fn prepare_session(
    session: Session,
    selection: &SelectionArgs,
    filter: &FilterOptions,
) -> spike_rs::Result<Session> {
    let session = if selection.channels.is_empty() {
        session
    } else {
        session.with_channels(&selection.channels)?
    };
    let session = session.filtered(filter)?;
    match selection.interval.as_deref() {
        Some(intervals) => session.select(intervals),
        None => Ok(session),
    }
}

/// Load, prepare and sort one recording.
pub fn run_pipeline(
    file_path: &str,
    selection: &SelectionArgs,
    filter: &FilterOptions,
    sort: &SortOptions,
    progress: &dyn Progress,
    quiet: bool,
) -> spike_rs::Result<Session> {
    let session = open_session(file_path, quiet)?;
    let session = prepare_session(session, selection, filter)?;
    session.sort(sort, progress)
}

/// Exit code for a failed pipeline.
pub fn exit_code_for(error: &SpikeError) -> i32 {
    match error {
        SpikeError::Cancelled => exit_codes::CANCELLED,
        SpikeError::Configuration(_)
        | SpikeError::Format(_)
        | SpikeError::MarkerResolution { .. }
        | SpikeError::FileNotFound(_)
        | SpikeError::UnsupportedFileType(_) => exit_codes::INPUT_ERROR,
        _ => exit_codes::EXECUTION_ERROR,
    }
}
