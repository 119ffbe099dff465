use crate::cli::InfoArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use serde::Serialize;
use spike_rs::{load_recording, MarkerStatus};
use std::path::Path;

#[derive(Serialize)]
struct MarkerSummary {
    key: i64,
    events: usize,
    first: Option<f64>,
}

#[derive(Serialize)]
struct InfoOutput {
    cli_version: String,
    file: String,
    framerate: u32,
    channels: Vec<String>,
    samples: usize,
    duration_s: f64,
    datatype: String,
    identifier: String,
    marker_status: MarkerStatus,
    markers: Vec<MarkerSummary>,
    profile_log: String,
}

pub fn execute(args: InfoArgs) -> i32 {
    if let Err(msg) = params::validate_file(&args.file) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let loaded = match load_recording(Path::new(&args.file)) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error: {}", e);
            return params::exit_code_for(&e);
        }
    };
    let recording = &loaded.recording;

    let info = InfoOutput {
        cli_version: env!("CARGO_PKG_VERSION").to_string(),
        file: args.file.clone(),
        framerate: recording.framerate,
        channels: recording.channel_names.clone(),
        samples: recording.num_samples(),
        duration_s: recording.duration(),
        datatype: recording.datatype.clone(),
        identifier: recording.identifier.clone(),
        marker_status: loaded.marker_status.clone(),
        markers: recording
            .markers
            .iter()
            .map(|(key, times)| MarkerSummary {
                key: key.0,
                events: times.len(),
                first: times.first().copied(),
            })
            .collect(),
        profile_log: spike_rs::profiling::profile_log_location(),
    };

    if args.json {
        match output::to_json(&info, false) {
            Ok(json) => {
                if let Err(e) = output::write_output(&json, None) {
                    eprintln!("Error: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    } else {
        println!("spikesort CLI v{}", info.cli_version);
        println!("File: {}", info.file);
        println!("Datatype: {} (identifier {})", info.datatype, info.identifier);
        println!("Framerate: {} Hz", info.framerate);
        println!("Channels: {}", info.channels.join(", "));
        println!("Samples: {} ({:.3} s)", info.samples, info.duration_s);
        println!();
        match &info.marker_status {
            MarkerStatus::MissingFile { path } => {
                println!("Markers: none ({} not found)", path.display())
            }
            MarkerStatus::Loaded { path, .. } => println!("Markers: {}", path.display()),
            MarkerStatus::Snapshot => println!("Markers: from snapshot"),
        }
        for marker in &info.markers {
            println!(
                "  m{}: {} event(s), first at {}",
                marker.key,
                marker.events,
                marker
                    .first
                    .map(|t| format!("{} s", t))
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }

    exit_codes::SUCCESS
}
