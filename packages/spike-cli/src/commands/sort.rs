use crate::cli::SortArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use serde::Serialize;
use spike_rs::{spike_train_exports, FilterOptions, ProgressFn, SortResult, TimeWindow};
use std::path::Path;

#[derive(Serialize)]
struct SortOutput<'a> {
    file: &'a str,
    filter: Option<&'a FilterOptions>,
    windows: Vec<TimeWindow>,
    selected_duration_s: f64,
    history: &'a [String],
    result: &'a SortResult,
}

pub fn execute(args: SortArgs) -> i32 {
    if let Err(msg) = params::validate_file(&args.file) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let thresholds = match params::thresholds_from_text(args.thresholds.as_deref()) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let sort_options = match params::sort_options(&thresholds, &args.selection) {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let filter = params::filter_options(&args.filter);

    if !args.quiet {
        eprintln!("Sorting spikes in {}...", args.file);
        let list: Vec<String> = thresholds.iter().map(|t| t.to_string()).collect();
        eprintln!("  Thresholds: {}", list.join(", "));
        if let Some(cutoff) = sort_options.cutoff {
            eprintln!("  Cutoff: {}", cutoff);
        }
    }

    let progress = ProgressFn::new(|done, total| log::info!("Detection pass {}/{}", done, total));
    let session = match params::run_pipeline(
        &args.file,
        &args.selection,
        &filter,
        &sort_options,
        &progress,
        args.quiet,
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return params::exit_code_for(&e);
        }
    };
    let Some(result) = session.sorting() else {
        eprintln!("Error: sorting produced no result");
        return exit_codes::EXECUTION_ERROR;
    };

    if !args.quiet {
        for channel in &result.channels {
            for cluster in &channel.clusters {
                eprintln!(
                    "  Channel {}: {} spike(s) ({})",
                    channel.channel + 1,
                    cluster.len(),
                    cluster.label
                );
            }
        }
    }

    let windows = session.windows();
    let report = SortOutput {
        file: &args.file,
        filter: session.filter(),
        selected_duration_s: session.selected_duration(),
        windows: windows.clone(),
        history: session.history(),
        result,
    };
    if let Err(e) = output::emit(&report, args.compact, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    if let Some(ref dir) = args.export_dir {
        let exports = spike_train_exports(result, &windows, &params::output_stem(&args.file));
        match output::write_spike_trains(dir, &exports) {
            Ok(paths) => {
                if !args.quiet {
                    eprintln!("Wrote {} spike-time file(s) to {}", paths.len(), dir);
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    }

    if let Some(ref path) = args.snapshot {
        if let Err(e) = session.snapshot().save(Path::new(path)) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
        if !args.quiet {
            eprintln!("Session saved to {}", path);
        }
    }

    if !args.quiet {
        if let Some(ref path) = args.output {
            eprintln!("Results written to {}", path);
        }
    }
    exit_codes::SUCCESS
}
