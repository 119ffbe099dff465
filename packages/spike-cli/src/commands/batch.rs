use crate::cli::{BatchArgs, SelectionArgs};
use crate::exit_codes;
use crate::output;
use crate::params;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use spike_rs::{
    parse_threshold_sets, spike_train_exports, CancelToken, FilterOptions, ProgressFn, SortResult,
    SpikeError,
};
use std::path::Path;
use std::time::Instant;

/// Plan file: `{"jobs": [{"file": "a.wav", "thresholds": "[700;1200]"}]}`.
/// Fields left out fall back to the command-line values.
#[derive(Debug, Deserialize)]
struct BatchPlan {
    jobs: Vec<PlanEntry>,
}

#[derive(Debug, Deserialize)]
struct PlanEntry {
    file: String,
    #[serde(default)]
    thresholds: Option<String>,
    #[serde(default)]
    channels: Option<Vec<usize>>,
    #[serde(default)]
    interval: Option<String>,
    #[serde(default)]
    cutoff: Option<f64>,
}

#[derive(Debug)]
struct Job {
    file: String,
    thresholds: Vec<i64>,
    selection: SelectionArgs,
    output_name: String,
}

enum JobOutcome {
    /// Spike count, and the compact report when results go to stdout
    Succeeded(usize, Option<String>),
    Failed(String),
    Cancelled,
}

#[derive(Serialize)]
struct JobReport<'a> {
    file: &'a str,
    output_name: &'a str,
    thresholds: &'a [i64],
    selected_duration_s: f64,
    history: &'a [String],
    result: &'a SortResult,
}

pub async fn execute(args: BatchArgs) -> i32 {
    let jobs = match plan_jobs(&args) {
        Ok(j) => j,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if jobs.is_empty() {
        eprintln!("Error: No matching files found");
        return exit_codes::INPUT_ERROR;
    }

    // Dry-run mode: print job list and exit
    if args.dry_run {
        for job in &jobs {
            let list: Vec<String> = job.thresholds.iter().map(|t| t.to_string()).collect();
            println!("{}\t{}\t{}", job.file, job.output_name, list.join(" "));
        }
        if !args.quiet {
            eprintln!("Planned {} job(s)", jobs.len());
        }
        return exit_codes::SUCCESS;
    }

    for job in &jobs {
        if let Err(msg) = params::sort_options(&job.thresholds, &job.selection) {
            eprintln!("Error: {}: {}", job.file, msg);
            return exit_codes::INPUT_ERROR;
        }
    }

    if let Some(ref dir) = args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Error: Failed to create output directory '{}': {}", dir, e);
            return exit_codes::EXECUTION_ERROR;
        }
    }

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs.unwrap_or(0))
        .build()
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: Failed to start worker pool: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let token = CancelToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling remaining jobs...");
            interrupt.cancel();
        }
    });

    let filter = params::filter_options(&args.filter);
    let total = jobs.len();
    let start_time = Instant::now();
    let worker_args = args.clone();
    let worker_token = token.clone();

    let outcomes = tokio::task::spawn_blocking(move || {
        pool.install(|| {
            jobs.par_iter()
                .enumerate()
                .map(|(i, job)| {
                    if worker_token.is_cancelled() {
                        return JobOutcome::Cancelled;
                    }
                    if !worker_args.quiet {
                        eprintln!("[{}/{}] {}...", i + 1, total, job.output_name);
                    }
                    let outcome = run_job(job, &filter, &worker_args, &worker_token);
                    if let JobOutcome::Failed(ref msg) = outcome {
                        eprintln!("  Error: {}: {}", job.output_name, msg);
                        if !worker_args.continue_on_error {
                            worker_token.cancel();
                        }
                    }
                    outcome
                })
                .collect::<Vec<_>>()
        })
    })
    .await;

    let outcomes = match outcomes {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: batch worker failed: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut cancelled = 0usize;
    let mut spikes = 0usize;
    for outcome in &outcomes {
        match outcome {
            JobOutcome::Succeeded(count, report) => {
                succeeded += 1;
                spikes += count;
                // JSONL to stdout, in job order
                if let Some(json) = report {
                    if let Err(e) = output::write_output(json, None) {
                        eprintln!("Error: {}", e);
                        return exit_codes::EXECUTION_ERROR;
                    }
                }
            }
            JobOutcome::Failed(_) => failed += 1,
            JobOutcome::Cancelled => cancelled += 1,
        }
    }

    let elapsed = start_time.elapsed();

    if !args.quiet {
        eprintln!(
            "Batch complete: {}/{} succeeded, {}/{} failed, {} cancelled, {} spike(s), {:.1}s",
            succeeded,
            total,
            failed,
            total,
            cancelled,
            spikes,
            elapsed.as_secs_f64()
        );
    }

    if failed == 0 && cancelled == 0 {
        exit_codes::SUCCESS
    } else if failed == 0 {
        exit_codes::CANCELLED
    } else if succeeded > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}

fn run_job(job: &Job, filter: &FilterOptions, args: &BatchArgs, token: &CancelToken) -> JobOutcome {
    if let Err(msg) = params::validate_file(&job.file) {
        return JobOutcome::Failed(msg);
    }
    let sort_options = match params::sort_options(&job.thresholds, &job.selection) {
        Ok(o) => o,
        Err(msg) => return JobOutcome::Failed(msg),
    };

    let progress = ProgressFn::new(|done, total| {
        log::debug!("{}: detection pass {}/{}", job.output_name, done, total)
    })
    .with_token(token.clone());
    let session = match params::run_pipeline(&job.file, &job.selection, filter, &sort_options, &progress, true) {
        Ok(s) => s,
        Err(SpikeError::Cancelled) => return JobOutcome::Cancelled,
        Err(e) => return JobOutcome::Failed(e.to_string()),
    };
    let Some(result) = session.sorting() else {
        return JobOutcome::Failed("sorting produced no result".to_string());
    };

    let report = JobReport {
        file: &job.file,
        output_name: &job.output_name,
        thresholds: &job.thresholds,
        selected_duration_s: session.selected_duration(),
        history: session.history(),
        result,
    };
    let spikes = result.total_spikes();

    match args.output_dir {
        Some(ref dir) => {
            let out_path = Path::new(dir).join(format!("{}_sort.json", job.output_name));
            let written = output::to_json(&report, args.compact)
                .and_then(|json| output::write_output(&json, out_path.to_str()))
                .and_then(|_| {
                    let exports = spike_train_exports(result, &session.windows(), &job.output_name);
                    output::write_spike_trains(dir, &exports)
                });
            match written {
                Ok(_) => JobOutcome::Succeeded(spikes, None),
                Err(msg) => JobOutcome::Failed(msg),
            }
        }
        None => match output::to_json(&report, true) {
            Ok(json) => JobOutcome::Succeeded(spikes, Some(json)),
            Err(msg) => JobOutcome::Failed(msg),
        },
    }
}

/// Expand the inputs into one job per (file, threshold set).
fn plan_jobs(args: &BatchArgs) -> Result<Vec<Job>, String> {
    let default_sets = parse_threshold_sets(args.thresholds.as_deref().unwrap_or(""))
        .map_err(|e| e.to_string())?;

    let mut jobs = Vec::new();
    if let Some(ref plan_path) = args.plan {
        for entry in read_plan(plan_path)?.jobs {
            let sets = match entry.thresholds {
                Some(ref text) => parse_threshold_sets(text).map_err(|e| format!("{}: {}", entry.file, e))?,
                None => default_sets.clone(),
            };
            let mut selection = args.selection.clone();
            if let Some(channels) = entry.channels {
                selection.channels = channels;
            }
            if entry.interval.is_some() {
                selection.interval = entry.interval;
            }
            if entry.cutoff.is_some() {
                selection.cutoff = entry.cutoff;
            }
            push_jobs(&mut jobs, &entry.file, &sets, &selection);
        }
    } else {
        for file in resolve_files(args)? {
            push_jobs(&mut jobs, &file, &default_sets, &args.selection);
        }
    }
    Ok(jobs)
}

fn push_jobs(jobs: &mut Vec<Job>, file: &str, sets: &[Vec<i64>], selection: &SelectionArgs) {
    let stem = params::output_stem(file);
    for (k, thresholds) in sets.iter().enumerate() {
        let output_name = if sets.len() > 1 {
            format!("{}_set{}", stem, k + 1)
        } else {
            stem.clone()
        };
        jobs.push(Job {
            file: file.to_string(),
            thresholds: thresholds.clone(),
            selection: selection.clone(),
            output_name,
        });
    }
}

fn read_plan(path: &str) -> Result<BatchPlan, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read plan file '{}': {}", path, e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid plan file '{}': {}", path, e))
}

fn resolve_files(args: &BatchArgs) -> Result<Vec<String>, String> {
    if let Some(ref pattern) = args.glob {
        resolve_glob(pattern)
    } else if let Some(ref files) = args.files {
        Ok(files.clone())
    } else {
        Err("One of --glob, --files, or --plan must be specified".to_string())
    }
}

fn resolve_glob(pattern: &str) -> Result<Vec<String>, String> {
    let paths = glob::glob(pattern)
        .map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))?;

    let mut files: Vec<String> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    if let Some(s) = path.to_str() {
                        files.push(s.to_string());
                    }
                }
            }
            Err(e) => {
                eprintln!("Warning: glob error: {}", e);
            }
        }
    }
    files.sort();
    Ok(files)
}
