use crate::cli::AnalyzeArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use serde::Serialize;
use spike_rs::binning::{amplitude_edges, isi_edges_ms, normalized_histogram, AMPLITUDE_BINS};
use spike_rs::correlation::{channel_amplitude_range, ClusterPair, MarkerCorrelation};
use spike_rs::{
    cluster_average_waveform, event_average_exports, event_related_average, interspike_intervals,
    spike_train_exports, AverageWaveform, AveragingOptions, ChannelClusters, ChannelEventAverages,
    CorrelationEngine, CorrelationOptions, Correlogram, MarkerAverage, MarkerKey, ProgressFn,
    Session, SortResult, TimeWindow, WaveformOptions,
};

#[derive(Serialize)]
struct Histogram {
    edges: Vec<f64>,
    weights: Vec<f64>,
}

impl Histogram {
    fn new(values: &[f64], edges: Vec<f64>) -> Self {
        let weights = normalized_histogram(values, &edges);
        Self { edges, weights }
    }
}

#[derive(Serialize)]
struct ClusterAnalysis {
    /// 1-based
    cluster: usize,
    label: String,
    spikes: usize,
    firing_rate_hz: f64,
    autocorrelogram: Correlogram,
    /// Edges in milliseconds
    isi_histogram: Histogram,
    amplitude_histogram: Option<Histogram>,
    waveform: AverageWaveform,
}

#[derive(Serialize)]
struct ChannelAnalysis {
    /// 1-based
    channel: usize,
    lag_s: Vec<f64>,
    clusters: Vec<ClusterAnalysis>,
    cross_correlograms: Vec<ClusterPair>,
    marker_correlograms: Vec<MarkerCorrelation>,
    event_averages: Vec<MarkerAverage>,
}

#[derive(Serialize)]
struct AnalyzeOutput<'a> {
    file: &'a str,
    windows: Vec<TimeWindow>,
    selected_duration_s: f64,
    history: &'a [String],
    interval_ticks: usize,
    sorting: &'a SortResult,
    channels: Vec<ChannelAnalysis>,
}

struct AnalysisSettings {
    engine: CorrelationEngine,
    marker: Option<MarkerKey>,
    waveform: WaveformOptions,
}

fn analyze_channel(
    session: &Session,
    channel: &ChannelClusters,
    event_averages: Option<&ChannelEventAverages>,
    settings: &AnalysisSettings,
) -> spike_rs::Result<ChannelAnalysis> {
    let framerate = session.framerate();
    let duration = session.selected_duration();
    let signal: &[f64] = session
        .samples()
        .get(channel.channel)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let autos = settings.engine.autocorrelograms(channel)?;
    let lag_s = autos
        .first()
        .map(|c| c.lag_seconds(framerate))
        .unwrap_or_default();

    let shared_edges = match channel_amplitude_range(channel) {
        Some((lo, hi)) => Some(amplitude_edges(lo, hi, AMPLITUDE_BINS)?),
        None => None,
    };

    let mut clusters = Vec::with_capacity(channel.clusters.len());
    for ((rank, cluster), autocorrelogram) in channel.clusters.iter().enumerate().zip(autos) {
        let isi_ms: Vec<f64> = interspike_intervals(cluster)
            .iter()
            .map(|s| s * 1000.0)
            .collect();
        clusters.push(ClusterAnalysis {
            cluster: rank + 1,
            label: cluster.label.clone(),
            spikes: cluster.len(),
            firing_rate_hz: cluster.mean_firing_rate(duration),
            autocorrelogram,
            isi_histogram: Histogram::new(&isi_ms, isi_edges_ms()),
            amplitude_histogram: shared_edges
                .clone()
                .map(|edges| Histogram::new(&cluster.amplitudes, edges)),
            waveform: cluster_average_waveform(signal, cluster, framerate, &settings.waveform)?,
        });
    }

    let marker_correlograms = match settings.marker {
        Some(key) => settings
            .engine
            .against_marker(channel, session.markers(), key, framerate)?,
        None => Vec::new(),
    };

    Ok(ChannelAnalysis {
        channel: channel.channel + 1,
        lag_s,
        clusters,
        cross_correlograms: settings.engine.cross_correlograms(channel)?,
        marker_correlograms,
        event_averages: event_averages.map(|e| e.averages.clone()).unwrap_or_default(),
    })
}

pub fn execute(args: AnalyzeArgs) -> i32 {
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
        eprintln!("Analyzing {}...", args.file);
        let half_width = args.interval_ms.max(args.preinterval_ms);
        eprintln!("  Correlogram window: +/-{} ms", half_width);
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
    let Some(sorting) = session.sorting() else {
        eprintln!("Error: sorting produced no result");
        return exit_codes::EXECUTION_ERROR;
    };

    let correlation = CorrelationOptions {
        interval_ms: args.interval_ms,
        preinterval_ms: args.preinterval_ms,
    };
    let engine = match CorrelationEngine::new(
        &correlation,
        session.framerate(),
        session.recording().num_samples(),
    ) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            return params::exit_code_for(&e);
        }
    };

    let era_options = AveragingOptions {
        pre_s: args.era_pre,
        post_s: args.era_post,
    };
    let era = match event_related_average(
        session.samples(),
        session.markers(),
        session.framerate(),
        &era_options,
    ) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            return params::exit_code_for(&e);
        }
    };

    let settings = AnalysisSettings {
        engine,
        marker: args.marker.map(MarkerKey),
        waveform: WaveformOptions {
            pre_ms: args.waveform_pre_ms,
            post_ms: args.waveform_post_ms,
        },
    };

    let mut channels = Vec::with_capacity(sorting.channels.len());
    for channel in &sorting.channels {
        match analyze_channel(&session, channel, era.get(channel.channel), &settings) {
            Ok(analysis) => channels.push(analysis),
            Err(e) => {
                eprintln!("Error: channel {}: {}", channel.channel + 1, e);
                return params::exit_code_for(&e);
            }
        }
    }

    if !args.quiet {
        for channel in &channels {
            for cluster in &channel.clusters {
                eprintln!(
                    "  Channel {} cluster {}: {} spike(s), {:.2} Hz, waveform from {} spike(s)",
                    channel.channel,
                    cluster.cluster,
                    cluster.spikes,
                    cluster.firing_rate_hz,
                    cluster.waveform.windows_used
                );
            }
        }
    }

    let windows = session.windows();
    let report = AnalyzeOutput {
        file: &args.file,
        windows: windows.clone(),
        selected_duration_s: session.selected_duration(),
        history: session.history(),
        interval_ticks: settings.engine.interval_ticks(),
        sorting,
        channels,
    };
    if let Err(e) = output::emit(&report, args.compact, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    if let Some(ref dir) = args.export_dir {
        let stem = params::output_stem(&args.file);
        let written = output::write_spike_trains(dir, &spike_train_exports(sorting, &windows, &stem))
            .and_then(|mut paths| {
                paths.extend(output::write_event_averages(dir, &event_average_exports(&era, &stem))?);
                Ok(paths)
            });
        match written {
            Ok(paths) => {
                if !args.quiet {
                    eprintln!("Wrote {} CSV file(s) to {}", paths.len(), dir);
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    }

    if !args.quiet {
        if let Some(ref path) = args.output {
            eprintln!("Results written to {}", path);
        }
    }
    exit_codes::SUCCESS
}
