//! Tabular export rows
//!
//! Builds the tables behind the per-cluster spike-time CSVs and the
//! per-channel event-average CSVs. Writing them is left to the caller.

use crate::averaging::ChannelEventAverages;
use crate::sorter::SortResult;
use crate::window::{total_duration, TimeWindow};
use serde::Serialize;

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Spike times of one cluster with the selection summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpikeTrainExport {
    pub file_name: String,
    /// 1-based
    pub channel: usize,
    /// 1-based
    pub cluster: usize,
    pub label: String,
    pub spike_times: Vec<f64>,
    pub windows: Vec<TimeWindow>,
    /// Mean firing rate over the selected duration, in Hz
    pub frequency: f64,
    pub cutoff: Option<f64>,
}

impl SpikeTrainExport {
    pub fn header(&self) -> Vec<String> {
        vec![
            self.label.clone(),
            "Start time".to_string(),
            "Stop time".to_string(),
            "Frequency".to_string(),
            "Cut off threshold".to_string(),
        ]
    }

    /// Column-aligned rows; shorter columns are left blank.
    pub fn rows(&self) -> Vec<Vec<String>> {
        let height = self.spike_times.len().max(self.windows.len()).max(1);
        (0..height)
            .map(|i| {
                let window = self.windows.get(i);
                let first = i == 0;
                vec![
                    cell(self.spike_times.get(i).copied()),
                    cell(window.map(|w| w.start)),
                    cell(window.map(|w| w.stop)),
                    cell(first.then_some(self.frequency)),
                    cell(self.cutoff.filter(|_| first)),
                ]
            })
            .collect()
    }
}

/// One export per (channel, cluster), named
/// `spiketimes_{output}_channel{n}_cluster{m}.csv`.
pub fn spike_train_exports(
    sorting: &SortResult,
    windows: &[TimeWindow],
    output: &str,
) -> Vec<SpikeTrainExport> {
    let duration = total_duration(windows);
    sorting
        .channels
        .iter()
        .enumerate()
        .flat_map(|(ch, channel)| {
            channel.clusters.iter().enumerate().map(move |(cl, cluster)| SpikeTrainExport {
                file_name: format!("spiketimes_{}_channel{}_cluster{}.csv", output, ch + 1, cl + 1),
                channel: ch + 1,
                cluster: cl + 1,
                label: cluster.label.clone(),
                spike_times: cluster.times.clone(),
                windows: windows.to_vec(),
                frequency: cluster.mean_firing_rate(duration),
                cutoff: sorting.cutoff,
            })
        })
        .collect()
}

/// Event-related averages of one channel, one column per marker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventAverageExport {
    pub file_name: String,
    /// 1-based
    pub channel: usize,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// One export per channel, named `event_average_{output}_channel{n}.csv`.
/// Markers without a usable window get an empty column.
pub fn event_average_exports(averages: &[ChannelEventAverages], output: &str) -> Vec<EventAverageExport> {
    averages
        .iter()
        .map(|channel| {
            let time: &[f64] = channel
                .averages
                .iter()
                .find(|a| !a.waveform.is_empty())
                .map(|a| a.waveform.time.as_slice())
                .unwrap_or(&[]);

            let mut header = vec!["Time (s)".to_string()];
            header.extend(channel.averages.iter().map(|a| format!("Marker {}", a.marker)));

            let rows = time
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let mut row = vec![t.to_string()];
                    row.extend(
                        channel
                            .averages
                            .iter()
                            .map(|a| cell(a.waveform.mean.get(i).copied())),
                    );
                    row
                })
                .collect();

            EventAverageExport {
                file_name: format!("event_average_{}_channel{}.csv", output, channel.channel + 1),
                channel: channel.channel + 1,
                header,
                rows,
            }
        })
        .collect()
}
