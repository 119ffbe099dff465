pub mod averaging;
pub mod binning;
pub mod correlation;
pub mod error;
pub mod export;
pub mod filter;
pub mod peak;
pub mod profiling;
pub mod progress;
pub mod recording;
pub mod session;
pub mod sorter;
pub mod thresholds;
pub mod types;
pub mod wav;
pub mod window;

pub use averaging::{
    cluster_average_waveform, event_related_average, AverageWaveform, AveragingOptions,
    ChannelEventAverages, MarkerAverage, WaveformOptions,
};
pub use correlation::{
    autocorrelogram, cross_correlate, interspike_intervals, marker_ticks, CorrelationEngine,
    CorrelationOptions, Correlogram,
};
pub use error::{Result, SpikeError};
pub use export::{event_average_exports, spike_train_exports, EventAverageExport, SpikeTrainExport};
pub use filter::{BandOptions, FilterOptions, NotchOptions, SignalFilter};
pub use peak::{find_peaks, Peak, PeakDetector};
pub use progress::{CancelToken, NoProgress, Progress, ProgressFn};
pub use recording::{load_recording, LoadedRecording, MarkerStatus, Recording};
pub use session::{Session, SessionSnapshot};
pub use sorter::{ChannelClusters, Cluster, SortOptions, SortResult, SpikeSorter};
pub use thresholds::{order_thresholds, parse_threshold_sets, parse_thresholds};
pub use types::*;
pub use window::{resolve_windows, select_windows, Selection, TimeWindow};
