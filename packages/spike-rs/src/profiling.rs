use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

const PROFILE_DIR: &str = "spike-rs";
const PROFILE_FILE: &str = "performance_profile.log";

/// Wall-clock timer for one pipeline stage. Logs and appends to the profile
/// log when dropped.
pub struct ProfileScope {
    label: String,
    start: Instant,
}

impl ProfileScope {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        log::debug!("[PROFILE] {} - {:.3}ms", self.label, elapsed_ms);

        if let Err(e) = append_profile_line(&format_profile_line(&self.label, elapsed_ms)) {
            log::warn!("Failed to write profile log: {}", e);
        }
    }
}

fn profile_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PROFILE_DIR)
        .join(PROFILE_FILE)
}

/// `<rfc3339 timestamp> | <label> | <ms>ms`
fn format_profile_line(label: &str, duration_ms: f64) -> String {
    format!(
        "{} | {} | {:.3}ms",
        chrono::Utc::now().to_rfc3339(),
        label,
        duration_ms
    )
}

fn append_profile_line(line: &str) -> std::io::Result<()> {
    let path = profile_log_path();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}

/// Time the rest of the enclosing block
#[macro_export]
macro_rules! profile_scope {
    ($label:expr) => {
        let _profile_scope = $crate::profiling::ProfileScope::new($label);
    };
}

/// Location of the profile log, for display
pub fn profile_log_location() -> String {
    profile_log_path().display().to_string()
}
