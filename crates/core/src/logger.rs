// Session-based logging with automatic rotation.
// One timestamped file per run; lines are buffered in memory and flushed
// on demand so per-frame logging never blocks on disk.
use anyhow::Result;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct SessionLogger {
    lines: Mutex<Vec<String>>,
    log_path: PathBuf,
    log_dir: PathBuf,
    retention_count: usize,
    session_name: String,
}

impl SessionLogger {
    pub fn new(log_dir: PathBuf, session_name: &str, retention_count: usize) -> Result<Self> {
        fs::create_dir_all(&log_dir)?;

        let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        let log_path = log_dir.join(format!("{}_{}.log", session_name, timestamp));

        let logger = Self {
            lines: Mutex::new(Vec::new()),
            log_path,
            log_dir,
            retention_count,
            session_name: session_name.to_string(),
        };

        logger.prune_old_sessions()?;
        logger.append(format!("=== {} session started ===", session_name));

        Ok(logger)
    }

    fn append(&self, message: impl AsRef<str>) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("[{}] {}", timestamp, message.as_ref());

        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.append(message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.append(format!("WARN: {}", message.as_ref()));
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.append(format!("ERROR: {}", message.as_ref()));
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.append(format!("DEBUG: {}", message.as_ref()));
    }

    /// Delete logs from old sessions beyond the retention count.
    fn prune_old_sessions(&self) -> Result<()> {
        let prefix = format!("{}_", self.session_name);
        let mut old_logs: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.log_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) != Some("log") {
                    continue;
                }
                let named_for_session = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| name.starts_with(&prefix));
                if !named_for_session {
                    continue;
                }
                if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                    old_logs.push((path, modified));
                }
            }
        }

        // Newest first; everything past the retention count goes.
        old_logs.sort_by(|a, b| b.1.cmp(&a.1));
        for (path, _) in old_logs.iter().skip(self.retention_count) {
            let _ = fs::remove_file(path);
        }

        Ok(())
    }

    pub fn flush_to_disk(&self) -> Result<()> {
        if let Ok(mut lines) = self.lines.lock() {
            if lines.is_empty() {
                return Ok(());
            }

            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)?;

            for line in lines.iter() {
                writeln!(file, "{}", line)?;
            }
            file.flush()?;

            lines.clear();
        }

        Ok(())
    }

    pub fn finalize(&self) -> Result<()> {
        self.append(format!("=== {} session ended ===", self.session_name));
        self.flush_to_disk()
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

static LOGGER: once_cell::sync::OnceCell<SessionLogger> = once_cell::sync::OnceCell::new();
static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn init_logger(log_dir: PathBuf, session_name: &str, retention_count: usize) -> Result<()> {
    let logger = SessionLogger::new(log_dir, session_name, retention_count)?;
    LOGGER
        .set(logger)
        .map_err(|_| anyhow::anyhow!("Logger already initialized"))?;
    Ok(())
}

/// Enable DEBUG-level lines (off unless diagnostics were requested).
pub fn set_debug_logging(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn debug_logging_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

pub fn log_info(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.info(message);
    }
}

pub fn log_warn(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.warn(message);
    }
}

pub fn log_error(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.error(message);
    }
}

pub fn log_debug(message: impl AsRef<str>) {
    if !debug_logging_enabled() {
        return;
    }
    if let Some(logger) = LOGGER.get() {
        logger.debug(message);
    }
}

pub fn flush_logs() -> Result<()> {
    if let Some(logger) = LOGGER.get() {
        logger.flush_to_disk()?;
    }
    Ok(())
}

pub fn finalize_logs() -> Result<()> {
    if let Some(logger) = LOGGER.get() {
        logger.finalize()?;
    }
    Ok(())
}

/// Rate limiter for log lines emitted from per-frame paths. A capture error
/// can repeat thousands of times per second; the gate lets one line through
/// per interval and counts the rest.
pub struct LogThrottle {
    state: Mutex<ThrottleState>,
    interval: Duration,
}

struct ThrottleState {
    last_emit: Option<Instant>,
    suppressed: u64,
}

impl LogThrottle {
    pub const fn new(interval: Duration) -> Self {
        Self {
            state: Mutex::new(ThrottleState {
                last_emit: None,
                suppressed: 0,
            }),
            interval,
        }
    }

    pub fn per_second() -> Self {
        Self::new(Duration::from_secs(1))
    }

    /// Returns `Some(suppressed_since_last)` when a line may be emitted now.
    pub fn permit(&self) -> Option<u64> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return None,
        };
        let now = Instant::now();
        let due = match state.last_emit {
            Some(last) => now.duration_since(last) >= self.interval,
            None => true,
        };
        if due {
            let suppressed = state.suppressed;
            state.last_emit = Some(now);
            state.suppressed = 0;
            Some(suppressed)
        } else {
            state.suppressed += 1;
            None
        }
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::log_info(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::log_warn(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logger::log_error(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logger::log_debug(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_permits_first_call_immediately() {
        let throttle = LogThrottle::per_second();
        assert_eq!(throttle.permit(), Some(0));
    }

    #[test]
    fn throttle_suppresses_within_interval_and_counts() {
        let throttle = LogThrottle::new(Duration::from_secs(60));
        assert_eq!(throttle.permit(), Some(0));
        assert_eq!(throttle.permit(), None);
        assert_eq!(throttle.permit(), None);
        assert_eq!(throttle.permit(), None);
        let state = throttle.state.lock().unwrap();
        assert_eq!(state.suppressed, 3);
    }

    #[test]
    fn throttle_with_zero_interval_always_permits() {
        let throttle = LogThrottle::new(Duration::ZERO);
        assert_eq!(throttle.permit(), Some(0));
        assert_eq!(throttle.permit(), Some(0));
    }

    #[test]
    fn session_files_are_pruned_beyond_retention() {
        let dir = std::env::temp_dir().join(format!("lumaveil-logtest-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        for i in 0..5 {
            let path = dir.join(format!("overlay_2026-01-0{}_00-00-00.log", i + 1));
            fs::write(&path, "x").unwrap();
        }

        {
            let _logger = SessionLogger::new(dir.clone(), "overlay", 3).unwrap();
        }

        let remaining = fs::read_dir(&dir).unwrap().flatten().count();
        // Three retained plus the file the new session just wrote on drop.
        assert_eq!(remaining, 4);
        let _ = fs::remove_dir_all(&dir);
    }
}
