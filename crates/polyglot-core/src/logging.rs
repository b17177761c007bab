//! Guest log capture.
//!
//! Bundles emit diagnostics through the `env.log` host function, through
//! WASI stderr, or (for interpreted handlers) through the interpreter's
//! stderr. Every message becomes a [`LogEntry`] stored with the invocation
//! and is re-emitted through `tracing` with `guest_log = true`.

use std::time::Instant;

use tracing::{debug, error, info, warn};

/// Entries kept per invocation; later lines are counted and discarded.
pub const MAX_LOG_ENTRIES: usize = 1024;

/// A single log entry from guest code.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level (debug, info, warn, error).
    pub level: LogLevel,

    /// Log message content.
    pub message: String,

    /// Timestamp when the log was recorded.
    pub timestamp: Instant,
}

/// Log level for guest logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug-level messages.
    Debug,
    /// Informational messages.
    Info,
    /// Warning messages.
    Warn,
    /// Error messages.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Records guest log lines for one invocation.
#[derive(Debug)]
pub struct LoggingHost {
    bundle: String,
    request_id: String,
    entries: Vec<LogEntry>,
    dropped: usize,
}

impl LoggingHost {
    /// Create a log sink for one invocation of `bundle`.
    pub fn new(bundle: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            bundle: bundle.into(),
            request_id: request_id.into(),
            entries: Vec::new(),
            dropped: 0,
        }
    }

    /// Log a message at the specified level.
    ///
    /// The entry is stored and also emitted via `tracing`. Past
    /// [`MAX_LOG_ENTRIES`] messages are only counted.
    pub fn log(&mut self, level: LogLevel, message: &str) {
        if self.entries.len() >= MAX_LOG_ENTRIES {
            if self.dropped == 0 {
                warn!(
                    bundle = %self.bundle,
                    request_id = %self.request_id,
                    limit = MAX_LOG_ENTRIES,
                    "Guest log limit reached, discarding further entries"
                );
            }
            self.dropped += 1;
            return;
        }

        self.entries.push(LogEntry {
            level,
            message: message.to_string(),
            timestamp: Instant::now(),
        });

        let bundle = self.bundle.as_str();
        let request_id = self.request_id.as_str();
        match level {
            LogLevel::Debug => debug!(bundle, request_id, guest_log = true, "{}", message),
            LogLevel::Info => info!(bundle, request_id, guest_log = true, "{}", message),
            LogLevel::Warn => warn!(bundle, request_id, guest_log = true, "{}", message),
            LogLevel::Error => error!(bundle, request_id, guest_log = true, "{}", message),
        }
    }

    /// Record every non-empty line of a captured stderr stream.
    ///
    /// A line starting with `[debug]`, `[info]`, `[warn]` or `[error]` is
    /// logged at that level with the prefix stripped.
    pub fn log_stream(&mut self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            let (level, message) = parse_line(line);
            self.log(level, message);
        }
    }

    /// Entries recorded so far.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Messages discarded after the entry limit was reached.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Consume the sink and return its entries.
    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

/// Convert a numeric log level to [`LogLevel`].
///
/// Levels are 0=debug, 1=info, 2=warn, 3=error; unknown values map to info.
pub fn level_from_i32(level: i32) -> LogLevel {
    match level {
        0 => LogLevel::Debug,
        2 => LogLevel::Warn,
        3 => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

/// Split an optional `[level]` prefix off a guest log line.
pub fn parse_line(line: &str) -> (LogLevel, &str) {
    const PREFIXES: [(&str, LogLevel); 4] = [
        ("[debug]", LogLevel::Debug),
        ("[info]", LogLevel::Info),
        ("[warn]", LogLevel::Warn),
        ("[error]", LogLevel::Error),
    ];

    for (prefix, level) in PREFIXES {
        if let Some(rest) = line.strip_prefix(prefix) {
            return (level, rest.trim_start());
        }
    }

    (LogLevel::Info, line)
}
