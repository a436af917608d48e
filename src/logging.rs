//! Tracing setup and per-run session transcripts.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::settings::AppSettings;

/// Entries kept in memory per session.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` when verbose.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Level of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    Action,
    Thinking,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Action => "ACTION",
            LogLevel::Thinking => "THINK",
        }
    }
}

/// A single transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    /// Line written to the session file.
    pub fn format_line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level.as_str(),
            self.message
        )
    }
}

/// Transcript of one automation run, kept in memory and appended to a file.
#[derive(Debug)]
pub struct SessionLog {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
    path: PathBuf,
    file: File,
}

impl SessionLog {
    /// Start a session file in the default logs directory.
    pub fn create_default() -> io::Result<Self> {
        let dir = AppSettings::logs_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no logs directory on this platform")
        })?;
        Self::create_in(&dir)
    }

    /// Start a session file in `dir`.
    pub fn create_in(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let name = format!(
            "session_{}_{}.log",
            Local::now().format("%Y%m%d_%H%M%S"),
            &id[..8]
        );
        let path = dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            entries: VecDeque::new(),
            max_entries: DEFAULT_MAX_ENTRIES,
            path,
            file,
        })
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Append an entry. A failed file write is reported and otherwise ignored.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(level, message);

        if let Err(e) = writeln!(self.file, "{}", entry.format_line()) {
            tracing::warn!("Failed to write session log {}: {}", self.path.display(), e);
        }

        self.entries.push_back(entry);
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Success, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn action(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Action, message);
    }

    pub fn thinking(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Thinking, message);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Session files in `dir`.
pub fn list_log_files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map(|ext| ext == "log").unwrap_or(false))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

/// Session files in the default logs directory.
pub fn list_log_files() -> Vec<PathBuf> {
    AppSettings::logs_dir()
        .map(|dir| list_log_files_in(&dir))
        .unwrap_or_default()
}

/// Lines of a session file.
pub fn read_log_file(path: &Path) -> io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(reader.lines().map_while(Result::ok).collect())
}
