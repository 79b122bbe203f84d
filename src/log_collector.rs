//! Decoupled logging pipeline.
//!
//! ```text
//! log::info!() / log::warn!() ...
//!     |
//! [LogCollector] (non-blocking, any thread)
//!     | (crossbeam unbounded channel)
//!     v
//! [DiskPersister] (background thread)
//!     |            \
//! logs/<ts>_lattest.log   stderr (optional echo)
//! ```
//!
//! Callers never wait on disk I/O, except through [`LogCollector::flush_blocking`]
//! which sends a flush marker down the same channel and waits for it.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Internal log line or special marker
enum LogMessage {
    Line(LogLine),
    /// Flush marker with channel sender to signal completion
    Flush(std::sync::mpsc::Sender<()>),
}

/// A log line with metadata
#[derive(Clone, Debug)]
pub struct LogLine {
    pub level: Level,
    pub message: String,
    /// `HH:MM:SS.mmm`, taken when the line was created
    pub timestamp: String,
}

impl LogLine {
    pub fn new(level: Level, message: String) -> Self {
        LogLine {
            level,
            message,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    /// `[HH:MM:SS.mmm] [LEVEL] message`
    pub fn render(&self) -> String {
        format!("[{}] [{}] {}", self.timestamp, self.level, self.message)
    }
}

/// File name of a session log started now: `<YYYYmmdd_HHMMSS>_lattest.log`
pub fn session_log_filename() -> String {
    format!("{}_lattest.log", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Logger that persists every record on a background thread
#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    log_path: PathBuf,
    level: LevelFilter,
}

impl LogCollector {
    /// Create the log directory and session file, then start the persister thread.
    pub fn new(log_dir: &Path, level: LevelFilter, echo: bool) -> Result<Self, String> {
        std::fs::create_dir_all(log_dir)
            .map_err(|e| format!("Failed to create log dir {}: {}", log_dir.display(), e))?;

        let log_path = log_dir.join(session_log_filename());
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| format!("Failed to open log file {}: {}", log_path.display(), e))?;

        let (tx, rx) = unbounded::<LogMessage>();

        // Plain OS thread so records from any runtime or firing thread get through
        std::thread::Builder::new()
            .name("lattest-log".to_string())
            .spawn(move || persist_loop(rx, file, echo))
            .map_err(|e| format!("Failed to spawn log persister: {}", e))?;

        Ok(LogCollector { tx, log_path, level })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Queue a line (non-blocking)
    pub fn log_line(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    /// Wait until every line queued before this call is written.
    pub fn flush_blocking(&self) -> Result<(), String> {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        rx.recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }

    /// Async form of [`flush_blocking`](Self::flush_blocking), run off the executor threads.
    pub async fn wait_for_empty(&self) -> Result<(), String> {
        let collector = self.clone();
        tokio::task::spawn_blocking(move || collector.flush_blocking())
            .await
            .map_err(|e| format!("Flush task failed: {}", e))?
    }

    /// Install a clone of this collector as the global `log` backend.
    pub fn install(&self) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self.clone()))?;
        log::set_max_level(self.level);
        Ok(())
    }
}

fn persist_loop(rx: crossbeam_channel::Receiver<LogMessage>, mut file: File, echo: bool) {
    while let Ok(msg) = rx.recv() {
        match msg {
            LogMessage::Line(line) => {
                let formatted = line.render();
                let _ = writeln!(file, "{}", formatted);
                if echo {
                    eprintln!("{}", formatted);
                }
            }
            LogMessage::Flush(done) => {
                let _ = file.flush();
                let _ = file.sync_data();
                let _ = done.send(());
            }
        }
    }
    let _ = file.flush();
}

/// Wires all log::info!(), log::warn!(), log::error!() calls into LogCollector
impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.log_line(LogLine::new(record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {
        let _ = self.flush_blocking();
    }
}
