//! Progress callbacks for uploads and downloads, plus ready-made trackers.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use crate::models::{format_eta, format_size, format_speed};

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Download,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Upload => write!(f, "upload"),
            Operation::Download => write!(f, "download"),
        }
    }
}

/// Lifecycle of a transfer as reported to callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Starting,
    Progress,
    /// Chunks are uploaded and being bound to the destination.
    Saving,
    Completed,
    Error,
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferStatus::Starting => "starting",
            TransferStatus::Progress => "progress",
            TransferStatus::Saving => "saving",
            TransferStatus::Completed => "completed",
            TransferStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Optional context passed alongside the four progress numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressExtras {
    pub operation: Operation,
    pub filename: String,
    pub status: TransferStatus,
    /// Set only when `status` is [`TransferStatus::Error`].
    pub error: Option<String>,
}

/// Receives transfer progress.
///
/// `speed` is bytes per second measured since the previous call.
/// Any `Send` closure `FnMut(u64, u64, f64, f64, &ProgressExtras)` implements
/// this, so transfers stay spawnable on a multi-threaded runtime.
pub trait ProgressCallback: Send {
    fn on_progress(
        &mut self,
        bytes_transferred: u64,
        total_bytes: u64,
        percentage: f64,
        speed: f64,
        extras: &ProgressExtras,
    );
}

impl<F> ProgressCallback for F
where
    F: FnMut(u64, u64, f64, f64, &ProgressExtras) + Send,
{
    fn on_progress(
        &mut self,
        bytes_transferred: u64,
        total_bytes: u64,
        percentage: f64,
        speed: f64,
        extras: &ProgressExtras,
    ) {
        self(bytes_transferred, total_bytes, percentage, speed, extras)
    }
}

/// Percentage of `done` over `total`; an empty transfer is 100%.
pub fn percentage(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        done as f64 / total as f64 * 100.0
    }
}

/// Feeds a callback on behalf of the transfer engine: computes
/// instantaneous speed and keeps callback panics away from the transfer.
pub(crate) struct ProgressReporter<'a> {
    callback: Option<&'a mut dyn ProgressCallback>,
    operation: Operation,
    filename: String,
    last_bytes: u64,
    last_at: Instant,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(
        callback: Option<&'a mut dyn ProgressCallback>,
        operation: Operation,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            callback,
            operation,
            filename: filename.into(),
            last_bytes: 0,
            last_at: Instant::now(),
        }
    }

    pub(crate) fn report(
        &mut self,
        bytes: u64,
        total: u64,
        status: TransferStatus,
        error: Option<String>,
    ) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_at).as_secs_f64();
        let delta = bytes.saturating_sub(self.last_bytes);
        let speed = if elapsed > 0.0 {
            delta as f64 / elapsed
        } else {
            0.0
        };
        self.last_bytes = bytes;
        self.last_at = now;

        let Some(callback) = self.callback.as_mut() else {
            return;
        };

        let extras = ProgressExtras {
            operation: self.operation,
            filename: self.filename.clone(),
            status,
            error,
        };
        let pct = percentage(bytes, total);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            callback.on_progress(bytes, total, pct, speed, &extras);
        }));
        if outcome.is_err() {
            tracing::warn!(
                filename = %self.filename,
                status = %status,
                "Progress callback panicked; transfer continues"
            );
        }
    }
}

/// Terminal progress bar with speed and ETA.
pub struct SimpleProgressBar {
    title: String,
    bar: Option<ProgressBar>,
}

impl ProgressCallback for SimpleProgressBar {
    fn on_progress(
        &mut self,
        bytes: u64,
        total: u64,
        _percentage: f64,
        _speed: f64,
        extras: &ProgressExtras,
    ) {
        let title = &self.title;
        let bar = self.bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(total);
            let style = ProgressStyle::with_template(
                "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
            bar.set_style(style);
            bar.set_message(title.clone());
            bar
        });

        bar.set_position(bytes);
        match extras.status {
            TransferStatus::Saving => bar.set_message(format!("{title} (saving)")),
            TransferStatus::Completed => bar.finish_with_message(format!("{title} done")),
            TransferStatus::Error => {
                let reason = extras.error.as_deref().unwrap_or("unknown error");
                bar.abandon_with_message(format!("{title} failed: {reason}"));
            }
            TransferStatus::Starting | TransferStatus::Progress => {}
        }
    }
}

/// Verbose tracker: a line per checkpoint, optionally mirrored to a log file.
pub struct DetailedProgress {
    log_file: Option<PathBuf>,
    writer: Option<File>,
    started: Option<Instant>,
    next_checkpoint: f64,
}

impl DetailedProgress {
    const CHECKPOINT_STEP: f64 = 20.0;

    fn emit(&mut self, line: String) {
        println!("{line}");
        tracing::info!(target: "pcloud_sdk::progress", "{line}");

        let Some(path) = &self.log_file else {
            return;
        };
        if self.writer.is_none() {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => self.writer = Some(file),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Cannot open progress log; disabling it"
                    );
                    self.log_file = None;
                    return;
                }
            }
        }
        if let Some(writer) = self.writer.as_mut() {
            let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            if let Err(e) = writeln!(writer, "[{stamp}] {line}") {
                tracing::warn!(error = %e, "Cannot write progress log");
            }
        }
    }
}

impl ProgressCallback for DetailedProgress {
    fn on_progress(
        &mut self,
        bytes: u64,
        total: u64,
        pct: f64,
        speed: f64,
        extras: &ProgressExtras,
    ) {
        let started = *self.started.get_or_insert_with(Instant::now);
        let elapsed = started.elapsed().as_secs_f64();

        match extras.status {
            TransferStatus::Starting => {
                self.emit(format!(
                    "Starting {} of {} ({})",
                    extras.operation,
                    extras.filename,
                    format_size(total)
                ));
            }
            TransferStatus::Progress => {
                if pct + f64::EPSILON >= self.next_checkpoint {
                    while self.next_checkpoint <= pct {
                        self.next_checkpoint += Self::CHECKPOINT_STEP;
                    }
                    let remaining = total.saturating_sub(bytes) as f64;
                    let eta = if speed > 0.0 {
                        remaining / speed
                    } else {
                        f64::INFINITY
                    };
                    self.emit(format!(
                        "{:5.1}% {}/{} at {} ETA {}",
                        pct,
                        format_size(bytes),
                        format_size(total),
                        format_speed(speed),
                        format_eta(eta)
                    ));
                }
            }
            TransferStatus::Saving => self.emit(format!("Saving {}...", extras.filename)),
            TransferStatus::Completed => {
                let average = if elapsed > 0.0 {
                    bytes as f64 / elapsed
                } else {
                    0.0
                };
                self.emit(format!(
                    "Completed {} of {} in {:.1}s (average {})",
                    extras.operation,
                    extras.filename,
                    elapsed,
                    format_speed(average)
                ));
            }
            TransferStatus::Error => {
                let reason = extras.error.as_deref().unwrap_or("unknown error");
                self.emit(format!(
                    "Failed {} of {}: {}",
                    extras.operation, extras.filename, reason
                ));
            }
        }
    }
}

/// Prints only the 0/25/50/75/100 % milestones, each once.
pub struct MinimalProgress {
    next_milestone: u32,
}

impl ProgressCallback for MinimalProgress {
    fn on_progress(
        &mut self,
        _bytes: u64,
        _total: u64,
        pct: f64,
        _speed: f64,
        extras: &ProgressExtras,
    ) {
        while self.next_milestone <= 100 && pct >= f64::from(self.next_milestone) {
            println!(
                "{} {}: {}%",
                extras.operation, extras.filename, self.next_milestone
            );
            self.next_milestone += 25;
        }
        if extras.status == TransferStatus::Error {
            let reason = extras.error.as_deref().unwrap_or("unknown error");
            println!("{} {} failed: {}", extras.operation, extras.filename, reason);
        }
    }
}

/// Writes every update as a CSV row and prints nothing.
pub struct SilentProgress {
    path: PathBuf,
    writer: Option<File>,
    failed: bool,
}

impl SilentProgress {
    pub const HEADER: &'static str =
        "timestamp,operation,filename,status,bytes,total,percentage,speed";

    fn open(&mut self) -> Option<&mut File> {
        if self.writer.is_none() && !self.failed {
            let fresh = !self.path.exists();
            let opened = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .and_then(|mut file| {
                    if fresh {
                        writeln!(file, "{}", Self::HEADER)?;
                    }
                    Ok(file)
                });
            match opened {
                Ok(file) => self.writer = Some(file),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Cannot open CSV progress log"
                    );
                    self.failed = true;
                }
            }
        }
        self.writer.as_mut()
    }
}

impl ProgressCallback for SilentProgress {
    fn on_progress(
        &mut self,
        bytes: u64,
        total: u64,
        pct: f64,
        speed: f64,
        extras: &ProgressExtras,
    ) {
        let Some(writer) = self.open() else {
            return;
        };
        let row = format!(
            "{},{},{},{},{},{},{:.2},{:.0}",
            chrono::Utc::now().to_rfc3339(),
            extras.operation,
            csv_field(&extras.filename),
            extras.status,
            bytes,
            total,
            pct,
            speed
        );
        if let Err(e) = writeln!(writer, "{row}") {
            tracing::warn!(error = %e, "Cannot write CSV progress row");
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Progress bar titled `title`.
pub fn create_progress_bar(title: impl Into<String>) -> SimpleProgressBar {
    SimpleProgressBar {
        title: title.into(),
        bar: None,
    }
}

/// Checkpoint logger, mirrored to `log_file` when given.
pub fn create_detailed_progress(log_file: Option<PathBuf>) -> DetailedProgress {
    DetailedProgress {
        log_file,
        writer: None,
        started: None,
        next_checkpoint: 0.0,
    }
}

/// Milestone printer.
pub fn create_minimal_progress() -> MinimalProgress {
    MinimalProgress { next_milestone: 0 }
}

/// Silent CSV logger writing to `csv_file`.
pub fn create_silent_progress(csv_file: impl Into<PathBuf>) -> SilentProgress {
    SilentProgress {
        path: csv_file.into(),
        writer: None,
        failed: false,
    }
}
