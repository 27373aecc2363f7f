use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::Local;
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::{error::InstallerError, ui};

/// Number of cells in the rendered progress bar.
pub const BAR_WIDTH: usize = 50;

// ── Log levels ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Status,
    Progress,
    Info,
    Success,
    Warning,
    Error,
    Cmd,
    CmdOutput,
    CmdError,
    CmdSuccess,
}

impl Level {
    pub fn tag(self) -> &'static str {
        match self {
            Level::Status => "STATUS",
            Level::Progress => "PROGRESS",
            Level::Info => "INFO",
            Level::Success => "SUCCESS",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Cmd => "CMD",
            Level::CmdOutput => "CMD_OUTPUT",
            Level::CmdError => "CMD_ERROR",
            Level::CmdSuccess => "CMD_SUCCESS",
        }
    }
}

// ── Progress math ─────────────────────────────────────────────────────────────
//
// Both values truncate independently, so near non-divisor totals the bar can
// look a cell short of the printed percentage.

pub fn progress_percent(current: usize, total: usize) -> usize {
    if total == 0 {
        return 100;
    }
    current * 100 / total
}

pub fn progress_fill(current: usize, total: usize, width: usize) -> usize {
    if total == 0 {
        return width;
    }
    current * width / total
}

fn render_bar(filled: usize, width: usize) -> String {
    let filled = filled.min(width);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(width - filled))
}

// ── Reporter ──────────────────────────────────────────────────────────────────

/// Progress bar, status line and the append-only run log.
///
/// Every reporting call writes its log entry before anything is drawn, so the
/// log always holds at least what the operator saw.
pub struct Reporter {
    log_path: PathBuf,
    log: Mutex<File>,
    status: Mutex<String>,
    bar: ProgressBar,
}

impl Reporter {
    /// Opens (or creates) the log in append mode and draws to stderr.
    pub fn create(log_path: impl Into<PathBuf>) -> io::Result<Self> {
        Self::with_target(log_path, ProgressDrawTarget::stderr())
    }

    pub fn with_target(
        log_path: impl Into<PathBuf>,
        target: ProgressDrawTarget,
    ) -> io::Result<Self> {
        let log_path = log_path.into();
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let bar = ProgressBar::with_draw_target(None, target);
        bar.set_style(
            ProgressStyle::with_template("{prefix}\n{msg}").expect("progress template is valid"),
        );

        Ok(Reporter {
            log_path,
            log: Mutex::new(file),
            status: Mutex::new(String::new()),
            bar,
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Appends one timestamped entry. Write failures are ignored: losing a
    /// log line must never abort an installation.
    pub fn record(&self, level: Level, msg: &str) {
        let mut file = self.log.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let _ = writeln!(file, "{} [{}] {}", stamp, level.tag(), msg);
        let _ = file.flush();
    }

    // ── Screen + log ──────────────────────────────────────────────────────────

    pub fn show_progress(&self, current: usize, total: usize, message: &str) {
        self.record(
            Level::Progress,
            &format!("{}/{} {}", current, total, message),
        );

        let percent = progress_percent(current, total);
        let filled = progress_fill(current, total, BAR_WIDTH);
        self.bar.set_prefix(format!(
            "{} {} {}",
            style(render_bar(filled, BAR_WIDTH)).blue(),
            style(format!("{:>3}%", percent)).green(),
            message
        ));
        self.redraw_status();
    }

    pub fn update_status(&self, msg: &str) {
        self.record(Level::Status, msg);
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = msg.to_string();
        self.redraw_status();
    }

    pub fn log_info(&self, msg: &str) {
        self.update_status(msg);
        self.record(Level::Info, msg);
    }

    pub fn log_success(&self, msg: &str) {
        self.update_status(msg);
        self.record(Level::Success, msg);
    }

    pub fn log_warning(&self, msg: &str) {
        self.update_status(msg);
        self.record(Level::Warning, msg);
    }

    /// Errors are printed above the bar instead of replacing the status line.
    pub fn log_error(&self, msg: &str) {
        self.record(Level::Error, msg);
        self.bar.suspend(|| ui::print_error(msg));
    }

    /// Reports a fatal step failure: log first, then the same lines on screen
    /// together with the log location.
    pub fn handle_error(&self, step: &str, err: &InstallerError) {
        let headline = format!("Installation failed during: {}", step);
        let details = format!("Error details: {}", err);
        self.record(Level::Error, &headline);
        self.record(Level::Error, &details);

        self.bar.abandon();
        eprintln!();
        ui::print_error(&headline);
        ui::print_error(&details);
        eprintln!();
        ui::print_info(&format!("Full log available at: {}", self.log_path.display()));
        eprintln!();
    }

    /// Writes an error that ended the run outside any step to the log and
    /// hands it back. Step failures went through `handle_error` already.
    pub fn log_failure(&self, err: InstallerError) -> InstallerError {
        if !matches!(err, InstallerError::Step { .. }) {
            self.record(Level::Error, &format!("Installation aborted: {}", err));
        }
        err
    }

    /// Leaves the final bar on screen once every step has finished.
    pub fn finish(&self) {
        self.bar.finish();
    }

    fn redraw_status(&self) {
        let status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if status.is_empty() {
            self.bar.set_message(" ");
        } else {
            self.bar
                .set_message(format!("{} {}", style("└─").yellow(), status.as_str()));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn hidden_reporter(dir: &Path) -> Reporter {
        Reporter::with_target(dir.join("run.log"), ProgressDrawTarget::hidden()).unwrap()
    }

    /// `(level tag, first message line)` pairs in file order. Continuation
    /// lines of multi-line command output are skipped.
    pub(crate) fn log_entries(reporter: &Reporter) -> Vec<(String, String)> {
        fs::read_to_string(reporter.log_path())
            .unwrap()
            .lines()
            .filter_map(|line| {
                // "<date> <time> [TAG] message"
                let rest = line.splitn(3, ' ').nth(2)?;
                let rest = rest.strip_prefix('[')?;
                let (tag, msg) = rest.split_once("] ")?;
                Some((tag.to_string(), msg.to_string()))
            })
            .collect()
    }

    #[test]
    fn progress_math_floors_both_values() {
        for total in 1..=40 {
            for current in 0..=total {
                assert_eq!(progress_percent(current, total), current * 100 / total);
                assert_eq!(
                    progress_fill(current, total, BAR_WIDTH),
                    current * BAR_WIDTH / total
                );
            }
        }
        // 1/3: 33% printed, 16 of 50 cells filled.
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_fill(1, 3, BAR_WIDTH), 16);
        assert_eq!(progress_fill(9, 9, BAR_WIDTH), BAR_WIDTH);
    }

    #[test]
    fn rendered_bar_is_always_full_width() {
        for filled in 0..=BAR_WIDTH {
            assert_eq!(render_bar(filled, BAR_WIDTH).chars().count(), BAR_WIDTH + 2);
        }
    }

    #[test]
    fn every_call_lands_in_the_log_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let r = hidden_reporter(dir.path());

        r.show_progress(0, 9, "Creating user...");
        r.update_status("Creating dployr user...");
        r.log_info("info line");
        r.log_success("success line");
        r.log_warning("warning line");
        r.log_error("error line");
        r.record(Level::Cmd, "Running: true");

        let got = log_entries(&r);
        let want = [
            ("PROGRESS", "0/9 Creating user..."),
            ("STATUS", "Creating dployr user..."),
            ("STATUS", "info line"),
            ("INFO", "info line"),
            ("STATUS", "success line"),
            ("SUCCESS", "success line"),
            ("STATUS", "warning line"),
            ("WARNING", "warning line"),
            ("ERROR", "error line"),
            ("CMD", "Running: true"),
        ];
        assert_eq!(got.len(), want.len());
        for ((tag, msg), (want_tag, want_msg)) in got.iter().zip(want.iter()) {
            assert_eq!(tag, want_tag);
            assert_eq!(msg, want_msg);
        }
    }

    #[test]
    fn log_is_appended_across_reporters() {
        let dir = tempfile::tempdir().unwrap();
        hidden_reporter(dir.path()).update_status("first run");
        let second = hidden_reporter(dir.path());
        second.update_status("second run");

        let msgs: Vec<String> = log_entries(&second).into_iter().map(|(_, m)| m).collect();
        assert_eq!(msgs, vec!["first run", "second run"]);
    }

    #[test]
    fn fatal_error_logs_step_and_cause() {
        let dir = tempfile::tempdir().unwrap();
        let r = hidden_reporter(dir.path());
        r.handle_error("Setting up caddy", &InstallerError::Dns("taken".into()));

        let got = log_entries(&r);
        assert_eq!(got[0].1, "Installation failed during: Setting up caddy");
        assert_eq!(got[1].1, "Error details: DNS record creation failed: taken");
    }

    #[test]
    fn failure_outside_a_step_is_logged_once() {
        let dir = tempfile::tempdir().unwrap();
        let r = hidden_reporter(dir.path());

        let err = r.log_failure(InstallerError::Cancelled);
        assert!(matches!(err, InstallerError::Cancelled));
        r.log_failure(InstallerError::Network("unexpected DNS response: EOF".into()));
        r.log_failure(InstallerError::Dns("taken".into()).in_step("Setting up caddy"));

        let got = log_entries(&r);
        assert_eq!(
            got,
            [
                ("ERROR".to_string(), "Installation aborted: Installation cancelled by user".to_string()),
                (
                    "ERROR".to_string(),
                    "Installation aborted: Network detection failed: unexpected DNS response: EOF"
                        .to_string()
                ),
            ]
        );
    }
}
