use console::{measure_text_width, style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::{config::InstallMode, context::InstallationContext, error::InstallerError};

const RULE_WIDTH: usize = 52;

fn rule() {
    println!("{}", style("─".repeat(RULE_WIDTH)).dim());
}

// ── Banner ────────────────────────────────────────────────────────────────────

pub fn print_banner() {
    let logo = [
        r"       _       _               ",
        r"    __| |_ __ | | ___  _   _ _ __ ",
        r"   / _` | '_ \| |/ _ \| | | | '__|",
        r"  | (_| | |_) | | (_) | |_| | |   ",
        r"   \__,_| .__/|_|\___/ \__, |_|   ",
        r"        |_|            |___/      ",
    ];

    println!();
    for line in &logo {
        println!("{}", style(line).cyan().bold());
    }
    println!();
    println!(
        "{}",
        style(format!(
            "   your app, your server, your rules  ·  installer v{}",
            env!("CARGO_PKG_VERSION")
        ))
        .dim()
        .italic()
    );
    println!();
    rule();
    println!();
}

// ── Feedback messages ─────────────────────────────────────────────────────────

fn marked(mark: StyledObject<&str>, msg: impl std::fmt::Display) -> String {
    format!("  {}  {}", mark.bold(), msg)
}

pub fn print_success(msg: &str) {
    println!("{}", marked(style("✓").green(), style(msg).green()));
}

pub fn print_info(msg: &str) {
    println!("{}", marked(style("→").blue(), msg));
}

pub fn print_warning(msg: &str) {
    println!("{}", marked(style("⚠").yellow(), style(msg).yellow()));
}

/// Errors go to stderr.
pub fn print_error(msg: &str) {
    eprintln!("{}", marked(style("✗").red(), style(msg).red()));
}

// ── Info box ──────────────────────────────────────────────────────────────────

/// Draws a bordered key/value box sized to its widest row.
///
/// ```text
/// ┌─ Installation Plan ─────────────────┐
/// │  Mode     docker                    │
/// │  Domain   3fa9c1d2e4b5.dployr.dev   │
/// └─────────────────────────────────────┘
/// ```
pub fn kv_box(title: &str, rows: &[(&str, &str)]) -> String {
    let key_width = rows.iter().map(|(k, _)| measure_text_width(k)).max().unwrap_or(0) + 3;
    let inner = rows
        .iter()
        .map(|(_, v)| key_width + measure_text_width(v) + 4)
        .chain([measure_text_width(title) + 4])
        .max()
        .unwrap_or(0);

    let mut out = format!(
        "  ┌─ {} {}┐\n",
        style(title).white().bold(),
        style("─".repeat(inner - measure_text_width(title) - 3)).dim()
    );
    for (key, val) in rows {
        let used = key_width + measure_text_width(val) + 2;
        out.push_str(&format!(
            "  │  {}{}{}{}│\n",
            style(*key).dim(),
            " ".repeat(key_width - measure_text_width(key)),
            style(*val).white().bold(),
            " ".repeat(inner - used)
        ));
    }
    out.push_str(&format!("  └{}┘", style("─".repeat(inner)).dim()));
    out
}

pub fn print_kv_box(title: &str, rows: &[(&str, &str)]) {
    println!("{}", kv_box(title, rows));
}

// ── Spinner ───────────────────────────────────────────────────────────────────

/// Runs `work` under a braille spinner. The spinner is cleared either way;
/// `done` is printed in its place only on success.
pub fn with_spinner<T>(
    msg: &str,
    done: &str,
    work: impl FnOnce() -> Result<T, InstallerError>,
) -> Result<T, InstallerError> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("  {spinner:.cyan.bold}  {msg}")
            .expect("spinner template is valid")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));

    let result = work();
    pb.finish_and_clear();
    if result.is_ok() {
        print_success(done);
    }
    result
}

// ── Completion ────────────────────────────────────────────────────────────────

/// `"4m 07s"` style elapsed time.
pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!("{}m {:02}s", secs / 60, secs % 60)
}

pub fn print_completion(ctx: &InstallationContext, domain: &str) {
    let elapsed = chrono::Local::now() - ctx.started_at();

    println!();
    rule();
    println!("{}", style("  INSTALLATION COMPLETE").green().bold());
    rule();
    println!();
    print_success(&format!("Installation completed in {}", format_elapsed(elapsed)));
    println!();
    print_info("Access your dployr installation at:");
    println!("     {}", style(format!("https://{}", domain)).green().bold());
    println!();

    let rows: &[(&str, &str)] = match ctx.mode() {
        InstallMode::Containerized => &[
            ("Start", "cd /data/dployr && docker compose up -d"),
            ("Stop", "cd /data/dployr && docker compose down"),
            ("Logs", "cd /data/dployr && docker compose logs -f"),
        ],
        InstallMode::HostNative => &[
            ("Start", "sudo systemctl start dployr"),
            ("Stop", "sudo systemctl stop dployr"),
            ("Status", "sudo systemctl status dployr"),
            ("Logs", "tail -f /var/log/dployr.log"),
        ],
    };
    print_kv_box("Service management", rows);
    println!();
}
