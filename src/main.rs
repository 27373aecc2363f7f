mod checkpoint;
mod cmd;
mod config;
mod context;
mod error;
mod os;
mod remote;
mod report;
mod runner;
mod steps;
mod ui;

use std::path::PathBuf;

use chrono::{DateTime, Local};
use clap::Parser;
use dialoguer::{theme::ColorfulTheme, Confirm};

use checkpoint::CheckpointStore;
use cmd::CommandExecutor;
use config::{Config, InstallMode};
use context::InstallationContext;
use error::InstallerError;
use remote::{HttpRemote, Remote};
use report::{Level, Reporter};
use runner::StepRunner;
use steps::Toolkit;

/// Installs dployr on a fresh Linux server. Re-running resumes from the
/// first step that has not completed yet.
#[derive(Debug, Parser)]
#[command(name = "dployr-installer", version, about)]
struct Cli {
    /// How dployr is run on this host.
    #[arg(long = "type", value_enum)]
    mode: InstallMode,

    /// Skip the confirmation prompt.
    #[arg(short, long)]
    yes: bool,

    /// Forget completed steps and install from scratch.
    #[arg(long)]
    fresh: bool,

    /// Where completion markers are kept [default: ~/.dployr/state].
    #[arg(long, env = "DPLOYR_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Directory for the run log.
    #[arg(long, env = "DPLOYR_LOG_DIR", default_value = "/tmp")]
    log_dir: PathBuf,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => {}
        // Already reported with the log location by the runner.
        Err(InstallerError::Step { .. }) => std::process::exit(1),
        Err(e) => {
            println!();
            ui::print_error(&e.to_string());
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<(), InstallerError> {
    // ── Guard ─────────────────────────────────────────────────────────────────
    check_root()?;

    let started = Local::now();
    let mut config = Config::default();
    if let Some(dir) = &cli.state_dir {
        config.state_dir = dir.clone();
    }
    let report = Reporter::create(config::log_file_path(&cli.log_dir, started))?;
    report.record(Level::Info, "Starting dployr installer...");

    install(&cli, &config, &report, started).map_err(|e| report.log_failure(e))
}

fn install(
    cli: &Cli,
    config: &Config,
    report: &Reporter,
    started: DateTime<Local>,
) -> Result<(), InstallerError> {
    // ── Welcome ───────────────────────────────────────────────────────────────
    ui::print_banner();
    ui::print_info(&format!("Log file: {}", report.log_path().display()));

    let exec = CommandExecutor::new(report);
    let remote = HttpRemote::new(config.endpoints.clone())?;

    // ── Host discovery ────────────────────────────────────────────────────────
    let (public, private) = ui::with_spinner(
        "Detecting network addresses...",
        "Network addresses detected",
        || Ok((remote.public_ip()?, context::private_address()?)),
    )?;

    let os = os::resolve(&config.layout.os_release, &exec);
    if let Err(e) = os.require_family() {
        report.record(Level::Warning, &e.to_string());
        ui::print_warning(&format!("{}, the requirements step will fail", e));
    }

    // ── Checkpoints ───────────────────────────────────────────────────────────
    let checkpoints = CheckpointStore::open(&config.state_dir)?;
    report.record(
        Level::Info,
        &format!("Checkpoints kept in {}", checkpoints.dir().display()),
    );

    let mut ctx = InstallationContext::new(cli.mode, os, public, private, started);
    if !cli.fresh {
        checkpoints.claim_mode(cli.mode)?;
        if ctx.restore_subdomain(&checkpoints)? {
            report.record(
                Level::Info,
                &format!("Reusing registered subdomain {}", ctx.subdomain()),
            );
        }
    }
    confirm_plan(cli, &ctx, config)?;

    if cli.fresh {
        let removed = checkpoints.reset()?;
        report.log_info(&format!("Cleared {} completed step(s)", removed));
        checkpoints.claim_mode(cli.mode)?;
    }

    // ── Steps ─────────────────────────────────────────────────────────────────
    let kit = Toolkit {
        exec: &exec,
        remote: &remote,
        report,
        config,
    };
    let summary = StepRunner::new(&checkpoints, report).run(steps::pipeline(&kit), &mut ctx)?;
    report.log_success(&format!(
        "Installation finished: {} step(s) run, {} already done or not needed",
        summary.completed.len(),
        summary.skipped.len()
    ));
    report.finish();

    ui::print_completion(&ctx, &ctx.fqdn(&config.endpoints.domain));
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Shows what is about to happen and asks for a go-ahead, unless `--yes` was
/// given or nobody is at the terminal.
fn confirm_plan(
    cli: &Cli,
    ctx: &InstallationContext,
    config: &Config,
) -> Result<(), InstallerError> {
    let os = match ctx.os().codename.as_deref() {
        Some(codename) => format!("{} ({})", ctx.os().id, codename),
        None => ctx.os().id.clone(),
    };
    let domain = ctx.fqdn(&config.endpoints.domain);
    let network = if ctx.behind_nat() {
        format!("{} via {}", ctx.private_address(), ctx.public_address())
    } else {
        ctx.public_address().to_string()
    };

    println!();
    ui::print_kv_box(
        "Installation Plan",
        &[
            ("Mode", ctx.mode().as_str()),
            ("OS", os.as_str()),
            ("Domain", domain.as_str()),
            ("Address", network.as_str()),
        ],
    );
    println!();

    if cli.yes || !console::user_attended() {
        return Ok(());
    }

    let go = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Proceed with the installation?")
        .default(true)
        .interact()?;

    if !go {
        return Err(InstallerError::Cancelled);
    }
    Ok(())
}

/// Checks that the process is running as root (UID 0).
fn check_root() -> Result<(), InstallerError> {
    let uid = std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|s| {
            s.lines()
                .find(|l| l.starts_with("Uid:"))
                .and_then(|l| l.split_whitespace().nth(1))
                .and_then(|v| v.parse::<u32>().ok())
        })
        .unwrap_or(1); // default to non-root if unreadable

    if uid != 0 {
        return Err(InstallerError::NotRoot);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn type_flag_selects_mode() {
        let cli = Cli::try_parse_from(["dployr-installer", "--type", "standalone", "-y"]).unwrap();
        assert_eq!(cli.mode, InstallMode::HostNative);
        assert!(cli.yes);
        assert!(!cli.fresh);

        let cli = Cli::try_parse_from(["dployr-installer", "--type", "docker"]).unwrap();
        assert_eq!(cli.mode, InstallMode::Containerized);
    }

    #[test]
    fn type_flag_is_required_and_validated() {
        assert!(Cli::try_parse_from(["dployr-installer"]).is_err());
        assert!(Cli::try_parse_from(["dployr-installer", "--type", "k8s"]).is_err());
    }
}
