pub mod caddy;
pub mod directories;
pub mod docker;
pub mod download;
pub mod migrations;
pub mod requirements;
pub mod services;
pub mod start;
pub mod user;

use std::{
    fs::{self, OpenOptions},
    io,
    os::unix::fs::PermissionsExt,
    path::Path,
    thread,
    time::Duration,
};

use crate::{
    cmd::Exec,
    config::{Config, InstallMode},
    remote::Remote,
    report::Reporter,
    runner::Step,
};

/// Account that owns the application files and runs the service.
pub const SERVICE_USER: &str = "dployr";

/// Collaborators shared by every step.
pub struct Toolkit<'a> {
    pub exec: &'a dyn Exec,
    pub remote: &'a dyn Remote,
    pub report: &'a Reporter,
    pub config: &'a Config,
}

impl Toolkit<'_> {
    /// Fixed sleep announced on the status line. Zero waits are silent.
    pub fn wait(&self, duration: Duration, what: &str) {
        if duration.is_zero() {
            return;
        }
        self.report
            .update_status(&format!("{} ({}s)...", what, duration.as_secs()));
        thread::sleep(duration);
    }
}

/// The installation, in execution order.
pub fn pipeline<'a>(kit: &'a Toolkit<'a>) -> Vec<Step<'a>> {
    vec![
        Step::new("Creating user", move |ctx| user::create(kit, ctx)),
        Step::new("Installing requirements", move |ctx| requirements::install(kit, ctx)),
        Step::new("Downloading archive", move |ctx| download::fetch(kit, ctx)),
        Step::new("Setting up docker", move |ctx| docker::setup(kit, ctx))
            .only_for(InstallMode::Containerized),
        Step::new("Creating directories", move |ctx| directories::create(kit, ctx)),
        Step::new("Running migrations", move |ctx| migrations::run(kit, ctx)),
        Step::new("Configuring services", move |ctx| services::configure(kit, ctx)),
        Step::new("Setting up caddy", move |ctx| caddy::setup(kit, ctx)),
        Step::new("Starting services", move |ctx| start::run(kit, ctx)),
    ]
}

// ── Filesystem helpers ────────────────────────────────────────────────────────
//
// All of these overwrite or no-op on repeat, so a step that dies half way can
// simply run again.

/// Path as a command-line argument.
pub(crate) fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn write_file(path: &Path, content: &str, mode: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    set_mode(path, mode)
}

pub(crate) fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

pub(crate) fn touch(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path).map(drop)
}
