use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::ValueEnum;

/// Deployment topology chosen with `--type`. Fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InstallMode {
    /// Run dployr under docker compose.
    #[value(name = "docker")]
    Containerized,
    /// Run dployr as a systemd service on the host.
    #[value(name = "standalone")]
    HostNative,
}

impl InstallMode {
    /// The name accepted on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            InstallMode::Containerized => "docker",
            InstallMode::HostNative => "standalone",
        }
    }
}

// ── Filesystem layout ─────────────────────────────────────────────────────────

/// Every path a step reads or writes.
///
/// Production uses the absolute paths below; tests re-root the whole tree
/// into a temporary directory with [`Layout::rooted`].
#[derive(Debug, Clone)]
pub struct Layout {
    pub passwd: PathBuf,
    pub os_release: PathBuf,
    pub sudoers: PathBuf,
    pub app_dir: PathBuf,
    pub data_dir: PathBuf,
    pub keyrings_dir: PathBuf,
    pub apt_keyrings_dir: PathBuf,
    pub apt_sources_dir: PathBuf,
    pub docker_config_dir: PathBuf,
    pub systemd_unit: PathBuf,
    pub service_log: PathBuf,
    pub caddyfile: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Layout::rooted("/")
    }
}

impl Layout {
    pub fn rooted(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let at = |p: &str| root.join(p);
        Layout {
            passwd: at("etc/passwd"),
            os_release: at("etc/os-release"),
            sudoers: at("etc/sudoers.d/dployr"),
            app_dir: at("home/dployr"),
            data_dir: at("data/dployr"),
            keyrings_dir: at("usr/share/keyrings"),
            apt_keyrings_dir: at("etc/apt/keyrings"),
            apt_sources_dir: at("etc/apt/sources.list.d"),
            docker_config_dir: at("etc/docker"),
            systemd_unit: at("etc/systemd/system/dployr.service"),
            service_log: at("var/log/dployr.log"),
            caddyfile: at("etc/caddy/Caddyfile"),
        }
    }
}

// ── Remote endpoints ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub public_ip: String,
    pub latest_release: String,
    pub release_cdn: String,
    pub dns_create: String,
    /// Registered subdomains live under this zone.
    pub domain: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            public_ip: "https://api.ipify.org".to_string(),
            latest_release: "https://api.github.com/repos/tobimadehin/dployr/releases/latest"
                .to_string(),
            release_cdn: "https://github.com/tobimadehin/dployr/releases/download".to_string(),
            dns_create: "https://dployr.dev/api/dns/create".to_string(),
            domain: "dployr.dev".to_string(),
        }
    }
}

// ── Fixed waits ───────────────────────────────────────────────────────────────

/// Unconditional sleeps used in place of readiness checks.
#[derive(Debug, Clone, Copy)]
pub struct Waits {
    pub docker_ready: Duration,
    pub dns_propagation: Duration,
    pub certificate: Duration,
    pub containerized_start: Duration,
    pub native_start: Duration,
}

impl Default for Waits {
    fn default() -> Self {
        Waits {
            docker_ready: Duration::from_secs(5),
            dns_propagation: Duration::from_secs(30),
            certificate: Duration::from_secs(15),
            containerized_start: Duration::from_secs(5),
            native_start: Duration::from_secs(3),
        }
    }
}

impl Waits {
    #[cfg(test)]
    pub fn none() -> Self {
        Waits {
            docker_ready: Duration::ZERO,
            dns_propagation: Duration::ZERO,
            certificate: Duration::ZERO,
            containerized_start: Duration::ZERO,
            native_start: Duration::ZERO,
        }
    }
}

// ── Aggregate ─────────────────────────────────────────────────────────────────

/// Everything the steps need besides the installation context.
#[derive(Debug, Clone)]
pub struct Config {
    pub layout: Layout,
    pub endpoints: Endpoints,
    pub waits: Waits,
    /// Checkpoint markers and the records that outlive a run.
    pub state_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            layout: Layout::default(),
            endpoints: Endpoints::default(),
            waits: Waits::default(),
            state_dir: default_state_dir(),
        }
    }
}

/// `~/.dployr/state`, falling back to `/root` when no home is known.
pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/root"))
        .join(".dployr")
        .join("state")
}

/// `<dir>/dployr-YYYYMMDD-HHMMSS.log`, stamped with the run start time.
pub fn log_file_path(dir: &Path, started: chrono::DateTime<chrono::Local>) -> PathBuf {
    dir.join(format!("dployr-{}.log", started.format("%Y%m%d-%H%M%S")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rooted_layout_stays_under_root() {
        let layout = Layout::rooted("/tmp/x");
        assert_eq!(layout.caddyfile, PathBuf::from("/tmp/x/etc/caddy/Caddyfile"));
        assert_eq!(layout.app_dir, PathBuf::from("/tmp/x/home/dployr"));
        assert_eq!(Layout::default().sudoers, PathBuf::from("/etc/sudoers.d/dployr"));
    }

    #[test]
    fn log_file_is_named_after_start_time() {
        let started = chrono::Local.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            log_file_path(Path::new("/tmp"), started),
            PathBuf::from("/tmp/dployr-20250309-140507.log")
        );
    }
}
