use std::fs;

use crate::{config::InstallMode, context::InstallationContext, error::InstallerError};

use super::{arg, touch, Toolkit};

const CONTAINER_DIRS: &[&str] = &[
    "nextjs-apps",
    "builds",
    "images/cache",
    "logs/hot",
    "logs/warm",
    "logs/cold",
    "monitoring/prometheus",
    "monitoring/grafana",
    "ssl",
    "nginx/sites",
    "redis",
];

const NATIVE_DIRS: &[&str] = &["apps", "builds", "logs", "ssl"];

/// Lays out the working tree for the chosen mode and gives it to the
/// service user.
pub fn create(kit: &Toolkit<'_>, ctx: &mut InstallationContext) -> Result<(), InstallerError> {
    let layout = &kit.config.layout;
    let (root, subdirs) = match ctx.mode() {
        InstallMode::Containerized => (&layout.data_dir, CONTAINER_DIRS),
        InstallMode::HostNative => (&layout.app_dir, NATIVE_DIRS),
    };

    kit.report.update_status("Creating directories...");
    for sub in subdirs {
        fs::create_dir_all(root.join(sub))?;
    }

    if ctx.mode() == InstallMode::HostNative {
        touch(&layout.service_log)?;
        kit.exec
            .run("chown", &["dployr:dployr", arg(&layout.service_log).as_str()])?;
    }

    kit.exec.run("chown", &["-R", "dployr:dployr", arg(root).as_str()])?;
    Ok(())
}
