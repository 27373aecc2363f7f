use crate::{config::InstallMode, context::InstallationContext, error::InstallerError};

use super::Toolkit;

/// Brings dployr up under its supervisor and gives it a moment to settle.
pub fn run(kit: &Toolkit<'_>, ctx: &mut InstallationContext) -> Result<(), InstallerError> {
    let waits = &kit.config.waits;
    match ctx.mode() {
        InstallMode::Containerized => {
            kit.exec
                .run_in(&kit.config.layout.data_dir, "docker", &["compose", "up", "-d"])?;
            kit.wait(waits.containerized_start, "Waiting for dployr to start");
        }
        InstallMode::HostNative => {
            kit.exec.run("systemctl", &["start", "dployr"])?;
            kit.wait(waits.native_start, "Waiting for dployr to start");
        }
    }
    Ok(())
}
