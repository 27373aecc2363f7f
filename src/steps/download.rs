use std::fs;

use crate::{context::InstallationContext, error::InstallerError, remote::download_url};

use super::{arg, set_mode, Toolkit};

/// Fetches the latest release archive into the application directory and
/// hands it to the service user.
pub fn fetch(kit: &Toolkit<'_>, _ctx: &mut InstallationContext) -> Result<(), InstallerError> {
    check_arch(std::env::consts::ARCH)?;

    let app_dir = &kit.config.layout.app_dir;
    let app = arg(app_dir);

    kit.report.update_status("Creating dployr directory...");
    fs::create_dir_all(app_dir)?;

    kit.report.update_status("Fetching latest release info...");
    let release = kit.remote.latest_release()?;
    let url = download_url(&kit.config.endpoints.release_cdn, &release.tag_name);
    kit.report
        .update_status(&format!("Starting download from {}...", url));

    let zip = app_dir.join("dployr.zip");
    let zip_arg = arg(&zip);
    kit.report.update_status("Downloading ZIP file...");
    kit.exec.run("curl", &["-fsSL", "-o", zip_arg.as_str(), url.as_str()])?;

    kit.report.update_status("Extracting...");
    kit.exec.run("unzip", &["-o", "-q", zip_arg.as_str(), "-d", app.as_str()])?;
    let _ = fs::remove_file(&zip);

    kit.report.update_status("Setting path permissions...");
    set_mode(app_dir, 0o775)?;

    kit.report.update_status("Setting file ownership...");
    kit.exec.run("chown", &["-R", "dployr:dployr", app.as_str()])?;

    let storage = app_dir.join("storage");
    let cache = app_dir.join("bootstrap").join("cache");
    kit.exec.run(
        "chown",
        &["-R", "dployr:www-data", arg(&storage).as_str(), arg(&cache).as_str()],
    )?;
    set_mode(&cache, 0o775)?;
    set_mode(&storage, 0o775)?;

    kit.report.update_status("Download complete");
    Ok(())
}

/// Release archives exist for these targets only.
fn check_arch(arch: &str) -> Result<(), InstallerError> {
    match arch {
        "x86_64" | "aarch64" | "arm" => Ok(()),
        other => Err(InstallerError::UnsupportedArch(other.to_string())),
    }
}
