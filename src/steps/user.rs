use std::{fs, path::Path};

use crate::{context::InstallationContext, error::InstallerError};

use super::{arg, write_file, Toolkit, SERVICE_USER};

const SUDOERS: &str = "\
# Allow dployr to manage its own service and nginx
dployr ALL=(ALL) NOPASSWD: /bin/systemctl start dployr, /bin/systemctl stop dployr, /bin/systemctl restart dployr, /bin/systemctl reload nginx, /bin/systemctl restart nginx
";

/// Creates the `dployr` system account (unless present) and its sudo rules.
pub fn create(kit: &Toolkit<'_>, _ctx: &mut InstallationContext) -> Result<(), InstallerError> {
    let layout = &kit.config.layout;

    if user_exists(&layout.passwd, SERVICE_USER) {
        kit.report.update_status("User already exists");
    } else {
        kit.report.update_status("Creating dployr user...");
        let home = arg(&layout.app_dir);
        kit.exec.run(
            "useradd",
            &["-r", "-m", "-s", "/bin/bash", "-d", home.as_str(), SERVICE_USER],
        )?;
    }

    kit.report.update_status("Setting up sudo permissions...");
    write_file(&layout.sudoers, SUDOERS, 0o440)?;
    Ok(())
}

fn user_exists(passwd: &Path, name: &str) -> bool {
    fs::read_to_string(passwd)
        .map(|content| {
            content
                .lines()
                .any(|line| line.split(':').next() == Some(name))
        })
        .unwrap_or(false)
}
