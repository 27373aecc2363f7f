use std::path::Path;

use crate::{config::InstallMode, context::InstallationContext, error::InstallerError};

use super::{arg, write_file, Toolkit};

/// Describes how dployr is supervised: a compose file or a systemd unit.
pub fn configure(kit: &Toolkit<'_>, ctx: &mut InstallationContext) -> Result<(), InstallerError> {
    let layout = &kit.config.layout;
    match ctx.mode() {
        InstallMode::Containerized => {
            kit.report.update_status("Writing docker-compose.yml...");
            write_file(
                &layout.data_dir.join("docker-compose.yml"),
                &compose_file(&layout.data_dir),
                0o664,
            )?;
        }
        InstallMode::HostNative => {
            kit.report.update_status("Creating systemd service...");
            write_file(
                &layout.systemd_unit,
                &systemd_unit(&layout.app_dir, &layout.service_log),
                0o664,
            )?;
            kit.exec.run("systemctl", &["daemon-reload"])?;
            kit.exec
                .run("chmod", &["+x", arg(&layout.app_dir.join("artisan")).as_str()])?;
            kit.exec.run("systemctl", &["enable", "dployr"])?;
        }
    }
    Ok(())
}

fn compose_file(data_dir: &Path) -> String {
    format!(
        r#"services:
  dployr-web:
    image: dployr:latest
    user: "dployr:dployr"
    ports:
      - "7879:7879"
    volumes:
      - {data}:/data
      - /var/run/docker.sock:/var/run/docker.sock
    environment:
      - NODE_ENV=production
      - NEXT_TELEMETRY_DISABLED=1
    restart: unless-stopped
"#,
        data = data_dir.display()
    )
}

fn systemd_unit(app_dir: &Path, log: &Path) -> String {
    format!(
        r#"[Unit]
Description=dployr
After=network.target

[Service]
User=dployr
Group=dployr
WorkingDirectory={app}
ExecStart=/usr/bin/php {app}/artisan queue:work --sleep=3 --tries=3
Restart=always
StandardOutput=append:{log}
StandardError=append:{log}

[Install]
WantedBy=multi-user.target
"#,
        app = app_dir.display(),
        log = log.display()
    )
}
