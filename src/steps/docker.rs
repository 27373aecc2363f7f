use serde_json::json;

use crate::{context::InstallationContext, error::InstallerError};

use super::{write_file, Toolkit, SERVICE_USER};

/// Port the containerized web UI listens on.
const WEB_PORT: &str = "7879";

fn daemon_config() -> String {
    let config = json!({
        "log-driver": "json-file",
        "log-opts": {
            "max-size": "100m",
            "max-file": "10"
        },
        "default-address-pools": [
            {"base": "172.17.0.0/12", "size": 20}
        ]
    });
    // Serializing a literal `Value` cannot fail.
    serde_json::to_string_pretty(&config).unwrap_or_default()
}

/// Configures and starts the Docker daemon, then lets the service user
/// talk to it.
pub fn setup(kit: &Toolkit<'_>, _ctx: &mut InstallationContext) -> Result<(), InstallerError> {
    let docker_dir = &kit.config.layout.docker_config_dir;

    kit.report.update_status("Writing Docker daemon config...");
    write_file(&docker_dir.join("daemon.json"), &daemon_config(), 0o664)?;

    kit.exec.run("systemctl", &["enable", "docker"])?;
    kit.exec.run("systemctl", &["start", "docker"])?;
    kit.wait(kit.config.waits.docker_ready, "Waiting for Docker to be ready");

    kit.report.update_status("Adding user to docker group...");
    kit.exec.run("usermod", &["-aG", "docker", SERVICE_USER])?;

    if kit.exec.run("ufw", &["allow", WEB_PORT]).is_err() {
        kit.report
            .log_warning(&format!("Failed to open firewall port {}", WEB_PORT));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        cmd::testing::RecordingExec,
        config::InstallMode,
        context::tests::context,
        remote::testing::FakeRemote,
        report::tests::hidden_reporter,
        steps::tests::{test_config, UBUNTU},
    };

    #[test]
    fn firewall_failure_is_only_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let report = hidden_reporter(dir.path());
        let config = test_config(&dir.path().join("root"));
        let exec = RecordingExec::default().fail_on("ufw", "ERROR: problem running iptables");
        let remote = FakeRemote::default();
        let kit = Toolkit { exec: &exec, remote: &remote, report: &report, config: &config };

        setup(&kit, &mut context(InstallMode::Containerized, UBUNTU)).unwrap();

        assert_eq!(
            exec.calls(),
            vec![
                "systemctl enable docker",
                "systemctl start docker",
                "usermod -aG docker dployr",
                "ufw allow 7879",
            ]
        );
        let log = fs::read_to_string(report.log_path()).unwrap();
        assert!(log.contains("[WARNING] Failed to open firewall port 7879"));

        let daemon: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(config.layout.docker_config_dir.join("daemon.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(daemon["log-opts"]["max-file"], "10");
    }
}
