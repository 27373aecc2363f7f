use std::path::Path;

use crate::{checkpoint::CheckpointStore, context::InstallationContext, error::InstallerError};

use super::{arg, write_file, Toolkit};

/// Registration attempts; each rejected attempt picks a new subdomain.
const DNS_ATTEMPTS: usize = 3;

const PHP_FPM_SOCKET: &str = "unix//run/php/php8.3-fpm.sock";

/// Registers the public name, points Caddy at the app and lets it obtain a
/// certificate.
///
/// A registered subdomain is recorded in the state directory right away, so
/// a run that dies later in this step reuses it instead of registering again.
pub fn setup(kit: &Toolkit<'_>, ctx: &mut InstallationContext) -> Result<(), InstallerError> {
    let state = CheckpointStore::open(&kit.config.state_dir)?;
    if ctx.subdomain_registered(&state)? {
        kit.report.update_status(&format!(
            "DNS record for {} already registered",
            ctx.fqdn(&kit.config.endpoints.domain)
        ));
    } else {
        register(kit, ctx)?;
        ctx.save_subdomain(&state)?;
    }

    let layout = &kit.config.layout;
    let domain = ctx.fqdn(&kit.config.endpoints.domain);
    let config = caddyfile(ctx, &domain, &layout.app_dir);

    kit.report.update_status("Writing Caddyfile...");
    write_file(&layout.caddyfile, &config, 0o664)?;
    kit.exec
        .run("chown", &["caddy:caddy", arg(&layout.caddyfile).as_str()])?;

    for port in ["80", "443"] {
        if kit.exec.run("ufw", &["allow", port]).is_err() {
            kit.report
                .log_warning(&format!("Failed to open firewall port {}", port));
        }
    }

    kit.wait(kit.config.waits.dns_propagation, "Waiting for DNS propagation");

    kit.report.update_status("Reloading Caddy configuration...");
    kit.exec.run("systemctl", &["restart", "caddy"])?;

    kit.wait(kit.config.waits.certificate, "Provisioning SSL certificate");
    Ok(())
}

fn register(kit: &Toolkit<'_>, ctx: &mut InstallationContext) -> Result<(), InstallerError> {
    let zone = &kit.config.endpoints.domain;
    let mut attempt = 1;
    loop {
        kit.report
            .update_status(&format!("Creating DNS record for {}...", ctx.fqdn(zone)));

        match kit.remote.register_dns(ctx.subdomain(), ctx.private_address()) {
            Ok(()) => return Ok(()),
            Err(InstallerError::Dns(reason)) if attempt < DNS_ATTEMPTS => {
                kit.report.log_warning(&format!(
                    "DNS record for {} rejected: {}",
                    ctx.fqdn(zone),
                    reason
                ));
                ctx.regenerate_subdomain();
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn site_block(address: &str, app_dir: &Path) -> String {
    format!(
        "{address} {{
    root * {root}/public
    php_fastcgi {PHP_FPM_SOCKET}
    try_files {{path}} {{path}}/ /index.php?{{query}}
    file_server
}}
",
        root = app_dir.display()
    )
}

/// Behind NAT the app is also served over plain HTTP on the private address,
/// and HTTPS redirects are disabled so that listener keeps working.
fn caddyfile(ctx: &InstallationContext, domain: &str, app_dir: &Path) -> String {
    if ctx.behind_nat() {
        format!(
            "{{\n    auto_https disable_redirects\n}}\n\n{}\n{}",
            site_block(domain, app_dir),
            site_block(&format!("http://{}:80", ctx.private_address()), app_dir)
        )
    } else {
        site_block(domain, app_dir)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, net::Ipv4Addr};

    use chrono::Local;

    use super::*;
    use crate::{
        cmd::testing::RecordingExec,
        config::InstallMode,
        context::tests::context,
        os::parse_os_release,
        remote::testing::FakeRemote,
        report::tests::hidden_reporter,
        steps::tests::{test_config, UBUNTU},
    };

    #[test]
    fn rejected_subdomain_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let report = hidden_reporter(dir.path());
        let config = test_config(&dir.path().join("root"));
        let exec = RecordingExec::default();
        let remote = FakeRemote {
            rejections: 1,
            ..FakeRemote::default()
        };
        let kit = Toolkit { exec: &exec, remote: &remote, report: &report, config: &config };
        let mut ctx = context(InstallMode::HostNative, UBUNTU);
        let first = ctx.subdomain().to_string();

        setup(&kit, &mut ctx).unwrap();

        let registered = remote.registered.borrow();
        assert_eq!(registered.len(), 2);
        assert_eq!(registered[0].0, first);
        assert_eq!(registered[1].0, ctx.subdomain());
        assert_eq!(registered[1].1, Ipv4Addr::new(10, 0, 0, 4));

        let caddyfile = fs::read_to_string(&config.layout.caddyfile).unwrap();
        assert!(caddyfile.contains(&format!("{}.dployr.dev {{", ctx.subdomain())));
    }

    #[test]
    fn persistent_rejection_fails_the_step() {
        let dir = tempfile::tempdir().unwrap();
        let report = hidden_reporter(dir.path());
        let config = test_config(&dir.path().join("root"));
        let exec = RecordingExec::default();
        let remote = FakeRemote {
            rejections: DNS_ATTEMPTS,
            ..FakeRemote::default()
        };
        let kit = Toolkit { exec: &exec, remote: &remote, report: &report, config: &config };

        let err = setup(&kit, &mut context(InstallMode::HostNative, UBUNTU)).unwrap_err();
        assert!(matches!(err, InstallerError::Dns(_)));
        assert_eq!(remote.registered.borrow().len(), DNS_ATTEMPTS);
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn undecodable_response_fails_without_a_new_subdomain() {
        let dir = tempfile::tempdir().unwrap();
        let report = hidden_reporter(dir.path());
        let config = test_config(&dir.path().join("root"));
        let exec = RecordingExec::default();
        let remote = FakeRemote {
            dns_body: Some("<html><body>502 Bad Gateway</body></html>"),
            ..FakeRemote::default()
        };
        let kit = Toolkit { exec: &exec, remote: &remote, report: &report, config: &config };
        let mut ctx = context(InstallMode::HostNative, UBUNTU);
        let first = ctx.subdomain().to_string();

        let err = setup(&kit, &mut ctx).unwrap_err();

        assert!(matches!(err, InstallerError::Network(_)), "{err}");
        assert_eq!(ctx.subdomain(), first);
        assert_eq!(remote.registered.borrow().len(), 1);
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn recorded_subdomain_is_not_registered_again() {
        let dir = tempfile::tempdir().unwrap();
        let report = hidden_reporter(dir.path());
        let config = test_config(&dir.path().join("root"));
        let state = CheckpointStore::open(&config.state_dir).unwrap();
        let exec = RecordingExec::default().fail_on("systemctl restart caddy", "Job failed");
        let remote = FakeRemote::default();
        let kit = Toolkit { exec: &exec, remote: &remote, report: &report, config: &config };

        let mut ctx = context(InstallMode::HostNative, UBUNTU);
        setup(&kit, &mut ctx).unwrap_err();
        assert!(ctx.subdomain_registered(&state).unwrap());

        // A later run starts from a fresh context and takes the record over.
        let mut again = context(InstallMode::HostNative, UBUNTU);
        assert!(again.restore_subdomain(&state).unwrap());
        let _ = setup(&kit, &mut again);

        assert_eq!(remote.registered.borrow().len(), 1);
        assert_eq!(again.subdomain(), ctx.subdomain());
    }

    #[test]
    fn nat_config_serves_private_address_too() {
        let ctx = context(InstallMode::HostNative, UBUNTU);
        let config = caddyfile(&ctx, "abc.dployr.dev", Path::new("/home/dployr"));
        assert!(config.starts_with("{\n    auto_https disable_redirects\n}"));
        assert!(config.contains("abc.dployr.dev {\n    root * /home/dployr/public"));
        assert!(config.contains("http://10.0.0.4:80 {"));
        assert!(config.contains("try_files {path} {path}/ /index.php?{query}"));
    }

    #[test]
    fn direct_config_has_a_single_site() {
        let addr = Ipv4Addr::new(198, 51, 100, 9);
        let ctx = InstallationContext::new(
            InstallMode::HostNative,
            parse_os_release(UBUNTU),
            addr,
            addr,
            Local::now(),
        );
        let config = caddyfile(&ctx, "abc.dployr.dev", Path::new("/home/dployr"));
        assert!(config.starts_with("abc.dployr.dev {"));
        assert!(!config.contains("http://"));
    }
}
