use std::fs;

use crate::{
    config::InstallMode,
    context::InstallationContext,
    error::InstallerError,
    os::OsFamily,
};

use super::{arg, set_mode, write_file, Toolkit};

// ── Package sets ──────────────────────────────────────────────────────────────

const UBUNTU_BASE: &[&str] = &[
    "curl", "wget", "git", "jq", "ca-certificates", "gnupg", "ufw", "openssl", "unzip",
    "net-tools",
];

const UBUNTU_PHP: &[&str] = &[
    "composer", "php8.3-common", "php8.3-cli", "php8.3-fpm", "php8.3-curl", "php8.3-bz2",
    "php8.3-mbstring", "php8.3-intl",
];

const DEBIAN_BASE: &[&str] = &[
    "curl", "wget", "git", "jq", "ca-certificates", "gnupg", "ufw", "openssl", "unzip",
    "net-tools", "debian-keyring", "debian-archive-keyring", "apt-transport-https",
    "lsb-release",
];

const DEBIAN_PHP: &[&str] = &[
    "php8.3-fpm", "php8.3-cli", "php8.3-common", "php8.3-curl", "php8.3-mbstring",
    "php8.3-xml", "php8.3-zip", "php8.3-bcmath", "php8.3-intl", "php8.3-gd",
    "php8.3-sqlite3", "php8.3-tokenizer", "composer",
];

const RHEL_BASE: &[&str] = &["curl", "wget", "git", "jq", "caddy", "ufw", "openssl"];

const DOCKER_PACKAGES: &[&str] = &[
    "docker-ce", "docker-ce-cli", "containerd.io", "docker-buildx-plugin",
    "docker-compose-plugin",
];

// ── Repositories ──────────────────────────────────────────────────────────────

const SURY_KEY_URL: &str = "https://packages.sury.org/php/apt.gpg";
const CADDY_KEY_URL: &str = "https://dl.cloudsmith.io/public/caddy/stable/gpg.key";
const CADDY_REPO_URL: &str = "https://dl.cloudsmith.io/public/caddy/stable/debian.deb.txt";
const DOCKER_RHEL_REPO: &str = "https://download.docker.com/linux/centos/docker-ce.repo";

/// Installs system packages, PHP, Caddy and (containerized) Docker with the
/// host's package manager.
pub fn install(kit: &Toolkit<'_>, ctx: &mut InstallationContext) -> Result<(), InstallerError> {
    let os = ctx.os();
    kit.report.update_status(&format!("Detected OS: {}", os.id));

    match os.family {
        OsFamily::UbuntuLike => ubuntu(kit, ctx),
        OsFamily::DebianLike => debian(kit, ctx),
        OsFamily::RhelLike => rhel(kit, ctx),
        OsFamily::Unknown => Err(InstallerError::UnsupportedOs(os.id.clone())),
    }
}

// ── Per-family bodies ─────────────────────────────────────────────────────────

fn ubuntu(kit: &Toolkit<'_>, ctx: &InstallationContext) -> Result<(), InstallerError> {
    apt_update(kit)?;
    kit.report.update_status("Installing system packages...");
    apt_install(kit, UBUNTU_BASE)?;

    kit.report.update_status("Adding PHP repository...");
    kit.exec.run("add-apt-repository", &["-y", "ppa:ondrej/php"])?;
    apt_update(kit)?;
    kit.report.update_status("Installing PHP packages...");
    apt_install(kit, UBUNTU_PHP)?;

    caddy_debian(kit)?;
    if ctx.mode() == InstallMode::Containerized {
        docker_debian(kit, ctx)?;
    }
    Ok(())
}

fn debian(kit: &Toolkit<'_>, ctx: &InstallationContext) -> Result<(), InstallerError> {
    let layout = &kit.config.layout;

    apt_update(kit)?;
    kit.report.update_status("Installing system packages...");
    apt_install(kit, DEBIAN_BASE)?;

    kit.report.update_status("Creating keyring directory...");
    fs::create_dir_all(&layout.keyrings_dir)?;

    kit.report.update_status("Testing DNS resolution...");
    if kit.exec.run("nslookup", &["packages.sury.org"]).is_err() {
        kit.report
            .log_warning("DNS resolution failed for packages.sury.org");
    }

    kit.report.update_status("Adding PHP repository GPG key...");
    let key = layout.keyrings_dir.join("sury-php-keyring.gpg");
    dearmor_key(kit, &["-fsSL", SURY_KEY_URL], &arg(&key))?;
    set_mode(&key, 0o664)?;

    kit.report.update_status("Adding PHP repository...");
    let codename = ctx.os().codename()?;
    write_file(
        &layout.apt_sources_dir.join("sury-php.list"),
        &format!(
            "deb [signed-by={}] https://packages.sury.org/php/ {} main\n",
            key.display(),
            codename
        ),
        0o664,
    )?;

    apt_update(kit)?;
    kit.report.update_status("Installing PHP packages...");
    apt_install(kit, DEBIAN_PHP)?;

    caddy_debian(kit)?;
    if ctx.mode() == InstallMode::Containerized {
        docker_debian(kit, ctx)?;
    }
    Ok(())
}

fn rhel(kit: &Toolkit<'_>, ctx: &InstallationContext) -> Result<(), InstallerError> {
    kit.report.update_status("Enabling Caddy repository...");
    kit.exec.run("yum", &["install", "-y", "yum-plugin-copr"])?;
    kit.exec.run("yum", &["copr", "enable", "-y", "@caddy/caddy"])?;

    kit.report.update_status("Installing system packages...");
    yum_install(kit, RHEL_BASE)?;

    if ctx.mode() == InstallMode::Containerized {
        kit.report.update_status("Installing Docker...");
        kit.exec.run("yum", &["install", "-y", "yum-utils"])?;
        kit.exec
            .run("yum-config-manager", &["--add-repo", DOCKER_RHEL_REPO])?;
        yum_install(kit, DOCKER_PACKAGES)?;
    }
    Ok(())
}

// ── Shared Debian-family pieces ───────────────────────────────────────────────

fn caddy_debian(kit: &Toolkit<'_>) -> Result<(), InstallerError> {
    let layout = &kit.config.layout;
    kit.report.update_status("Installing Caddy web server...");

    fs::create_dir_all(&layout.keyrings_dir)?;
    fs::create_dir_all(&layout.apt_sources_dir)?;

    let key = layout.keyrings_dir.join("caddy-stable-archive-keyring.gpg");
    let list = layout.apt_sources_dir.join("caddy-stable.list");
    let list_arg = arg(&list);
    dearmor_key(kit, &["-1sLf", CADDY_KEY_URL], &arg(&key))?;
    kit.exec
        .pipe(("curl", &["-1sLf", CADDY_REPO_URL]), ("tee", &[list_arg.as_str()]))?;

    set_mode(&key, 0o664)?;
    set_mode(&list, 0o664)?;

    apt_update(kit)?;
    apt_install(kit, &["caddy"])
}

fn docker_debian(kit: &Toolkit<'_>, ctx: &InstallationContext) -> Result<(), InstallerError> {
    let layout = &kit.config.layout;
    let os = ctx.os();
    kit.report.update_status("Installing Docker...");

    fs::create_dir_all(&layout.apt_keyrings_dir)?;
    set_mode(&layout.apt_keyrings_dir, 0o775)?;

    let key = layout.apt_keyrings_dir.join("docker.gpg");
    let key_url = format!("https://download.docker.com/linux/{}/gpg", os.id);
    dearmor_key(kit, &["-fsSL", key_url.as_str()], &arg(&key))?;
    set_mode(&key, 0o664)?;

    let arch = deb_arch(std::env::consts::ARCH)?;
    let codename = os.codename()?;
    write_file(
        &layout.apt_sources_dir.join("docker.list"),
        &format!(
            "deb [arch={} signed-by={}] https://download.docker.com/linux/{} {} stable\n",
            arch,
            key.display(),
            os.id,
            codename
        ),
        0o664,
    )?;

    apt_update(kit)?;
    apt_install(kit, DOCKER_PACKAGES)
}

/// `curl <curl_args> | gpg --dearmor -o <dest>`; `--batch --yes` lets a
/// repeated run overwrite an existing keyring.
fn dearmor_key(kit: &Toolkit<'_>, curl_args: &[&str], dest: &str) -> Result<(), InstallerError> {
    kit.exec.pipe(
        ("curl", curl_args),
        ("gpg", &["--batch", "--yes", "--dearmor", "-o", dest]),
    )
}

fn apt_update(kit: &Toolkit<'_>) -> Result<(), InstallerError> {
    kit.report.update_status("Updating package lists...");
    kit.exec.run("apt-get", &["update", "-qq"]).map(drop)
}

fn apt_install(kit: &Toolkit<'_>, packages: &[&str]) -> Result<(), InstallerError> {
    let mut args = vec!["install", "-y"];
    args.extend_from_slice(packages);
    kit.exec.run("apt-get", &args).map(drop)
}

fn yum_install(kit: &Toolkit<'_>, packages: &[&str]) -> Result<(), InstallerError> {
    let mut args = vec!["install", "-y"];
    args.extend_from_slice(packages);
    kit.exec.run("yum", &args).map(drop)
}

/// Debian architecture name for a Rust target architecture.
fn deb_arch(arch: &str) -> Result<&'static str, InstallerError> {
    match arch {
        "x86_64" => Ok("amd64"),
        "aarch64" => Ok("arm64"),
        "arm" => Ok("armhf"),
        other => Err(InstallerError::UnsupportedArch(other.to_string())),
    }
}
