use std::{collections::HashMap, fs, path::Path};

use crate::{cmd::Exec, error::InstallerError};

// ── Data types ────────────────────────────────────────────────────────────────

/// Package-manager ecosystems the steps know how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    UbuntuLike,
    DebianLike,
    RhelLike,
    Unknown,
}

impl OsFamily {
    pub fn from_id(id: &str) -> Self {
        match id {
            "ubuntu" => OsFamily::UbuntuLike,
            "debian" => OsFamily::DebianLike,
            "centos" | "rhel" | "rocky" | "alma" | "almalinux" => OsFamily::RhelLike,
            _ => OsFamily::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsProfile {
    pub family: OsFamily,
    /// Raw `ID` from os-release, `"unknown"` when unreadable.
    pub id: String,
    pub codename: Option<String>,
}

impl OsProfile {
    /// The family, or `UnsupportedOs` when the host is not one we handle.
    pub fn require_family(&self) -> Result<OsFamily, InstallerError> {
        match self.family {
            OsFamily::Unknown => Err(InstallerError::UnsupportedOs(self.id.clone())),
            family => Ok(family),
        }
    }

    pub fn codename(&self) -> Result<&str, InstallerError> {
        self.codename.as_deref().ok_or(InstallerError::MissingCodename)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Reads `os_release` and, when it carries no codename, asks `lsb_release`.
/// Never fails: an unreadable file yields an `Unknown` profile and the first
/// step that needs a concrete family reports it.
pub fn resolve(os_release: &Path, exec: &dyn Exec) -> OsProfile {
    let content = fs::read_to_string(os_release).unwrap_or_default();
    let mut profile = parse_os_release(&content);

    if profile.codename.is_none() && profile.family != OsFamily::Unknown {
        profile.codename = exec
            .run("lsb_release", &["-cs"])
            .ok()
            .map(|out| out.trim().to_string())
            .filter(|c| !c.is_empty());
    }

    profile
}

pub fn parse_os_release(content: &str) -> OsProfile {
    let fields = parse_fields(content);
    let id = fields
        .get("ID")
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());

    OsProfile {
        family: OsFamily::from_id(&id),
        codename: fields.get("VERSION_CODENAME").filter(|v| !v.is_empty()).cloned(),
        id,
    }
}

// ── os-release parser ─────────────────────────────────────────────────────────
//
// Each line looks like:   KEY=value   or   KEY="quoted value"

fn parse_fields(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}
