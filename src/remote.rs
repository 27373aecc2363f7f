use std::{net::Ipv4Addr, time::Duration};

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::{config::Endpoints, error::InstallerError};

const USER_AGENT: &str = concat!("dployr-installer/", env!("CARGO_PKG_VERSION"));

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct Release {
    pub tag_name: String,
}

#[derive(Debug, Serialize)]
struct DnsRequest<'a> {
    subdomain: &'a str,
    host: String,
}

#[derive(Debug, Default, Deserialize)]
struct DnsErrors {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DnsResponse {
    success: bool,
    #[serde(default)]
    errors: DnsErrors,
}

/// HTTP services the installer depends on.
pub trait Remote {
    fn public_ip(&self) -> Result<Ipv4Addr, InstallerError>;
    fn latest_release(&self) -> Result<Release, InstallerError>;
    /// Points `<subdomain>.<domain>` at `host`. A rejection by the endpoint
    /// is `InstallerError::Dns` carrying its message.
    fn register_dns(&self, subdomain: &str, host: Ipv4Addr) -> Result<(), InstallerError>;
}

// ── HTTP implementation ───────────────────────────────────────────────────────

pub struct HttpRemote {
    client: Client,
    endpoints: Endpoints,
}

impl HttpRemote {
    pub fn new(endpoints: Endpoints) -> Result<Self, InstallerError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(HttpRemote { client, endpoints })
    }
}

impl Remote for HttpRemote {
    fn public_ip(&self) -> Result<Ipv4Addr, InstallerError> {
        let body = self
            .client
            .get(&self.endpoints.public_ip)
            .send()?
            .error_for_status()?
            .text()?;
        parse_address(&body)
    }

    fn latest_release(&self) -> Result<Release, InstallerError> {
        Ok(self
            .client
            .get(&self.endpoints.latest_release)
            .header("Accept", "application/vnd.github+json")
            .send()?
            .error_for_status()?
            .json()?)
    }

    fn register_dns(&self, subdomain: &str, host: Ipv4Addr) -> Result<(), InstallerError> {
        let body = self
            .client
            .post(&self.endpoints.dns_create)
            .json(&DnsRequest {
                subdomain,
                host: host.to_string(),
            })
            .send()?
            .text()?;
        check_dns_response(&body)
    }
}

// ── Response handling ─────────────────────────────────────────────────────────

fn parse_address(body: &str) -> Result<Ipv4Addr, InstallerError> {
    let trimmed = body.trim();
    trimmed
        .parse()
        .map_err(|_| InstallerError::Network(format!("unexpected public IP response: {:?}", trimmed)))
}

/// The DNS endpoint answers `{success, errors: {message}}` even on failure
/// statuses, so the body decides. Only `success: false` is a rejection of the
/// name; a body that is not that shape (a proxy error page) is a transport
/// failure.
fn check_dns_response(body: &str) -> Result<(), InstallerError> {
    let resp: DnsResponse = serde_json::from_str(body)
        .map_err(|e| InstallerError::Network(format!("unexpected DNS response: {}", e)))?;
    if resp.success {
        Ok(())
    } else {
        Err(InstallerError::Dns(resp.errors.message))
    }
}

/// Archive URL for a release tag.
pub fn download_url(cdn: &str, tag: &str) -> String {
    format!("{}/{}/dployr-{}.zip", cdn.trim_end_matches('/'), tag, tag)
}
