use std::{
    io,
    net::{IpAddr, Ipv4Addr, UdpSocket},
};

use chrono::{DateTime, Local};
use rand::RngCore;

use crate::{
    checkpoint::CheckpointStore, config::InstallMode, error::InstallerError, os::OsProfile,
};

/// Bytes of randomness behind a generated subdomain (hex-encoded, so the
/// label is twice as long).
const SUBDOMAIN_BYTES: usize = 6;

/// State record holding the subdomain whose DNS record this host owns.
const SUBDOMAIN_RECORD: &str = "subdomain";

/// Everything resolved before the first step runs.
///
/// Mode, OS profile and addresses are fixed at construction. The subdomain
/// is either taken over from an earlier run that registered it or replaced
/// when the DNS endpoint rejects it; nothing else changes it.
#[derive(Debug, Clone)]
pub struct InstallationContext {
    mode: InstallMode,
    os: OsProfile,
    public_address: Ipv4Addr,
    private_address: Ipv4Addr,
    subdomain: String,
    started_at: DateTime<Local>,
}

impl InstallationContext {
    pub fn new(
        mode: InstallMode,
        os: OsProfile,
        public_address: Ipv4Addr,
        private_address: Ipv4Addr,
        started_at: DateTime<Local>,
    ) -> Self {
        InstallationContext {
            mode,
            os,
            public_address,
            private_address,
            subdomain: random_subdomain(),
            started_at,
        }
    }

    pub fn mode(&self) -> InstallMode {
        self.mode
    }

    pub fn os(&self) -> &OsProfile {
        &self.os
    }

    pub fn public_address(&self) -> Ipv4Addr {
        self.public_address
    }

    pub fn private_address(&self) -> Ipv4Addr {
        self.private_address
    }

    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// True when the host sits behind NAT and needs the private listener.
    pub fn behind_nat(&self) -> bool {
        self.public_address != self.private_address
    }

    /// Fully qualified name under `domain`.
    pub fn fqdn(&self, domain: &str) -> String {
        format!("{}.{}", self.subdomain, domain)
    }

    /// Picks a fresh subdomain after the DNS endpoint refused the current one.
    pub fn regenerate_subdomain(&mut self) -> &str {
        self.subdomain = random_subdomain();
        &self.subdomain
    }

    /// Takes over the subdomain an earlier run registered. Returns whether
    /// one was on record; a malformed record is ignored.
    pub fn restore_subdomain(&mut self, store: &CheckpointStore) -> io::Result<bool> {
        match store.load(SUBDOMAIN_RECORD)? {
            Some(saved) if is_dns_label(&saved) => {
                self.subdomain = saved;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Records the current subdomain as registered to this host.
    pub fn save_subdomain(&self, store: &CheckpointStore) -> io::Result<()> {
        store.save(SUBDOMAIN_RECORD, &self.subdomain)
    }

    /// True when the current subdomain is the one on record.
    pub fn subdomain_registered(&self, store: &CheckpointStore) -> io::Result<bool> {
        Ok(store.load(SUBDOMAIN_RECORD)?.as_deref() == Some(self.subdomain.as_str()))
    }
}

fn is_dns_label(s: &str) -> bool {
    (1..=63).contains(&s.len())
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

pub fn random_subdomain() -> String {
    let mut bytes = [0u8; SUBDOMAIN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// First non-loopback IPv4 address of the host: the source address the
/// kernel would pick for outbound traffic. Connecting a UDP socket sends
/// nothing.
pub fn private_address() -> Result<Ipv4Addr, InstallerError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket
        .connect((Ipv4Addr::new(1, 1, 1, 1), 80))
        .map_err(|e| InstallerError::Network(format!("no route to the internet: {}", e)))?;

    match socket.local_addr()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Ok(ip),
        other => Err(InstallerError::Network(format!(
            "no private IPv4 address found (got {})",
            other
        ))),
    }
}
