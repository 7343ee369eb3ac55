//! Upstream-proxy rule storage, selection (4.G), and handshake (4.H).

pub mod handshake;
pub mod selector;

use crate::acl::HostSpec;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    /// "do NOT proxy this host; go direct."
    None,
    Http,
    Socks4,
    Socks5,
}

#[derive(Debug, Clone)]
pub enum DomainFilter {
    Exact(String),
    /// Stored without the leading `.`.
    Suffix(String),
    Cidr(HostSpec),
}

#[derive(Debug, Clone)]
pub struct UpstreamRule {
    pub kind: UpstreamKind,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    /// Precomputed `base64("user:pass")` for `Http` upstreams.
    pub authstr: Option<String>,
    /// `None` marks the default (catch-all) rule.
    pub domain_filter: Option<DomainFilter>,
}

impl UpstreamRule {
    pub fn new(
        kind: UpstreamKind,
        host: String,
        port: u16,
        user: Option<String>,
        pass: Option<String>,
        domain_filter: Option<DomainFilter>,
    ) -> Self {
        let authstr = match (kind, &user, &pass) {
            (UpstreamKind::Http, Some(u), Some(p)) => Some(BASE64.encode(format!("{u}:{p}"))),
            _ => None,
        };
        Self {
            kind,
            host,
            port,
            user,
            pass,
            authstr,
            domain_filter,
        }
    }

    pub fn is_default(&self) -> bool {
        self.domain_filter.is_none()
    }
}
