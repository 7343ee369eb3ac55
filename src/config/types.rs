//! Config value object (component of §3 DATA MODEL).
//!
//! Two layers, same split the teacher uses: `RawConfig` is what `serde`
//! deserializes straight off disk (plain strings/ints, one field per
//! directive); `Config` is the validated, parsed, immutable runtime value
//! — `HostSpec`/`UpstreamRule`/`Filter` etc. built once at load time so the
//! hot path never re-parses a string.

use crate::acl::{Acl, AclRule, Action, HostSpec};
use crate::basicauth::{AuthToken, BasicAuth};
use crate::error::ProxyError;
use crate::filter::{Filter, FilterFlavor, FilterTarget};
use crate::reverse::{normalize_path, ReverseConfig, ReverseRule};
use crate::upstream::{DomainFilter, UpstreamKind, UpstreamRule};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

fn default_port() -> u16 {
    8888
}
fn default_timeout() -> u32 {
    600
}
fn default_max_clients() -> u32 {
    100
}
fn default_true() -> bool {
    true
}
fn default_realm() -> String {
    "tinyrelay".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_admin_listen() -> Option<String> {
    Some("127.0.0.1:8889".to_string())
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUpstreamRule {
    pub kind: String, // "none" | "http" | "socks4" | "socks5"
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
    /// One of: absent (default rule), `"exact:<name>"`, `".suffix"`, or a
    /// CIDR/address string (parsed through `HostSpec::parse`).
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAclRule {
    pub action: String, // "allow" | "deny"
    pub host: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFilterConfig {
    pub patterns_file: Option<PathBuf>,
    #[serde(default)]
    pub target: String, // "url" | "domain"
    #[serde(default)]
    pub flavor: String, // "fixed" | "regex" | "glob"
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub default_deny: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReverseRule {
    pub path: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReverseConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub rules: Vec<RawReverseRule>,
    #[serde(default)]
    pub magic_cookie: bool,
    #[serde(default)]
    pub reverse_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBasicAuthEntry {
    pub user: String,
    pub pass: String,
}

/// What `serde` sees on disk. Field names track the directive table in
/// spec.md §6 (snake_case, TOML-friendly) rather than the original's
/// keyword-per-line grammar — config-file *lexing* is explicitly out of
/// THE CORE; this struct is the producer interface it targets.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub listen_addrs: Vec<String>,
    #[serde(default)]
    pub bind_addrs: Vec<String>,
    #[serde(default)]
    pub bind_same: bool,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub pid_file: Option<PathBuf>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    #[serde(default = "default_max_clients")]
    pub max_clients: u32,
    #[serde(default)]
    pub acl: Vec<RawAclRule>,
    #[serde(default)]
    pub anonymous_headers: Vec<String>,
    #[serde(default)]
    pub connect_ports: Vec<u16>,
    #[serde(default)]
    pub stat_host: Option<String>,
    #[serde(default)]
    pub stat_file: Option<PathBuf>,
    #[serde(default)]
    pub error_files: HashMap<u16, PathBuf>,
    #[serde(default)]
    pub default_error_file: Option<PathBuf>,
    #[serde(default)]
    pub via_proxy_name: Option<String>,
    #[serde(default)]
    pub disable_via_header: bool,
    #[serde(default)]
    pub add_x_tinyproxy: bool,
    #[serde(default)]
    pub basicauth: Vec<RawBasicAuthEntry>,
    #[serde(default = "default_realm")]
    pub basicauth_realm: String,
    #[serde(default)]
    pub add_headers: Vec<(String, String)>,
    #[serde(default)]
    pub filter: Option<RawFilterConfig>,
    #[serde(default)]
    pub reverse: Option<RawReverseConfig>,
    #[serde(default)]
    pub upstream_rules: Vec<RawUpstreamRule>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub syslog: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub daemonize: bool,
    /// `/healthz` + `/metrics` + `/stats` surface. `None` (an explicit empty
    /// string in the config file) disables it.
    #[serde(default = "default_admin_listen")]
    pub admin_listen: Option<String>,
    /// Accept origin-form requests with no absolute-form URI or `CONNECT`,
    /// deriving the target from the `Host:` header (spec.md 4.J step 9).
    /// Off by default, matching the original's `ReverseOnly`-adjacent
    /// transparent-proxy directive being opt-in.
    #[serde(default)]
    pub transparent: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            listen_addrs: Vec::new(),
            bind_addrs: Vec::new(),
            bind_same: false,
            user: None,
            group: None,
            pid_file: None,
            timeout_secs: default_timeout(),
            max_clients: default_max_clients(),
            acl: Vec::new(),
            anonymous_headers: Vec::new(),
            connect_ports: Vec::new(),
            stat_host: None,
            stat_file: None,
            error_files: HashMap::new(),
            default_error_file: None,
            via_proxy_name: None,
            disable_via_header: false,
            add_x_tinyproxy: false,
            basicauth: Vec::new(),
            basicauth_realm: default_realm(),
            add_headers: Vec::new(),
            filter: None,
            reverse: None,
            upstream_rules: Vec::new(),
            log_file: None,
            syslog: false,
            log_level: default_log_level(),
            daemonize: true,
            admin_listen: default_admin_listen(),
            transparent: false,
        }
    }
}

/// The validated, parsed, immutable config shared by every worker.
#[derive(Debug)]
pub struct Config {
    pub port: u16,
    pub listen_addrs: Vec<String>,
    pub bind_addrs: Vec<String>,
    pub bind_same: bool,
    pub user: Option<String>,
    pub group: Option<String>,
    pub pid_path: Option<PathBuf>,
    pub idle_timeout_secs: u32,
    pub max_clients: u32,
    pub acl: Acl,
    pub anonymous_headers: Option<HashSet<String>>,
    pub connect_ports: Vec<u16>,
    pub stat_host: Option<String>,
    pub stat_page: Option<String>,
    pub errorpages: HashMap<u16, String>,
    pub default_errorpage: Option<String>,
    pub via_proxy_name: String,
    pub disable_via_header: bool,
    pub add_x_tinyproxy: bool,
    pub basicauth: BasicAuth,
    pub add_headers: Vec<(String, String)>,
    pub filter: Option<Filter>,
    pub reverse: Option<ReverseConfig>,
    pub upstream_rules: Vec<UpstreamRule>,
    pub log_file: Option<PathBuf>,
    pub syslog: bool,
    pub log_level: String,
    pub daemonize: bool,
    pub admin_listen: Option<String>,
    pub transparent: bool,
}

impl Config {
    pub fn from_raw(mut raw: RawConfig) -> Result<Self, ProxyError> {
        if raw.timeout_secs == 0 {
            tracing::warn!("Timeout 0 is invalid, falling back to default of 600s");
            raw.timeout_secs = default_timeout();
        }
        if raw.port == 0 {
            return Err(ProxyError::Config("Port is required".into()));
        }

        let acl_rules = raw
            .acl
            .iter()
            .map(|r| {
                let action = match r.action.to_ascii_lowercase().as_str() {
                    "allow" => Action::Allow,
                    "deny" => Action::Deny,
                    other => {
                        return Err(ProxyError::Config(format!("unknown ACL action {other}")))
                    }
                };
                Ok(AclRule {
                    action,
                    host: HostSpec::parse(&r.host),
                })
            })
            .collect::<Result<Vec<_>, ProxyError>>()?;

        let anonymous_headers = if raw.anonymous_headers.is_empty() {
            None
        } else {
            Some(raw.anonymous_headers.into_iter().collect())
        };

        let basicauth_tokens = raw
            .basicauth
            .iter()
            .map(|e| {
                AuthToken::new(&e.user, &e.pass)
                    .ok_or_else(|| ProxyError::Config(format!("credentials for {} too long", e.user)))
            })
            .collect::<Result<Vec<_>, ProxyError>>()?;

        let filter = raw.filter.as_ref().map(build_filter).transpose()?;

        let reverse = raw.reverse.as_ref().map(|r| ReverseConfig {
            base_url: r.base_url.clone(),
            rules: r
                .rules
                .iter()
                .map(|rule| ReverseRule {
                    path: normalize_path(&rule.path),
                    target: rule.target.clone(),
                })
                .collect(),
            magic_cookie: r.magic_cookie,
            reverse_only: r.reverse_only,
        });

        let mut seen_default = false;
        let mut upstream_rules = Vec::with_capacity(raw.upstream_rules.len());
        for rule in &raw.upstream_rules {
            let kind = match rule.kind.to_ascii_lowercase().as_str() {
                "none" => UpstreamKind::None,
                "http" => UpstreamKind::Http,
                "socks4" => UpstreamKind::Socks4,
                "socks5" => UpstreamKind::Socks5,
                other => {
                    return Err(ProxyError::Config(format!("unknown upstream kind {other}")))
                }
            };
            let domain_filter = rule.domain.as_deref().map(parse_domain_filter).transpose()?;
            if domain_filter.is_none() {
                if seen_default {
                    return Err(ProxyError::Config(
                        "at most one default Upstream rule is allowed".into(),
                    ));
                }
                seen_default = true;
            }
            upstream_rules.push(UpstreamRule::new(
                kind,
                rule.host.clone(),
                rule.port,
                rule.user.clone(),
                rule.pass.clone(),
                domain_filter,
            ));
        }

        Ok(Config {
            port: raw.port,
            listen_addrs: raw.listen_addrs,
            bind_addrs: raw.bind_addrs,
            bind_same: raw.bind_same,
            user: raw.user,
            group: raw.group,
            pid_path: raw.pid_file,
            idle_timeout_secs: raw.timeout_secs,
            max_clients: raw.max_clients,
            acl: Acl::new(acl_rules),
            anonymous_headers,
            connect_ports: raw.connect_ports,
            stat_host: raw.stat_host,
            stat_page: raw
                .stat_file
                .map(std::fs::read_to_string)
                .transpose()
                .map_err(|e| ProxyError::Config(format!("StatFile: {e}")))?,
            errorpages: raw
                .error_files
                .into_iter()
                .map(|(code, path)| -> Result<(u16, String), ProxyError> {
                    let content = std::fs::read_to_string(&path)
                        .map_err(|e| ProxyError::Config(format!("ErrorFile {code}: {e}")))?;
                    Ok((code, content))
                })
                .collect::<Result<_, _>>()?,
            default_errorpage: raw
                .default_error_file
                .map(std::fs::read_to_string)
                .transpose()
                .map_err(|e| ProxyError::Config(format!("DefaultErrorFile: {e}")))?,
            via_proxy_name: raw.via_proxy_name.unwrap_or_else(|| {
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| "tinyrelay".to_string())
            }),
            disable_via_header: raw.disable_via_header,
            add_x_tinyproxy: raw.add_x_tinyproxy,
            basicauth: BasicAuth::new(basicauth_tokens, raw.basicauth_realm),
            add_headers: raw.add_headers,
            filter,
            reverse,
            upstream_rules,
            log_file: raw.log_file,
            syslog: raw.syslog,
            log_level: raw.log_level,
            daemonize: raw.daemonize,
            admin_listen: raw.admin_listen.filter(|s| !s.is_empty()),
            transparent: raw.transparent,
        })
    }
}

fn build_filter(raw: &RawFilterConfig) -> Result<Filter, ProxyError> {
    let Some(path) = &raw.patterns_file else {
        return Err(ProxyError::Config(
            "filter configured without patterns_file".into(),
        ));
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| ProxyError::Config(format!("filter patterns_file: {e}")))?;
    let patterns: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();

    let target = match raw.target.to_ascii_lowercase().as_str() {
        "url" => FilterTarget::Url,
        "domain" | "" => FilterTarget::Domain,
        other => return Err(ProxyError::Config(format!("unknown filter target {other}"))),
    };
    let flavor = match raw.flavor.to_ascii_lowercase().as_str() {
        "regex" => FilterFlavor::Regex,
        "glob" | "fnmatch" => FilterFlavor::Glob,
        "fixed" | "" => FilterFlavor::FixedStrings,
        other => return Err(ProxyError::Config(format!("unknown filter flavor {other}"))),
    };
    Filter::build(&patterns, flavor, target, raw.case_sensitive, raw.default_deny)
}

fn parse_domain_filter(spec: &str) -> Result<DomainFilter, ProxyError> {
    if let Some(name) = spec.strip_prefix("exact:") {
        return Ok(DomainFilter::Exact(name.to_string()));
    }
    if let Some(suffix) = spec.strip_prefix('.') {
        return Ok(DomainFilter::Suffix(suffix.to_string()));
    }
    let host_spec = HostSpec::parse(spec);
    if matches!(host_spec, HostSpec::None) {
        return Err(ProxyError::Config(format!(
            "unparseable upstream domain filter: {spec}"
        )));
    }
    Ok(DomainFilter::Cidr(host_spec))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_raw() -> RawConfig {
        RawConfig {
            port: 8888,
            ..RawConfig::default()
        }
    }

    #[test]
    fn minimal_config_parses() {
        let cfg = Config::from_raw(minimal_raw()).unwrap();
        assert_eq!(cfg.port, 8888);
        assert_eq!(cfg.idle_timeout_secs, 600);
    }

    #[test]
    fn zero_timeout_is_floored_with_warning() {
        let mut raw = minimal_raw();
        raw.timeout_secs = 0;
        let cfg = Config::from_raw(raw).unwrap();
        assert_eq!(cfg.idle_timeout_secs, 600);
    }

    #[test]
    fn second_default_upstream_rule_is_rejected() {
        let mut raw = minimal_raw();
        raw.upstream_rules = vec![
            RawUpstreamRule {
                kind: "http".into(),
                host: "proxy1.test".into(),
                port: 8080,
                user: None,
                pass: None,
                domain: None,
            },
            RawUpstreamRule {
                kind: "http".into(),
                host: "proxy2.test".into(),
                port: 8080,
                user: None,
                pass: None,
                domain: None,
            },
        ];
        assert!(Config::from_raw(raw).is_err());
    }

    #[test]
    fn acl_rules_parse_into_hostspecs() {
        let mut raw = minimal_raw();
        raw.acl.push(RawAclRule {
            action: "deny".into(),
            host: "10.0.0.0/8".into(),
        });
        let cfg = Config::from_raw(raw).unwrap();
        assert!(!cfg.acl.is_empty());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut raw = minimal_raw();
        raw.port = 0;
        assert!(Config::from_raw(raw).is_err());
    }

    #[test]
    fn admin_listen_defaults_to_loopback() {
        let cfg = Config::from_raw(minimal_raw()).unwrap();
        assert_eq!(cfg.admin_listen.as_deref(), Some("127.0.0.1:8889"));
    }

    #[test]
    fn empty_admin_listen_disables_admin_server() {
        let mut raw = minimal_raw();
        raw.admin_listen = Some(String::new());
        let cfg = Config::from_raw(raw).unwrap();
        assert!(cfg.admin_listen.is_none());
    }

    #[test]
    fn transparent_defaults_to_false() {
        let cfg = Config::from_raw(minimal_raw()).unwrap();
        assert!(!cfg.transparent);
    }

    #[test]
    fn transparent_can_be_enabled() {
        let mut raw = minimal_raw();
        raw.transparent = true;
        let cfg = Config::from_raw(raw).unwrap();
        assert!(cfg.transparent);
    }
}
