//! Reverse-proxy path rewriting (component 4.I) and the rule store that
//! backs it (SPEC_FULL.md supplement — spec.md treats the store as an
//! external collaborator and specifies only the pure rewrite function).

use crate::headers::HeaderMap;

pub const MAGIC_COOKIE_NAME: &str = "yummy_magical_cookie";

#[derive(Debug, Clone)]
pub struct ReverseRule {
    /// Always ends in `/`, normalized at config load.
    pub path: String,
    pub target: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReverseConfig {
    pub base_url: String,
    pub rules: Vec<ReverseRule>,
    pub magic_cookie: bool,
    pub reverse_only: bool,
}

pub enum RewriteOutcome {
    /// Rewritten URL to forward to the origin.
    Rewritten {
        url: String,
        /// Set when the match came via the magic-cookie fallback: the
        /// caller should re-stamp the cookie on the response with this path.
        cookie_path: Option<String>,
    },
    /// Canonical-redirect case: emit a 301 with this `Location`.
    Redirect { location: String },
    /// No rule matched.
    NoMatch,
}

/// Rewrite `url` against `rules`, per spec.md 4.I.
pub fn rewrite(url: &str, headers: &HeaderMap, cfg: &ReverseConfig) -> RewriteOutcome {
    if !url.starts_with('/') {
        return RewriteOutcome::NoMatch;
    }

    if let Some(outcome) = try_rules(url, &cfg.rules, None) {
        return outcome;
    }

    if cfg.magic_cookie {
        if let Some(cookie_url) = find_magic_cookie(headers) {
            if let Some(outcome) = try_rules(&cookie_url, &cfg.rules, Some(&cookie_url)) {
                return outcome;
            }
        }
    }

    RewriteOutcome::NoMatch
}

fn try_rules(url: &str, rules: &[ReverseRule], via_cookie: Option<&str>) -> Option<RewriteOutcome> {
    for rule in rules {
        let canonical = rule.path.trim_end_matches('/');
        if url == canonical {
            return Some(RewriteOutcome::Redirect {
                location: rule.path.clone(),
            });
        }
        if url.starts_with(rule.path.as_str()) {
            let rewritten = format!("{}{}", rule.target, &url[rule.path.len()..]);
            let cookie_path = via_cookie.map(|_| rule.path.clone());
            return Some(RewriteOutcome::Rewritten {
                url: rewritten,
                cookie_path,
            });
        }
    }
    None
}

fn find_magic_cookie(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.find("Cookie")?;
    for piece in cookie_header.split(';') {
        let piece = piece.trim();
        if let Some(value) = piece.strip_prefix(&format!("{MAGIC_COOKIE_NAME}=")) {
            return Some(value.to_string());
        }
    }
    None
}

/// Rewrite a response's `Location` header against the reverse rules, per
/// spec.md 4.J step 18. Unlike [`rewrite`] this checks the Location value
/// itself against each rule's upstream `target`, independent of whether the
/// request that produced the response went through a reverse rule at all.
pub fn rewrite_location(location: &str, cfg: &ReverseConfig) -> Option<String> {
    if cfg.base_url.is_empty() {
        return None;
    }
    for rule in &cfg.rules {
        if let Some(rest) = location.strip_prefix(rule.target.as_str()) {
            let path_no_leading_slash = rule.path.trim_start_matches('/');
            return Some(format!("{}{}{}", cfg.base_url, path_no_leading_slash, rest));
        }
    }
    None
}

/// Normalize a configured reverse path so it always ends in `/`.
pub fn normalize_path(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<ReverseRule> {
        vec![ReverseRule {
            path: "/app/".into(),
            target: "http://origin.internal".into(),
        }]
    }

    #[test]
    fn prefix_match_rewrites_remainder() {
        let cfg = ReverseConfig {
            rules: rules(),
            ..Default::default()
        };
        let headers = HeaderMap::new();
        match rewrite("/app/page", &headers, &cfg) {
            RewriteOutcome::Rewritten { url, cookie_path } => {
                assert_eq!(url, "http://origin.internal/page");
                assert!(cookie_path.is_none());
            }
            _ => panic!("expected rewrite"),
        }
    }

    #[test]
    fn bare_prefix_without_trailing_slash_redirects() {
        let cfg = ReverseConfig {
            rules: rules(),
            ..Default::default()
        };
        let headers = HeaderMap::new();
        match rewrite("/app", &headers, &cfg) {
            RewriteOutcome::Redirect { location } => assert_eq!(location, "/app/"),
            _ => panic!("expected redirect"),
        }
    }

    #[test]
    fn non_origin_form_url_never_matches() {
        let cfg = ReverseConfig {
            rules: rules(),
            ..Default::default()
        };
        let headers = HeaderMap::new();
        assert!(matches!(
            rewrite("http://evil.test/app/", &headers, &cfg),
            RewriteOutcome::NoMatch
        ));
    }

    #[test]
    fn location_matching_a_rule_target_is_rewritten() {
        let cfg = ReverseConfig {
            base_url: "http://proxy.example/".into(),
            rules: rules(),
            ..Default::default()
        };
        let rewritten = rewrite_location("http://origin.internal/page?x=1", &cfg);
        assert_eq!(rewritten.as_deref(), Some("http://proxy.example/app/page?x=1"));
    }

    #[test]
    fn location_with_no_matching_rule_is_untouched() {
        let cfg = ReverseConfig {
            base_url: "http://proxy.example/".into(),
            rules: rules(),
            ..Default::default()
        };
        assert!(rewrite_location("http://other.internal/page", &cfg).is_none());
    }

    #[test]
    fn location_rewrite_disabled_without_base_url() {
        let cfg = ReverseConfig {
            rules: rules(),
            ..Default::default()
        };
        assert!(rewrite_location("http://origin.internal/page", &cfg).is_none());
    }

    #[test]
    fn magic_cookie_fallback_sets_cookie_path() {
        let cfg = ReverseConfig {
            rules: rules(),
            magic_cookie: true,
            ..Default::default()
        };
        let mut headers = HeaderMap::new();
        headers.append("Cookie", "yummy_magical_cookie=/app/page");
        match rewrite("/unrelated", &headers, &cfg) {
            RewriteOutcome::Rewritten { url, cookie_path } => {
                assert_eq!(url, "http://origin.internal/page");
                assert_eq!(cookie_path.as_deref(), Some("/app/"));
            }
            _ => panic!("expected rewrite via cookie"),
        }
    }
}
