//! Upstream rule-list matching (component 4.G).

use super::{DomainFilter, UpstreamKind, UpstreamRule};
use crate::acl::HostSpec;
use std::net::IpAddr;

/// Walk `rules` in order looking for the first specific (non-default) rule
/// whose domain filter matches `target_host`. Falls through to the default
/// rule if nothing specific matched. Returns `None` for "go direct" —
/// either because a matching rule explicitly says so, or because nothing
/// matched and there is no default rule.
pub async fn select<'a>(
    rules: &'a [UpstreamRule],
    target_host: &str,
) -> Option<&'a UpstreamRule> {
    let mut default_rule = None;

    for rule in rules {
        let Some(filter) = &rule.domain_filter else {
            // first default rule wins; config validation already rejects a
            // second one, but we guard here too.
            if default_rule.is_none() {
                default_rule = Some(rule);
            }
            continue;
        };

        if domain_filter_matches(filter, target_host).await {
            return match rule.kind {
                UpstreamKind::None => None,
                _ => Some(rule),
            };
        }
    }

    default_rule.and_then(|rule| match rule.kind {
        UpstreamKind::None => None,
        _ => Some(rule),
    })
}

async fn domain_filter_matches(filter: &DomainFilter, target_host: &str) -> bool {
    match filter {
        DomainFilter::Exact(s) => s.eq_ignore_ascii_case(target_host),
        DomainFilter::Suffix(s) => {
            target_host.eq_ignore_ascii_case(s)
                || target_host
                    .to_ascii_lowercase()
                    .ends_with(&format!(".{}", s.to_ascii_lowercase()))
        }
        DomainFilter::Cidr(spec) => {
            // resolve target_host and test each candidate address
            if let Ok(addrs) = tokio::net::lookup_host((target_host, 0)).await {
                for addr in addrs {
                    if matches_cidr(spec, addr.ip()) {
                        return true;
                    }
                }
            }
            false
        }
    }
}

fn matches_cidr(spec: &HostSpec, ip: IpAddr) -> bool {
    spec.matches(ip, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(kind: UpstreamKind, filter: Option<DomainFilter>) -> UpstreamRule {
        UpstreamRule::new(kind, "proxy.test".into(), 8080, None, None, filter)
    }

    #[tokio::test]
    async fn exact_match_wins_over_default() {
        let rules = vec![
            rule(
                UpstreamKind::Socks5,
                Some(DomainFilter::Exact("example.test".into())),
            ),
            rule(UpstreamKind::Http, None),
        ];
        let selected = select(&rules, "example.test").await.unwrap();
        assert_eq!(selected.kind, UpstreamKind::Socks5);
    }

    #[tokio::test]
    async fn falls_through_to_default_when_nothing_specific_matches() {
        let rules = vec![
            rule(
                UpstreamKind::Socks5,
                Some(DomainFilter::Exact("other.test".into())),
            ),
            rule(UpstreamKind::Http, None),
        ];
        let selected = select(&rules, "example.test").await.unwrap();
        assert_eq!(selected.kind, UpstreamKind::Http);
    }

    #[tokio::test]
    async fn none_kind_means_direct() {
        let rules = vec![rule(
            UpstreamKind::None,
            Some(DomainFilter::Suffix("example.test".into())),
        )];
        assert!(select(&rules, "a.example.test").await.is_none());
    }

    #[tokio::test]
    async fn no_match_and_no_default_is_direct() {
        let rules = vec![rule(
            UpstreamKind::Http,
            Some(DomainFilter::Exact("other.test".into())),
        )];
        assert!(select(&rules, "example.test").await.is_none());
    }
}
