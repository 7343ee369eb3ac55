//! Access-control list evaluation (component 4.C), built on [`HostSpec`].

pub mod hostspec;

pub use hostspec::HostSpec;

use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Allow,
    Deny,
}

#[derive(Debug, Clone)]
pub struct AclRule {
    pub action: Action,
    pub host: HostSpec,
}

#[derive(Debug, Clone, Default)]
pub struct Acl {
    rules: Vec<AclRule>,
}

impl Acl {
    pub fn new(rules: Vec<AclRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate `peer_ip` against the rule list in order. The first rule
    /// whose host spec matches decides the outcome; an empty list, or a
    /// list where nothing matches, allows (spec.md 4.C says: "If all skip
    /// -> deny" for a non-empty list, "if list empty -> allow").
    pub async fn check(&self, peer_ip: IpAddr) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let mut reverse_name: Option<Option<String>> = None;

        for rule in &self.rules {
            let matched = match &rule.host {
                HostSpec::Hostname { suffix } if suffix.starts_with('.') => {
                    let name = match &reverse_name {
                        Some(cached) => cached.clone(),
                        None => {
                            let resolved = crate::net::reverse_lookup(peer_ip).await;
                            reverse_name = Some(resolved.clone());
                            resolved
                        }
                    };
                    rule.host.matches(peer_ip, name.as_deref())
                }
                HostSpec::Hostname { suffix } => {
                    // non-dotted: try a forward resolve of the configured
                    // name and compare against the peer's address.
                    let forward_matches = tokio::net::lookup_host((suffix.as_str(), 0))
                        .await
                        .map(|addrs| addrs.map(|a| a.ip()).any(|a| a == peer_ip))
                        .unwrap_or(false);
                    forward_matches || rule.host.matches(peer_ip, None)
                }
                HostSpec::Cidr { .. } | HostSpec::None => rule.host.matches(peer_ip, None),
            };

            if matched {
                return rule.action == Action::Allow;
            }
        }

        tracing::warn!(peer_ip = %peer_ip, "Unauthorized connection from \"{}\".", peer_ip);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn empty_acl_allows() {
        let acl = Acl::default();
        assert!(acl.check(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))).await);
    }

    #[tokio::test]
    async fn first_matching_rule_wins() {
        let acl = Acl::new(vec![
            AclRule {
                action: Action::Deny,
                host: HostSpec::parse("10.0.0.0/8"),
            },
            AclRule {
                action: Action::Allow,
                host: HostSpec::parse("0.0.0.0/0"),
            },
        ]);
        assert!(!acl.check(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))).await);
        assert!(acl.check(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))).await);
    }

    #[tokio::test]
    async fn no_match_denies_when_list_nonempty() {
        let acl = Acl::new(vec![AclRule {
            action: Action::Allow,
            host: HostSpec::parse("10.0.0.0/8"),
        }]);
        assert!(!acl.check(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))).await);
    }
}
