//! Host specification parsing and matching (component 4.B).

use crate::net::full_inet_pton;
use std::net::{IpAddr, Ipv6Addr};

/// A parsed ACL/upstream-filter address specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSpec {
    Cidr { network: Ipv6Addr, mask: Ipv6Addr },
    /// `suffix` as written (may or may not start with `.`).
    Hostname { suffix: String },
    /// Parse failure sentinel: always fails to match.
    None,
}

fn mask_from_prefix(prefix: u32) -> Ipv6Addr {
    let prefix = prefix.min(128);
    let mut bytes = [0u8; 16];
    for (i, byte) in bytes.iter_mut().enumerate() {
        let bit_start = i as u32 * 8;
        *byte = if bit_start + 8 <= prefix {
            0xff
        } else if bit_start >= prefix {
            0x00
        } else {
            let bits = prefix - bit_start;
            (0xffu8) << (8 - bits)
        };
    }
    Ipv6Addr::from(bytes)
}

fn apply_mask(addr: Ipv6Addr, mask: Ipv6Addr) -> Ipv6Addr {
    let a = addr.octets();
    let m = mask.octets();
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = a[i] & m[i];
    }
    Ipv6Addr::from(out)
}

impl HostSpec {
    /// Parse a config-string address specification, per spec.md 4.B.
    pub fn parse(spec: &str) -> HostSpec {
        if let Some((addr_str, mask_str)) = spec.split_once('/') {
            let Some(addr_v4_or_v6) = full_inet_pton(addr_str) else {
                return HostSpec::None;
            };
            let is_v4 = addr_str.parse::<std::net::Ipv4Addr>().is_ok();

            // dotted v4 mask, only meaningful alongside a v4 address
            if is_v4 && mask_str.contains('.') {
                let Ok(dotted) = mask_str.parse::<std::net::Ipv4Addr>() else {
                    return HostSpec::None;
                };
                let v4_mask_bits = u32::from(dotted).leading_ones();
                let mask = mask_from_prefix(96 + v4_mask_bits);
                return HostSpec::Cidr {
                    network: apply_mask(addr_v4_or_v6, mask),
                    mask,
                };
            }

            let Ok(mut prefix) = mask_str.parse::<u32>() else {
                return HostSpec::None;
            };
            if prefix > 128 {
                return HostSpec::None;
            }
            if is_v4 {
                if prefix > 32 {
                    return HostSpec::None;
                }
                prefix += 96;
            }
            let mask = mask_from_prefix(prefix);
            HostSpec::Cidr {
                network: apply_mask(addr_v4_or_v6, mask),
                mask,
            }
        } else if let Some(addr) = full_inet_pton(spec) {
            HostSpec::Cidr {
                network: addr,
                mask: mask_from_prefix(128),
            }
        } else if spec.contains(':') {
            // contains a colon but didn't parse as a v6 literal: bogus.
            HostSpec::None
        } else {
            HostSpec::Hostname {
                suffix: spec.to_string(),
            }
        }
    }

    /// Match against a peer whose numeric IP is known; `peer_name` is the
    /// reverse-resolved hostname, computed lazily by the caller (at most
    /// once per ACL evaluation) and passed in as `Some` once available.
    pub fn matches(&self, peer_ip: IpAddr, peer_name: Option<&str>) -> bool {
        match self {
            HostSpec::None => false,
            HostSpec::Cidr { network, mask } => {
                let widened = crate::net::widen(peer_ip);
                apply_mask(widened, *mask) == *network
            }
            HostSpec::Hostname { suffix } => {
                if let Some(bare) = suffix.strip_prefix('.') {
                    match peer_name {
                        Some(name) => {
                            name.eq_ignore_ascii_case(bare)
                                || name
                                    .to_ascii_lowercase()
                                    .ends_with(&format!(".{}", bare.to_ascii_lowercase()))
                        }
                        None => false,
                    }
                } else {
                    // non-dotted form: matched via forward-resolve by the
                    // caller (acl::check does the DNS lookup); here we only
                    // handle the already-resolved reverse-name path for
                    // symmetry with the dotted form.
                    match peer_name {
                        Some(name) => name.eq_ignore_ascii_case(suffix),
                        None => false,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn slash_32_v4_matches_only_exact_address() {
        let spec = HostSpec::parse("10.1.2.3/32");
        assert!(spec.matches(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)), None));
        assert!(!spec.matches(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 4)), None));
    }

    #[test]
    fn slash_128_v6_matches_only_exact_address() {
        let spec = HostSpec::parse("::1/128");
        assert!(spec.matches(IpAddr::V6(Ipv6Addr::LOCALHOST), None));
        assert!(!spec.matches(IpAddr::V6(Ipv6Addr::UNSPECIFIED), None));
    }

    #[test]
    fn cidr_depends_only_on_prefix_bits() {
        let spec = HostSpec::parse("10.0.0.0/8");
        assert!(spec.matches(IpAddr::V4(Ipv4Addr::new(10, 255, 0, 1)), None));
        assert!(!spec.matches(IpAddr::V4(Ipv4Addr::new(11, 0, 0, 1)), None));
    }

    #[test]
    fn bare_address_is_host_mask() {
        let spec = HostSpec::parse("192.168.1.1");
        assert!(spec.matches(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), None));
        assert!(!spec.matches(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)), None));
    }

    #[test]
    fn dotted_mask_widens_correctly() {
        let spec = HostSpec::parse("192.168.0.0/255.255.0.0");
        assert!(spec.matches(IpAddr::V4(Ipv4Addr::new(192, 168, 5, 5)), None));
        assert!(!spec.matches(IpAddr::V4(Ipv4Addr::new(192, 169, 5, 5)), None));
    }

    #[test]
    fn garbage_with_colon_is_rejected() {
        assert_eq!(HostSpec::parse("not:an:address:either"), HostSpec::None);
    }

    #[test]
    fn plain_word_is_a_hostname_spec() {
        assert_eq!(
            HostSpec::parse("example.test"),
            HostSpec::Hostname {
                suffix: "example.test".into()
            }
        );
    }

    #[test]
    fn dotted_prefix_suffix_matches_subdomains() {
        let spec = HostSpec::parse(".example.test");
        assert!(spec.matches(IpAddr::V4(Ipv4Addr::UNSPECIFIED), Some("a.example.test")));
        assert!(spec.matches(IpAddr::V4(Ipv4Addr::UNSPECIFIED), Some("example.test")));
        assert!(!spec.matches(IpAddr::V4(Ipv4Addr::UNSPECIFIED), Some("evilexample.test")));
    }
}
