//! URL/host filter predicate (spec.md calls this an external, pluggable
//! collaborator — "only interfaces defined"; SPEC_FULL.md §B still builds
//! it concretely, grounded in the original's `filter.c`, since a runnable
//! proxy needs a real implementation behind the interface).

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::RegexSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTarget {
    Url,
    Domain,
}

enum Matcher {
    Fixed(Vec<String>),
    Regex(RegexSet),
    Glob(GlobSet),
}

pub struct Filter {
    matcher: Matcher,
    target: FilterTarget,
    case_sensitive: bool,
    default_deny: bool,
}

pub enum FilterFlavor {
    FixedStrings,
    Regex,
    Glob,
}

impl Filter {
    /// Build a filter from a flat list of patterns (one per original line),
    /// per the `Filter*` config directives in spec.md §6.
    pub fn build(
        patterns: &[String],
        flavor: FilterFlavor,
        target: FilterTarget,
        case_sensitive: bool,
        default_deny: bool,
    ) -> Result<Self, crate::error::ProxyError> {
        let normalized: Vec<String> = if case_sensitive {
            patterns.to_vec()
        } else {
            patterns.iter().map(|p| p.to_ascii_lowercase()).collect()
        };

        let matcher = match flavor {
            FilterFlavor::FixedStrings => Matcher::Fixed(normalized),
            FilterFlavor::Regex => {
                let set = RegexSet::new(&normalized)
                    .map_err(|e| crate::error::ProxyError::Config(format!("bad filter regex: {e}")))?;
                Matcher::Regex(set)
            }
            FilterFlavor::Glob => {
                let mut builder = GlobSetBuilder::new();
                for p in &normalized {
                    let glob = Glob::new(p)
                        .map_err(|e| crate::error::ProxyError::Config(format!("bad filter glob: {e}")))?;
                    builder.add(glob);
                }
                let set = builder
                    .build()
                    .map_err(|e| crate::error::ProxyError::Config(format!("bad filter glob set: {e}")))?;
                Matcher::Glob(set)
            }
        };

        Ok(Self {
            matcher,
            target,
            case_sensitive,
            default_deny,
        })
    }

    pub fn target(&self) -> FilterTarget {
        self.target
    }

    /// `true` means "allowed through"; `false` means "blocked, return 403".
    pub fn allows(&self, subject: &str) -> bool {
        let subject = if self.case_sensitive {
            subject.to_string()
        } else {
            subject.to_ascii_lowercase()
        };

        let hit = match &self.matcher {
            Matcher::Fixed(list) => list.iter().any(|p| subject.contains(p.as_str())),
            Matcher::Regex(set) => set.is_match(&subject),
            Matcher::Glob(set) => set.is_match(&subject),
        };

        // default_deny: patterns are an allow-list, anything not matching
        // is rejected. Otherwise patterns are a deny-list.
        if self.default_deny {
            hit
        } else {
            !hit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_list_blocks_matching_domain() {
        let f = Filter::build(
            &["ads.example.test".to_string()],
            FilterFlavor::FixedStrings,
            FilterTarget::Domain,
            false,
            false,
        )
        .unwrap();
        assert!(!f.allows("ads.example.test"));
        assert!(f.allows("example.test"));
    }

    #[test]
    fn allow_list_only_passes_matching_domain() {
        let f = Filter::build(
            &["good.example.test".to_string()],
            FilterFlavor::FixedStrings,
            FilterTarget::Domain,
            false,
            true,
        )
        .unwrap();
        assert!(f.allows("good.example.test"));
        assert!(!f.allows("bad.example.test"));
    }

    #[test]
    fn glob_flavor_matches_wildcards() {
        let f = Filter::build(
            &["*.ads.test".to_string()],
            FilterFlavor::Glob,
            FilterTarget::Domain,
            false,
            false,
        )
        .unwrap();
        assert!(!f.allows("banner.ads.test"));
    }
}
