//! Insertion-ordered, case-insensitive header multimap (component 4.E).

/// Hard cap on the number of entries a single `HeaderMap` may hold. Further
/// `append` calls beyond the cap fail silently — a defence against resource
/// exhaustion from a client sending an unbounded number of header lines.
pub const MAX_HEADERS: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a header, preserving the caller's case for the key as emitted.
    /// No-op once the map already holds `MAX_HEADERS` entries.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if self.entries.len() >= MAX_HEADERS {
            return;
        }
        self.entries.push((key.into(), value.into()));
    }

    /// First value whose key matches `key` case-insensitively.
    pub fn find(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All values whose key matches `key` case-insensitively, insertion order.
    pub fn find_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Remove every entry whose key matches `key`. Idempotent: calling this
    /// twice in a row has the same effect as calling it once.
    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace the single value for `key`, removing any prior entries first.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.remove(&key);
        self.append(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_then_find_is_none() {
        let mut h = HeaderMap::new();
        h.append("Host", "example.test");
        h.remove("host");
        assert_eq!(h.find("Host"), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut h = HeaderMap::new();
        h.append("Connection", "keep-alive");
        h.remove("connection");
        h.remove("connection");
        assert!(h.is_empty());
    }

    #[test]
    fn find_is_case_insensitive_and_preserves_insertion_case() {
        let mut h = HeaderMap::new();
        h.append("Content-Type", "text/plain");
        assert_eq!(h.find("content-type"), Some("text/plain"));
        let (k, _) = h.iter().next().unwrap();
        assert_eq!(k, "Content-Type");
    }

    #[test]
    fn append_caps_at_max_headers() {
        let mut h = HeaderMap::new();
        for i in 0..(MAX_HEADERS + 10) {
            h.append(format!("X-{i}"), "v");
        }
        assert_eq!(h.len(), MAX_HEADERS);
    }

    #[test]
    fn remove_removes_all_matches() {
        let mut h = HeaderMap::new();
        h.append("X-Dup", "1");
        h.append("x-dup", "2");
        h.append("X-DUP", "3");
        h.remove("X-Dup");
        assert!(h.find("X-Dup").is_none());
    }

    #[test]
    fn iteration_is_insertion_order() {
        let mut h = HeaderMap::new();
        h.append("A", "1");
        h.append("B", "2");
        h.append("C", "3");
        let keys: Vec<_> = h.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
    }
}
