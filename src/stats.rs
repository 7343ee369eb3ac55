//! Connection counters and the in-band stathost page (component 4.M).

use crate::htmlerror::substitute;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    pub open: AtomicU64,
    pub close: AtomicU64,
    pub badconn: AtomicU64,
    pub denied: AtomicU64,
    pub refused: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_open(&self) {
        self.open.fetch_add(1, Ordering::Relaxed);
        crate::metrics::connections_opened();
    }
    pub fn inc_close(&self) {
        self.close.fetch_add(1, Ordering::Relaxed);
        crate::metrics::connections_closed();
    }
    pub fn inc_badconn(&self) {
        self.badconn.fetch_add(1, Ordering::Relaxed);
        crate::metrics::bad_connections();
    }
    pub fn inc_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
        crate::metrics::denied_connections();
    }
    pub fn inc_refused(&self) {
        self.refused.fetch_add(1, Ordering::Relaxed);
        crate::metrics::refused_connections();
    }

    /// `reqs` is every connection ever opened, i.e. the `open` counter.
    pub fn snapshot(&self) -> HashMap<String, String> {
        let open = self.open.load(Ordering::Relaxed);
        let mut vars = HashMap::new();
        vars.insert("reqs".to_string(), open.to_string());
        vars.insert("open".to_string(), open.to_string());
        vars.insert("close".to_string(), self.close.load(Ordering::Relaxed).to_string());
        vars.insert(
            "badconn".to_string(),
            self.badconn.load(Ordering::Relaxed).to_string(),
        );
        vars.insert(
            "denied".to_string(),
            self.denied.load(Ordering::Relaxed).to_string(),
        );
        vars.insert(
            "refused".to_string(),
            self.refused.load(Ordering::Relaxed).to_string(),
        );
        vars
    }

    /// Render the stats page: the configured template if one is set, else
    /// a hard-coded minimal page with the same variables.
    pub fn render_page(&self, template: Option<&str>) -> String {
        let vars = self.snapshot();
        match template {
            Some(tpl) => substitute(tpl, &vars),
            None => format!(
                "<html><head><title>tinyrelay stats</title></head><body>\n\
                 <h1>Stats</h1>\n\
                 <table>\n\
                 <tr><td>Open requests</td><td>{reqs}</td></tr>\n\
                 <tr><td>Currently open</td><td>{open_minus_close}</td></tr>\n\
                 <tr><td>Bad connections</td><td>{badconn}</td></tr>\n\
                 <tr><td>Denied connections</td><td>{denied}</td></tr>\n\
                 <tr><td>Refused connections</td><td>{refused}</td></tr>\n\
                 </table>\n\
                 </body></html>\n",
                reqs = vars["reqs"],
                open_minus_close = self.open.load(Ordering::Relaxed)
                    - self.close.load(Ordering::Relaxed),
                badconn = vars["badconn"],
                denied = vars["denied"],
                refused = vars["refused"],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let stats = Stats::new();
        stats.inc_open();
        stats.inc_open();
        stats.inc_close();
        stats.inc_denied();

        let snap = stats.snapshot();
        assert_eq!(snap["open"], "2");
        assert_eq!(snap["close"], "1");
        assert_eq!(snap["denied"], "1");
        assert_eq!(snap["badconn"], "0");
    }

    #[test]
    fn default_page_contains_current_counts() {
        let stats = Stats::new();
        stats.inc_open();
        let page = stats.render_page(None);
        assert!(page.contains("<h1>Stats</h1>"));
    }
}
