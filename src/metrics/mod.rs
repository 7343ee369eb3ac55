pub mod registry;

pub use registry::Metrics;

/// Thin wrappers around the `metrics` crate macros so `stats::Stats` (which
/// has no business importing the macros directly) stays decoupled from the
/// exact metric names.
pub fn connections_opened() {
    metrics::counter!("tinyrelay_connections_total").increment(1);
    metrics::gauge!("tinyrelay_connections_active").increment(1.0);
}

pub fn connections_closed() {
    metrics::gauge!("tinyrelay_connections_active").decrement(1.0);
}

pub fn bad_connections() {
    metrics::counter!("tinyrelay_bad_connections_total").increment(1);
}

pub fn denied_connections() {
    metrics::counter!("tinyrelay_denied_connections_total").increment(1);
}

pub fn refused_connections() {
    metrics::counter!("tinyrelay_refused_connections_total").increment(1);
}

pub fn relay_bytes(direction: &'static str, bytes: u64) {
    metrics::counter!("tinyrelay_relay_bytes_total", "direction" => direction).increment(bytes);
}

pub fn upstream_handshake_duration(kind: &'static str, secs: f64) {
    metrics::histogram!("tinyrelay_upstream_handshake_duration_seconds", "kind" => kind)
        .record(secs);
}
