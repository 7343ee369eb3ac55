use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const HANDSHAKE_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`,
/// `gauge!`, `histogram!`) can be used anywhere in the codebase. The
/// `PrometheusHandle` is retained solely for rendering the `/metrics`
/// endpoint on the admin server.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                HANDSHAKE_LATENCY_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        describe_counter!(
            "tinyrelay_connections_total",
            Unit::Count,
            "Total downstream connections accepted"
        );
        describe_gauge!(
            "tinyrelay_connections_active",
            Unit::Count,
            "Number of connections currently being relayed"
        );
        describe_counter!(
            "tinyrelay_bad_connections_total",
            Unit::Count,
            "Connections terminated due to malformed requests"
        );
        describe_counter!(
            "tinyrelay_denied_connections_total",
            Unit::Count,
            "Connections denied by ACL, filter, or auth"
        );
        describe_counter!(
            "tinyrelay_refused_connections_total",
            Unit::Count,
            "Connections refused because max_clients was reached"
        );
        describe_counter!(
            "tinyrelay_relay_bytes_total",
            Unit::Bytes,
            "Bytes relayed between client and server, by direction"
        );
        describe_histogram!(
            "tinyrelay_upstream_handshake_duration_seconds",
            Unit::Seconds,
            "Time spent performing the upstream handshake, by kind"
        );
        describe_counter!(
            "tinyrelay_config_reloads_total",
            Unit::Count,
            "Config reload events triggered by SIGHUP"
        );

        Self { handle }
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}
