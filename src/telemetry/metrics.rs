//! Prometheus metrics

use std::net::SocketAddr;
use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMetric {
    /// Transports that completed the opening handshake
    ConnectionsOpened,
    /// Transports that reported a close
    ConnectionsClosed,
    /// Reconnections put on the backoff timer
    ReconnectsScheduled,
    /// Inbound frames delivered to listeners
    MessagesReceived,
    /// Outbound frames handed to the transport
    MessagesSent,
    /// Sends rejected or dropped
    SendFailures,
    /// Keepalive frames sent
    PingsSent,
    /// Listener callbacks that panicked
    ListenerPanics,
}

impl CounterMetric {
    pub fn name(&self) -> &'static str {
        match self {
            CounterMetric::ConnectionsOpened => "mindful_ws_connections_opened_total",
            CounterMetric::ConnectionsClosed => "mindful_ws_connections_closed_total",
            CounterMetric::ReconnectsScheduled => "mindful_ws_reconnects_scheduled_total",
            CounterMetric::MessagesReceived => "mindful_ws_messages_received_total",
            CounterMetric::MessagesSent => "mindful_ws_messages_sent_total",
            CounterMetric::SendFailures => "mindful_ws_send_failures_total",
            CounterMetric::PingsSent => "mindful_ws_pings_sent_total",
            CounterMetric::ListenerPanics => "mindful_ws_listener_panics_total",
        }
    }
}

const RECONNECT_DELAY_METRIC: &str = "mindful_ws_reconnect_delay_ms";

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    metrics::counter!(metric.name()).increment(1);
}

/// Record the delay chosen for a scheduled reconnection
pub fn record_reconnect_delay(delay: Duration) {
    metrics::histogram!(RECONNECT_DELAY_METRIC).record(delay.as_millis() as f64);
}

/// Serve the Prometheus scrape endpoint on the given port
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;

    tracing::info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}
