//! The Prometheus metrics surface.

use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

/// The process-scoped metric set, exported in Prometheus text format
/// on the monitor server.
pub struct Metrics {
    registry: Registry,
    /// Live websocket connections.
    pub ws_connections: IntGauge,
    /// Documents with live coordinators.
    pub active_documents: IntGauge,
    /// Live sessions.
    pub active_sessions: IntGauge,
    /// The current load factor.
    pub load_factor: IntGauge,
    /// How many load samples have been folded.
    pub load_updates: IntCounter,
}

impl Metrics {
    /// Build and register the metric set.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let ws_connections = IntGauge::with_opts(Opts::new(
            "scribe_ws_connections",
            "Live websocket connections",
        ))?;
        let active_documents = IntGauge::with_opts(Opts::new(
            "scribe_active_documents",
            "Documents with live coordinators",
        ))?;
        let active_sessions =
            IntGauge::with_opts(Opts::new("scribe_active_sessions", "Live sessions"))?;
        let load_factor =
            IntGauge::with_opts(Opts::new("scribe_load_factor", "Current load factor"))?;
        let load_updates = IntCounter::with_opts(Opts::new(
            "scribe_load_updates_total",
            "Load samples folded since boot",
        ))?;
        registry.register(Box::new(ws_connections.clone()))?;
        registry.register(Box::new(active_documents.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;
        registry.register(Box::new(load_factor.clone()))?;
        registry.register(Box::new(load_updates.clone()))?;
        Ok(Self {
            registry,
            ws_connections,
            active_documents,
            active_sessions,
            load_factor,
            load_updates,
        })
    }

    /// Render the exposition text.
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
