//! The idle-session sweep.

use crate::registry::SessionRegistry;
use otcore::{DurationMs, TimeMs};
use std::sync::Arc;
use tracing::{info, warn};

/// Ends sessions whose `last_active` is older than the idle bound.
/// The caller (the application's background task) decides the cadence
/// and ties it to the shutdown signal.
pub struct IdleSweep {
    registry: Arc<SessionRegistry>,
    idle_bound: DurationMs,
}

impl IdleSweep {
    /// A sweep over `registry` with the given idle bound.
    pub fn new(registry: Arc<SessionRegistry>, idle_bound: DurationMs) -> Self {
        Self {
            registry,
            idle_bound,
        }
    }

    /// End every session idle at `now`. Returns how many ended.
    pub async fn sweep_once(&self, now: TimeMs) -> usize {
        let mut ended = 0;
        for session in self.registry.all().await {
            let idle = now.since(session.last_active());
            if idle < self.idle_bound {
                continue;
            }
            info!(session = %session.session_id(), idle = %idle, "ending idle session");
            if let Err(err) = session.end().await {
                // The registry entry still goes; the farewell op is
                // best-effort.
                warn!(session = %session.session_id(), %err, "idle end failed");
            }
            self.registry.remove(session.session_id()).await;
            ended += 1;
        }
        ended
    }
}
