#![deny(missing_docs)]
//! Application façade for scribe.
//!
//! Owns the pieces that make the server a well-behaved citizen under
//! load: the [`LoadFactor`] synthesized from independent stats, the
//! [`TrafficSignal`] the external load balancer consumes, the
//! [`ShutdownManager`] that coordinates the drain, the Prometheus
//! [`Metrics`] set, and the monitor HTTP surface. [`Application`]
//! wires them to the store, auth, document, session, and API layers
//! and runs the background tasks, each tied to the shutdown signal.

mod app;
mod load;
mod metrics;
mod monitor;
mod shutdown;
mod signal;

pub use app::{AppConfig, Application, Mode};
pub use load::{HEAVY_LOAD_VALUE, LoadFactor, LoadStats, LoadThresholds};
pub use metrics::Metrics;
pub use monitor::{MonitorState, VarSource, monitor_routes};
pub use shutdown::ShutdownManager;
pub use signal::{
    MAX_LF_FOR_DUTY, MIN_LF_FOR_DUTY, MIN_ON_MSEC, SignalError, TrafficSignal, off_msec,
};
