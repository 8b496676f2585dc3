//! The monitor surface: a separate HTTP server for health, info,
//! metrics, and admission state.

use crate::load::{HEAVY_LOAD_VALUE, LoadFactor};
use crate::metrics::Metrics;
use crate::signal::TrafficSignal;
use async_trait::async_trait;
use otcore::TimeMs;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use warp::Filter;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Reply;

/// Supplies the `/var` payload. The application implements this;
/// the monitor needs nothing else from it.
#[async_trait]
pub trait VarSource: Send + Sync {
    /// Assorted variable state: connection counts, mode, redacted
    /// root-token ids.
    async fn vars(&self) -> serde_json::Value;
}

/// What the monitor endpoints read.
pub struct MonitorState {
    /// Health-check outcome, maintained by the application.
    pub healthy: Arc<AtomicBool>,
    /// The load factor.
    pub load: Arc<LoadFactor>,
    /// The traffic signal.
    pub signal: Arc<Mutex<TrafficSignal>>,
    /// The metric set.
    pub metrics: Arc<Metrics>,
    /// The `/var` payload source.
    pub vars: Arc<dyn VarSource>,
    /// When the process booted.
    pub boot_time: TimeMs,
    /// The build descriptor (crate name and version).
    pub build: String,
}

/// The monitor routes: `/health`, `/info`, `/metrics`,
/// `/load-factor`, `/traffic-signal`, `/var`.
pub fn monitor_routes(state: Arc<MonitorState>) -> BoxedFilter<(warp::reply::Response,)> {
    let health = {
        let state = state.clone();
        warp::path!("health").and(warp::get()).map(move || {
            if state.healthy.load(Ordering::Relaxed) {
                warp::reply::with_status("ok\n", StatusCode::OK).into_response()
            } else {
                warp::reply::with_status("unhealthy\n", StatusCode::SERVICE_UNAVAILABLE)
                    .into_response()
            }
        })
    };
    let info = {
        let state = state.clone();
        warp::path!("info").and(warp::get()).map(move || {
            let now = TimeMs::now();
            warp::reply::json(&json!({
                "boot": state.boot_time,
                "build": state.build,
                "runtime": { "uptime_msec": now.since(state.boot_time) },
            }))
            .into_response()
        })
    };
    let metrics = {
        let state = state.clone();
        warp::path!("metrics")
            .and(warp::get())
            .map(move || state.metrics.encode().into_response())
    };
    let load_factor = {
        let state = state.clone();
        warp::path!("load-factor").and(warp::get()).map(move || {
            warp::reply::json(&json!({
                "heavy": HEAVY_LOAD_VALUE,
                "value": state.load.value(),
            }))
            .into_response()
        })
    };
    let traffic = {
        let state = state.clone();
        warp::path!("traffic-signal")
            .and(warp::get())
            .then(move || {
                let state = state.clone();
                async move {
                    let signal = state.signal.lock().await;
                    let status = if signal.allow() {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    warp::reply::with_status(format!("{}\n", signal.reason()), status)
                        .into_response()
                }
            })
    };
    let vars = {
        let state = state.clone();
        warp::path!("var").and(warp::get()).then(move || {
            let state = state.clone();
            async move { warp::reply::json(&state.vars.vars().await).into_response() }
        })
    };

    health
        .or(info)
        .unify()
        .map(|r: warp::reply::Response| r.into_response())
        .or(metrics)
        .unify()
        .map(|r: warp::reply::Response| r.into_response())
        .or(load_factor)
        .unify()
        .map(|r: warp::reply::Response| r.into_response())
        .or(traffic)
        .unify()
        .map(|r: warp::reply::Response| r.into_response())
        .or(vars)
        .unify()
        .map(|r: warp::reply::Response| r.into_response())
        .boxed()
}
