//! Application wiring: stores, auth, documents, sessions, API server,
//! monitor server, background tasks, and the drain.

use crate::load::{LoadFactor, LoadStats, LoadThresholds};
use crate::metrics::Metrics;
use crate::monitor::{MonitorState, VarSource, monitor_routes};
use crate::shutdown::ShutdownManager;
use crate::signal::TrafficSignal;
use async_trait::async_trait;
use otcore::{DurationMs, FileStore, TimeMs};
use scribe_api::{ConnectionTracker, Context, api_routes};
use scribe_auth::{BearerToken, RootAccess, SessionMinter, TokenAuthority, default_token_syntax};
use scribe_auth_static::StaticTokenAuthority;
use scribe_doc::Documents;
use scribe_session::{IdleSweep, SessionRegistry};
use scribe_store_fs::FsFileStore;
use scribe_store_memory::MemoryFileStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Dev mounts the token-override capability; prod does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Development: token overrides allowed.
    Dev,
    /// Production.
    Prod,
}

impl Mode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

/// Application configuration, threaded through construction instead
/// of living in process-wide singletons.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Where the API server listens.
    pub api_addr: SocketAddr,
    /// Where the monitor server listens.
    pub monitor_addr: SocketAddr,
    /// Durable storage directory.
    pub storage_dir: PathBuf,
    /// Dev or prod.
    pub mode: Mode,
    /// Root token secrets.
    pub root_tokens: Vec<String>,
    /// How long a session may idle before the sweep ends it.
    pub session_idle_bound: DurationMs,
    /// Cadence of the load/traffic polling task.
    pub load_poll_interval: DurationMs,
    /// Cadence of the idle sweep.
    pub sweep_interval: DurationMs,
    /// Cadence of the drain loop while connections linger.
    pub drain_interval: DurationMs,
}

impl AppConfig {
    /// A dev-mode configuration with stock cadences.
    pub fn dev(api_addr: SocketAddr, monitor_addr: SocketAddr, storage_dir: PathBuf) -> Self {
        Self {
            api_addr,
            monitor_addr,
            storage_dir,
            mode: Mode::Dev,
            root_tokens: Vec::new(),
            session_idle_bound: DurationMs::from_secs(30 * 60),
            load_poll_interval: DurationMs::from_secs(1),
            sweep_interval: DurationMs::from_secs(60),
            drain_interval: DurationMs::from_millis(250),
        }
    }
}

/// The assembled server.
pub struct Application {
    config: AppConfig,
    authority: Arc<StaticTokenAuthority>,
    documents: Arc<Documents>,
    registry: Arc<SessionRegistry>,
    context: Arc<Context>,
    tracker: Arc<ConnectionTracker>,
    load: Arc<LoadFactor>,
    signal: Arc<Mutex<TrafficSignal>>,
    shutdown: Arc<ShutdownManager>,
    metrics: Arc<Metrics>,
    healthy: Arc<AtomicBool>,
    boot_time: TimeMs,
}

impl Application {
    /// Wire everything up. Nothing starts listening until
    /// [`run`](Application::run).
    pub fn build(config: AppConfig) -> anyhow::Result<Arc<Self>> {
        let mut root_tokens = Vec::new();
        for secret in &config.root_tokens {
            root_tokens.push(BearerToken::parse(secret.clone(), default_token_syntax)?);
        }
        let authority = Arc::new(StaticTokenAuthority::new(root_tokens));

        let durable: Arc<dyn FileStore> = Arc::new(FsFileStore::new(&config.storage_dir));
        let ephemeral: Arc<dyn FileStore> = Arc::new(MemoryFileStore::new());
        let documents = Arc::new(Documents::new(durable, ephemeral));
        let registry = Arc::new(SessionRegistry::new());

        let api_url = format!("http://{}/api", config.api_addr);
        let minter = Arc::new(SessionMinter::new(api_url, authority.clone()));
        let token_control = match config.mode {
            Mode::Dev => Some(authority.clone() as Arc<dyn scribe_auth::TokenControl>),
            Mode::Prod => None,
        };
        let root = Arc::new(RootAccess::new(minter, token_control)?);
        let context = Arc::new(Context::new(
            authority.clone(),
            documents.clone(),
            registry.clone(),
            root,
        ));

        Ok(Arc::new(Self {
            config,
            authority,
            documents,
            registry,
            context,
            tracker: Arc::new(ConnectionTracker::new()),
            load: Arc::new(LoadFactor::new(LoadThresholds::default())),
            signal: Arc::new(Mutex::new(TrafficSignal::new())),
            shutdown: Arc::new(ShutdownManager::new()),
            metrics: Arc::new(Metrics::new()?),
            healthy: Arc::new(AtomicBool::new(true)),
            boot_time: TimeMs::now(),
        }))
    }

    /// The shutdown coordinator, for signal handlers.
    pub fn shutdown(&self) -> &Arc<ShutdownManager> {
        &self.shutdown
    }

    /// The capability context, for tests driving the API directly.
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Serve until shutdown completes the drain.
    pub async fn run(self: &Arc<Self>) -> anyhow::Result<()> {
        let monitor_state = Arc::new(MonitorState {
            healthy: self.healthy.clone(),
            load: self.load.clone(),
            signal: self.signal.clone(),
            metrics: self.metrics.clone(),
            vars: self.clone() as Arc<dyn VarSource>,
            boot_time: self.boot_time,
            build: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        });

        let (api_close_tx, api_close_rx) = tokio::sync::oneshot::channel::<()>();
        let (monitor_close_tx, monitor_close_rx) = tokio::sync::oneshot::channel::<()>();
        let (_api_addr, api_server) =
            warp::serve(api_routes(self.context.clone(), self.tracker.clone()))
                .try_bind_with_graceful_shutdown(self.config.api_addr, async move {
                    let _ = api_close_rx.await;
                })?;
        let (_monitor_addr, monitor_server) = warp::serve(monitor_routes(monitor_state))
            .try_bind_with_graceful_shutdown(self.config.monitor_addr, async move {
                let _ = monitor_close_rx.await;
            })?;
        info!(api = %self.config.api_addr, monitor = %self.config.monitor_addr,
              mode = self.config.mode.as_str(), "scribe server up");
        let api_task = tokio::spawn(api_server);
        let monitor_task = tokio::spawn(monitor_server);

        self.spawn_load_task();
        self.spawn_sweep_task();
        self.spawn_token_refresh_task();

        self.shutdown.when_shutting_down().await;
        self.drain().await;

        let _ = api_close_tx.send(());
        let _ = monitor_close_tx.send(());
        let _ = api_task.await;
        let _ = monitor_task.await;
        self.shutdown.drain().await;
        info!("scribe server down");
        Ok(())
    }

    /// The drain: hard-off signal, refuse new connections, ask the
    /// existing ones to close, and sweep until none remain.
    async fn drain(&self) {
        info!("shutdown initiated; draining connections");
        {
            let mut signal = self.signal.lock().await;
            signal.set_shutting_down();
            if let Err(err) = signal.should_allow_traffic_at(TimeMs::now().as_millis()) {
                warn!(%err, "signal evaluation failed during drain");
            }
        }
        self.tracker.stop_accepting();
        loop {
            self.tracker.close_all();
            if self.tracker.ws_connection_count() == 0 {
                break;
            }
            tokio::time::sleep(self.config.drain_interval.to_std()).await;
        }
        info!("all connections drained");
    }

    /// Periodically fold fresh stats into the load factor and step
    /// the traffic signal.
    fn spawn_load_task(self: &Arc<Self>) {
        let app = self.clone();
        tokio::spawn(async move {
            loop {
                let rough_size = match app.documents.rough_size().await {
                    Ok(size) => {
                        app.healthy.store(true, Ordering::Relaxed);
                        size
                    }
                    Err(err) => {
                        warn!(%err, "store size probe failed");
                        app.healthy.store(false, Ordering::Relaxed);
                        0
                    }
                };
                let stats = LoadStats {
                    ws_connections: app.tracker.ws_connection_count() as u64,
                    documents: app.documents.active_count().await as u64,
                    sessions: app.registry.count().await as u64,
                    rough_size,
                };
                let value = app.load.update(stats);
                app.metrics.ws_connections.set(stats.ws_connections as i64);
                app.metrics.active_documents.set(stats.documents as i64);
                app.metrics.active_sessions.set(stats.sessions as i64);
                app.metrics.load_factor.set(value as i64);
                app.metrics.load_updates.inc();
                {
                    let mut signal = app.signal.lock().await;
                    signal.set_healthy(app.healthy.load(Ordering::Relaxed));
                    signal.set_load_factor(value);
                    if let Err(err) = signal.should_allow_traffic_at(TimeMs::now().as_millis()) {
                        warn!(%err, "signal evaluation failed");
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(app.config.load_poll_interval.to_std()) => {}
                    _ = app.shutdown.when_shutting_down() => break,
                }
            }
        });
    }

    /// Periodically end idle sessions.
    fn spawn_sweep_task(self: &Arc<Self>) {
        let app = self.clone();
        tokio::spawn(async move {
            let sweep = IdleSweep::new(app.registry.clone(), app.config.session_idle_bound);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(app.config.sweep_interval.to_std()) => {}
                    _ = app.shutdown.when_shutting_down() => break,
                }
                let ended = sweep.sweep_once(TimeMs::now()).await;
                if ended > 0 {
                    info!(ended, "idle sessions swept");
                }
            }
        });
    }

    /// Poll the authority for root-token changes.
    fn spawn_token_refresh_task(self: &Arc<Self>) {
        let app = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = app.authority.when_root_tokens_change(None) => {
                        let ids: Vec<String> = app
                            .authority
                            .root_tokens()
                            .await
                            .iter()
                            .map(|t| t.id().to_string())
                            .collect();
                        info!(?ids, "root token set refreshed");
                    }
                    _ = app.shutdown.when_shutting_down() => break,
                }
            }
        });
    }
}

#[async_trait]
impl VarSource for Application {
    async fn vars(&self) -> serde_json::Value {
        let root_token_ids: Vec<String> = self
            .authority
            .root_tokens()
            .await
            .iter()
            .map(|token| token.id().to_string())
            .collect();
        serde_json::json!({
            "mode": self.config.mode.as_str(),
            "ws_connections": self.tracker.ws_connection_count(),
            "active_documents": self.documents.active_count().await,
            "active_sessions": self.registry.count().await,
            "targets": self.context.target_count().await,
            "load_factor": self.load.value(),
            "shutting_down": self.shutdown.is_shutting_down(),
            "root_token_ids": root_token_ids,
        })
    }
}
