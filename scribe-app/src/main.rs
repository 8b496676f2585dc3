//! The scribe server daemon.

use clap::Parser;
use scribe_app::{AppConfig, Application, Mode};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "scribe-server", about = "Collaborative editing server")]
struct Opts {
    /// API listen address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
    /// Monitor listen address.
    #[arg(long, default_value = "127.0.0.1:8888")]
    monitor: SocketAddr,
    /// Durable storage directory.
    #[arg(long, default_value = "scribe-data")]
    storage: PathBuf,
    /// Run in dev mode (mounts the token-override capability).
    #[arg(long)]
    dev: bool,
    /// Root token secret. Repeatable.
    #[arg(long = "root-token")]
    root_tokens: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opts = Opts::parse();

    let mut config = AppConfig::dev(opts.listen, opts.monitor, opts.storage);
    config.mode = if opts.dev { Mode::Dev } else { Mode::Prod };
    config.root_tokens = opts.root_tokens;

    let app = Application::build(config)?;
    {
        let shutdown = app.shutdown().clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; shutting down");
                shutdown.begin();
            }
        });
    }
    app.run().await
}
