/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use osus_proxy::config::{BeatmapMirror, ConfigOverrides, Country, ProxyConfig, SharedPreferences};
use osus_proxy::proxy::{self, tls, Proxy};
use osus_proxy::updater::Updater;

// ── CLI argument definition ───────────────────────────────────────────────────

/// osus-proxy – HTTPS reverse proxy for osu! bancho servers.
///
/// Example:
///   osus-proxy --server akatsuki.gg --mirror nerinyan --fake-country JP
///
/// then start osu! with `-devserver osus.zihad.dev`.
#[derive(Debug, Parser)]
#[command(
    name = "osus-proxy",
    about = "HTTPS reverse proxy for osu! bancho servers",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Address the TLS listener binds to.
    #[arg(short = 'l', long = "listen")]
    listen: Option<SocketAddr>,

    /// PEM certificate chain for the listener.
    #[arg(long = "cert")]
    cert: Option<PathBuf>,

    /// PEM private key for the listener.
    #[arg(long = "key")]
    key: Option<PathBuf>,

    /// Upstream server address, e.g. `ppy.sh`.
    #[arg(short = 's', long = "server")]
    server: Option<String>,

    /// Beatmap download mirror.
    #[arg(long = "mirror", value_enum)]
    mirror: Option<BeatmapMirror>,

    /// Do not add the supporter privilege to responses.
    #[arg(long = "no-fake-supporter", default_value_t = false)]
    no_fake_supporter: bool,

    /// Country (ISO alpha-2) shown for the logged-in user, client-side only.
    #[arg(long = "fake-country")]
    fake_country: Option<Country>,

    /// Debug log file.
    #[arg(long = "log-file", default_value = "./osus-proxy.log")]
    log_file: PathBuf,

    /// Do not contact the update server at startup.
    #[arg(long = "skip-update-check", default_value_t = false)]
    skip_update_check: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen: self.listen,
            cert_path: self.cert.clone(),
            key_path: self.key.clone(),
            server_address: self.server.clone(),
            beatmap_mirror: self.mirror,
            fake_country: self.fake_country,
            no_fake_supporter: self.no_fake_supporter,
        }
    }
}

// ── Logging ───────────────────────────────────────────────────────────────────

/// Non-blocking appender for `log_file`.  Lines are written on a background
/// thread that flushes when the returned guard is dropped.
fn log_file_writer(log_file: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = log_file
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", log_file.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .with_context(|| format!("Cannot open log file: {}", log_file.display()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Console output follows `RUST_LOG` (default `info`); the log file always
/// receives everything at `DEBUG` and above.
fn init_logging(log_file: &Path) -> Result<WorkerGuard> {
    let (writer, guard) = log_file_writer(log_file)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG),
        )
        .with(
            tracing_subscriber::fmt::layer().with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            ),
        )
        .init();
    Ok(guard)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let guard = match init_logging(&cli.log_file) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e:#}");
            process::exit(1);
        }
    };

    info!("osus-proxy {} starting up...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        // process::exit skips destructors; flush the log file first.
        drop(guard);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let overrides = cli.overrides();

    // ── Load configuration ────────────────────────────────────────────────────
    if cli.config.is_none() {
        warn!("No configuration file provided, using defaults and command-line values");
    }
    let config = ProxyConfig::resolve(cli.config.as_deref(), &overrides)?;

    info!(
        listen         = %config.listen,
        source_domain  = %config.source_domain,
        server_address = %config.preferences.server_address,
        fake_supporter = config.preferences.fake_supporter,
        beatmap_mirror = %config.preferences.beatmap_mirror,
        fake_country   = ?config.preferences.fake_country.map(|c| c.alpha2()),
        "Configuration"
    );

    // ── Update check (never fatal) ────────────────────────────────────────────
    if !cli.skip_update_check {
        tokio::spawn(check_for_updates());
    }

    // ── Listener ──────────────────────────────────────────────────────────────
    let acceptor = tls::build_acceptor(&config.cert_path, &config.key_path)?;
    let listener = proxy::bind(&config).await?;

    let preferences: SharedPreferences = Arc::new(RwLock::new(config.preferences.clone()));
    let handler = Arc::new(Proxy::new(&config, preferences.clone())?);

    if let Some(path) = cli.config.clone() {
        spawn_reload_handler(path, overrides, preferences);
    }

    proxy::serve(handler, listener, acceptor, shutdown_signal()).await;
    info!("osus-proxy stopped");
    Ok(())
}

async fn check_for_updates() {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            warn!("Cannot locate own executable for update check: {}", e);
            return;
        }
    };
    match Updater::default().check_for_updates(&exe).await {
        Ok(true) => warn!("A newer osus-proxy build is available"),
        Ok(false) => info!("osus-proxy is up to date"),
        Err(e) => warn!("Update check failed: {:#}", e),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler the proxy just runs until killed.
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Re-read preferences from `path` on SIGHUP.  Listener settings (address,
/// certificate) only take effect after a restart.
#[cfg(unix)]
fn spawn_reload_handler(path: PathBuf, overrides: ConfigOverrides, preferences: SharedPreferences) {
    use osus_proxy::config::reload_preferences;
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Cannot install SIGHUP handler: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            if let Err(e) = reload_preferences(&path, &overrides, &preferences).await {
                warn!("Reload failed, keeping previous preferences: {:#}", e);
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_handler(_path: PathBuf, _overrides: ConfigOverrides, _preferences: SharedPreferences) {}

// ── Tests ─────────────────────────────────────────────────────────────────────
