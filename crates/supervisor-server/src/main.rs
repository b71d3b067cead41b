//! `supervisor-server` — CLI/bootstrap binary.
//!
//! Wires `supervisor-service`'s Supervisor Core to `supervisor-api`'s router
//! and a `hyper` listener. A `clap::Parser` CLI, `tracing_subscriber::fmt()`
//! initialized once at the top of `main`, and a full `config`-crate
//! settings file/env stack layered under the CLI flags.

mod settings;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use supervisor_api::auth::AuthConfig;
use supervisor_api::rate_limit::RateLimitConfig;
use supervisor_api::{router, ApiState};
use supervisor_core::ConfigFormat;
use supervisor_service::{
    AutoConfigOrchestrator, AutoConfigSettings, DiscoveryProvider, RemoteConfigClient, RemoteConfigClientConfig,
    StaticDiscoveryProvider, Supervisor, SupervisorConfig,
};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "supervisor")]
#[command(about = "Host telemetry agent supervisor for the New Relic collector")]
#[command(version)]
struct Cli {
    /// Path to a TOML settings file layered over the built-in defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the initial user configuration (YAML or JSON) to apply at
    /// startup. Overrides the settings file's `initial_config_path`.
    #[arg(long)]
    init_config: Option<PathBuf>,

    /// Address to bind the control-plane API to. Overrides the settings
    /// file's `bind_addr`.
    #[arg(long)]
    bind: Option<String>,

    /// Emit structured JSON logs instead of human-readable text.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_ref())?;
    if let Some(bind) = cli.bind {
        settings.bind_addr = bind;
    }
    if cli.log_json {
        settings.log_json = true;
    }
    init_logging(settings.log_json);

    info!(bind_addr = %settings.bind_addr, "starting host telemetry supervisor");

    let supervisor_config = SupervisorConfig {
        collector_binary_path: settings.collector_binary_path.clone(),
        working_dir: settings.working_dir.clone(),
        max_config_versions: settings.max_config_versions,
        memory_limit_bytes: settings.memory_limit_bytes,
        health_check_interval: settings.health_check_interval(),
        restart_check_interval: settings.restart_check_interval(),
        event_log_capacity: settings.event_log_capacity,
    };
    let supervisor = Supervisor::new(supervisor_config);

    let init_config_path = cli.init_config.or_else(|| settings.initial_config_path.clone());
    let initial_config = match init_config_path {
        Some(path) => Some(read_initial_config(&path)?),
        None => None,
    };

    supervisor.start(initial_config).await?;

    if settings.autoconfig_enabled {
        spawn_autoconfig(&supervisor, &settings);
    }

    let auth = AuthConfig { jwt_secret: settings.auth_jwt_secret.clone(), static_api_key: settings.auth_static_api_key.clone() };
    let rate_limit = RateLimitConfig {
        burst: settings.rate_limit_burst,
        refill_per_interval: settings.rate_limit_refill_per_interval,
        interval: settings.rate_limit_interval(),
    };
    let state = ApiState::new(supervisor.clone(), auth, rate_limit);
    let app = router(state);

    let addr: SocketAddr = settings.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "control-plane API listening");

    let serve = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::select! {
        result = serve => {
            if let Err(e) = result {
                error!(error = %e, "control-plane API server exited with an error");
            }
        }
        _ = run_signal_handlers(supervisor.clone()) => {}
    }

    info!("shutdown sequence complete");
    Ok(())
}

/// `tracing-subscriber` installed exactly once, here at the binary
/// boundary; every library crate only ever calls the `tracing` macros.
fn init_logging(json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn read_initial_config(path: &PathBuf) -> anyhow::Result<(String, ConfigFormat)> {
    let raw = std::fs::read_to_string(path)?;
    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => ConfigFormat::Json,
        _ => ConfigFormat::Yaml,
    };
    Ok((raw, format))
}

/// 4.H "Signal handling for the supervisor's own process": `SIGTERM`/`SIGINT`
/// trigger orderly shutdown of child then self; `SIGHUP` forwards to the
/// child and records a reload event. Runs until a terminating signal arrives.
async fn run_signal_handlers(supervisor: Supervisor) {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };
    let mut int = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGINT handler");
            return;
        }
    };
    let mut hup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGHUP handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = term.recv() => {
                info!("received SIGTERM, shutting down collector then self");
                supervisor.stop().await;
                return;
            }
            _ = int.recv() => {
                info!("received SIGINT, shutting down collector then self");
                supervisor.stop().await;
                return;
            }
            _ = hup.recv() => {
                info!("received SIGHUP, forwarding to collector");
                supervisor.handle_reload_signal().await;
            }
        }
    }
}

/// Wires the Discovery Client (4.J) and, if a remote config base URL is
/// configured, the Remote Config Client (4.K) into the Auto-config
/// Orchestrator (4.L). The host-probing Discovery Client itself is an
/// external collaborator; until one is wired in via a plugin this starts
/// from an empty static list, which still exercises the orchestrator's
/// scan/diff/apply loop for hosts whose services are fully described by
/// the user configuration's own receivers.
fn spawn_autoconfig(supervisor: &Supervisor, settings: &Settings) {
    let discovery: Arc<dyn DiscoveryProvider> = Arc::new(StaticDiscoveryProvider::new(Vec::new()));

    let remote_client = match (&settings.remote_config_base_url, &settings.license_key) {
        (Some(base_url), Some(license_key)) => {
            Some(Arc::new(RemoteConfigClient::new(RemoteConfigClientConfig::new(base_url.clone(), license_key.clone()))))
        }
        (Some(_), None) => {
            warn!("remote_config_base_url set without a license_key; remote config fetch disabled");
            None
        }
        _ => None,
    };

    let autoconfig_settings = AutoConfigSettings {
        enabled: true,
        scan_interval: settings.autoconfig_scan_interval(),
        agent_version: env!("CARGO_PKG_VERSION").to_string(),
        min_confidence: settings.autoconfig_min_confidence(),
    };

    let orchestrator = Arc::new(AutoConfigOrchestrator::new(discovery, remote_client, supervisor.clone(), autoconfig_settings));
    orchestrator.spawn();
}
