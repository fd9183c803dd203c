// # companiond - DNS Companion Daemon
//
// Keeps Netcup DNS `A` records for a set of hostnames pointed at this host.
//
// The daemon is a thin integration layer:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the Netcup client, state store, address resolver and hosts
// 4. Running the reconciliation engine until SIGTERM/SIGINT
//
// ## Configuration
//
// ### Netcup API
// - `NC_CUSTOMER_NUMBER`, `NC_API_KEY`, `NC_API_PASSWORD`: credentials (required)
// - `NC_API_ENDPOINT`: API endpoint (defaults to the production endpoint)
//
// ### Resilience
// - `NC_MAX_RETRIES`, `NC_INITIAL_BACKOFF_MS`, `NC_MAX_BACKOFF_MS`,
//   `NC_BACKOFF_MULTIPLIER`
// - `NC_CIRCUIT_BREAKER_THRESHOLD`, `NC_CIRCUIT_BREAKER_TIMEOUT_SEC`,
//   `NC_CIRCUIT_BREAKER_HALF_OPEN_REQS`
//
// Unparsable numeric values fall back to their defaults.
//
// ### Addresses and hosts
// - `HOST_IP`: fixed target address, skips discovery
// - `IP_LOOKUP_URL`: comma-separated "what is my IP" services
// - `COMPANION_HOSTS`: hostnames to manage, `host` or `host=address`
//
// ### Behaviour
// - `DRY_RUN`: log decisions without writing records
// - `STATE_PERSISTENCE_ENABLED`, `STATE_FILE_PATH`
// - `RECONCILIATION_ENABLED`: reconcile persisted records at startup
// - `COMPANION_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export NC_CUSTOMER_NUMBER=12345
// export NC_API_KEY=...
// export NC_API_PASSWORD=...
// export COMPANION_HOSTS=app.example.com,api.example.com
// export STATE_FILE_PATH=/var/lib/companion/dns-state.json
//
// companiond
// ```

use anyhow::{Context, Result};
use companion_core::config::CompanionConfig;
use companion_core::traits::{
    AddressResolver, LogNotifier, OutboundAddressResolver, StateStore, StaticFactSource,
};
use companion_core::{EngineEvent, FileStateStore, MemoryStateStore, ReconcileEngine};
use companion_provider_netcup::{NetcupClient, NetcupCredentials};
use std::env;
use std::net::IpAddr;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long the engine may take to stop after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum CompanionExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<CompanionExitCode> for ExitCode {
    fn from(code: CompanionExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration assembled from the environment
struct Config {
    credentials: NetcupCredentials,
    endpoint: Option<String>,
    lookup_urls: Vec<String>,
    hosts: String,
    log_level: String,
    companion: CompanionConfig,
    /// Problems found while parsing, reported once logging is up
    warnings: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let mut warnings = Vec::new();
        let mut companion = CompanionConfig::default();

        let retry = &mut companion.retry;
        retry.max_retries = env_or("NC_MAX_RETRIES", retry.max_retries, &mut warnings);
        retry.initial_backoff_ms =
            env_or("NC_INITIAL_BACKOFF_MS", retry.initial_backoff_ms, &mut warnings);
        retry.max_backoff_ms = env_or("NC_MAX_BACKOFF_MS", retry.max_backoff_ms, &mut warnings);
        retry.backoff_multiplier =
            env_or("NC_BACKOFF_MULTIPLIER", retry.backoff_multiplier, &mut warnings);

        let breaker = &mut companion.circuit_breaker;
        breaker.failure_threshold = env_or(
            "NC_CIRCUIT_BREAKER_THRESHOLD",
            breaker.failure_threshold,
            &mut warnings,
        );
        breaker.open_timeout_secs = env_or(
            "NC_CIRCUIT_BREAKER_TIMEOUT_SEC",
            breaker.open_timeout_secs,
            &mut warnings,
        );
        breaker.half_open_max_requests = env_or(
            "NC_CIRCUIT_BREAKER_HALF_OPEN_REQS",
            breaker.half_open_max_requests,
            &mut warnings,
        );

        companion.engine.dry_run = env_flag("DRY_RUN", false, &mut warnings);
        companion.engine.host_ip = match non_empty_var("HOST_IP") {
            Some(raw) => Some(parse_host_ip(&raw)?),
            None => None,
        };

        companion.state.enabled = env_flag("STATE_PERSISTENCE_ENABLED", true, &mut warnings);
        if let Some(path) = non_empty_var("STATE_FILE_PATH") {
            companion.state.path = path;
        }
        companion.state.reconcile_on_startup =
            env_flag("RECONCILIATION_ENABLED", true, &mut warnings);

        let customer_number = non_empty_var("NC_CUSTOMER_NUMBER")
            .context("NC_CUSTOMER_NUMBER is required")?;
        let customer_number: u64 = customer_number
            .trim()
            .parse()
            .with_context(|| format!("NC_CUSTOMER_NUMBER must be numeric, got {}", customer_number))?;
        let api_key = non_empty_var("NC_API_KEY").context("NC_API_KEY is required")?;
        let api_password = non_empty_var("NC_API_PASSWORD").context("NC_API_PASSWORD is required")?;

        let lookup_urls = non_empty_var("IP_LOOKUP_URL")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            credentials: NetcupCredentials::new(customer_number, api_key, api_password),
            endpoint: non_empty_var("NC_API_ENDPOINT"),
            lookup_urls,
            hosts: env::var("COMPANION_HOSTS").unwrap_or_default(),
            log_level: env::var("COMPANION_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            companion,
            warnings,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.companion
            .validate()
            .context("invalid companion configuration")?;

        for url in &self.lookup_urls {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                anyhow::bail!("IP_LOOKUP_URL must use HTTP or HTTPS scheme. Got: {}", url);
            }
        }

        if let Some(endpoint) = &self.endpoint
            && !endpoint.starts_with("https://")
            && !endpoint.starts_with("http://")
        {
            anyhow::bail!("NC_API_ENDPOINT must use HTTP or HTTPS scheme. Got: {}", endpoint);
        }

        Ok(())
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

/// `HOST_IP` must be IPv4; only `A` records are managed
fn parse_host_ip(raw: &str) -> Result<IpAddr> {
    let ip = IpAddr::from_str(raw.trim())
        .with_context(|| format!("HOST_IP is not a valid address: {}", raw))?;
    if !ip.is_ipv4() {
        anyhow::bail!("HOST_IP must be an IPv4 address, got {}", ip);
    }
    Ok(ip)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `name`, keeping `default` when unset or unparsable
fn env_or<T: FromStr + Copy + std::fmt::Display>(
    name: &str,
    default: T,
    warnings: &mut Vec<String>,
) -> T {
    match non_empty_var(name) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warnings.push(format!("{}={} is not valid, using {}", name, raw, default));
                default
            }
        },
        None => default,
    }
}

fn env_flag(name: &str, default: bool, warnings: &mut Vec<String>) -> bool {
    match non_empty_var(name) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                warnings.push(format!("{}={} is not a boolean, using {}", name, raw, default));
                default
            }
        },
        None => default,
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return CompanionExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return CompanionExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CompanionExitCode::ConfigError.into();
    }

    for warning in &config.warnings {
        warn!("{}", warning);
    }

    info!("Starting companiond");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CompanionExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => CompanionExitCode::CleanShutdown,
            Err(DaemonError::Startup(e)) => {
                error!("Startup error: {:#}", e);
                CompanionExitCode::ConfigError
            }
            Err(DaemonError::Runtime(e)) => {
                error!("Daemon error: {:#}", e);
                CompanionExitCode::RuntimeError
            }
        }
    })
    .into()
}

enum DaemonError {
    Startup(anyhow::Error),
    Runtime(anyhow::Error),
}

/// Run the daemon
async fn run_daemon(config: Config) -> std::result::Result<(), DaemonError> {
    let (engine, events, source) = build(&config).await.map_err(DaemonError::Startup)?;
    let engine = Arc::new(engine);

    let event_logger = tokio::spawn(log_events(events));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut engine_task = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run(&source, shutdown_rx).await }
    });

    let finished_early = tokio::select! {
        received = wait_for_shutdown() => {
            let received = received.map_err(DaemonError::Runtime)?;
            info!("Received shutdown signal: {}", received);
            None
        }
        joined = &mut engine_task => Some(joined),
    };

    let joined = match finished_early {
        Some(joined) => joined,
        None => {
            // The receiver may already be gone if the engine stopped on its own.
            let _ = shutdown_tx.send(true);
            tokio::time::timeout(SHUTDOWN_GRACE, engine_task)
                .await
                .map_err(|_| {
                    DaemonError::Runtime(anyhow::anyhow!(
                        "engine did not stop within {:?}",
                        SHUTDOWN_GRACE
                    ))
                })?
        }
    };

    // Last sender goes with the engine; the logger drains and exits.
    drop(engine);
    let _ = event_logger.await;

    match joined {
        Ok(Ok(())) => {
            info!("Shutting down companiond");
            Ok(())
        }
        Ok(Err(e)) => Err(DaemonError::Runtime(e.into())),
        Err(e) => Err(DaemonError::Runtime(anyhow::anyhow!("engine task failed: {}", e))),
    }
}

/// Wire the engine and its collaborators from configuration
async fn build(
    config: &Config,
) -> Result<(ReconcileEngine, mpsc::Receiver<EngineEvent>, StaticFactSource)> {
    let mut client = NetcupClient::from_config(config.credentials.clone(), &config.companion)
        .context("failed to create Netcup client")?;
    if let Some(endpoint) = &config.endpoint {
        client = client.with_endpoint(endpoint.clone());
    }
    info!(endpoint = client.endpoint(), "Netcup client ready");

    let state_store: Box<dyn StateStore> = if config.companion.state.enabled {
        let store = FileStateStore::load(&config.companion.state.path)
            .await
            .context("failed to open state file")?;
        info!(
            path = %config.companion.state.path,
            entries = store.count().await,
            "State persistence enabled"
        );
        Box::new(store)
    } else {
        info!("State persistence disabled, using in-memory state");
        Box::new(MemoryStateStore::new())
    };

    let resolver = build_resolver(config)?;
    match config.companion.engine.host_ip {
        Some(ip) => info!(%ip, "Using configured host address"),
        None => info!(resolver = resolver.name(), "Discovering host address"),
    }

    let source = StaticFactSource::parse(&config.hosts).context("invalid COMPANION_HOSTS")?;
    if source.facts().is_empty() {
        warn!("COMPANION_HOSTS is empty; only persisted records will be reconciled");
    }
    for fact in source.facts() {
        info!(hostname = %fact.hostname, "Managing host");
    }
    if config.companion.engine.dry_run {
        warn!("Dry-run mode: no DNS records will be written");
    }

    let (engine, events) = ReconcileEngine::new(
        Box::new(client),
        state_store,
        resolver,
        Box::new(LogNotifier),
        &config.companion,
    )
    .context("failed to create engine")?;

    Ok((engine, events, source))
}

#[cfg(feature = "http")]
fn build_resolver(config: &Config) -> Result<Box<dyn AddressResolver>> {
    if config.lookup_urls.is_empty() {
        return Ok(Box::new(OutboundAddressResolver::new()));
    }
    let resolver = companion_ip_http::HttpAddressResolver::with_services(config.lookup_urls.clone())
        .context("failed to create HTTP address resolver")?;
    Ok(Box::new(resolver))
}

#[cfg(not(feature = "http"))]
fn build_resolver(config: &Config) -> Result<Box<dyn AddressResolver>> {
    if !config.lookup_urls.is_empty() {
        warn!("IP_LOOKUP_URL ignored: built without the http feature");
    }
    Ok(Box::new(OutboundAddressResolver::new()))
}

async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::Started => debug!("Engine started"),
            EngineEvent::ReconcileCompleted(report) => info!(
                synced = report.synced,
                in_sync = report.in_sync,
                errors = report.errors,
                cancelled = report.cancelled,
                "Reconciliation finished"
            ),
            EngineEvent::FactProcessed { hostname, outcome } => {
                debug!(%hostname, ?outcome, "Host processed")
            }
            EngineEvent::FactFailed { hostname, error } => {
                debug!(%hostname, %error, "Host failed")
            }
            EngineEvent::Stopped { reason } => info!(%reason, "Engine stopped"),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
