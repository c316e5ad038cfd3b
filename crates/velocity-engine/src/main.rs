//! Controller binary for the Velocity traffic junctions.
//!
//! This is the main entry point that wires together the junction workers,
//! the HTTP/`WebSocket` gateway and the optional NATS bridge. It loads
//! configuration, starts every junction cycling, and serves until the
//! process receives Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `VELOCITY_CONFIG` or `velocity-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Create the event broadcast channel
//! 4. Connect to NATS, if configured
//! 5. Spawn one worker per junction and start auto-cycling
//! 6. Start the gateway
//! 7. Start the NATS command bridge
//! 8. Wait for Ctrl-C, then shut down in reverse order

mod error;
mod nats;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use velocity_core::config::LoggingConfig;
use velocity_core::{EventSink, FanoutSink, JunctionRegistry, VelocityConfig};
use velocity_gateway::state::event_channel;
use velocity_gateway::{AppState, ServerConfig};

use crate::error::EngineError;
use crate::nats::{NatsBridge, NatsEventPublisher};

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "VELOCITY_CONFIG";

/// Configuration file used when [`CONFIG_ENV`] is unset.
const DEFAULT_CONFIG_PATH: &str = "velocity-config.yaml";

/// Application entry point for the junction controller.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is configured from it, so report the
    //    source once the subscriber is installed.
    let (config, source) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("velocity-engine starting");
    match &source {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }
    info!(
        host = %config.server.host,
        port = config.server.port,
        junctions = config.junctions.len(),
        green_ms = config.timing.signal_green_duration_ms,
        yellow_ms = config.timing.signal_yellow_duration_ms,
        emergency_ms = config.timing.emergency_duration_ms,
        "Controller configured"
    );

    // 3. Create the event channel shared by the workers and the gateway.
    let tx = event_channel();

    // 4. Connect to NATS. Failure is not fatal.
    let prefix = config.infrastructure.nats_subject_prefix.clone();
    let nats_client = match &config.infrastructure.nats_url {
        Some(url) => {
            info!(nats_url = %url, "Connecting to NATS");
            match async_nats::connect(url.as_str()).await {
                Ok(client) => {
                    info!("NATS connected");
                    Some(client)
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "failed to connect to NATS, continuing with HTTP and WebSocket only"
                    );
                    None
                }
            }
        }
        None => {
            info!("NATS not configured");
            None
        }
    };

    let mut sink = FanoutSink::new().with(Arc::new(tx.clone()));
    let mut publisher_handle = None;
    if let Some(client) = &nats_client {
        let (publisher, handle) = NatsEventPublisher::spawn(client.clone(), prefix.clone());
        sink = sink.with(Arc::new(publisher));
        publisher_handle = Some(handle);
    }

    // 5. Spawn junction workers and start cycling.
    let sink: Arc<dyn EventSink> = Arc::new(sink);
    let registry = Arc::new(JunctionRegistry::spawn(&config, sink));
    registry.start_all().await.map_err(EngineError::from)?;
    info!(junctions = registry.len(), "Junction workers running");

    // 6. Start the gateway.
    let shutdown = CancellationToken::new();
    let mut app_state = AppState::new(Arc::clone(&registry), tx);
    let static_dir = Path::new(&config.server.static_dir);
    if static_dir.is_dir() {
        app_state = app_state.with_static_dir(static_dir);
    } else {
        info!(
            static_dir = %config.server.static_dir,
            "Static directory not found, serving API only"
        );
    }
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    let gateway = velocity_gateway::spawn_gateway(
        &server_config,
        Arc::new(app_state),
        shutdown.clone(),
    )
    .await
    .map_err(EngineError::from)?;

    // 7. Start the NATS command bridge.
    let bridge = nats_client.map(|client| {
        let bridge = NatsBridge::new(client, prefix);
        let registry = Arc::clone(&registry);
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge.run(registry, token).await {
                warn!(error = %e, "NATS command bridge failed");
            }
        })
    });

    // 8. Serve until Ctrl-C.
    tokio::signal::ctrl_c().await.map_err(EngineError::from)?;
    info!("Shutdown requested");

    shutdown.cancel();
    if let Err(e) = gateway.await {
        warn!(error = %e, "gateway task panicked");
    }
    if let Some(bridge) = bridge {
        if let Err(e) = bridge.await {
            warn!(error = %e, "NATS bridge task panicked");
        }
    }
    registry.shutdown().await;
    // The publisher drains once the workers have dropped their sinks.
    if let Some(handle) = publisher_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "NATS publisher task panicked");
        }
    }

    info!("velocity-engine shutdown complete");
    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load the controller configuration.
///
/// Reads the file named by `VELOCITY_CONFIG`, falling back to
/// `velocity-config.yaml` in the working directory. Without a file the
/// built-in defaults are used; environment overrides and validation apply
/// either way. Returns the path that was read, if any.
fn load_config() -> Result<(VelocityConfig, Option<PathBuf>), EngineError> {
    let config_path = std::env::var(CONFIG_ENV)
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if config_path.exists() {
        let config = VelocityConfig::from_file(&config_path)?;
        Ok((config, Some(config_path)))
    } else {
        let mut config = VelocityConfig::default_with_junctions();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok((config, None))
    }
}
