// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `niko-bridge` - process entry point.
//!
//! Loads the bootstrap file and the persisted server configuration,
//! connects to the broker, and runs the bridge until interrupted.
//!
//! Environment:
//! - `NIKO_BRIDGE_CONFIG`: bootstrap file (default `default.conf`)
//! - `NIKO_BRIDGE_STATE`: persisted configuration (default `serverConfig.json`)
//! - `RUST_LOG`: log filter (default `niko_bridge=info`)

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use niko_bridge::config::{BootstrapConfig, BridgeSettings, ConfigPaths, ConfigStore};
use niko_bridge::protocol::MqttTransport;
use niko_bridge::{Bridge, ProtocolError};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "niko_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "niko-bridge stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> niko_bridge::Result<()> {
    let paths = ConfigPaths::from_env();
    let bootstrap = BootstrapConfig::load(&paths.bootstrap)?;

    let store = ConfigStore::new(&paths.state);
    let persisted = store.load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Ignoring persisted configuration");
        None
    });
    let (settings, devices) = BridgeSettings::resolve(&bootstrap, persisted)?;
    tracing::info!(%settings, devices = devices.len(), "Starting niko-bridge");

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut builder = MqttTransport::builder()
        .host(&bootstrap.mqtt_server)
        .port(bootstrap.mqtt_port)
        .tls(bootstrap.mqtt_tls)
        .keep_alive(Duration::from_secs(bootstrap.keep_alive_secs))
        .connect_timeout(Duration::from_secs(bootstrap.connection_timeout_secs));
    if let Some((user, pass)) = bootstrap.credentials() {
        builder = builder.credentials(user, pass);
    }
    let transport = builder.connect(events_tx).await?;

    let bridge = Arc::new(Bridge::new(settings, devices, store, transport.clone()));
    tokio::spawn(Arc::clone(&bridge).run_dispatch_loop());
    tokio::spawn(Arc::clone(&bridge).run_poll_loop());

    // The transport reconnects on its own; its event stream only ends with
    // the session.
    let mut events = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.run(events_rx).await })
    };

    tokio::select! {
        () = shutdown_signal() => {}
        _ = &mut events => {
            bridge.on_disconnected();
            return Err(ProtocolError::ConnectionFailed("MQTT event loop stopped".to_string()).into());
        }
    }

    if let Err(e) = transport.disconnect().await {
        tracing::warn!(error = %e, "Disconnect request failed");
    }
    bridge.on_disconnected();
    events.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Waits for SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, disconnecting"),
        () = terminate => tracing::info!("Received SIGTERM, disconnecting"),
    }
}
