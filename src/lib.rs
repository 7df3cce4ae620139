//! iTAG MQTT bridge library
//! Connects to iTAG BLE tags in range and mirrors their button, battery,
//! signal strength and presence onto MQTT topics. Alerts requested over
//! MQTT are written back to the tags.

// Module declarations
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod mqtt;
pub mod state;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use bluest::Adapter;
use log::{error, info};
use tokio::sync::mpsc;

use crate::config::BridgeConfig;
use crate::core::bluetooth::{ScanController, TagManager, SCAN_RESTART_DELAY};
use crate::mqtt::{TagPublisher, Topics};

/// Runs the bridge until Ctrl-C, then releases every tag.
pub async fn run(config: BridgeConfig) -> Result<()> {
    let adapter = Adapter::default()
        .await
        .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
    let adapter = Arc::new(adapter);

    let (client, event_loop) = mqtt::client::connect(&config.mqtt)?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(mqtt::client::pump_events(event_loop, events_tx.clone()));

    let scanner = ScanController::new(adapter, events_tx.clone(), SCAN_RESTART_DELAY);
    let scan = scanner.handle();
    tokio::spawn(async move {
        if let Err(e) = scanner.run().await {
            error!("Scanner stopped: {}", e);
        }
    });

    let publisher = TagPublisher::new(
        client,
        Topics::new(config.mqtt.base_topic.clone()),
        config.home_assistant.clone(),
    );
    let mut manager = TagManager::new(config.tag.clone(), publisher, scan, events_tx);

    let result = tokio::select! {
        _ = manager.run(events_rx) => Ok(()),
        signal = tokio::signal::ctrl_c() => signal.map_err(anyhow::Error::from),
    };
    info!("Shutting down");
    manager.shutdown();
    result
}
