//! MQTT connection and inbound event pump

use std::time::Duration;

use anyhow::Result;
use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;

use crate::config::mqtt_config::MqttConfig;
use crate::core::bluetooth::{BridgeEvent, TagPeripheral};

const REQUEST_CHANNEL_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Builds the client and its event loop. Nothing is sent until the loop is
/// polled.
pub fn connect(config: &MqttConfig) -> Result<(AsyncClient, EventLoop)> {
    let (host, port) = config.endpoint()?;
    let mut options = MqttOptions::new(config.client_id.clone(), host.clone(), port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_clean_session(true);
    if let Some(username) = &config.username {
        options.set_credentials(
            username.clone(),
            config.password.clone().unwrap_or_default(),
        );
    }

    info!(
        "MQTT client configured for {}:{} (auth: {})",
        host,
        port,
        config.username.is_some()
    );
    Ok(AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY))
}

/// Polls the event loop forever, forwarding connections and incoming
/// publications to the lifecycle manager. Returns when the manager is gone.
pub async fn pump_events<P: TagPeripheral>(
    mut event_loop: EventLoop,
    events: UnboundedSender<BridgeEvent<P>>,
) {
    loop {
        let event = match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected");
                BridgeEvent::BusConnected
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(
                    "MQTT topic: {} message: {}",
                    publish.topic,
                    String::from_utf8_lossy(&publish.payload)
                );
                BridgeEvent::BusMessage {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                }
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("MQTT connection error: {}", e);
                sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        if events.send(event).is_err() {
            debug!("Event channel closed, stopping MQTT pump");
            return;
        }
    }
}
