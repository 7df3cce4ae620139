//! Outbound side of the bus
//! `TagPublisher` turns lifecycle and sensor events into topic publications.
//! Failures are logged here and never reach the caller.

use anyhow::Result;
use log::{debug, error, info};
use rumqttc::{AsyncClient, ClientError, QoS};

use crate::config::home_assistant_config::{DisconnectAction, HomeAssistantConfig};
use crate::core::bluetooth::DeviceId;
use crate::core::button::ClickEvent;
use crate::error::BridgeError;
use crate::mqtt::discovery::{self, ENTITIES};
use crate::mqtt::topics::{self, Topics};

/// Payload published on the button topic after each click
pub const CLICK_RESET: &str = "0";

/// The MQTT operations the bridge depends on
#[async_trait::async_trait]
pub trait BusPublisher: Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()>;

    async fn subscribe(&self, topics: &[String]) -> Result<()>;

    async fn unsubscribe(&self, topics: &[String]) -> Result<()>;
}

/// Requests are queued without waiting. While the broker is unreachable the
/// queue is not drained; once it is full further requests are dropped.
#[async_trait::async_trait]
impl BusPublisher for AsyncClient {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        let queued = self.try_publish(topic, QoS::AtMostOnce, retain, payload.as_bytes().to_vec());
        enqueue(queued, topic)
    }

    async fn subscribe(&self, topics: &[String]) -> Result<()> {
        for topic in topics {
            enqueue(self.try_subscribe(topic.as_str(), QoS::AtMostOnce), topic)?;
        }
        Ok(())
    }

    async fn unsubscribe(&self, topics: &[String]) -> Result<()> {
        for topic in topics {
            enqueue(self.try_unsubscribe(topic.as_str()), topic)?;
        }
        Ok(())
    }
}

fn enqueue(result: Result<(), ClientError>, topic: &str) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(ClientError::TryRequest(_)) => Err(BridgeError::BusBackpressure(topic.to_string()).into()),
        Err(e) => Err(BridgeError::from(e).into()),
    }
}

pub struct TagPublisher<B: BusPublisher> {
    bus: B,
    topics: Topics,
    home_assistant: HomeAssistantConfig,
}

impl<B: BusPublisher> TagPublisher<B> {
    pub fn new(bus: B, topics: Topics, home_assistant: HomeAssistantConfig) -> Self {
        Self {
            bus,
            topics,
            home_assistant,
        }
    }

    async fn send(&self, topic: &str, payload: &str, retain: bool) {
        debug!("MQTT publish {} <- {:?}", topic, payload);
        if let Err(e) = self.bus.publish(topic, payload, retain).await {
            error!("Failed to publish to {}: {}", topic, e);
        }
    }

    pub async fn presence(&self, id: &DeviceId, present: bool) {
        let payload = if present { "1" } else { "0" };
        self.send(&self.topics.state(id, topics::PRESENCE), payload, false)
            .await;
    }

    pub async fn rssi(&self, id: &DeviceId, rssi: i16) {
        self.send(&self.topics.state(id, topics::RSSI), &rssi.to_string(), false)
            .await;
    }

    pub async fn battery(&self, id: &DeviceId, level: u8) {
        self.send(
            &self.topics.state(id, topics::BATTERY),
            &level.to_string(),
            false,
        )
        .await;
    }

    /// Publishes the click marker followed by the reset marker.
    pub async fn click(&self, id: &DeviceId, click: ClickEvent) {
        let topic = self.topics.state(id, topics::BUTTON);
        self.send(&topic, click.payload(), false).await;
        self.send(&topic, CLICK_RESET, false).await;
    }

    pub async fn subscribe_alerts(&self, id: &DeviceId) {
        let alert_topics = self.topics.alert_topics(id);
        if let Err(e) = self.bus.subscribe(&alert_topics).await {
            error!("Failed to subscribe to alert topics of {}: {}", id, e);
        }
    }

    pub async fn unsubscribe_alerts(&self, id: &DeviceId) {
        let alert_topics = self.topics.alert_topics(id);
        if let Err(e) = self.bus.unsubscribe(&alert_topics).await {
            error!("Failed to unsubscribe from alert topics of {}: {}", id, e);
        }
    }

    /// Announces the sensors of a tag to Home Assistant, if enabled.
    pub async fn announce(&self, id: &DeviceId) {
        if !self.home_assistant.enabled {
            return;
        }
        for (entity, leaf) in ENTITIES {
            let config = discovery::sensor_config(&self.topics, id, entity, leaf);
            let payload = match serde_json::to_string(&config) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize discovery config for {}: {}", id, e);
                    continue;
                }
            };
            let topic = discovery::config_topic(&self.home_assistant.discovery_prefix, id, entity);
            self.send(&topic, &payload, true).await;
        }
        info!("Announced {} to Home Assistant", id);
    }

    /// Publishes the disconnect side effects: presence 0 and, with Home
    /// Assistant enabled, removal of entities per the configured action.
    pub async fn retract(&self, id: &DeviceId) {
        self.presence(id, false).await;
        if !self.home_assistant.enabled {
            return;
        }
        let removed: &[&str] = match self.home_assistant.on_disconnect {
            DisconnectAction::KeepAll => &[],
            DisconnectAction::KeepPresence => &["click", "rssi", "battery"],
            DisconnectAction::RemoveAll => &["click", "rssi", "battery", "presence"],
        };
        for entity in removed {
            let topic = discovery::config_topic(&self.home_assistant.discovery_prefix, id, entity);
            self.send(&topic, "", true).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingPublisher;

    fn publisher(home_assistant: HomeAssistantConfig) -> (TagPublisher<RecordingPublisher>, RecordingPublisher) {
        let bus = RecordingPublisher::default();
        (
            TagPublisher::new(bus.clone(), Topics::new("itag"), home_assistant),
            bus,
        )
    }

    #[tokio::test]
    async fn click_is_followed_by_reset() {
        let (publisher, bus) = publisher(HomeAssistantConfig::default());
        publisher.click(&DeviceId::new("AA:BB"), ClickEvent::Double).await;
        assert_eq!(
            bus.payloads("itag/AA:BB/button"),
            vec!["2".to_string(), "0".to_string()]
        );
    }

    #[tokio::test]
    async fn announce_is_silent_without_home_assistant() {
        let (publisher, bus) = publisher(HomeAssistantConfig::default());
        publisher.announce(&DeviceId::new("AA:BB")).await;
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn announce_publishes_retained_configs() {
        let (publisher, bus) = publisher(HomeAssistantConfig {
            enabled: true,
            ..HomeAssistantConfig::default()
        });
        publisher.announce(&DeviceId::new("AA:BB")).await;
        let published = bus.published();
        assert_eq!(published.len(), 4);
        assert!(published.iter().all(|p| p.retain));
        assert_eq!(published[0].topic, "homeassistant/sensor/AABB_click/config");
        assert!(published[0].payload.contains("itag/AA:BB/button"));
    }

    #[tokio::test]
    async fn retract_follows_disconnect_action() {
        let (publisher, bus) = publisher(HomeAssistantConfig {
            enabled: true,
            on_disconnect: DisconnectAction::KeepPresence,
            ..HomeAssistantConfig::default()
        });
        let id = DeviceId::new("AA:BB");
        publisher.retract(&id).await;

        assert_eq!(bus.payloads("itag/AA:BB/presence"), vec!["0".to_string()]);
        let cleared: Vec<String> = bus
            .published()
            .into_iter()
            .filter(|p| p.topic.ends_with("/config"))
            .map(|p| p.topic)
            .collect();
        assert_eq!(cleared.len(), 3);
        assert!(!cleared.iter().any(|t| t.contains("presence")));
    }

    #[tokio::test]
    async fn publish_failures_are_swallowed() {
        let (publisher, bus) = publisher(HomeAssistantConfig::default());
        bus.fail_publishes(true);
        publisher.presence(&DeviceId::new("AA:BB"), true).await;
        assert!(bus.published().is_empty());
    }
}
