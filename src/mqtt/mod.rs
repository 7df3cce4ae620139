//! MQTT side of the bridge
//! Connection handling, topic layout, outbound publications and Home
//! Assistant discovery.

pub mod client;
pub mod discovery;
pub mod publisher;
pub mod topics;

pub use publisher::{BusPublisher, TagPublisher};
pub use topics::Topics;
