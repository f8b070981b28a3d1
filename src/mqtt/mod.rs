//! Live CAD feed over MQTT
//!
//! The decoder and router are always built; the network subscriber needs the
//! `mqtt` feature.

pub mod payload;
pub mod router;
#[cfg(feature = "mqtt")]
pub mod subscriber;

pub use payload::{DecodedMessage, MeterPayload, decode};
pub use router::{ELECTRICITY_CLASSIFIER, GAS_CLASSIFIER, LiveReading, MeterRouter};
#[cfg(feature = "mqtt")]
pub use subscriber::MqttSubscriber;
