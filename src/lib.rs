//! # glowmarkt-bridge
//!
//! Bridge between the Hildebrand Glow / Glowmarkt smart-meter service and a
//! home-automation host.
//!
//! ## Architecture
//!
//! - `glowmarkt`: REST client, wire types and daily window computation
//! - `auth`: shared credential with single-flight re-authentication
//! - `scheduler`: refresh-window aware polling of usage and tariff feeds
//! - `sensor`: host-visible sensors derived from the polled feeds
//! - `mqtt`: decoder, router and subscriber for the live CAD feed
//! - `persistence`: key/value store the refreshed token is written to
//! - `config`: YAML configuration with validation
//! - `logging`: structured logging and tracing
//! - `bridge`: runtime wiring used by the binary

pub mod auth;
pub mod bridge;
pub mod config;
pub mod error;
pub mod glowmarkt;
pub mod logging;
pub mod mqtt;
pub mod persistence;
pub mod scheduler;
pub mod sensor;

// Re-export commonly used types
pub use bridge::GlowBridge;
pub use config::Config;
pub use error::{GlowError, Result};
