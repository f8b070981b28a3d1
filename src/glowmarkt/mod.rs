//! Glowmarkt REST API integration
//!
//! Authentication, resource discovery, daily usage and tariff queries
//! against `api.glowmarkt.com`.

pub mod client;
pub mod types;
pub mod window;

pub use client::GlowClient;
pub use types::{
    Credential, CurrentUsage, Device, Reading, Resource, SupplyType, TariffPlan,
    Unit, UsageOutcome,
};
pub use window::DailyWindow;

/// Production API base
pub const DEFAULT_BASE_URL: &str = "https://api.glowmarkt.com/api/v0-1";

/// Device type id of the Glow consumer access device
pub const CAD_DEVICE_TYPE_ID: &str = "1027b6e8-9bfd-4dcb-8068-c73f6413cfaf";
