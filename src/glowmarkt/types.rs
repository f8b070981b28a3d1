use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use super::window::DailyWindow;

/// Account credential plus the time-limited bearer token issued for it
#[derive(Clone)]
pub struct Credential {
    pub application_id: String,
    pub username: String,
    pub password: String,
    pub token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(application_id: &str, username: &str, password: &str) -> Self {
        Self {
            application_id: application_id.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            token: None,
            expiry: None,
        }
    }

    /// True when there is no token or its expiry has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (&self.token, self.expiry) {
            (None, _) => true,
            (Some(_), Some(exp)) => exp <= now,
            (Some(_), None) => false,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("application_id", &self.application_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// `POST /auth` response body
#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponse {
    #[serde(default)]
    pub valid: bool,
    pub token: Option<String>,
    pub exp: Option<i64>,
}

/// Supply a resource meters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupplyType {
    Electricity,
    Gas,
    Unknown,
}

impl SupplyType {
    pub fn from_source_type(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "ELEC" => Self::Electricity,
            "GAS" => Self::Gas,
            _ => Self::Unknown,
        }
    }

    pub fn from_classifier(classifier: &str) -> Self {
        if classifier.starts_with("electricity.") {
            Self::Electricity
        } else if classifier.starts_with("gas.") {
            Self::Gas
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electricity => "electricity",
            Self::Gas => "gas",
            Self::Unknown => "unknown",
        }
    }
}

/// Vendor-defined metering endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub classifier: String,
    pub base_unit: Option<String>,
    pub supply: SupplyType,
}

impl Resource {
    /// `electricity.consumption` or `gas.consumption`
    pub fn is_consumption(&self) -> bool {
        self.classifier.ends_with(".consumption")
    }

    /// `electricity.consumption.cost` or `gas.consumption.cost`
    pub fn is_cost(&self) -> bool {
        self.classifier.ends_with(".consumption.cost")
    }

    /// Classifier of the consumption resource a cost resource belongs to
    pub fn meter_classifier(&self) -> Option<&str> {
        self.classifier.strip_suffix(".cost")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResourceTypeInfo {
    #[serde(rename = "type")]
    pub source_type: Option<String>,
}

/// One element of `GET /resource`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResourceDescriptor {
    pub resource_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub classifier: String,
    pub base_unit: Option<String>,
    pub data_source_resource_type_info: Option<ResourceTypeInfo>,
}

impl From<ResourceDescriptor> for Resource {
    fn from(d: ResourceDescriptor) -> Self {
        let supply = d
            .data_source_resource_type_info
            .as_ref()
            .and_then(|i| i.source_type.as_deref())
            .map(SupplyType::from_source_type)
            .filter(|s| *s != SupplyType::Unknown)
            .unwrap_or_else(|| SupplyType::from_classifier(&d.classifier));
        Self {
            id: d.resource_id,
            name: d.name,
            classifier: d.classifier,
            base_unit: d.base_unit,
            supply,
        }
    }
}

/// One element of `GET /device`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_type_id: String,
    pub hardware_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Unit a reading is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    KilowattHours,
    Pence,
    CubicMetres,
}

impl Unit {
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim() {
            "kWh" | "kwh" | "KWH" => Some(Self::KilowattHours),
            "pence" | "p" => Some(Self::Pence),
            "m3" | "m³" => Some(Self::CubicMetres),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KilowattHours => "kWh",
            Self::Pence => "pence",
            Self::CubicMetres => "m³",
        }
    }
}

/// Aggregated value for one reporting window
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub unit: Unit,
    pub window: DailyWindow,
}

/// Result of a usage query; `NoDataYet` is a normal outcome
#[derive(Debug, Clone, PartialEq)]
pub enum UsageOutcome {
    Reading(Reading),
    NoDataYet,
}

/// `GET /resource/{id}/readings` response body
#[derive(Debug, Deserialize)]
pub(crate) struct ReadingsResponse {
    #[serde(default)]
    pub data: Vec<(i64, Option<f64>)>,
    pub units: Option<String>,
}

/// Error body returned on non-200 responses
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
}

/// Current tariff for a resource, in pence
#[derive(Debug, Clone, PartialEq)]
pub struct TariffPlan {
    pub name: Option<String>,
    pub standing_charge: f64,
    pub rate: f64,
    pub valid_from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TariffResponse {
    #[serde(default)]
    pub data: Vec<TariffEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TariffEntry {
    pub name: Option<String>,
    pub from: Option<String>,
    pub current_rates: Option<CurrentRates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CurrentRates {
    #[serde(deserialize_with = "number_or_string")]
    pub rate: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub standing_charge: f64,
}

/// Latest instantaneous value from `GET /resource/{id}/current`
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUsage {
    pub value: f64,
    pub units: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentResponse {
    #[serde(default)]
    pub data: Vec<(i64, Option<f64>)>,
    pub units: Option<String>,
}

// The tariff endpoint has been seen returning both 24.5 and "24.5"
fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match &v {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("not a number: {}", s))),
        _ => Err(serde::de::Error::custom("expected number or string")),
    }
}
