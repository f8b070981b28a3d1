//! Sensor model exposed to the host
//!
//! Each sensor is a named view over one upstream feed plus a pure
//! transformation. Derived sensors never poll on their own; they read the
//! value the scheduler already fetched for their source feed this cycle.

use crate::config::GasConfig;
use crate::glowmarkt::{CurrentUsage, Reading, Resource, SupplyType, TariffPlan};

/// What a feed fetches for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Usage,
    Tariff,
    /// Latest instantaneous value, polled every cycle
    Current,
}

/// Upstream reading a sensor depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey {
    pub resource_id: String,
    pub kind: FeedKind,
}

impl FeedKey {
    pub fn usage(resource_id: &str) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            kind: FeedKind::Usage,
        }
    }

    pub fn tariff(resource_id: &str) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            kind: FeedKind::Tariff,
        }
    }

    pub fn current(resource_id: &str) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            kind: FeedKind::Current,
        }
    }
}

/// Last value fetched for a feed
#[derive(Debug, Clone, PartialEq)]
pub enum FeedValue {
    Usage(Reading),
    Tariff(TariffPlan),
    Current(CurrentUsage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Usage,
    Cost,
    Standing,
    Rate,
    GasVolume,
    Demand,
}

/// Pure function from a feed value to the sensor state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// Usage in kWh, 2 dp
    Round2,
    /// Pence to pounds, 2 dp
    PenceToPounds,
    /// kWh to m³
    EnergyToVolume {
        volume_correction: f64,
        calorific_value: f64,
    },
    /// Unit rate, pence to pounds, 4 dp
    TariffRate,
    /// Standing charge, pence to pounds, 4 dp
    TariffStanding,
    /// Instantaneous demand as reported, 3 dp
    Demand,
}

impl Transform {
    pub fn apply(&self, value: &FeedValue) -> Option<f64> {
        match (self, value) {
            (Self::Round2, FeedValue::Usage(r)) => Some(round_to(r.value, 2)),
            (Self::PenceToPounds, FeedValue::Usage(r)) => Some(round_to(pence_to_pounds(r.value), 2)),
            (
                Self::EnergyToVolume {
                    volume_correction,
                    calorific_value,
                },
                FeedValue::Usage(r),
            ) => Some(round_to(
                kwh_to_cubic_metres(r.value, *volume_correction, *calorific_value),
                3,
            )),
            (Self::TariffRate, FeedValue::Tariff(t)) => Some(round_to(pence_to_pounds(t.rate), 4)),
            (Self::TariffStanding, FeedValue::Tariff(t)) => {
                Some(round_to(pence_to_pounds(t.standing_charge), 4))
            }
            (Self::Demand, FeedValue::Current(c)) => Some(round_to(c.value, 3)),
            _ => None,
        }
    }
}

pub fn kwh_to_cubic_metres(kwh: f64, volume_correction: f64, calorific_value: f64) -> f64 {
    kwh * 3.6 / volume_correction / calorific_value
}

pub fn pence_to_pounds(pence: f64) -> f64 {
    pence / 100.0
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub key: String,
    pub name: String,
    pub kind: SensorKind,
    pub unit: &'static str,
    /// Consumption resource this sensor is grouped under
    pub device_id: String,
    pub source: FeedKey,
    pub transform: Transform,
}

/// Host-visible state of one sensor after a cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    pub key: String,
    pub name: String,
    pub unit: &'static str,
    pub device_id: String,
    pub value: Option<f64>,
    pub available: bool,
}

fn supply_label(resource: &Resource) -> &'static str {
    match resource.supply {
        SupplyType::Electricity => "Electricity",
        SupplyType::Gas => "Gas",
        SupplyType::Unknown => "Meter",
    }
}

/// Sensors fed by a consumption resource: usage, tariff pair, current
/// demand for electricity, and the volume conversion for gas
pub fn consumption_sensors(resource: &Resource, gas: &GasConfig) -> Vec<Sensor> {
    let label = supply_label(resource);
    let mut sensors = vec![
        Sensor {
            key: resource.id.clone(),
            name: format!("{} usage (today)", label),
            kind: SensorKind::Usage,
            unit: "kWh",
            device_id: resource.id.clone(),
            source: FeedKey::usage(&resource.id),
            transform: Transform::Round2,
        },
        Sensor {
            key: format!("{}-tariff", resource.id),
            name: format!("{} standing charge", label),
            kind: SensorKind::Standing,
            unit: "GBP",
            device_id: resource.id.clone(),
            source: FeedKey::tariff(&resource.id),
            transform: Transform::TariffStanding,
        },
        Sensor {
            key: format!("{}-rate", resource.id),
            name: format!("{} rate", label),
            kind: SensorKind::Rate,
            unit: "GBP/kWh",
            device_id: resource.id.clone(),
            source: FeedKey::tariff(&resource.id),
            transform: Transform::TariffRate,
        },
    ];

    if resource.supply == SupplyType::Electricity {
        sensors.push(Sensor {
            key: format!("{}-current", resource.id),
            name: format!("{} demand", label),
            kind: SensorKind::Demand,
            unit: "W",
            device_id: resource.id.clone(),
            source: FeedKey::current(&resource.id),
            transform: Transform::Demand,
        });
    }

    if resource.supply == SupplyType::Gas {
        sensors.push(Sensor {
            key: format!("{}-volume", resource.id),
            name: format!("{} usage (today, m³)", label),
            kind: SensorKind::GasVolume,
            unit: "m³",
            device_id: resource.id.clone(),
            source: FeedKey::usage(&resource.id),
            transform: Transform::EnergyToVolume {
                volume_correction: gas.volume_correction,
                calorific_value: gas.calorific_value,
            },
        });
    }
    sensors
}

/// Cost sensor for a `*.consumption.cost` resource, grouped under the
/// consumption resource of the same supply when there is one
pub fn cost_sensor(resource: &Resource, meter: Option<&Resource>) -> Sensor {
    Sensor {
        key: resource.id.clone(),
        name: format!("{} cost (today)", supply_label(resource)),
        kind: SensorKind::Cost,
        unit: "GBP",
        device_id: meter.map_or_else(|| resource.id.clone(), |m| m.id.clone()),
        source: FeedKey::usage(&resource.id),
        transform: Transform::PenceToPounds,
    }
}
