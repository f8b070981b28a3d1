//! Decoder for the Glow CAD MQTT payload
//!
//! The CAD publishes the ZigBee Smart Energy metering cluster (`0702`) as
//! JSON: attribute sets keyed by two hex digits, attribute values as hex
//! strings. A meter section only counts as present when its formatting set
//! (`03`) is there.

use serde_json::{Map, Value};

use crate::error::{GlowError, Result};
use crate::logging::get_logger;

const METERING_CLUSTER: &str = "0702";
const READING_INFORMATION_SET: &str = "00";
const METER_STATUS: &str = "02";
const FORMATTING: &str = "03";
const HISTORICAL_CONSUMPTION: &str = "04";
const ALTERNATIVE_HISTORICAL_CONSUMPTION: &str = "0C";

type AttributeSet = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplyStatus {
    Off,
    Armed,
    On,
}

impl SupplyStatus {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "00" => Some(Self::Off),
            "01" => Some(Self::Armed),
            "02" => Some(Self::On),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfMeasure {
    Kwh,
    CubicMetres,
}

impl UnitOfMeasure {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "00" => Some(Self::Kwh),
            "01" => Some(Self::CubicMetres),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kwh => "kWh",
            Self::CubicMetres => "m³",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeteringDeviceType {
    Electric,
    Gas,
}

impl MeteringDeviceType {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "00" => Some(Self::Electric),
            "80" => Some(Self::Gas),
            _ => None,
        }
    }
}

/// Attribute set `00`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingInformationSet {
    pub current_summation_delivered: Option<u64>,
    pub current_summation_received: Option<u64>,
    pub current_max_demand_delivered: Option<u64>,
    pub reading_snapshot_time: Option<u64>,
    pub supply_status: Option<SupplyStatus>,
}

/// Attribute set `02`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterStatus {
    pub status: Option<String>,
}

/// Attribute set `03`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Formatting {
    pub unit_of_measure: Option<UnitOfMeasure>,
    pub multiplier: Option<u64>,
    pub divisor: Option<u64>,
    pub summation_formatting: Option<String>,
    pub demand_formatting: Option<String>,
    pub metering_device_type: Option<MeteringDeviceType>,
    /// MPAN for electricity, MPRN for gas
    pub site_id: Option<String>,
    pub meter_serial_number: Option<String>,
    pub alternative_unit_of_measure: Option<UnitOfMeasure>,
}

/// Attribute sets `04` and `0C`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalConsumption {
    /// Signed; negative when exporting
    pub instantaneous_demand: Option<i64>,
    pub current_day_consumption_delivered: Option<u64>,
    pub current_week_consumption_delivered: Option<u64>,
    pub current_month_consumption_delivered: Option<u64>,
}

/// One meter's section of a publish
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterPayload {
    pub reading_information_set: ReadingInformationSet,
    pub meter_status: MeterStatus,
    pub formatting: Formatting,
    pub historical_consumption: HistoricalConsumption,
    pub alternative_historical_consumption: HistoricalConsumption,
}

impl MeterPayload {
    /// Apply multiplier and divisor to a raw register value
    pub fn calibrate(&self, raw: f64) -> f64 {
        let multiplier = self.formatting.multiplier.unwrap_or(1) as f64;
        match self.formatting.divisor {
            Some(d) if d != 0 => raw * multiplier / d as f64,
            _ => raw * multiplier,
        }
    }

    /// Cumulative import in `formatting.unit_of_measure`
    pub fn summation_delivered(&self) -> Option<f64> {
        self.reading_information_set
            .current_summation_delivered
            .map(|v| self.calibrate(v as f64))
    }

    pub fn summation_received(&self) -> Option<f64> {
        self.reading_information_set
            .current_summation_received
            .map(|v| self.calibrate(v as f64))
    }

    pub fn instantaneous_demand(&self) -> Option<f64> {
        self.historical_consumption
            .instantaneous_demand
            .map(|v| self.calibrate(v as f64))
    }

    pub fn day_consumption(&self) -> Option<f64> {
        self.historical_consumption
            .current_day_consumption_delivered
            .map(|v| self.calibrate(v as f64))
    }
}

/// Decoded publish; either meter may be absent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedMessage {
    pub electricity: Option<MeterPayload>,
    pub gas: Option<MeterPayload>,
}

/// Decode one MQTT publish body
pub fn decode(bytes: &[u8]) -> Result<DecodedMessage> {
    let root: Value =
        serde_json::from_slice(bytes).map_err(|e| GlowError::malformed(format!("invalid JSON: {}", e)))?;
    let root = root
        .as_object()
        .ok_or_else(|| GlowError::malformed("payload is not a JSON object"))?;

    if !root.contains_key("elecMtr") && !root.contains_key("gasMtr") {
        return Err(GlowError::malformed("no elecMtr or gasMtr section"));
    }

    Ok(DecodedMessage {
        electricity: decode_meter("elecMtr", root.get("elecMtr"))?,
        gas: decode_meter("gasMtr", root.get("gasMtr"))?,
    })
}

fn decode_meter(name: &str, section: Option<&Value>) -> Result<Option<MeterPayload>> {
    let Some(section) = section else {
        return Ok(None);
    };
    let cluster = section
        .get(METERING_CLUSTER)
        .and_then(Value::as_object)
        .ok_or_else(|| GlowError::malformed(format!("{} has no {} cluster", name, METERING_CLUSTER)))?;

    let Some(formatting) = attribute_set(cluster, FORMATTING)? else {
        return Ok(None);
    };
    let reading = attribute_set(cluster, READING_INFORMATION_SET)?;
    let status = attribute_set(cluster, METER_STATUS)?;
    let historical = attribute_set(cluster, HISTORICAL_CONSUMPTION)?;
    let alternative = attribute_set(cluster, ALTERNATIVE_HISTORICAL_CONSUMPTION)?;

    Ok(Some(MeterPayload {
        reading_information_set: ReadingInformationSet {
            current_summation_delivered: hex_u64(reading, "00")?,
            current_summation_received: hex_u64(reading, "01")?,
            current_max_demand_delivered: hex_u64(reading, "02")?,
            reading_snapshot_time: hex_u64(reading, "07")?,
            supply_status: code(reading, "14")?.and_then(|c| known(c, SupplyStatus::from_code)),
        },
        meter_status: MeterStatus {
            status: code(status, "00")?.map(str::to_string),
        },
        formatting: Formatting {
            unit_of_measure: code(Some(formatting), "00")?
                .and_then(|c| known(c, UnitOfMeasure::from_code)),
            multiplier: hex_u64(Some(formatting), "01")?,
            divisor: hex_u64(Some(formatting), "02")?,
            summation_formatting: code(Some(formatting), "03")?.map(str::to_string),
            demand_formatting: code(Some(formatting), "04")?.map(str::to_string),
            metering_device_type: code(Some(formatting), "06")?
                .and_then(|c| known(c, MeteringDeviceType::from_code)),
            site_id: code(Some(formatting), "07")?.map(str::to_string),
            meter_serial_number: code(Some(formatting), "08")?.map(str::to_string),
            alternative_unit_of_measure: code(Some(formatting), "12")?
                .and_then(|c| known(c, UnitOfMeasure::from_code)),
        },
        historical_consumption: historical_set(historical)?,
        alternative_historical_consumption: historical_set(alternative)?,
    }))
}

fn historical_set(set: Option<&AttributeSet>) -> Result<HistoricalConsumption> {
    Ok(HistoricalConsumption {
        instantaneous_demand: hex_i64_signed(set, "00")?,
        current_day_consumption_delivered: hex_u64(set, "01")?,
        current_week_consumption_delivered: hex_u64(set, "30")?,
        current_month_consumption_delivered: hex_u64(set, "40")?,
    })
}

fn attribute_set<'a>(cluster: &'a AttributeSet, key: &str) -> Result<Option<&'a AttributeSet>> {
    match cluster.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(set)) => Ok(Some(set)),
        Some(_) => Err(GlowError::malformed(format!(
            "attribute set {} is not an object",
            key
        ))),
    }
}

fn code<'a>(set: Option<&'a AttributeSet>, key: &str) -> Result<Option<&'a str>> {
    match set.and_then(|s| s.get(key)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(GlowError::malformed(format!(
            "attribute {} is not a string: {}",
            key, other
        ))),
    }
}

fn known<T>(code: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
    let parsed = parse(code);
    if parsed.is_none() {
        get_logger("mqtt").debug(&format!("Ignoring unknown enum code {}", code));
    }
    parsed
}

fn hex_u64(set: Option<&AttributeSet>, key: &str) -> Result<Option<u64>> {
    let Some(s) = code(set, key)? else {
        return Ok(None);
    };
    u64::from_str_radix(s.trim(), 16)
        .map(Some)
        .map_err(|_| GlowError::malformed(format!("attribute {} is not hex: {:?}", key, s)))
}

// Two's complement over the width of the hex string
fn hex_i64_signed(set: Option<&AttributeSet>, key: &str) -> Result<Option<i64>> {
    let Some(s) = code(set, key)? else {
        return Ok(None);
    };
    let s = s.trim();
    let raw = u64::from_str_radix(s, 16)
        .map_err(|_| GlowError::malformed(format!("attribute {} is not hex: {:?}", key, s)))?;
    let bits = (s.len() * 4) as u32;
    if bits == 0 || bits >= 64 {
        return Ok(Some(raw as i64));
    }
    let sign = 1u64 << (bits - 1);
    if raw & sign != 0 {
        Ok(Some(raw as i64 - (1i64 << bits)))
    } else {
        Ok(Some(raw as i64))
    }
}
