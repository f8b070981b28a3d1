use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::payload::{DecodedMessage, MeterPayload, SupplyStatus, UnitOfMeasure, decode};
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};

pub const ELECTRICITY_CLASSIFIER: &str = "electricity.consumption";
pub const GAS_CLASSIFIER: &str = "gas.consumption";

/// Calibrated live values for one meter
#[derive(Debug, Clone, PartialEq)]
pub struct LiveReading {
    pub classifier: String,
    pub cumulative: Option<f64>,
    pub unit: Option<UnitOfMeasure>,
    pub demand: Option<f64>,
    pub supply_status: Option<SupplyStatus>,
    pub received_at: DateTime<Utc>,
}

impl LiveReading {
    fn from_meter(classifier: &str, meter: &MeterPayload, received_at: DateTime<Utc>) -> Self {
        Self {
            classifier: classifier.to_string(),
            cumulative: meter.summation_delivered(),
            unit: meter.formatting.unit_of_measure,
            demand: meter.instantaneous_demand(),
            supply_status: meter.reading_information_set.supply_status,
            received_at,
        }
    }
}

type Routes = HashMap<String, watch::Sender<Option<LiveReading>>>;

/// Classifier to latest-value channel map
///
/// Cloned handles share the same routes, so registrations made before the
/// subscriber (re)connects stay in place.
#[derive(Clone)]
pub struct MeterRouter {
    routes: Arc<RwLock<Routes>>,
    logger: StructuredLogger,
}

impl Default for MeterRouter {
    fn default() -> Self {
        Self {
            routes: Arc::new(RwLock::new(HashMap::new())),
            logger: get_logger("mqtt"),
        }
    }
}

impl MeterRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to live values for `classifier`
    pub fn register(&self, classifier: &str) -> watch::Receiver<Option<LiveReading>> {
        let mut routes = match self.routes.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        routes
            .entry(classifier.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    pub fn latest(&self, classifier: &str) -> Option<LiveReading> {
        let routes = match self.routes.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        routes.get(classifier).and_then(|tx| tx.borrow().clone())
    }

    /// Push decoded meters to registered classifiers; returns how many were updated
    pub fn dispatch(&self, message: &DecodedMessage, received_at: DateTime<Utc>) -> usize {
        let routes = match self.routes.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut updated = 0;
        for (classifier, meter) in [
            (ELECTRICITY_CLASSIFIER, message.electricity.as_ref()),
            (GAS_CLASSIFIER, message.gas.as_ref()),
        ] {
            let (Some(meter), Some(tx)) = (meter, routes.get(classifier)) else {
                continue;
            };
            tx.send_replace(Some(LiveReading::from_meter(classifier, meter, received_at)));
            updated += 1;
        }
        updated
    }

    /// Decode and dispatch one publish
    pub fn handle_payload(&self, bytes: &[u8]) -> Result<usize> {
        let message = decode(bytes)?;
        let updated = self.dispatch(&message, Utc::now());
        self.logger
            .trace(&format!("Dispatched live reading to {} routes", updated));
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] = br#"{"elecMtr": {"0702": {
        "00": {"00": "0000000003E8", "14": "02"},
        "03": {"00": "00", "01": "000001", "02": "0003E8"},
        "04": {"00": "000001F4"}}}}"#;

    #[test]
    fn routes_only_registered_classifiers() {
        let router = MeterRouter::new();
        assert_eq!(router.handle_payload(PAYLOAD).unwrap(), 0);

        let mut rx = router.register(ELECTRICITY_CLASSIFIER);
        assert_eq!(router.handle_payload(PAYLOAD).unwrap(), 1);
        assert!(rx.has_changed().unwrap());
        let reading = rx.borrow_and_update().clone().unwrap();
        assert!((reading.cumulative.unwrap() - 1.0).abs() < 1e-9);
        assert!((reading.demand.unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(reading.supply_status, Some(SupplyStatus::On));
        assert!(router.latest(GAS_CLASSIFIER).is_none());
    }

    #[test]
    fn clones_share_routes() {
        let router = MeterRouter::new();
        let rx = router.register(ELECTRICITY_CLASSIFIER);
        let other = router.clone();
        other.handle_payload(PAYLOAD).unwrap();
        assert!(rx.borrow().is_some());
        assert!(router.latest(ELECTRICITY_CLASSIFIER).is_some());
    }

    #[test]
    fn malformed_payload_is_an_error_not_a_panic() {
        let router = MeterRouter::new();
        router.register(ELECTRICITY_CLASSIFIER);
        assert!(router.handle_payload(b"{").is_err());
        assert!(router.latest(ELECTRICITY_CLASSIFIER).is_none());
    }
}
