//! Polling scheduler
//!
//! Owns one feed per (resource, usage|tariff|current) pair and the sensors
//! derived from them. Each cycle it decides whether upstream data is due,
//! polls the feeds that need it, then evaluates every sensor against the
//! feed values. Current-demand feeds are polled on every cycle.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::config::{GasConfig, RefreshWindow};
use crate::error::Result;
use crate::glowmarkt::{CurrentUsage, DailyWindow, Resource, SupplyType, TariffPlan, UsageOutcome};
use crate::logging::{StructuredLogger, get_logger};
use crate::sensor::{
    FeedKey, FeedKind, FeedValue, Sensor, SensorSnapshot, consumption_sensors, cost_sensor,
};

/// Upstream calls the scheduler needs; implemented by the auth controller
#[async_trait::async_trait]
pub trait MeterApi: Send + Sync {
    /// Called once at the start of every cycle
    fn begin_cycle(&self) {}

    async fn usage(&self, resource: &Resource, window: &DailyWindow) -> Result<UsageOutcome>;

    async fn tariff(&self, resource: &Resource) -> Result<Option<TariffPlan>>;

    async fn current(&self, resource: &Resource) -> Result<Option<CurrentUsage>>;
}

/// Minutes of the hour in which upstream data may have changed
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    windows: Vec<RefreshWindow>,
}

impl RefreshPolicy {
    pub fn new(windows: Vec<RefreshWindow>) -> Self {
        Self { windows }
    }

    pub fn is_due(&self, minute: u32) -> bool {
        self.windows
            .iter()
            .any(|w| minute >= w.start_minute && minute <= w.end_minute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Uninitialized,
    Fetching,
    Ready,
    /// Token still rejected after the one re-auth attempt
    StaleAuth,
    NoData,
    TransientFail,
}

#[derive(Debug)]
struct Feed {
    key: FeedKey,
    resource: Resource,
    state: PollState,
    last: Option<FeedValue>,
    available: bool,
    // Set by a definitive answer, cleared by any failure or missing data;
    // unsettled feeds are polled every cycle
    settled: bool,
}

impl Feed {
    fn new(key: FeedKey, resource: &Resource) -> Self {
        Self {
            key,
            resource: resource.clone(),
            state: PollState::Uninitialized,
            last: None,
            available: true,
            settled: false,
        }
    }
}

pub struct Scheduler {
    api: Arc<dyn MeterApi>,
    policy: RefreshPolicy,
    tz: Tz,
    cutoff: NaiveTime,
    gas: GasConfig,
    feeds: Vec<Feed>,
    index: HashMap<FeedKey, usize>,
    sensors: Vec<Sensor>,
    logger: StructuredLogger,
}

impl Scheduler {
    pub fn new(
        api: Arc<dyn MeterApi>,
        policy: RefreshPolicy,
        tz: Tz,
        cutoff: NaiveTime,
        gas: GasConfig,
    ) -> Self {
        Self {
            api,
            policy,
            tz,
            cutoff,
            gas,
            feeds: Vec::new(),
            index: HashMap::new(),
            sensors: Vec::new(),
            logger: get_logger("scheduler"),
        }
    }

    /// Build feeds and sensors. Consumption resources come first so cost
    /// sensors can be grouped under them; unknown classifiers are skipped.
    pub fn setup(&mut self, resources: &[Resource]) {
        for resource in resources.iter().filter(|r| r.is_consumption()) {
            self.add_feed(FeedKey::usage(&resource.id), resource);
            self.add_feed(FeedKey::tariff(&resource.id), resource);
            if resource.supply == SupplyType::Electricity {
                self.add_feed(FeedKey::current(&resource.id), resource);
            }
            self.sensors
                .extend(consumption_sensors(resource, &self.gas));
        }

        for resource in resources.iter().filter(|r| r.is_cost()) {
            let meter = resource
                .meter_classifier()
                .and_then(|c| resources.iter().find(|r| r.classifier == c));
            self.add_feed(FeedKey::usage(&resource.id), resource);
            self.sensors.push(cost_sensor(resource, meter));
        }

        for resource in resources
            .iter()
            .filter(|r| !r.is_consumption() && !r.is_cost())
        {
            self.logger.debug(&format!(
                "Ignoring resource {} with classifier {}",
                resource.id, resource.classifier
            ));
        }

        self.logger.info(&format!(
            "Tracking {} feeds for {} sensors",
            self.feeds.len(),
            self.sensors.len()
        ));
    }

    fn add_feed(&mut self, key: FeedKey, resource: &Resource) {
        if self.index.contains_key(&key) {
            return;
        }
        self.index.insert(key.clone(), self.feeds.len());
        self.feeds.push(Feed::new(key, resource));
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn feed_state(&self, key: &FeedKey) -> Option<PollState> {
        self.index.get(key).map(|&i| self.feeds[i].state)
    }

    /// One update pass: poll due feeds, then evaluate all sensors
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Vec<SensorSnapshot> {
        self.api.begin_cycle();

        let minute = now.with_timezone(&self.tz).minute();
        let due = self.policy.is_due(minute);
        let window = DailyWindow::for_instant(now, self.tz, self.cutoff);

        for i in 0..self.feeds.len() {
            let feed = &self.feeds[i];
            if feed.settled && feed.key.kind != FeedKind::Current && !due {
                continue;
            }
            self.poll_feed(i, &window).await;
        }

        self.snapshots()
    }

    async fn poll_feed(&mut self, i: usize, window: &DailyWindow) {
        let api = Arc::clone(&self.api);
        let feed = &mut self.feeds[i];
        let logger = self.logger.for_resource(&feed.resource.id);
        feed.state = PollState::Fetching;

        let result = match feed.key.kind {
            FeedKind::Usage => api.usage(&feed.resource, window).await.map(|o| match o {
                UsageOutcome::Reading(r) => Some(FeedValue::Usage(r)),
                UsageOutcome::NoDataYet => None,
            }),
            FeedKind::Tariff => api
                .tariff(&feed.resource)
                .await
                .map(|t| t.map(FeedValue::Tariff)),
            FeedKind::Current => api
                .current(&feed.resource)
                .await
                .map(|c| c.map(FeedValue::Current)),
        };

        match result {
            Ok(Some(value)) => {
                feed.state = PollState::Ready;
                feed.last = Some(value);
                feed.available = true;
                feed.settled = true;
            }
            Ok(None) => {
                feed.state = PollState::NoData;
                feed.available = true;
                if feed.key.kind == FeedKind::Tariff {
                    // No tariff configured; nothing to wait for
                    if !feed.settled {
                        logger.warn("No tariff data found");
                    }
                    feed.last = None;
                    feed.settled = true;
                } else {
                    feed.settled = false;
                    logger.debug("No data yet for this window");
                }
            }
            Err(e) if e.is_auth() => {
                feed.state = PollState::StaleAuth;
                feed.available = false;
                feed.settled = false;
                logger.error(&format!("Authentication failed: {}", e));
            }
            Err(e) => {
                feed.state = PollState::TransientFail;
                feed.settled = false;
                logger.warn(&format!("Update failed, keeping last value: {}", e));
            }
        }
    }

    /// Evaluate every sensor against the current feed values
    pub fn snapshots(&self) -> Vec<SensorSnapshot> {
        self.sensors
            .iter()
            .map(|sensor| {
                let feed = self.index.get(&sensor.source).map(|&i| &self.feeds[i]);
                SensorSnapshot {
                    key: sensor.key.clone(),
                    name: sensor.name.clone(),
                    unit: sensor.unit,
                    device_id: sensor.device_id.clone(),
                    value: feed
                        .and_then(|f| f.last.as_ref())
                        .and_then(|v| sensor.transform.apply(v)),
                    available: feed.is_some_and(|f| f.available),
                }
            })
            .collect()
    }
}
