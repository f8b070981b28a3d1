//! Runtime wiring: config, auth, scheduler and the optional live feed

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

use crate::auth::AuthController;
use crate::config::Config;
use crate::error::Result;
use crate::glowmarkt::{Credential, GlowClient};
use crate::logging::{StructuredLogger, get_logger};
use crate::mqtt::MeterRouter;
use crate::persistence::PersistenceManager;
use crate::scheduler::{RefreshPolicy, Scheduler};
use crate::sensor::SensorSnapshot;

pub struct GlowBridge {
    config: Config,
    auth: Arc<AuthController>,
    scheduler: Scheduler,
    router: MeterRouter,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    logger: StructuredLogger,
}

impl GlowBridge {
    /// Load configuration from the default locations, set up logging, then
    /// build the bridge
    pub async fn from_env() -> Result<Self> {
        let config = Config::load().map_err(|e| {
            eprintln!("Failed to load configuration: {}", e);
            e
        })?;
        crate::logging::init_logging(&config.logging)?;
        Self::new(config).await
    }

    pub async fn new(config: Config) -> Result<Self> {
        let logger = get_logger("bridge");
        config.validate()?;
        let tz = config.tz()?;
        let cutoff = config.yesterday_cutoff()?;

        let client = GlowClient::from_config(&config.glowmarkt)?;
        let store = PersistenceManager::open(&config.state_file)?;
        let credential = Credential::new(
            &config.glowmarkt.application_id,
            &config.glowmarkt.username,
            &config.glowmarkt.password,
        );
        let auth = Arc::new(AuthController::new(client, credential, Box::new(store)));

        auth.begin_cycle();
        let resources = auth.list_resources().await?;
        logger.info(&format!("Found {} resources", resources.len()));

        let mut scheduler = Scheduler::new(
            auth.clone(),
            RefreshPolicy::new(config.polling.refresh_windows.clone()),
            tz,
            cutoff,
            config.gas.clone(),
        );
        scheduler.setup(&resources);

        let router = MeterRouter::new();
        for resource in resources.iter().filter(|r| r.is_consumption()) {
            router.register(&resource.classifier);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            config,
            auth,
            scheduler,
            router,
            shutdown_tx,
            shutdown_rx,
            logger,
        })
    }

    /// Flip to `true` to stop [`GlowBridge::run`]
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    pub fn auth(&self) -> &Arc<AuthController> {
        &self.auth
    }

    pub fn router(&self) -> &MeterRouter {
        &self.router
    }

    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting update loop");
        let mqtt_task = self.spawn_live_feed().await;

        let mut poll_interval = interval(Duration::from_secs(self.config.polling.interval_secs));
        let mut shutdown = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    let snapshots = self.scheduler.run_cycle(Utc::now()).await;
                    self.report(&snapshots);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.logger.info("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        if let Some(task) = mqtt_task
            && let Err(e) = task.await
        {
            self.logger
                .warn(&format!("MQTT task ended abnormally: {}", e));
        }
        self.logger.info("Bridge shutdown complete");
        Ok(())
    }

    fn report(&self, snapshots: &[SensorSnapshot]) {
        for s in snapshots {
            let logger = self.logger.for_resource(&s.device_id);
            match (s.available, s.value) {
                (false, _) => logger.warn(&format!("{}: unavailable", s.name)),
                (true, Some(v)) => logger.info(&format!("{}: {} {}", s.name, v, s.unit)),
                (true, None) => logger.debug(&format!("{}: no value yet", s.name)),
            }
        }
        for classifier in [crate::mqtt::ELECTRICITY_CLASSIFIER, crate::mqtt::GAS_CLASSIFIER] {
            if let Some(live) = self.router.latest(classifier) {
                self.logger.info(&format!(
                    "{} live: cumulative={:?} demand={:?} at {}",
                    classifier,
                    live.cumulative,
                    live.demand,
                    live.received_at.to_rfc3339()
                ));
            }
        }
    }

    #[cfg(feature = "mqtt")]
    async fn spawn_live_feed(&self) -> Option<JoinHandle<()>> {
        if !self.config.mqtt.enabled {
            return None;
        }

        self.auth.begin_cycle();
        let hardware_id = match self.auth.find_cad_hardware_id().await {
            Ok(Some(id)) => id,
            Ok(None) => {
                self.logger
                    .warn("No consumer access device registered, live feed disabled");
                return None;
            }
            Err(e) => {
                self.logger
                    .error(&format!("Could not look up the CAD: {}", e));
                return None;
            }
        };

        let subscriber = crate::mqtt::MqttSubscriber::new(
            &self.config.mqtt,
            &self.config.glowmarkt.username,
            &self.config.glowmarkt.password,
            &hardware_id,
            self.router.clone(),
        );
        let shutdown = self.shutdown_rx.clone();
        let logger = self.logger.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = subscriber.run(shutdown).await {
                logger.error(&format!("MQTT subscriber failed: {}", e));
            }
        }))
    }

    #[cfg(not(feature = "mqtt"))]
    async fn spawn_live_feed(&self) -> Option<JoinHandle<()>> {
        if self.config.mqtt.enabled {
            self.logger
                .warn("MQTT is enabled but this build has no mqtt support");
        }
        None
    }
}
