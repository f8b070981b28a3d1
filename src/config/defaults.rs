use super::*;

/// Application id registered for this integration with Hildebrand
pub const DEFAULT_APPLICATION_ID: &str = "b0f1b774-a586-4f72-9edd-27ead8aa7a8d";

pub const DEFAULT_VOLUME_CORRECTION: f64 = 1.022640;
pub const DEFAULT_CALORIFIC_VALUE: f64 = 39.9;

impl Default for GlowmarktConfig {
    fn default() -> Self {
        Self {
            base_url: crate::glowmarkt::DEFAULT_BASE_URL.to_string(),
            application_id: DEFAULT_APPLICATION_ID.to_string(),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            volume_correction: DEFAULT_VOLUME_CORRECTION,
            calorific_value: DEFAULT_CALORIFIC_VALUE,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            refresh_windows: vec![
                RefreshWindow {
                    start_minute: 0,
                    end_minute: 5,
                },
                RefreshWindow {
                    start_minute: 30,
                    end_minute: 35,
                },
            ],
            // Gas data can trail electricity by half an hour
            yesterday_cutoff: "01:05".to_string(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "glowmqtt.energyhive.com".to_string(),
            port: 1883,
            topic_template: "SMART/HILD/{hardwareId}".to_string(),
            keep_alive_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/glowmarkt.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            glowmarkt: GlowmarktConfig::default(),
            gas: GasConfig::default(),
            polling: PollingConfig::default(),
            mqtt: MqttConfig::default(),
            logging: LoggingConfig::default(),
            timezone: "Europe/London".to_string(),
            state_file: "glowmarkt_state.json".to_string(),
        }
    }
}
