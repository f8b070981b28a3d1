use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde_json::json;

use crate::config::GlowmarktConfig;
use crate::error::{GlowError, Result};
use crate::logging::{StructuredLogger, get_logger};

use super::CAD_DEVICE_TYPE_ID;
use super::types::{
    AuthResponse, Credential, CurrentResponse, CurrentUsage, Device, ErrorBody, Reading,
    ReadingsResponse, Resource, ResourceDescriptor, TariffPlan, TariffResponse, Unit,
    UsageOutcome,
};
use super::window::DailyWindow;

const APPLICATION_ID_HEADER: &str = "applicationId";
const TOKEN_HEADER: &str = "token";

/// Glowmarkt REST client
///
/// Stateless apart from the HTTP connection pool; the caller supplies the
/// bearer token on every request.
#[derive(Debug, Clone)]
pub struct GlowClient {
    base_url: String,
    application_id: String,
    http: reqwest::Client,
    logger: StructuredLogger,
}

impl GlowClient {
    /// Create a client with the given per-request timeout
    pub fn new(base_url: &str, application_id: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GlowError::config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            application_id: application_id.to_string(),
            http,
            logger: get_logger("glowmarkt"),
        })
    }

    pub fn from_config(cfg: &GlowmarktConfig) -> Result<Self> {
        Self::new(
            &cfg.base_url,
            &cfg.application_id,
            Duration::from_secs(cfg.request_timeout_secs),
        )
    }

    fn user_agent() -> String {
        format!("glowmarkt-bridge/{}", env!("APP_VERSION"))
    }

    fn get(&self, token: &str, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .header(APPLICATION_ID_HEADER, &self.application_id)
            .header(TOKEN_HEADER, token)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, Self::user_agent())
    }

    /// Exchange username and password for a bearer token
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Credential> {
        let resp = self
            .http
            .post(format!("{}/auth", self.base_url))
            .header(APPLICATION_ID_HEADER, &self.application_id)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, Self::user_agent())
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        let parsed: AuthResponse = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(_) if status.is_server_error() => {
                return Err(GlowError::api(status.as_u16(), "Authentication endpoint failed"));
            }
            Err(_) => return Err(GlowError::invalid_auth(format!("Unexpected auth response ({})", status))),
        };

        let token = match (parsed.valid, parsed.token) {
            (true, Some(token)) if !token.is_empty() => token,
            _ => {
                self.logger.warn("Glowmarkt rejected the supplied credentials");
                return Err(GlowError::invalid_auth("Credentials rejected"));
            }
        };

        let mut credential = Credential::new(&self.application_id, username, password);
        credential.token = Some(token);
        credential.expiry = parsed.exp.and_then(|e| Utc.timestamp_opt(e, 0).single());
        self.logger.info(&format!(
            "Authenticated, token valid until {}",
            credential
                .expiry
                .map(|e| e.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string())
        ));
        Ok(credential)
    }

    /// All resources visible to the account
    pub async fn list_resources(&self, token: &str) -> Result<Vec<Resource>> {
        let resp = self.get(token, "/resource").send().await?;
        if resp.status() != StatusCode::OK {
            return Err(GlowError::invalid_auth(format!(
                "Resource listing refused ({})",
                resp.status()
            )));
        }
        let descriptors: Vec<ResourceDescriptor> = resp.json().await?;
        let resources: Vec<Resource> = descriptors.into_iter().map(Resource::from).collect();
        self.logger
            .debug(&format!("Discovered {} resources", resources.len()));
        Ok(resources)
    }

    /// All devices registered to the account
    pub async fn list_devices(&self, token: &str) -> Result<Vec<Device>> {
        let resp = self.get(token, "/device").send().await?;
        if resp.status() != StatusCode::OK {
            return Err(GlowError::invalid_auth(format!(
                "Device listing refused ({})",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    /// Hardware id of the consumer access device, used in the MQTT topic
    pub async fn find_cad_hardware_id(&self, token: &str) -> Result<Option<String>> {
        let devices = self.list_devices(token).await?;
        Ok(devices
            .into_iter()
            .find(|d| d.device_type_id == CAD_DEVICE_TYPE_ID)
            .and_then(|d| d.hardware_id))
    }

    /// Ask the DCC-sourced resource to pull fresh data from the meter
    pub async fn catchup(&self, token: &str, resource_id: &str) -> Result<()> {
        let resp = self
            .get(token, &format!("/resource/{}/catchup", resource_id))
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }

    /// Daily total over `window`
    pub async fn readings(
        &self,
        token: &str,
        resource: &Resource,
        window: &DailyWindow,
    ) -> Result<UsageOutcome> {
        let resp = self
            .get(token, &format!("/resource/{}/readings", resource.id))
            .query(&[
                ("from", window.from_param()),
                ("to", window.to_param()),
                ("period", "P1D".to_string()),
                ("offset", window.offset_minutes.to_string()),
                ("function", "sum".to_string()),
                ("nulls", "1".to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if status != StatusCode::OK {
            if is_future_window(&body) {
                self.logger.debug(&format!(
                    "No data yet for {} from {}",
                    resource.classifier,
                    window.from_param()
                ));
                return Ok(UsageOutcome::NoDataYet);
            }
            return Err(classify_failure(status, &body));
        }

        let parsed: ReadingsResponse = serde_json::from_str(&body)?;
        let values: Vec<f64> = parsed.data.iter().filter_map(|(_, v)| *v).collect();
        if values.is_empty() {
            return Ok(UsageOutcome::NoDataYet);
        }

        let unit = parsed
            .units
            .as_deref()
            .and_then(Unit::from_label)
            .unwrap_or(if resource.is_cost() {
                Unit::Pence
            } else {
                Unit::KilowattHours
            });

        Ok(UsageOutcome::Reading(Reading {
            value: values.iter().sum(),
            unit,
            window: window.clone(),
        }))
    }

    /// Catch-up followed by the readings query, strictly in that order
    pub async fn get_usage(
        &self,
        token: &str,
        resource: &Resource,
        window: &DailyWindow,
    ) -> Result<UsageOutcome> {
        match self.catchup(token, &resource.id).await {
            Ok(()) => {}
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                // Readings may still be served from what was already collected
                self.logger
                    .warn(&format!("Catch-up for {} failed: {}", resource.classifier, e));
            }
        }
        self.readings(token, resource, window).await
    }

    /// Current tariff, `None` when the resource has none configured
    pub async fn get_tariff(&self, token: &str, resource: &Resource) -> Result<Option<TariffPlan>> {
        let resp = self
            .get(token, &format!("/resource/{}/tariff", resource.id))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if status != StatusCode::OK {
            return Err(classify_failure(status, &body));
        }

        let parsed: TariffResponse = serde_json::from_str(&body)?;
        let plan = parsed.data.into_iter().rev().find_map(|entry| {
            entry.current_rates.map(|rates| TariffPlan {
                name: entry.name,
                standing_charge: rates.standing_charge,
                rate: rates.rate,
                valid_from: entry.from,
            })
        });
        if plan.is_none() {
            self.logger
                .debug(&format!("No tariff data for {}", resource.classifier));
        }
        Ok(plan)
    }

    /// Latest instantaneous value reported for the resource
    pub async fn current_usage(&self, token: &str, resource: &Resource) -> Result<Option<CurrentUsage>> {
        let resp = self
            .get(token, &format!("/resource/{}/current", resource.id))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if status != StatusCode::OK {
            return Err(classify_failure(status, &body));
        }
        let parsed: CurrentResponse = serde_json::from_str(&body)?;
        Ok(parsed.data.last().and_then(|(ts, value)| {
            let value = (*value)?;
            let timestamp: DateTime<Utc> = Utc.timestamp_opt(*ts, 0).single()?;
            Some(CurrentUsage {
                value,
                units: parsed.units.clone(),
                timestamp,
            })
        }))
    }
}

/// Map a non-success response to the error taxonomy
fn classify_failure(status: StatusCode, body: &str) -> GlowError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND {
        return GlowError::invalid_auth(format!("Token rejected ({})", status));
    }
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    GlowError::api(status.as_u16(), message)
}

fn is_future_window(body: &str) -> bool {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .is_some_and(|e| e.to_lowercase().contains("in the future"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_401_and_404_as_auth() {
        assert!(classify_failure(StatusCode::UNAUTHORIZED, "").is_auth());
        assert!(classify_failure(StatusCode::NOT_FOUND, "").is_auth());
        let e = classify_failure(StatusCode::BAD_GATEWAY, r#"{"error":"upstream"}"#);
        assert!(matches!(e, GlowError::Api { status: 502, ref message } if message == "upstream"));
    }

    #[test]
    fn detects_future_window_error() {
        assert!(is_future_window(
            r#"{"error":"incorrect elements -from in the future"}"#
        ));
        assert!(!is_future_window(r#"{"error":"bad period"}"#));
        assert!(!is_future_window("not json"));
    }
}
