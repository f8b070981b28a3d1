//! Token lifecycle shared by every feed
//!
//! All feeds read the same [`Credential`]. When a request comes back with
//! `InvalidAuth` the caller asks for a refresh quoting the generation it
//! observed; concurrent callers are funnelled through one mutex and only the
//! first one actually talks to `/auth`. A refresh that itself fails with
//! `InvalidAuth` is not retried again until [`AuthController::begin_cycle`].

use std::future::Future;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::error::{GlowError, Result};
use crate::glowmarkt::{
    Credential, CurrentUsage, DailyWindow, GlowClient, Resource, TariffPlan, UsageOutcome,
};
use crate::logging::{StructuredLogger, get_logger};
use crate::persistence::{ConfigStore, TOKEN_EXPIRY_KEY, TOKEN_KEY};
use crate::scheduler::MeterApi;

struct AuthState {
    credential: Credential,
    generation: u64,
}

/// Token as seen by one caller
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    pub token: String,
    pub generation: u64,
}

pub struct AuthController {
    client: GlowClient,
    state: RwLock<AuthState>,
    refresh_lock: Mutex<()>,
    store: StdMutex<Box<dyn ConfigStore>>,
    failed_this_cycle: AtomicBool,
    refresh_count: AtomicU64,
    logger: StructuredLogger,
}

impl AuthController {
    /// Build a controller; a token persisted in `store` is reused when the
    /// credential carries none.
    pub fn new(client: GlowClient, mut credential: Credential, store: Box<dyn ConfigStore>) -> Self {
        let logger = get_logger("auth");
        if credential.token.is_none()
            && let Some(Value::String(token)) = store.get(TOKEN_KEY)
            && !token.is_empty()
        {
            credential.token = Some(token);
            credential.expiry = store
                .get(TOKEN_EXPIRY_KEY)
                .and_then(|v| v.as_str().map(str::to_string))
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|d| d.with_timezone(&Utc));
            logger.info("Restored persisted token");
        }

        Self {
            client,
            state: RwLock::new(AuthState {
                credential,
                generation: 0,
            }),
            refresh_lock: Mutex::new(()),
            store: StdMutex::new(store),
            failed_this_cycle: AtomicBool::new(false),
            refresh_count: AtomicU64::new(0),
            logger,
        }
    }

    pub fn client(&self) -> &GlowClient {
        &self.client
    }

    /// Clear the per-cycle re-auth failure latch
    pub fn begin_cycle(&self) {
        self.failed_this_cycle.store(false, Ordering::SeqCst);
    }

    /// Number of successful calls to `/auth`
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    /// Copy of the current credential
    pub async fn credential(&self) -> Credential {
        self.state.read().await.credential.clone()
    }

    /// Current token, authenticating first when there is none or it expired
    pub async fn token(&self) -> Result<TokenSnapshot> {
        let generation = {
            let state = self.state.read().await;
            if !state.credential.is_expired(Utc::now())
                && let Some(token) = &state.credential.token
            {
                return Ok(TokenSnapshot {
                    token: token.clone(),
                    generation: state.generation,
                });
            }
            state.generation
        };

        self.logger.debug("Token missing or expired, authenticating");
        self.refresh(generation).await?;
        self.current_token().await
    }

    async fn current_token(&self) -> Result<TokenSnapshot> {
        let state = self.state.read().await;
        state
            .credential
            .token
            .clone()
            .map(|token| TokenSnapshot {
                token,
                generation: state.generation,
            })
            .ok_or_else(|| GlowError::invalid_auth("No token available"))
    }

    /// Re-authenticate unless someone already did since `observed_generation`
    pub async fn refresh(&self, observed_generation: u64) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        let (username, password) = {
            let state = self.state.read().await;
            if state.generation != observed_generation && state.credential.token.is_some() {
                return Ok(());
            }
            (
                state.credential.username.clone(),
                state.credential.password.clone(),
            )
        };

        if self.failed_this_cycle.load(Ordering::SeqCst) {
            return Err(GlowError::invalid_auth(
                "Re-authentication already failed this cycle",
            ));
        }

        let fresh = match self.client.authenticate(&username, &password).await {
            Ok(c) => c,
            Err(e) => {
                if e.is_auth() {
                    self.failed_this_cycle.store(true, Ordering::SeqCst);
                }
                self.logger.error(&format!("Re-authentication failed: {}", e));
                return Err(e);
            }
        };

        {
            let mut state = self.state.write().await;
            state.credential.token = fresh.token.clone();
            state.credential.expiry = fresh.expiry;
            state.generation += 1;
        }
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        self.persist(&fresh);
        Ok(())
    }

    fn persist(&self, credential: &Credential) {
        let Ok(mut store) = self.store.lock() else {
            self.logger.warn("Token store lock poisoned, not persisting");
            return;
        };
        let token = credential.token.clone().unwrap_or_default();
        let expiry = credential
            .expiry
            .map(|e| Value::String(e.to_rfc3339()))
            .unwrap_or(Value::Null);
        if let Err(e) = store
            .set(TOKEN_KEY, Value::String(token))
            .and_then(|()| store.set(TOKEN_EXPIRY_KEY, expiry))
        {
            self.logger.warn(&format!("Failed to persist token: {}", e));
        }
    }

    /// Run `op` with the current token; on `InvalidAuth` refresh once and
    /// retry. A second `InvalidAuth` is returned to the caller.
    pub async fn with_auth<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let snapshot = self.token().await?;
        match op(snapshot.token).await {
            Err(e) if e.is_auth() => {
                self.logger.info("Token rejected, re-authenticating");
                self.refresh(snapshot.generation).await?;
                let retry = self.current_token().await?;
                let result = op(retry.token).await;
                if matches!(&result, Err(e) if e.is_auth()) {
                    // Fresh token rejected too; stop other feeds re-authenticating
                    self.failed_this_cycle.store(true, Ordering::SeqCst);
                }
                result
            }
            other => other,
        }
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        self.with_auth(|token| async move { self.client.list_resources(&token).await })
            .await
    }

    pub async fn find_cad_hardware_id(&self) -> Result<Option<String>> {
        self.with_auth(|token| async move { self.client.find_cad_hardware_id(&token).await })
            .await
    }
}

#[async_trait::async_trait]
impl MeterApi for AuthController {
    fn begin_cycle(&self) {
        AuthController::begin_cycle(self);
    }

    async fn usage(&self, resource: &Resource, window: &DailyWindow) -> Result<UsageOutcome> {
        self.with_auth(|token| async move { self.client.get_usage(&token, resource, window).await })
            .await
    }

    async fn tariff(&self, resource: &Resource) -> Result<Option<TariffPlan>> {
        self.with_auth(|token| async move { self.client.get_tariff(&token, resource).await })
            .await
    }

    async fn current(&self, resource: &Resource) -> Result<Option<CurrentUsage>> {
        self.with_auth(|token| async move { self.client.current_usage(&token, resource).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use std::time::Duration;

    fn client() -> GlowClient {
        GlowClient::new("http://127.0.0.1:9", "app", Duration::from_millis(200)).unwrap()
    }

    #[tokio::test]
    async fn restores_persisted_token() {
        let mut store = MemoryStore::new();
        store.set(TOKEN_KEY, Value::String("persisted".into())).unwrap();
        store
            .set(
                TOKEN_EXPIRY_KEY,
                Value::String("2099-01-01T00:00:00+00:00".into()),
            )
            .unwrap();
        let auth = AuthController::new(
            client(),
            Credential::new("app", "u", "p"),
            Box::new(store),
        );
        let snap = auth.token().await.unwrap();
        assert_eq!(snap.token, "persisted");
        assert_eq!(snap.generation, 0);
    }

    #[tokio::test]
    async fn stale_generation_refresh_is_a_no_op() {
        let mut credential = Credential::new("app", "u", "p");
        credential.token = Some("t".into());
        let auth = AuthController::new(client(), credential, Box::new(MemoryStore::new()));
        auth.state.write().await.generation = 3;
        // Unreachable server: would fail if it tried to authenticate
        auth.refresh(2).await.unwrap();
        assert_eq!(auth.refresh_count(), 0);
    }

    #[tokio::test]
    async fn failed_cycle_latch_blocks_until_next_cycle() {
        let auth = AuthController::new(
            client(),
            Credential::new("app", "u", "p"),
            Box::new(MemoryStore::new()),
        );
        auth.failed_this_cycle.store(true, Ordering::SeqCst);
        assert!(auth.refresh(0).await.unwrap_err().is_auth());
        auth.begin_cycle();
        // Now it really tries, and the closed port surfaces as a connect error
        let err = auth.refresh(0).await.unwrap_err();
        assert!(err.is_transient());
    }
}
