//! Token manager: hands out usable access tokens, refreshing as needed

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::oauth::{refresh_grant, TokenGrant};
use super::{
    AccessToken, AuthError, Clock, CredentialStore, PersistedTokenRecord,
    ServiceCredentialConfig, SystemClock,
};

/// Owns the access-token lifecycle of every service sharing one store.
///
/// Refreshes for the same service id are serialized so two callers never
/// persist divergent tokens; different services proceed independently.
pub struct TokenManager {
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn CredentialStore>, http: reqwest::Client) -> Self {
        Self::with_clock(store, http, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn CredentialStore>,
        http: reqwest::Client,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            http,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn service_lock(&self, service_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(service_id.to_string())
            .or_default()
            .clone()
    }

    /// Persisted token for a service; store failures count as "nothing cached".
    pub fn stored_token(&self, service_id: &str) -> Option<AccessToken> {
        match self.store.load(service_id) {
            Ok(record) => record.map(AccessToken::from),
            Err(e) => {
                tracing::warn!("Failed to load token for {}: {}", service_id, e);
                None
            }
        }
    }

    /// Return a token that is not inside its refresh window, refreshing
    /// (or bootstrapping from the configured refresh token) when needed.
    pub async fn get_valid_token(
        &self,
        config: &ServiceCredentialConfig,
    ) -> Result<AccessToken, AuthError> {
        let lock = self.service_lock(&config.service_id);
        let _guard = lock.lock().await;

        match self.stored_token(&config.service_id) {
            Some(token) if !token.should_refresh(self.clock.now()) => Ok(token),
            Some(token) => {
                tracing::info!("Access token for {} is expiring, refreshing", config.service_id);
                self.refresh(config, &token.refresh_token, Some(&token))
                    .await
            }
            None => {
                tracing::warn!(
                    "No saved access token for {}. Using initial refresh token.",
                    config.service_id
                );
                self.refresh(config, &config.initial_refresh_token, None)
                    .await
            }
        }
    }

    /// Replace a token the resource server rejected, ignoring its expiry.
    ///
    /// If another caller already replaced `rejected` with a token that is
    /// still fresh, that token is returned without contacting the server.
    pub async fn force_refresh(
        &self,
        config: &ServiceCredentialConfig,
        rejected: &AccessToken,
    ) -> Result<AccessToken, AuthError> {
        let lock = self.service_lock(&config.service_id);
        let _guard = lock.lock().await;

        let stored = self.stored_token(&config.service_id);
        if let Some(token) = &stored {
            if token.value != rejected.value && !token.should_refresh(self.clock.now()) {
                tracing::debug!("Token for {} was already replaced", config.service_id);
                return Ok(token.clone());
            }
        }

        tracing::warn!("Authentication failed for {}. Refreshing access token.", config.service_id);
        let current = stored.unwrap_or_else(|| rejected.clone());
        self.refresh(config, &current.refresh_token, Some(&current))
            .await
    }

    /// Run the refresh grant, stamp and persist the result. Caller holds the
    /// service lock.
    async fn refresh(
        &self,
        config: &ServiceCredentialConfig,
        refresh_token: &str,
        current: Option<&AccessToken>,
    ) -> Result<AccessToken, AuthError> {
        let grant = refresh_grant(&self.http, config, refresh_token, current, self.clock.now())
            .await
            .inspect_err(|e| {
                tracing::error!("Token refresh for {} failed: {}", config.service_id, e);
            })?;

        let token = self.accept(grant, refresh_token, current);
        if let Err(e) = self
            .store
            .save(&config.service_id, &PersistedTokenRecord::from(&token))
        {
            tracing::error!("Failed to save token for {}: {}", config.service_id, e);
        }
        tracing::info!("Access token for {} refreshed", config.service_id);
        Ok(token)
    }

    /// Turn a grant into a token issued now. Fields the server did not
    /// return carry over from the token being replaced.
    fn accept(
        &self,
        grant: TokenGrant,
        refresh_token: &str,
        current: Option<&AccessToken>,
    ) -> AccessToken {
        AccessToken {
            value: grant.access_token,
            refresh_token: grant
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
            secret: grant
                .token_secret
                .or_else(|| current.map(|t| t.secret.clone()))
                .unwrap_or_default(),
            expires_in: grant.expires_in.unwrap_or_default(),
            issued_at: self.clock.now(),
        }
    }
}
