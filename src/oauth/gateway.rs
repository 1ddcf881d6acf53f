use chrono::Duration;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::Clock;
use crate::config::Config;
use crate::db::models::{IntegrationRow, IntegrationStatus};
use crate::db::store::Storage;
use crate::error::ScopeError;
use crate::oauth::credential::{Credential, DEFAULT_EXPIRES_SECS, TokenSet};
use crate::oauth::endpoints::{OauthClientSettings, OauthEndpoints};
use crate::providers::Provider;

/// Settings-table key holding the operator's OAuth client.
pub const GOOGLE_OAUTH_SETTINGS_KEY: &str = "google_oauth_client";

/// A bearer credential good for one upstream call, plus the integration row
/// it was resolved through so callers can read sibling config fields
/// (selected property/customer/location ids) without a second fetch.
#[derive(Debug)]
pub struct AccessGrant {
    pub access_token: String,
    pub integration: IntegrationRow,
}

/// Produces a currently-valid bearer token for `(site, provider)`,
/// transparently refreshing and persisting when the stored token is near
/// expiry. Linked providers resolve through their anchor first.
///
/// Concurrent calls may both observe a near-expiry token and both refresh;
/// the later write wins and the loser self-heals on its next call. Not
/// guarded by a lock.
pub struct TokenGateway {
    store: Storage,
    http: reqwest::Client,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
}

impl TokenGateway {
    pub fn new(
        store: Storage,
        http: reqwest::Client,
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            http,
            config,
            clock,
        }
    }

    /// Load the operator OAuth client, or tell the caller the operator has
    /// to act (distinct from "the user has to act").
    pub async fn oauth_settings(&self) -> Result<OauthClientSettings, ScopeError> {
        self.store
            .get_setting(GOOGLE_OAUTH_SETTINGS_KEY)
            .await?
            .ok_or(ScopeError::OAuthNotConfigured)
    }

    /// Resolve a usable access token for the given site and provider.
    ///
    /// At most one persistence write happens per call, and only when a
    /// refresh actually occurred. Safe to call repeatedly.
    pub async fn access(
        &self,
        site_id: &str,
        provider: Provider,
    ) -> Result<AccessGrant, ScopeError> {
        let requested = self
            .store
            .get_integration(site_id, provider)
            .await?
            .ok_or(ScopeError::NotConnected(provider))?;

        let (anchor_provider, anchor_row) = match requested.credential() {
            Some(Credential::Owned { .. }) => (provider, requested.clone()),
            Some(Credential::Linked { anchor }) => {
                let row = self
                    .store
                    .get_integration(site_id, anchor)
                    .await?
                    .ok_or(ScopeError::NotConnected(anchor))?;
                (anchor, row)
            }
            None => return Err(ScopeError::NotConnected(provider)),
        };

        let Some(Credential::Owned { token_set }) = anchor_row.credential() else {
            return Err(ScopeError::NotConnected(anchor_provider));
        };

        let now = self.clock.now();
        let token_set = if token_set.needs_refresh(now) {
            self.refresh_and_persist(site_id, anchor_provider, &anchor_row, token_set)
                .await?
        } else {
            token_set
        };

        if token_set.access_token.is_empty() {
            return Err(ScopeError::TokenMissing);
        }

        Ok(AccessGrant {
            access_token: token_set.access_token,
            integration: requested,
        })
    }

    async fn refresh_and_persist(
        &self,
        site_id: &str,
        anchor_provider: Provider,
        anchor_row: &IntegrationRow,
        mut token_set: TokenSet,
    ) -> Result<TokenSet, ScopeError> {
        let settings = self.oauth_settings().await?;
        let refresh_token = token_set
            .refresh_token
            .clone()
            .ok_or(ScopeError::TokenMissing)?;

        let exchange = OauthEndpoints::refresh_access_token(
            &settings,
            &self.config.google_auth_uri,
            &self.config.google_token_uri,
            &refresh_token,
            &self.http,
        )
        .await;

        let now = self.clock.now();
        match exchange {
            Ok(fresh) => {
                token_set.access_token = fresh.access_token;
                // Providers do not always reissue a refresh token; keep the
                // one we have unless a new one arrived.
                if let Some(new_refresh) = fresh.refresh_token {
                    token_set.refresh_token = Some(new_refresh);
                }
                let lifetime = fresh
                    .expires_in
                    .map(|d| Duration::seconds(d.as_secs() as i64))
                    .unwrap_or_else(|| Duration::seconds(DEFAULT_EXPIRES_SECS));
                token_set.expires_at = now + lifetime;
                if let Some(scope) = fresh.scope {
                    token_set.scope = Some(scope);
                }
                token_set.last_error = None;

                self.persist_token_set(
                    site_id,
                    anchor_provider,
                    anchor_row,
                    &token_set,
                    IntegrationStatus::Connected,
                )
                .await?;
                info!(site = %site_id, provider = %anchor_provider, "access token refreshed");
                Ok(token_set)
            }
            Err(e) => {
                let detail = e.to_string();
                warn!(site = %site_id, provider = %anchor_provider, error = %detail, "token refresh failed");
                token_set.last_error = Some(detail.clone());
                // Surface the failure on the row so status queries show it;
                // the user must reconnect if refresh keeps failing.
                self.persist_token_set(
                    site_id,
                    anchor_provider,
                    anchor_row,
                    &token_set,
                    IntegrationStatus::Error,
                )
                .await?;
                Err(ScopeError::RefreshFailed(detail))
            }
        }
    }

    async fn persist_token_set(
        &self,
        site_id: &str,
        anchor_provider: Provider,
        anchor_row: &IntegrationRow,
        token_set: &TokenSet,
        status: IntegrationStatus,
    ) -> Result<(), ScopeError> {
        let mut config = anchor_row.config.clone();
        config["credential"] = serde_json::to_value(Credential::Owned {
            token_set: token_set.clone(),
        })?;
        self.store
            .update_integration(site_id, anchor_provider, status, &config)
            .await
    }
}
