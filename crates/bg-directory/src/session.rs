//! Service session lifecycle against the identity provider.
//!
//! The manager owns exactly one [`Session`]. Callers obtain it through
//! [`TokenLifecycleManager::valid_session`], which holds the session lock for
//! the whole check/refresh/re-authenticate protocol so concurrent callers
//! queue behind one renewal instead of racing their own.

use std::sync::Arc;

use bg_core::Clock;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{DirectoryError, DirectoryResult};
use crate::provider::{ClientCredentials, IdentityProvider, TokenGrant};

/// Seconds shaved off token lifetimes before they are considered used up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionThresholds {
    /// Premature access threshold.
    pub access_secs: i64,
    /// Premature refresh threshold.
    pub refresh_secs: i64,
}

impl SessionThresholds {
    /// Creates thresholds.
    #[must_use]
    pub const fn new(access_secs: i64, refresh_secs: i64) -> Self {
        Self {
            access_secs,
            refresh_secs,
        }
    }
}

impl From<&bg_core::config::SessionConfig> for SessionThresholds {
    fn from(config: &bg_core::config::SessionConfig) -> Self {
        Self::new(
            config.premature_access_threshold_secs,
            config.premature_refresh_threshold_secs,
        )
    }
}

/// An authenticated service session.
///
/// Replaced wholesale on every renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// When the request that produced this session was started.
    pub issued_at: DateTime<Utc>,
    /// Access token lifetime in seconds.
    pub access_lifetime_secs: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_lifetime_secs: i64,
}

impl Session {
    fn from_grant(grant: TokenGrant, issued_at: DateTime<Utc>) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            issued_at,
            access_lifetime_secs: grant.expires_in,
            refresh_lifetime_secs: grant.refresh_expires_in,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    session: Option<Session>,
    last_request: Option<DateTime<Utc>>,
}

/// Keeps a usable session against the identity provider.
pub struct TokenLifecycleManager {
    provider: Arc<dyn IdentityProvider>,
    credentials: ClientCredentials,
    thresholds: SessionThresholds,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
}

impl TokenLifecycleManager {
    /// Creates a manager with no session; the first call authenticates.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        credentials: ClientCredentials,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            credentials,
            thresholds: SessionThresholds::default(),
            clock,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Sets the premature expiry thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: SessionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Returns a session whose access token is usable right now.
    ///
    /// The current access token is reused while it is inside its (shortened)
    /// lifetime and the provider still reports it active. Otherwise the
    /// refresh token is used while inside its lifetime, and failing that a
    /// full client-credentials login is performed.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::AuthProviderUnavailable`] when neither
    /// refresh nor re-authentication succeeds.
    pub async fn valid_session(&self) -> DirectoryResult<Session> {
        let mut state = self.state.lock().await;

        if let (Some(session), Some(last_request)) = (state.session.clone(), state.last_request) {
            let elapsed = (self.clock.now() - last_request).num_seconds();

            if elapsed < session.access_lifetime_secs - self.thresholds.access_secs {
                match self
                    .provider
                    .introspect(&self.credentials, &session.access_token)
                    .await
                {
                    Ok(true) => return Ok(session),
                    Ok(false) => tracing::debug!("access token no longer active"),
                    Err(e) => tracing::warn!(error = %e, "access token introspection failed"),
                }
            }

            if elapsed < session.refresh_lifetime_secs - self.thresholds.refresh_secs {
                let stamp = self.clock.now();
                state.last_request = Some(stamp);
                match self
                    .provider
                    .refresh(&self.credentials, &session.refresh_token)
                    .await
                {
                    Ok(grant) => {
                        tracing::debug!("service session refreshed");
                        let renewed = Session::from_grant(grant, stamp);
                        state.session = Some(renewed.clone());
                        return Ok(renewed);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "session refresh failed, re-authenticating");
                    }
                }
            }
        }

        self.authenticate_locked(&mut state).await
    }

    /// Returns the access token of a valid session.
    ///
    /// # Errors
    ///
    /// See [`Self::valid_session`].
    pub async fn access_token(&self) -> DirectoryResult<String> {
        Ok(self.valid_session().await?.access_token)
    }

    /// Authenticates and confirms the provider accepts the fresh token.
    ///
    /// Used at startup so a misconfigured provider fails the process early.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::AuthProviderUnavailable`] if login fails or
    /// the new token is not reported active.
    pub async fn probe(&self) -> DirectoryResult<()> {
        let session = {
            let mut state = self.state.lock().await;
            self.authenticate_locked(&mut state).await?
        };

        let active = self
            .provider
            .introspect(&self.credentials, &session.access_token)
            .await
            .map_err(|e| DirectoryError::AuthProviderUnavailable(e.to_string()))?;
        if !active {
            return Err(DirectoryError::AuthProviderUnavailable(
                "freshly issued access token is not active".to_string(),
            ));
        }

        tracing::info!(realm = %self.credentials.realm, "identity provider session established");
        Ok(())
    }

    async fn authenticate_locked(&self, state: &mut SessionState) -> DirectoryResult<Session> {
        let stamp = self.clock.now();
        state.last_request = Some(stamp);

        match self.provider.authenticate(&self.credentials).await {
            Ok(grant) => {
                tracing::debug!(realm = %self.credentials.realm, "service client authenticated");
                let session = Session::from_grant(grant, stamp);
                state.session = Some(session.clone());
                Ok(session)
            }
            Err(e) => {
                state.session = None;
                tracing::error!(error = %e, "identity provider authentication failed");
                Err(DirectoryError::AuthProviderUnavailable(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryIdentityProvider;
    use bg_core::ManualClock;

    fn setup(
        access: i64,
        refresh: i64,
    ) -> (
        Arc<InMemoryIdentityProvider>,
        Arc<ManualClock>,
        Arc<TokenLifecycleManager>,
    ) {
        let provider =
            Arc::new(InMemoryIdentityProvider::new().with_token_lifetimes(access, refresh));
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        let manager = Arc::new(TokenLifecycleManager::new(
            provider.clone(),
            ClientCredentials::new("breakglass", "secret", "master"),
            clock.clone(),
        ));
        (provider, clock, manager)
    }

    #[tokio::test]
    async fn first_call_authenticates_and_second_reuses() {
        let (provider, clock, manager) = setup(60, 1800);

        let first = manager.valid_session().await.unwrap();
        clock.advance_secs(30);
        let second = manager.valid_session().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.authenticate_calls(), 1);
        assert_eq!(provider.refresh_calls(), 0);
        assert_eq!(provider.introspect_calls(), 1);
    }

    #[tokio::test]
    async fn expired_access_is_refreshed() {
        let (provider, clock, manager) = setup(60, 1800);

        let first = manager.valid_session().await.unwrap();
        clock.advance_secs(60);
        let second = manager.valid_session().await.unwrap();

        assert_ne!(first.access_token, second.access_token);
        assert_eq!(provider.refresh_calls(), 1);
        assert_eq!(provider.authenticate_calls(), 1);
        assert_eq!(second.issued_at, clock.now());
    }

    #[tokio::test]
    async fn inactive_access_is_refreshed_inside_window() {
        let (provider, _clock, manager) = setup(60, 1800);

        manager.valid_session().await.unwrap();
        provider.revoke_access_tokens();
        manager.valid_session().await.unwrap();

        assert_eq!(provider.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn refresh_failure_falls_back_to_login() {
        let (provider, clock, manager) = setup(60, 1800);

        manager.valid_session().await.unwrap();
        provider.set_refresh_failure(true);
        clock.advance_secs(120);
        manager.valid_session().await.unwrap();

        assert_eq!(provider.refresh_calls(), 1);
        assert_eq!(provider.authenticate_calls(), 2);
    }

    #[tokio::test]
    async fn expired_refresh_goes_straight_to_login() {
        let (provider, clock, manager) = setup(60, 1800);

        manager.valid_session().await.unwrap();
        clock.advance_secs(1800);
        manager.valid_session().await.unwrap();

        assert_eq!(provider.refresh_calls(), 0);
        assert_eq!(provider.authenticate_calls(), 2);
    }

    #[tokio::test]
    async fn thresholds_shorten_lifetimes() {
        let provider = Arc::new(InMemoryIdentityProvider::new().with_token_lifetimes(60, 1800));
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        let manager = TokenLifecycleManager::new(
            provider.clone(),
            ClientCredentials::new("breakglass", "secret", "master"),
            clock.clone(),
        )
        .with_thresholds(SessionThresholds::new(30, 1790));

        manager.valid_session().await.unwrap();
        clock.advance_secs(30);
        manager.valid_session().await.unwrap();

        // access window is 30s and refresh window 10s, so both are used up
        assert_eq!(provider.introspect_calls(), 0);
        assert_eq!(provider.refresh_calls(), 0);
        assert_eq!(provider.authenticate_calls(), 2);
    }

    #[tokio::test]
    async fn unavailable_when_everything_fails() {
        let (provider, clock, manager) = setup(60, 1800);

        manager.valid_session().await.unwrap();
        provider.set_refresh_failure(true);
        provider.set_authenticate_failure(true);
        clock.advance_secs(120);

        let err = manager.valid_session().await.unwrap_err();
        assert!(matches!(err, DirectoryError::AuthProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let (provider, clock, manager) = setup(60, 1800);

        manager.valid_session().await.unwrap();
        clock.advance_secs(90);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.valid_session().await.unwrap() })
            })
            .collect();

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().access_token);
        }
        tokens.dedup();

        assert_eq!(tokens.len(), 1);
        assert_eq!(provider.refresh_calls(), 1);
        assert_eq!(provider.authenticate_calls(), 1);
    }

    #[tokio::test]
    async fn probe_fails_fast() {
        let (provider, _clock, manager) = setup(60, 1800);
        provider.set_authenticate_failure(true);

        assert!(manager.probe().await.is_err());

        provider.set_authenticate_failure(false);
        assert!(manager.probe().await.is_ok());
    }
}
