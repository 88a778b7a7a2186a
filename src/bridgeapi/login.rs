//! Session manager for provider logins
//!
//! A [`Session`] owns one login against the provider's token endpoint. It
//! issues a bearer token, schedules its renewal shortly before expiry, demotes
//! itself to `Inactive` when the token expires unrenewed, and retries failed
//! logins on an exponential backoff. Callers never wait on those retries:
//! [`Session::ping`] only blocks while a login is actually in flight.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::USER_AGENT;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, BackoffConfig};
use crate::bridgeapi::credential::{CredentialProvider, LoginCred};
use crate::bridgeapi::error::{ApiError, Result};
use crate::bridgeapi::types::TokenResponse;

/// Renewal fires this long before the token expires
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(15);

/// Login lifecycle state; only `Active` carries a usable token
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoginState {
    #[default]
    Unstarted,
    Failed,
    Active,
    Inactive,
    InvalidCreds,
}

impl LoginState {
    /// Map the state to the error callers see when trying to use the session
    pub fn to_error(self) -> Result<()> {
        match self {
            LoginState::Active => Ok(()),
            LoginState::Unstarted => Err(ApiError::CredUnset),
            LoginState::Failed => Err(ApiError::FailedLogin),
            LoginState::Inactive => Err(ApiError::FailedRenew),
            LoginState::InvalidCreds => Err(ApiError::BadCredentials),
        }
    }

    /// States in which a ping triggers a login
    ///
    /// `InvalidCreds` waits for its scheduled retry instead.
    pub fn needs_login(self) -> bool {
        matches!(
            self,
            LoginState::Unstarted | LoginState::Failed | LoginState::Inactive
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoginState::Unstarted => "unstarted",
            LoginState::Failed => "failed",
            LoginState::Active => "active",
            LoginState::Inactive => "inactive",
            LoginState::InvalidCreds => "invalid_creds",
        }
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables shared by every session of a cache
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub refresh_buffer: Duration,
    pub backoff: BackoffConfig,
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
            backoff: BackoffConfig::login(),
            user_agent: default_user_agent(),
        }
    }
}

pub fn default_user_agent() -> String {
    format!("CrunchyBridgeOperator/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerKind {
    Retry,
    Renew,
    Expire,
}

/// One cancel-and-replace timer
///
/// The generation lets a firing task check that it is still the task the
/// slot points at. Every cancel advances it, including cancels that land
/// after the task already detached itself.
#[derive(Default)]
struct TimerSlot {
    generation: u64,
    handle: Option<AbortHandle>,
}

impl TimerSlot {
    fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

struct SessionState {
    state: LoginState,
    token: String,
    token_id: String,
    backoff: Backoff,
    provider: Arc<dyn CredentialProvider>,
    retry: TimerSlot,
    renew: TimerSlot,
    expire: TimerSlot,
    last_usage: Option<Instant>,
    last_refresh: Option<Instant>,
}

impl SessionState {
    fn slot(&mut self, kind: TimerKind) -> &mut TimerSlot {
        match kind {
            TimerKind::Retry => &mut self.retry,
            TimerKind::Renew => &mut self.renew,
            TimerKind::Expire => &mut self.expire,
        }
    }
}

/// A provider login shared by every client with the same endpoint and credential
pub struct Session {
    me: Weak<Session>,
    auth_url: String,
    http: reqwest::Client,
    config: SessionConfig,
    inner: Mutex<SessionState>,
    // Single-flight guard for logins, the only lock held across a request
    login_gate: tokio::sync::Mutex<()>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("auth_url", &self.auth_url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create an unstarted session; no login is attempted until pinged or scheduled
    pub fn new(
        auth_url: impl Into<String>,
        provider: Arc<dyn CredentialProvider>,
        http: reqwest::Client,
        config: SessionConfig,
    ) -> Arc<Self> {
        let backoff = Backoff::new(config.backoff.clone());
        let auth_url = auth_url.into();
        Arc::new_cyclic(|me| Session {
            me: me.clone(),
            auth_url,
            http,
            config,
            inner: Mutex::new(SessionState {
                state: LoginState::Unstarted,
                token: String::new(),
                token_id: String::new(),
                backoff,
                provider,
                retry: TimerSlot::default(),
                renew: TimerSlot::default(),
                expire: TimerSlot::default(),
                last_usage: None,
                last_refresh: None,
            }),
            login_gate: tokio::sync::Mutex::new(()),
        })
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Snapshot of the current login state
    pub fn state(&self) -> LoginState {
        self.inner.lock().state
    }

    /// Current bearer token, empty unless `Active`; marks the session as used
    pub fn token(&self) -> String {
        let mut inner = self.inner.lock();
        inner.last_usage = Some(Instant::now());
        inner.token.clone()
    }

    /// Provider-side identifier of the current token
    pub fn token_id(&self) -> String {
        self.inner.lock().token_id.clone()
    }

    /// Consecutive login failures since the last success
    pub fn failed_attempts(&self) -> u32 {
        self.inner.lock().backoff.attempt()
    }

    pub fn provider(&self) -> Arc<dyn CredentialProvider> {
        self.inner.lock().provider.clone()
    }

    /// Swap the credential source, used when the cached source went stale
    pub fn replace_provider(&self, provider: Arc<dyn CredentialProvider>) {
        self.inner.lock().provider = provider;
    }

    /// Log in if the session is not usable and not waiting out bad credentials
    ///
    /// Concurrent pings share one login: a caller that waited for an
    /// in-flight login re-checks the state and returns if it succeeded.
    pub async fn ping(&self) {
        if !self.state().needs_login() {
            return;
        }
        let _gate = self.login_gate.lock().await;
        if !self.state().needs_login() {
            return;
        }
        self.login_inner().await;
    }

    /// Run one login attempt now, waiting for any in-flight one first
    pub async fn login(&self) {
        let _gate = self.login_gate.lock().await;
        self.login_inner().await;
    }

    /// Run a scheduled retry unless it was cancelled while waiting for the gate
    async fn retry_login(&self, generation: u64) {
        let _gate = self.login_gate.lock().await;
        if self.inner.lock().retry.generation != generation {
            debug!(auth_url = %self.auth_url, "Scheduled login superseded");
            return;
        }
        self.login_inner().await;
    }

    /// Renew the token only if it was used since the last refresh
    pub async fn refresh_login(&self) {
        let used = {
            let inner = self.inner.lock();
            match (inner.last_usage, inner.last_refresh) {
                (Some(usage), Some(refresh)) => usage > refresh,
                (Some(_), None) => true,
                (None, _) => false,
            }
        };
        if used {
            self.login().await;
        } else {
            debug!(auth_url = %self.auth_url, "Session idle since last refresh, letting token expire");
        }
    }

    /// Demote an active session whose token ran out before renewal landed
    pub fn expire_login(&self) {
        let mut inner = self.inner.lock();
        if inner.state == LoginState::Active {
            info!(auth_url = %self.auth_url, token_id = %inner.token_id, "Login expired");
            inner.state = LoginState::Inactive;
        }
        inner.token.clear();
        inner.renew.cancel();
    }

    /// Schedule a login attempt after `delay`, replacing any pending retry
    pub fn schedule_login(&self, delay: Duration) {
        let mut inner = self.inner.lock();
        self.arm(&mut inner, TimerKind::Retry, delay);
    }

    async fn login_inner(&self) {
        let provider = self.provider();
        let cred = match provider.provide_credential().await {
            Ok(cred) if cred.is_zero() => {
                debug!(auth_url = %self.auth_url, "No credential configured yet");
                self.schedule_retry();
                return;
            }
            Ok(cred) => cred,
            Err(e) => {
                warn!(auth_url = %self.auth_url, error = %e, "Failed to retrieve credential");
                self.schedule_retry();
                return;
            }
        };

        match self.request_token(&cred).await {
            Ok(token) => self.login_succeeded(&cred, token),
            Err(TokenError::Rejected(status)) => {
                warn!(
                    auth_url = %self.auth_url,
                    key = %cred.key,
                    status = status.as_u16(),
                    "Credential rejected by provider"
                );
                let mut inner = self.inner.lock();
                inner.state = LoginState::InvalidCreds;
                inner.token.clear();
                let delay = inner.backoff.next_delay();
                self.arm(&mut inner, TimerKind::Retry, delay);
            }
            Err(TokenError::Transient(e)) => {
                warn!(auth_url = %self.auth_url, key = %cred.key, error = %e, "Login attempt failed");
                let mut inner = self.inner.lock();
                if inner.state == LoginState::Unstarted {
                    inner.state = LoginState::Failed;
                }
                let delay = inner.backoff.next_delay();
                self.arm(&mut inner, TimerKind::Retry, delay);
            }
        }
    }

    async fn request_token(&self, cred: &LoginCred) -> std::result::Result<TokenResponse, TokenError> {
        let response = self
            .http
            .post(format!("{}/access-tokens", self.auth_url))
            .basic_auth(&cred.key, Some(&cred.secret))
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await
            .map_err(|e| TokenError::Transient(e.into()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TokenError::Rejected(status));
        }
        if !status.is_success() {
            return Err(TokenError::Transient(ApiError::UnexpectedStatus(status.as_u16())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TokenError::Transient(e.into()))?;
        serde_json::from_slice(&body).map_err(|e| TokenError::Transient(e.into()))
    }

    fn login_succeeded(&self, cred: &LoginCred, token: TokenResponse) {
        let lifetime = Duration::from_secs(token.expires_in);
        let renew_after = lifetime.saturating_sub(self.config.refresh_buffer);

        let mut inner = self.inner.lock();
        info!(
            auth_url = %self.auth_url,
            key = %cred.key,
            token_id = %token.id,
            expires_in = token.expires_in,
            "Login established"
        );
        inner.token = token.access_token;
        inner.token_id = token.id;
        inner.state = LoginState::Active;
        inner.backoff.reset();
        inner.last_refresh = Some(Instant::now());
        inner.retry.cancel();
        self.arm(&mut inner, TimerKind::Expire, lifetime);
        self.arm(&mut inner, TimerKind::Renew, renew_after);
    }

    fn schedule_retry(&self) {
        let mut inner = self.inner.lock();
        let delay = inner.backoff.next_delay();
        debug!(auth_url = %self.auth_url, ?delay, "Scheduling login retry");
        self.arm(&mut inner, TimerKind::Retry, delay);
    }

    /// Cancel the slot's pending task and spawn its replacement
    ///
    /// Spawning happens under the state lock so the new handle is stored
    /// before the task can try to detach itself.
    fn arm(&self, inner: &mut SessionState, kind: TimerKind, delay: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(auth_url = %self.auth_url, ?kind, "No async runtime, timer not scheduled");
            return;
        };

        let slot = inner.slot(kind);
        slot.cancel();
        let generation = slot.generation;

        let me = self.me.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(session) = me.upgrade() else {
                return;
            };
            if !session.detach(kind, generation) {
                return;
            }
            match kind {
                TimerKind::Retry => session.retry_login(generation).await,
                TimerKind::Renew => session.refresh_login().await,
                TimerKind::Expire => session.expire_login(),
            }
        });
        slot.handle = Some(task.abort_handle());
    }

    /// Release the slot if it still belongs to the firing task
    fn detach(&self, kind: TimerKind, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        let slot = inner.slot(kind);
        if slot.generation != generation {
            return false;
        }
        slot.handle = None;
        true
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: LoginState) {
        self.inner.lock().state = state;
    }

    #[cfg(test)]
    fn timer_pending(&self, kind: TimerKind) -> bool {
        self.inner.lock().slot(kind).handle.is_some()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        inner.retry.cancel();
        inner.renew.cancel();
        inner.expire.cancel();
    }
}

enum TokenError {
    Rejected(StatusCode),
    Transient(ApiError),
}
