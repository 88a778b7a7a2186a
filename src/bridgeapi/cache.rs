//! Reference-counted cache of provider sessions
//!
//! Clients configured with the same auth endpoint and credential share one
//! [`Session`]. Entries are keyed by the endpoint plus a fingerprint of the
//! credential so raw secrets never end up in keys or logs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bridgeapi::BRIDGE_OPERATOR_NS;
use crate::bridgeapi::credential::{CredentialProvider, LoginCred};
use crate::bridgeapi::error::Result;
use crate::bridgeapi::login::{LoginState, Session, SessionConfig};

struct CacheEntry {
    session: Arc<Session>,
    count: i64,
}

/// Shared session registry, injected into every client that needs a login
pub struct SessionCache {
    http: reqwest::Client,
    config: SessionConfig,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(reqwest::Client::new(), SessionConfig::default())
    }
}

impl SessionCache {
    pub fn new(http: reqwest::Client, config: SessionConfig) -> Self {
        Self {
            http,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get the session for an endpoint and credential source, creating it on a miss
    ///
    /// The credential is read first and its error returned as-is, so a
    /// source that cannot be read never gets a cache entry. A new session
    /// starts logging in immediately in the background.
    pub async fn get_session(
        &self,
        auth_url: &str,
        provider: Arc<dyn CredentialProvider>,
    ) -> Result<Arc<Session>> {
        let cred = provider.provide_credential().await?;
        let label = session_label(auth_url, &cred);

        let (session, hit) = {
            let mut entries = self.entries.lock();
            match entries.get_mut(&label) {
                Some(entry) => {
                    entry.count += 1;
                    debug!(label = %label, count = entry.count, "Session cache hit");
                    (entry.session.clone(), true)
                }
                None => {
                    let session = Session::new(
                        auth_url,
                        provider.clone(),
                        self.http.clone(),
                        self.config.clone(),
                    );
                    session.schedule_login(Duration::ZERO);
                    info!(label = %label, "Created provider session");
                    entries.insert(
                        label,
                        CacheEntry {
                            session: session.clone(),
                            count: 1,
                        },
                    );
                    (session, false)
                }
            }
        };

        if hit {
            recover_source(&session, provider, &cred).await;
        }
        Ok(session)
    }

    /// Drop one reference to a session and sweep idle entries
    ///
    /// The sweep covers the whole cache: any entry without holders whose
    /// session went `Inactive` is removed. `Active` sessions stay cached at
    /// zero references so a later client can reuse the token.
    pub fn release(&self, session: &Arc<Session>) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries
            .values_mut()
            .find(|entry| Arc::ptr_eq(&entry.session, session))
        {
            entry.count = (entry.count - 1).max(0);
        }

        entries.retain(|label, entry| {
            let evict = entry.count <= 0 && entry.session.state() == LoginState::Inactive;
            if evict {
                debug!(label = %label, "Evicting idle provider session");
            }
            !evict
        });
    }

    /// Number of live holders of a cached session
    pub fn refcount(&self, session: &Arc<Session>) -> Option<i64> {
        self.entries
            .lock()
            .values()
            .find(|entry| Arc::ptr_eq(&entry.session, session))
            .map(|entry| entry.count)
    }

    pub fn contains(&self, session: &Arc<Session>) -> bool {
        self.refcount(session).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Point a cached session at the caller's source if its own one went stale
///
/// The caller produced the same credential fingerprint, so its source is
/// known-good; the cached one may have been deleted or rotated since.
async fn recover_source(
    session: &Arc<Session>,
    provider: Arc<dyn CredentialProvider>,
    cred: &LoginCred,
) {
    let current = session.provider();
    if Arc::ptr_eq(&current, &provider) {
        return;
    }
    match current.provide_credential().await {
        Ok(existing) if existing == *cred => return,
        Ok(_) => debug!(auth_url = %session.auth_url(), "Cached credential source changed, replacing"),
        Err(e) => debug!(auth_url = %session.auth_url(), error = %e, "Cached credential source failed, replacing"),
    }
    session.replace_provider(provider);
    session.ping().await;
}

/// Cache key: the endpoint plus a name-based UUID over endpoint and credential
pub fn session_label(auth_url: &str, cred: &LoginCred) -> String {
    let material = format!("{}\n{}\n{}", auth_url, cred.key, cred.secret);
    let fingerprint = Uuid::new_v5(&BRIDGE_OPERATOR_NS, material.as_bytes());
    format!("{}#{}", auth_url, fingerprint)
}
