//! Crunchy Bridge control-plane client
//!
//! - `credential`: where API keys come from
//! - `login`: one login's token lifecycle
//! - `cache`: sharing logins between clients
//! - `client`: typed HTTP operations on top of a shared login

pub mod cache;
pub mod client;
pub mod credential;
pub mod error;
pub mod login;
pub mod types;

use uuid::Uuid;

pub use cache::SessionCache;
pub use client::{BridgeApi, Client, ClientBuilder, idempotency_key};
pub use credential::{CredentialError, CredentialProvider, LoginCred};
pub use error::{ApiError, Result};
pub use login::{LoginState, Session, SessionConfig};
pub use types::{
    ClusterDetail, ClusterList, ClusterState, ConnectionRole, CreateRequest, Team, TeamList,
};

/// Namespace for the operator's name-based UUIDs (idempotency keys, cache labels)
pub const BRIDGE_OPERATOR_NS: Uuid = Uuid::from_u128(0xb208adb0_ca76_40f7_ab28_8a505730bd25);

/// Public API endpoint used when none is configured
pub const DEFAULT_API_URL: &str = "https://api.crunchybridge.com";
