//! Operator configuration from flags and environment

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::bridgeapi::DEFAULT_API_URL;
use crate::controller::Error;
use crate::resources::secret::{
    DEFAULT_KEY_FIELD, DEFAULT_SECRET_FIELD, DEFAULT_SECRET_NAME, DEFAULT_SECRET_NAMESPACE,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "bridge-operator")]
#[command(version, about = "Kubernetes operator for Crunchy Bridge PostgreSQL clusters", long_about = None)]
pub struct OperatorConfig {
    /// Crunchy Bridge API base URL
    #[arg(long, env = "BRIDGE_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Token endpoint base URL, defaults to the API URL
    #[arg(long, env = "BRIDGE_AUTH_URL")]
    pub auth_url: Option<String>,

    /// Seconds between provider polls while a cluster is provisioning
    #[arg(long, env = "WATCH_INTERVAL_SECS", default_value_t = 10)]
    pub watch_interval_secs: u64,

    /// Namespace of the Secret holding the API key pair
    #[arg(long, env = "API_CRED_NS", default_value = DEFAULT_SECRET_NAMESPACE)]
    pub credentials_namespace: String,

    /// Name of the Secret holding the API key pair
    #[arg(long, env = "API_CRED_NAME", default_value = DEFAULT_SECRET_NAME)]
    pub credentials_name: String,

    /// Secret data field holding the API key
    #[arg(long, env = "API_KEY_FIELD", default_value = DEFAULT_KEY_FIELD)]
    pub key_field: String,

    /// Secret data field holding the API secret
    #[arg(long, env = "API_SECRET_FIELD", default_value = DEFAULT_SECRET_FIELD)]
    pub secret_field: String,

    /// Team for clusters whose spec names none; the personal team otherwise
    #[arg(long, env = "BRIDGE_TEAM_ID")]
    pub team_id: Option<String>,

    /// Listen address of the health and metrics server
    #[arg(long, env = "HEALTH_BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    pub health_bind_address: SocketAddr,

    /// Only reconcile while holding the leader lease
    #[arg(long, env = "LEADER_ELECT", default_value_t = false)]
    pub leader_elect: bool,

    /// Watch a single namespace instead of the whole cluster
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,
}

impl OperatorConfig {
    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }

    /// Reject settings that would make every reconcile fail
    pub fn validate(&self) -> Result<(), Error> {
        if self.api_url.trim().is_empty() {
            return Err(Error::InvalidConfig("API URL must not be empty".into()));
        }
        if self.watch_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "watch interval must be at least one second".into(),
            ));
        }
        if self.key_field.is_empty() || self.secret_field.is_empty() {
            return Err(Error::InvalidConfig(
                "credential field names must not be empty".into(),
            ));
        }
        Ok(())
    }
}
