//! In-memory stand-ins for the resource store and the provider API
//!
//! `FakeStore` behaves like the API server for the calls the reconciler
//! makes: writes must carry the current `resourceVersion`, and an object
//! marked for deletion goes away once its last finalizer is removed.
//! `FakeBridgeApi` records every call and gates them on a login state the
//! same way the real client does. `FakeTeamStore` and `FakeTeamDirectory`
//! do the same for the BridgeTeam controller.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bridge_operator::bridgeapi::{
    ApiError, BridgeApi, ClusterDetail, ConnectionRole, CreateRequest, LoginState, TeamList,
};
use bridge_operator::controller::{
    ClusterStore, Context, StoreError, TeamContext, TeamDirectory, TeamStore,
};
use bridge_operator::crd::{BridgeCluster, BridgeTeam};
use kube::ResourceExt;
use parking_lot::Mutex;

use super::fixtures::{connection_role, team_list};

// =============================================================================
// Resource store
// =============================================================================

/// A write accepted by the fake store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    /// Metadata replace, with the finalizers it carried
    Metadata(Vec<String>),
    /// Status replace, with the phase it carried
    Status(String),
}

#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<HashMap<(String, String), BridgeCluster>>,
    version: AtomicU64,
    writes: Mutex<Vec<StoreWrite>>,
    fail_status_writes: AtomicBool,
    conflict_next_write: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store an object, assigning it a fresh resourceVersion
    pub fn insert(&self, mut cluster: BridgeCluster) {
        cluster.metadata.resource_version = Some(self.next_version());
        let key = object_key(&cluster);
        self.objects.lock().insert(key, cluster);
    }

    /// Current copy of a stored object, as a watch event would deliver it
    pub fn snapshot(&self, namespace: &str, name: &str) -> Option<BridgeCluster> {
        self.objects
            .lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.snapshot(namespace, name).is_some()
    }

    pub fn writes(&self) -> Vec<StoreWrite> {
        self.writes.lock().clone()
    }

    /// Phases written to status, in order
    pub fn phase_history(&self) -> Vec<String> {
        self.writes
            .lock()
            .iter()
            .filter_map(|w| match w {
                StoreWrite::Status(phase) => Some(phase.clone()),
                StoreWrite::Metadata(_) => None,
            })
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }

    /// Make every status write fail with a server error
    pub fn fail_status_writes(&self, fail: bool) {
        self.fail_status_writes.store(fail, Ordering::SeqCst);
    }

    /// Reject the next write as if another writer got there first
    pub fn conflict_next_write(&self) {
        self.conflict_next_write.store(true, Ordering::SeqCst);
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Look up the stored copy and check the caller's resourceVersion
    fn check_write(&self, incoming: &BridgeCluster) -> Result<BridgeCluster, StoreError> {
        if self.conflict_next_write.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Conflict("injected conflict".to_string()));
        }
        let key = object_key(incoming);
        let stored = self
            .objects
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", key.0, key.1)))?;
        if stored.metadata.resource_version != incoming.metadata.resource_version {
            return Err(StoreError::Conflict(format!(
                "stale resourceVersion {:?}",
                incoming.metadata.resource_version
            )));
        }
        Ok(stored)
    }
}

fn object_key(cluster: &BridgeCluster) -> (String, String) {
    (cluster.namespace().unwrap_or_default(), cluster.name_any())
}

#[async_trait]
impl ClusterStore for FakeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<BridgeCluster, StoreError> {
        self.snapshot(namespace, name)
            .ok_or_else(|| StoreError::NotFound(format!("{namespace}/{name}")))
    }

    async fn update(&self, cluster: &BridgeCluster) -> Result<BridgeCluster, StoreError> {
        let mut stored = self.check_write(cluster)?;
        stored.metadata.finalizers = cluster.metadata.finalizers.clone();
        stored.metadata.resource_version = Some(self.next_version());
        self.writes
            .lock()
            .push(StoreWrite::Metadata(stored.finalizers().to_vec()));

        let key = object_key(&stored);
        if stored.metadata.deletion_timestamp.is_some() && stored.finalizers().is_empty() {
            self.objects.lock().remove(&key);
        } else {
            self.objects.lock().insert(key, stored.clone());
        }
        Ok(stored)
    }

    async fn update_status(&self, cluster: &BridgeCluster) -> Result<BridgeCluster, StoreError> {
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Kube(kube::Error::Api(
                kube::core::ErrorResponse {
                    status: "Failure".to_string(),
                    message: "injected failure".to_string(),
                    reason: "InternalError".to_string(),
                    code: 500,
                },
            )));
        }
        let mut stored = self.check_write(cluster)?;
        stored.status = cluster.status.clone();
        stored.metadata.resource_version = Some(self.next_version());
        self.writes.lock().push(StoreWrite::Status(
            stored.phase_str().to_string(),
        ));
        self.objects
            .lock()
            .insert(object_key(&stored), stored.clone());
        Ok(stored)
    }
}

// =============================================================================
// Provider API
// =============================================================================

/// A provider call made through the fake
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeCall {
    Create(CreateRequest),
    Detail(String),
    ByName(String),
    Delete(String),
    ConnRole(String),
    DefaultTeam,
}

/// How the fake answers a create request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateOutcome {
    #[default]
    Accepted,
    Conflict,
    BadRequest,
}

pub struct FakeBridgeApi {
    calls: Mutex<Vec<BridgeCall>>,
    state: Mutex<LoginState>,
    detail: Mutex<Option<ClusterDetail>>,
    personal_team: Mutex<Option<String>>,
    role: Mutex<Option<ConnectionRole>>,
    create_outcome: Mutex<CreateOutcome>,
    fail_deletes: AtomicBool,
    deleted: Mutex<HashSet<String>>,
}

impl Default for FakeBridgeApi {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            state: Mutex::new(LoginState::Active),
            detail: Mutex::new(None),
            personal_team: Mutex::new(Some("t1".to_string())),
            role: Mutex::new(Some(connection_role())),
            create_outcome: Mutex::new(CreateOutcome::Accepted),
            fail_deletes: AtomicBool::new(false),
            deleted: Mutex::new(HashSet::new()),
        }
    }
}

impl FakeBridgeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<BridgeCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn create_requests(&self) -> Vec<CreateRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                BridgeCall::Create(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn set_login_state(&self, state: LoginState) {
        *self.state.lock() = state;
    }

    /// The one cluster the provider knows about, `None` for none
    pub fn set_detail(&self, detail: Option<ClusterDetail>) {
        *self.detail.lock() = detail;
    }

    pub fn set_personal_team(&self, team: Option<&str>) {
        *self.personal_team.lock() = team.map(str::to_string);
    }

    pub fn set_role(&self, role: Option<ConnectionRole>) {
        *self.role.lock() = role;
    }

    pub fn set_create_outcome(&self, outcome: CreateOutcome) {
        *self.create_outcome.lock() = outcome;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: BridgeCall) -> Result<(), ApiError> {
        self.calls.lock().push(call);
        self.state.lock().to_error()
    }
}

#[async_trait]
impl BridgeApi for FakeBridgeApi {
    async fn create_cluster(&self, request: &CreateRequest) -> Result<(), ApiError> {
        self.record(BridgeCall::Create(request.clone()))?;
        match *self.create_outcome.lock() {
            CreateOutcome::Accepted => Ok(()),
            CreateOutcome::Conflict => Err(ApiError::Conflict("name already in use".to_string())),
            CreateOutcome::BadRequest => Err(ApiError::BadRequest("invalid plan".to_string())),
        }
    }

    async fn cluster_detail(&self, id: &str) -> Result<ClusterDetail, ApiError> {
        self.record(BridgeCall::Detail(id.to_string()))?;
        self.detail
            .lock()
            .clone()
            .filter(|d| d.id == id)
            .ok_or(ApiError::NotFound)
    }

    async fn cluster_by_name(&self, name: &str) -> Result<ClusterDetail, ApiError> {
        self.record(BridgeCall::ByName(name.to_string()))?;
        Ok(self
            .detail
            .lock()
            .clone()
            .filter(|d| d.name == name)
            .unwrap_or_default())
    }

    async fn delete_cluster(&self, id: &str) -> Result<(), ApiError> {
        self.record(BridgeCall::Delete(id.to_string()))?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ApiError::UnexpectedStatus(503));
        }
        // A cluster can only be deleted once, afterwards the provider answers 404
        if !self.deleted.lock().insert(id.to_string()) {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }

    async fn default_conn_role(&self, id: &str) -> Result<ConnectionRole, ApiError> {
        self.record(BridgeCall::ConnRole(id.to_string()))?;
        self.role.lock().clone().ok_or(ApiError::NotFound)
    }

    async fn default_team_id(&self) -> Result<String, ApiError> {
        self.record(BridgeCall::DefaultTeam)?;
        self.personal_team
            .lock()
            .clone()
            .ok_or(ApiError::NoPersonalTeam)
    }

    fn login_state(&self) -> LoginState {
        *self.state.lock()
    }
}

// =============================================================================
// Controller harness
// =============================================================================

/// Fakes wired into a controller context
pub struct Harness {
    pub store: Arc<FakeStore>,
    pub bridge: Arc<FakeBridgeApi>,
    pub ctx: Arc<Context>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_context(|ctx| ctx)
    }

    pub fn with_context(configure: impl FnOnce(Context) -> Context) -> Self {
        let store = FakeStore::new();
        let bridge = FakeBridgeApi::new();
        let ctx = configure(Context::new(store.clone(), bridge.clone()));
        Self {
            store,
            bridge,
            ctx: Arc::new(ctx),
        }
    }

    /// Run one reconcile against the stored copy of the object
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
    ) -> bridge_operator::Result<kube::runtime::controller::Action> {
        let cluster = self
            .store
            .snapshot(namespace, name)
            .unwrap_or_else(|| panic!("{namespace}/{name} not in store"));
        bridge_operator::reconcile(Arc::new(cluster), self.ctx.clone()).await
    }

    /// Current phase string of a stored object
    pub fn phase(&self, namespace: &str, name: &str) -> String {
        self.store
            .snapshot(namespace, name)
            .map(|c| c.phase_str().to_string())
            .unwrap_or_default()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// BridgeTeam
// =============================================================================

#[derive(Default)]
pub struct FakeTeamStore {
    objects: Mutex<HashMap<(String, String), BridgeTeam>>,
    version: AtomicU64,
    status_writes: AtomicU64,
    conflict_next_write: AtomicBool,
}

impl FakeTeamStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, mut team: BridgeTeam) {
        team.metadata.resource_version = Some(self.next_version());
        self.objects
            .lock()
            .insert((team.namespace().unwrap_or_default(), team.name_any()), team);
    }

    pub fn snapshot(&self, namespace: &str, name: &str) -> Option<BridgeTeam> {
        self.objects
            .lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        self.objects
            .lock()
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Number of accepted status writes
    pub fn status_writes(&self) -> u64 {
        self.status_writes.load(Ordering::SeqCst)
    }

    pub fn conflict_next_write(&self) {
        self.conflict_next_write.store(true, Ordering::SeqCst);
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

#[async_trait]
impl TeamStore for FakeTeamStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<BridgeTeam, StoreError> {
        self.snapshot(namespace, name)
            .ok_or_else(|| StoreError::NotFound(format!("{namespace}/{name}")))
    }

    async fn update_status(&self, team: &BridgeTeam) -> Result<BridgeTeam, StoreError> {
        if self.conflict_next_write.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Conflict("injected conflict".to_string()));
        }
        let key = (team.namespace().unwrap_or_default(), team.name_any());
        let mut stored = self
            .objects
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", key.0, key.1)))?;
        if stored.metadata.resource_version != team.metadata.resource_version {
            return Err(StoreError::Conflict("stale resourceVersion".to_string()));
        }
        stored.status = team.status.clone();
        stored.metadata.resource_version = Some(self.next_version());
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().insert(key, stored.clone());
        Ok(stored)
    }
}

/// Answers team listings with a fixed result, recording the Secret asked for
pub struct FakeTeamDirectory {
    teams: Mutex<TeamList>,
    failure: Mutex<Option<fn() -> ApiError>>,
    lookups: Mutex<Vec<(String, String)>>,
}

impl FakeTeamDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            teams: Mutex::new(team_list()),
            failure: Mutex::new(None),
            lookups: Mutex::new(Vec::new()),
        })
    }

    pub fn set_teams(&self, teams: TeamList) {
        *self.teams.lock() = teams;
    }

    /// Fail every listing with the error `make` builds
    pub fn fail_with(&self, make: fn() -> ApiError) {
        *self.failure.lock() = Some(make);
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// (namespace, name) of every Secret a listing was made with
    pub fn lookups(&self) -> Vec<(String, String)> {
        self.lookups.lock().clone()
    }
}

#[async_trait]
impl TeamDirectory for FakeTeamDirectory {
    async fn list_teams(&self, namespace: &str, secret_name: &str) -> Result<TeamList, ApiError> {
        self.lookups
            .lock()
            .push((namespace.to_string(), secret_name.to_string()));
        match *self.failure.lock() {
            Some(make) => Err(make()),
            None => Ok(self.teams.lock().clone()),
        }
    }
}

/// Fakes wired into a BridgeTeam controller context
pub struct TeamHarness {
    pub store: Arc<FakeTeamStore>,
    pub directory: Arc<FakeTeamDirectory>,
    pub ctx: Arc<TeamContext>,
}

impl TeamHarness {
    pub fn new() -> Self {
        let store = FakeTeamStore::new();
        let directory = FakeTeamDirectory::new();
        let ctx = Arc::new(TeamContext::new(store.clone(), directory.clone()));
        Self {
            store,
            directory,
            ctx,
        }
    }

    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
    ) -> bridge_operator::Result<kube::runtime::controller::Action> {
        let team = self
            .store
            .snapshot(namespace, name)
            .unwrap_or_else(|| panic!("{namespace}/{name} not in store"));
        bridge_operator::reconcile_team(Arc::new(team), self.ctx.clone()).await
    }
}

impl Default for TeamHarness {
    fn default() -> Self {
        Self::new()
    }
}
