pub mod context;
pub mod error;
pub mod reconciler;
pub mod request;
pub mod state_machine;
pub mod status;
pub mod store;
pub mod team_context;
pub mod team_reconciler;

pub use context::{Context, DEFAULT_WATCH_INTERVAL, FailureCounts};
pub use error::{Error, Result, StoreError};
pub use reconciler::{CONFLICT_REQUEUE, FINALIZER, error_policy, reconcile};
pub use state_machine::{
    ClusterEvent, ClusterStateMachine, Effect, Observation, Requeue, Transition, plan,
};
pub use store::{ClusterStore, KubeClusterStore, KubeTeamStore, TeamStore};
pub use team_context::{KubeTeamDirectory, TeamContext, TeamDirectory};
pub use team_reconciler::{TEAMS_SYNCED_MESSAGE, reconcile_team, team_error_policy};
