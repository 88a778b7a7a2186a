//! Formal finite state machine for BridgeCluster lifecycle management
//!
//! Two layers: a transition table listing which phase changes are legal,
//! and [`plan`], a pure function from what the reconciler observed to the
//! ordered side effects it should run and how it should be requeued.
//! Neither touches the store or the network, so both are tested directly.

use std::fmt;

use crate::crd::ClusterPhase;

/// Events that trigger state transitions in the cluster lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterEvent {
    /// Deletion guard has been recorded on the resource
    FinalizerAttached,
    /// Provider accepted the create request (or already had the cluster)
    CreateAccepted,
    /// Provider reports the cluster as ready
    ProviderReady,
    /// Deletion timestamp has been set on the resource
    DeletionRequested,
}

impl fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterEvent::FinalizerAttached => write!(f, "FinalizerAttached"),
            ClusterEvent::CreateAccepted => write!(f, "CreateAccepted"),
            ClusterEvent::ProviderReady => write!(f, "ProviderReady"),
            ClusterEvent::DeletionRequested => write!(f, "DeletionRequested"),
        }
    }
}

/// A legal phase change
#[derive(Debug)]
pub struct TransitionRule {
    pub from: ClusterPhase,
    pub to: ClusterPhase,
    pub event: ClusterEvent,
    pub description: &'static str,
}

impl TransitionRule {
    const fn new(
        from: ClusterPhase,
        to: ClusterPhase,
        event: ClusterEvent,
        description: &'static str,
    ) -> Self {
        Self {
            from,
            to,
            event,
            description,
        }
    }
}

/// Result of attempting a state transition
#[derive(Debug, PartialEq, Eq)]
pub enum TransitionResult {
    Success {
        from: ClusterPhase,
        to: ClusterPhase,
        event: ClusterEvent,
        description: &'static str,
    },
    InvalidTransition {
        current: ClusterPhase,
        event: ClusterEvent,
    },
}

/// Transition table for the BridgeCluster lifecycle
pub struct ClusterStateMachine {
    transitions: Vec<TransitionRule>,
}

impl Default for ClusterStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterStateMachine {
    pub fn new() -> Self {
        use ClusterEvent::*;
        use ClusterPhase::*;

        Self {
            transitions: vec![
                TransitionRule::new(Unknown, Pending, FinalizerAttached, "Finalizer attached, cluster pending creation"),
                TransitionRule::new(Pending, Creating, CreateAccepted, "Create request accepted by provider"),
                TransitionRule::new(Creating, Ready, ProviderReady, "Provider reports cluster ready"),
                TransitionRule::new(Unknown, Deleting, DeletionRequested, "Deletion requested before setup"),
                TransitionRule::new(Pending, Deleting, DeletionRequested, "Deletion requested before creation"),
                TransitionRule::new(Creating, Deleting, DeletionRequested, "Deletion requested during provisioning"),
                TransitionRule::new(Ready, Deleting, DeletionRequested, "Cluster deletion requested"),
                // Deleting is terminal: the resource goes away once the finalizer is removed
            ],
        }
    }

    /// Attempt to transition to a new state based on an event
    pub fn transition(&self, current: ClusterPhase, event: ClusterEvent) -> TransitionResult {
        match self
            .transitions
            .iter()
            .find(|t| t.from == current && t.event == event)
        {
            Some(t) => TransitionResult::Success {
                from: t.from,
                to: t.to,
                event,
                description: t.description,
            },
            None => TransitionResult::InvalidTransition { current, event },
        }
    }

    pub fn can_transition(&self, from: ClusterPhase, event: ClusterEvent) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == from && t.event == event)
    }

    pub fn valid_events(&self, state: ClusterPhase) -> Vec<ClusterEvent> {
        self.transitions
            .iter()
            .filter(|t| t.from == state)
            .map(|t| t.event)
            .collect()
    }
}

/// Facts the planner decides on, read from the resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    pub phase: ClusterPhase,
    pub deletion_requested: bool,
    pub has_finalizer: bool,
    /// Provider cluster id recorded in status
    pub cluster_id: Option<String>,
}

/// Side effects, executed in order; the first failure stops the rest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    AddFinalizer,
    RemoveFinalizer,
    /// Persist the phase to status
    SetPhase(ClusterPhase),
    /// Best-effort status write marking the resource as deleting
    MarkDeleting,
    CreateCluster,
    /// Fetch provider detail, mirror it to status, promote when ready
    ObserveCluster,
    DeleteCluster(String),
}

impl Effect {
    /// Whether the effect talks to the provider
    pub fn calls_provider(&self) -> bool {
        matches!(
            self,
            Effect::CreateCluster | Effect::ObserveCluster | Effect::DeleteCluster(_)
        )
    }
}

/// How the reconciler asks to be called again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Only when the resource changes
    OnChange,
    /// After the configured provider poll interval
    WatchInterval,
}

/// Output of [`plan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: ClusterPhase,
    /// Phase recorded once every effect succeeded; observation may still
    /// promote `Creating` to `Ready`
    pub to: ClusterPhase,
    pub effects: Vec<Effect>,
    pub requeue: Requeue,
    pub description: &'static str,
}

impl Transition {
    fn stay(phase: ClusterPhase, requeue: Requeue, description: &'static str) -> Self {
        Self {
            from: phase,
            to: phase,
            effects: Vec::new(),
            requeue,
            description,
        }
    }

    fn advance(
        sm: &ClusterStateMachine,
        from: ClusterPhase,
        event: ClusterEvent,
        effects: Vec<Effect>,
    ) -> Self {
        match sm.transition(from, event) {
            TransitionResult::Success {
                to, description, ..
            } => Self {
                from,
                to,
                effects,
                requeue: Requeue::OnChange,
                description,
            },
            TransitionResult::InvalidTransition { .. } => {
                Self::stay(from, Requeue::OnChange, "No transition for phase")
            }
        }
    }
}

/// Decide what one reconcile should do
pub fn plan(obs: &Observation) -> Transition {
    let sm = ClusterStateMachine::new();
    let phase = obs.phase;

    // Deletion takes priority over every phase
    if obs.deletion_requested {
        if !obs.has_finalizer {
            return Transition::stay(phase, Requeue::OnChange, "Deletion pending, nothing to clean up");
        }
        let mut effects = vec![Effect::MarkDeleting];
        if let Some(id) = obs.cluster_id.as_deref().filter(|id| !id.is_empty()) {
            effects.push(Effect::DeleteCluster(id.to_string()));
        }
        effects.push(Effect::RemoveFinalizer);

        let description = match sm.transition(phase, ClusterEvent::DeletionRequested) {
            TransitionResult::Success { description, .. } => description,
            TransitionResult::InvalidTransition { .. } => "Continuing deletion",
        };
        return Transition {
            from: phase,
            to: ClusterPhase::Deleting,
            effects,
            requeue: Requeue::OnChange,
            description,
        };
    }

    match phase {
        ClusterPhase::Unknown => {
            let mut effects = Vec::with_capacity(2);
            if !obs.has_finalizer {
                effects.push(Effect::AddFinalizer);
            }
            effects.push(Effect::SetPhase(ClusterPhase::Pending));
            Transition::advance(&sm, phase, ClusterEvent::FinalizerAttached, effects)
        }
        ClusterPhase::Pending => Transition::advance(
            &sm,
            phase,
            ClusterEvent::CreateAccepted,
            vec![Effect::CreateCluster, Effect::SetPhase(ClusterPhase::Creating)],
        ),
        ClusterPhase::Creating => Transition {
            from: phase,
            to: phase,
            effects: vec![Effect::ObserveCluster],
            requeue: Requeue::WatchInterval,
            description: "Polling provider for provisioning progress",
        },
        ClusterPhase::Ready => Transition::stay(phase, Requeue::OnChange, "Cluster ready"),
        ClusterPhase::Deleting => {
            Transition::stay(phase, Requeue::OnChange, "Deleting without deletion request")
        }
    }
}
