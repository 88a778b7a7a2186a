// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for the lifecycle planner, key derivation and backoff
//!
//! These tests use proptest to generate random inputs and verify that:
//! 1. The planner never moves a live cluster backwards, whatever it observes
//! 2. Idempotency keys and session labels are deterministic
//! 3. Backoff delays never shrink until reset and never exceed the cap

use std::time::Duration;

use proptest::prelude::*;

use bridge_operator::backoff::{Backoff, BackoffConfig};
use bridge_operator::bridgeapi::cache::session_label;
use bridge_operator::bridgeapi::{LoginCred, idempotency_key};
use bridge_operator::controller::state_machine::{
    ClusterEvent, ClusterStateMachine, Effect, Observation, TransitionResult, plan,
};
use bridge_operator::crd::ClusterPhase;

// =============================================================================
// Strategies
// =============================================================================

fn arb_phase() -> impl Strategy<Value = ClusterPhase> {
    prop_oneof![
        Just(ClusterPhase::Unknown),
        Just(ClusterPhase::Pending),
        Just(ClusterPhase::Creating),
        Just(ClusterPhase::Ready),
        Just(ClusterPhase::Deleting),
    ]
}

fn arb_event() -> impl Strategy<Value = ClusterEvent> {
    prop_oneof![
        Just(ClusterEvent::FinalizerAttached),
        Just(ClusterEvent::CreateAccepted),
        Just(ClusterEvent::ProviderReady),
        Just(ClusterEvent::DeletionRequested),
    ]
}

fn arb_observation() -> impl Strategy<Value = Observation> {
    (
        arb_phase(),
        any::<bool>(),
        any::<bool>(),
        proptest::option::of("[a-z0-9]{0,8}"),
    )
        .prop_map(|(phase, deletion_requested, has_finalizer, cluster_id)| Observation {
            phase,
            deletion_requested,
            has_finalizer,
            cluster_id,
        })
}

/// Simulate a reconcile loop where every planned effect succeeds and the
/// provider reports ready at some point
fn simulate(ready_after: usize, passes: usize) -> Vec<ClusterPhase> {
    let mut obs = Observation::default();
    let mut history = Vec::new();
    for pass in 0..passes {
        let t = plan(&obs);
        for effect in &t.effects {
            match effect {
                Effect::AddFinalizer => obs.has_finalizer = true,
                Effect::SetPhase(phase) => obs.phase = *phase,
                Effect::ObserveCluster if pass >= ready_after => {
                    obs.cluster_id = Some("c1".to_string());
                    obs.phase = ClusterPhase::Ready;
                }
                Effect::ObserveCluster => obs.cluster_id = Some("c1".to_string()),
                _ => {}
            }
        }
        history.push(obs.phase);
    }
    history
}

// =============================================================================
// Lifecycle properties
// =============================================================================

proptest! {
    #[test]
    fn phase_never_regresses(ready_after in 0usize..20, passes in 1usize..30) {
        let history = simulate(ready_after, passes);
        for pair in history.windows(2) {
            prop_assert!(pair[0] <= pair[1], "regressed: {:?}", history);
        }
    }

    #[test]
    fn converges_to_ready(ready_after in 0usize..10) {
        let history = simulate(ready_after, ready_after + 4);
        prop_assert_eq!(history.last().copied(), Some(ClusterPhase::Ready));
    }

    #[test]
    fn plan_never_panics_and_targets_are_sane(obs in arb_observation()) {
        let t = plan(&obs);
        prop_assert_eq!(t.from, obs.phase);
        if obs.deletion_requested && !obs.has_finalizer {
            prop_assert!(t.effects.is_empty());
        } else if obs.deletion_requested {
            prop_assert_eq!(t.to, ClusterPhase::Deleting);
            prop_assert_eq!(t.effects.last(), Some(&Effect::RemoveFinalizer));
            prop_assert!(!t.effects.contains(&Effect::CreateCluster));
            prop_assert!(!t.effects.contains(&Effect::AddFinalizer));
        } else if obs.phase != ClusterPhase::Deleting {
            prop_assert!(t.to >= obs.phase);
            prop_assert!(!t.effects.iter().any(|e| matches!(e, Effect::DeleteCluster(_))));
        }
    }

    #[test]
    fn ready_never_calls_provider_without_deletion(has_finalizer in any::<bool>(), id in proptest::option::of("[a-z0-9]{1,8}")) {
        let t = plan(&Observation {
            phase: ClusterPhase::Ready,
            deletion_requested: false,
            has_finalizer,
            cluster_id: id,
        });
        prop_assert!(t.effects.iter().all(|e| !e.calls_provider()));
    }

    #[test]
    fn deleting_is_absorbing(events in prop::collection::vec(arb_event(), 0..10)) {
        let sm = ClusterStateMachine::new();
        for event in events {
            let result = sm.transition(ClusterPhase::Deleting, event);
            prop_assert!(
                matches!(result, TransitionResult::InvalidTransition { .. }),
                "Deleting should not transition on {:?}",
                event
            );
        }
    }
}

// =============================================================================
// Key derivation properties
// =============================================================================

proptest! {
    #[test]
    fn idempotency_key_is_deterministic(payload in prop::collection::vec(any::<u8>(), 0..256)) {
        prop_assert_eq!(idempotency_key(&payload), idempotency_key(&payload.clone()));
    }

    #[test]
    fn idempotency_key_separates_payloads(
        a in prop::collection::vec(any::<u8>(), 1..64),
        b in prop::collection::vec(any::<u8>(), 1..64),
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(idempotency_key(&a), idempotency_key(&b));
    }

    #[test]
    fn session_label_depends_on_all_inputs(
        key in "[a-z]{1,12}",
        secret in "[a-z]{1,12}",
        other in "[A-Z]{1,12}",
    ) {
        let url = "https://api.crunchybridge.com";
        let cred = LoginCred::new(key.clone(), secret.clone());
        let label = session_label(url, &cred);

        prop_assert_eq!(&label, &session_label(url, &cred));
        prop_assert!(label.starts_with(url));
        prop_assert_ne!(&label, &session_label(url, &LoginCred::new(other.clone(), secret.clone())));
        prop_assert_ne!(&label, &session_label(url, &LoginCred::new(key, other)));
        prop_assert_ne!(&label, &session_label("https://auth.example.com", &cred));
    }
}

// =============================================================================
// Backoff properties
// =============================================================================

proptest! {
    #[test]
    fn backoff_is_monotonic_and_capped(
        initial_ms in 1u64..5_000,
        max_secs in 1u64..7_200,
        multiplier in 2.0f64..4.0,
        attempts in 1usize..80,
    ) {
        let config = BackoffConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_secs(max_secs),
            multiplier,
            jitter: 0.1,
        };
        let mut backoff = Backoff::new(config.clone());
        let mut previous = Duration::ZERO;
        for _ in 0..attempts {
            let delay = backoff.next_delay();
            prop_assert!(delay >= previous, "{:?} < {:?}", delay, previous);
            prop_assert!(delay <= config.max_delay);
            previous = delay;
        }
        prop_assert_eq!(backoff.attempt() as usize, attempts);
    }

    #[test]
    fn backoff_reset_restarts_schedule(failures in 1usize..40) {
        let config = BackoffConfig { jitter: 0.0, ..BackoffConfig::login() };
        let mut backoff = Backoff::new(config.clone());
        for _ in 0..failures {
            backoff.next_delay();
        }
        backoff.reset();
        prop_assert_eq!(backoff.attempt(), 0);
        prop_assert_eq!(backoff.next_delay(), config.initial_delay);
    }
}
