//! Integration tests for the plan lifecycle controller.
//!
//! Every collaborator is a [`ScriptedBackend`], so the tests control each
//! response and can hold a call in flight to observe the session while an
//! operation is pending.

use std::sync::Arc;

use attune_core::lifecycle::{ErrorKind, MonitorVerdict, PlanLifecycleController, SessionState};
use attune_core::service::ServiceError;
use attune_core::store::PlanStore;
use attune_core::trigger::TriggerReason;
use attune_model::PlanType;
use attune_test_utils::{Call, Op, PlanBuilder, ScriptedBackend, plan};

// ===========================================================================
// Helpers
// ===========================================================================

fn controller(backend: &Arc<ScriptedBackend>) -> PlanLifecycleController {
    PlanLifecycleController::new(
        Arc::new(PlanStore::new()),
        ScriptedBackend::collaborators(backend),
    )
}

/// A controller in `ready` with plan `p1` (activities `a1`, `a2`).
async fn ready_controller(backend: &Arc<ScriptedBackend>) -> PlanLifecycleController {
    backend.push_fetch(Ok(Some(plan("p1"))));
    let ctl = controller(backend);
    ctl.load("u1").await.expect("load should succeed");
    assert_eq!(ctl.state(), SessionState::Ready);
    ctl
}

fn current_id(ctl: &PlanLifecycleController) -> String {
    ctl.store()
        .current_plan()
        .map(|p| p.id.clone())
        .unwrap_or_default()
}

fn transport(msg: &str) -> ServiceError {
    ServiceError::Transport(msg.to_string())
}

// ===========================================================================
// load
// ===========================================================================

#[tokio::test]
async fn load_without_plan_then_generate_weekly() {
    let backend = ScriptedBackend::new();
    backend.push_fetch(Ok(None));
    backend.push_generate(Ok(PlanBuilder::new("w1").plan_type(PlanType::Weekly).build()));
    let ctl = controller(&backend);

    let loaded = ctl.load("u1").await.unwrap();
    assert!(loaded.is_none());
    assert_eq!(ctl.state(), SessionState::Empty);
    assert!(ctl.store().current_plan().is_none());

    let generated = ctl.generate("u1", PlanType::Weekly).await.unwrap();
    assert_eq!(generated.plan_type, PlanType::Weekly);
    assert_eq!(ctl.state(), SessionState::Ready);
    assert_eq!(current_id(&ctl), "w1");

    assert_eq!(
        backend.calls(),
        vec![
            Call::Fetch {
                user_id: "u1".to_string()
            },
            Call::Generate {
                user_id: "u1".to_string(),
                plan_type: PlanType::Weekly
            },
        ]
    );
}

#[tokio::test]
async fn load_installs_existing_plan() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    assert_eq!(current_id(&ctl), "p1");
}

#[tokio::test]
async fn load_transport_failure_stays_uninitialized_and_can_retry() {
    let backend = ScriptedBackend::new();
    backend.push_fetch(Err(transport("connection refused")));
    backend.push_fetch(Ok(Some(plan("p1"))));
    let ctl = controller(&backend);

    let err = ctl.load("u1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FetchFailed);
    assert!(err.is_retryable());
    assert_eq!(ctl.state(), SessionState::Uninitialized);
    assert!(ctl.store().current_plan().is_none());

    let loaded = ctl.load("u1").await.unwrap().expect("plan on retry");
    assert_eq!(loaded.id, "p1");
    assert_eq!(ctl.state(), SessionState::Ready);
}

#[tokio::test]
async fn load_rejects_malformed_plan() {
    let backend = ScriptedBackend::new();
    backend.push_fetch(Ok(Some(PlanBuilder::new("p1").confidence(1.7).build())));
    let ctl = controller(&backend);

    let err = ctl.load("u1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedPlan);
    assert_eq!(ctl.state(), SessionState::Uninitialized);
    assert!(ctl.store().current_plan().is_none());
}

#[tokio::test]
async fn load_twice_is_invalid() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;

    let err = ctl.load("u1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(backend.count(Op::Fetch), 1);
    assert_eq!(ctl.state(), SessionState::Ready);
}

// ===========================================================================
// generate
// ===========================================================================

#[tokio::test]
async fn generate_before_load_is_invalid() {
    let backend = ScriptedBackend::new();
    let ctl = controller(&backend);

    let err = ctl.generate("u1", PlanType::Daily).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(backend.count(Op::Generate), 0);
}

#[tokio::test]
async fn generate_replaces_ready_plan() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    backend.push_generate(Ok(PlanBuilder::new("d1").plan_type(PlanType::Daily).build()));

    let generated = ctl.generate("u1", PlanType::Daily).await.unwrap();
    assert_eq!(generated.id, "d1");
    assert_eq!(current_id(&ctl), "d1");
    assert_eq!(ctl.state(), SessionState::Ready);
}

#[tokio::test]
async fn generation_failure_keeps_previous_plan() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    let before = ctl.store().current_plan().unwrap();
    backend.push_generate(Err(ServiceError::Status {
        status: 500,
        message: "generator unavailable".to_string(),
    }));

    let err = ctl.generate("u1", PlanType::Monthly).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GenerationFailed);
    assert_eq!(ctl.state(), SessionState::Ready);
    assert!(Arc::ptr_eq(&before, &ctl.store().current_plan().unwrap()));
}

#[tokio::test]
async fn generation_failure_from_empty_stays_empty() {
    let backend = ScriptedBackend::new();
    backend.push_fetch(Ok(None));
    let ctl = controller(&backend);
    ctl.load("u1").await.unwrap();

    let err = ctl.generate("u1", PlanType::Weekly).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GenerationFailed);
    assert_eq!(ctl.state(), SessionState::Empty);
}

#[tokio::test]
async fn crisis_plans_cannot_be_requested() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;

    let err = ctl
        .generate("u1", PlanType::CrisisIntervention)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPlanType);
    assert_eq!(backend.count(Op::Generate), 0);
    assert_eq!(ctl.state(), SessionState::Ready);
}

#[tokio::test]
async fn generate_while_adapting_is_busy() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    let before = ctl.store().current_plan().unwrap();
    let gate = backend.hold(Op::Adapt);
    backend.push_adapt(Ok(PlanBuilder::new("p2").adaptation_level(0.3).build()));
    backend.push_generate(Ok(plan("g1")));

    let adapting = ctl.adapt(TriggerReason::UserRequest, None);
    let racer = async {
        gate.entered().await;
        assert_eq!(ctl.state(), SessionState::Adapting);
        let result = ctl.generate("u1", PlanType::Weekly).await;
        let unchanged = Arc::ptr_eq(&before, &ctl.store().current_plan().unwrap());
        gate.release();
        (result, unchanged)
    };

    let (adapted, (generated, unchanged)) = tokio::join!(adapting, racer);
    let err = generated.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);
    assert!(unchanged, "rejected generate must not touch the stored plan");
    assert_eq!(backend.count(Op::Generate), 0);
    assert_eq!(adapted.unwrap().id, "p2");
    assert_eq!(ctl.state(), SessionState::Ready);
}

// ===========================================================================
// adapt
// ===========================================================================

#[tokio::test]
async fn adapt_replaces_current_plan() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    let old = ctl.store().current_plan().unwrap();
    let mut updates = ctl.store().subscribe();
    backend.push_adapt(Ok(PlanBuilder::new("p2").adaptation_level(0.4).build()));

    let adapted = ctl
        .adapt(TriggerReason::UserRequest, Some(serde_json::json!({"mood": "low"})))
        .await
        .unwrap();

    assert_eq!(adapted.adaptation_level, 0.4);
    let current = ctl.store().current_plan().unwrap();
    assert!(Arc::ptr_eq(&adapted, &current));
    assert!(!Arc::ptr_eq(&old, &current));
    assert_eq!(ctl.state(), SessionState::Ready);
    assert!(updates.has_changed().unwrap());
    assert_eq!(updates.borrow().as_ref().unwrap().id, "p2");

    assert_eq!(
        backend.calls().last(),
        Some(&Call::Adapt {
            plan_id: "p1".to_string(),
            trigger: TriggerReason::UserRequest,
            feedback: Some(serde_json::json!({"mood": "low"})),
        })
    );
}

#[tokio::test]
async fn adapt_failure_keeps_prior_plan() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    let before = ctl.store().current_plan().unwrap();
    backend.push_adapt(Err(transport("network unreachable")));

    let err = ctl
        .adapt(TriggerReason::GoalAchievement, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AdaptationFailed);
    assert_eq!(ctl.state(), SessionState::Ready);
    assert!(Arc::ptr_eq(&before, &ctl.store().current_plan().unwrap()));
}

#[tokio::test]
async fn malformed_adaptation_is_not_installed() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    backend.push_adapt(Ok(PlanBuilder::new("p2").activities(&["x", "x"]).build()));

    let err = ctl.adapt(TriggerReason::UserRequest, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedPlan);
    assert_eq!(current_id(&ctl), "p1");
    assert_eq!(ctl.state(), SessionState::Ready);
}

#[tokio::test]
async fn second_adapt_while_adapting_is_busy() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    let gate = backend.hold(Op::Adapt);
    backend.push_adapt(Ok(plan("p2")));

    let first = ctl.adapt(TriggerReason::UserRequest, None);
    let second = async {
        gate.entered().await;
        let result = ctl.adapt(TriggerReason::UserRequest, None).await;
        gate.release();
        result
    };

    let (first, second) = tokio::join!(first, second);
    assert_eq!(second.unwrap_err().kind(), ErrorKind::Busy);
    assert_eq!(backend.count(Op::Adapt), 1, "no second request may be issued");
    assert_eq!(first.unwrap().id, "p2");
    assert_eq!(ctl.state(), SessionState::Ready);
}

#[tokio::test]
async fn adapt_in_empty_session_is_invalid() {
    let backend = ScriptedBackend::new();
    backend.push_fetch(Ok(None));
    let ctl = controller(&backend);
    ctl.load("u1").await.unwrap();

    let err = ctl.request_adaptation(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(backend.count(Op::Adapt), 0);
    assert_eq!(ctl.state(), SessionState::Empty);
}

#[tokio::test]
async fn user_request_sends_user_request_trigger() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    backend.push_adapt(Ok(plan("p2")));

    ctl.request_adaptation(None).await.unwrap();
    assert!(backend.calls().contains(&Call::Adapt {
        plan_id: "p1".to_string(),
        trigger: TriggerReason::UserRequest,
        feedback: None,
    }));
}

// ===========================================================================
// complete
// ===========================================================================

#[tokio::test]
async fn completion_with_positive_verdict_adapts() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    let p1 = ctl.store().current_plan().unwrap();
    backend.push_verdict(true);
    backend.push_adapt(Ok(PlanBuilder::new("p2").adaptation_level(0.2).build()));

    let outcome = ctl.complete("u1", "a1").await.unwrap();

    assert!(outcome.newly_completed);
    assert!(matches!(outcome.monitor, MonitorVerdict::Adapt));
    let p2 = outcome.adapted_plan().expect("adaptation should succeed");
    assert_ne!(p2.id, p1.id);
    assert_eq!(current_id(&ctl), "p2");
    assert_eq!(ctl.state(), SessionState::Ready);
    assert!(outcome.errors().is_empty());

    assert_eq!(
        &backend.calls()[1..],
        &[
            Call::Record {
                user_id: "u1".to_string(),
                activity_id: "a1".to_string()
            },
            Call::Monitor {
                user_id: "u1".to_string(),
                plan_id: "p1".to_string()
            },
            Call::Adapt {
                plan_id: "p1".to_string(),
                trigger: TriggerReason::GoalAchievement,
                feedback: None
            },
        ]
    );
}

#[tokio::test]
async fn completion_with_hold_verdict_keeps_plan() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    backend.push_verdict(false);

    let outcome = ctl.complete("u1", "a2").await.unwrap();

    assert!(matches!(outcome.monitor, MonitorVerdict::Hold));
    assert!(outcome.adaptation.is_none());
    assert!(ctl.store().is_completed("a2"));
    assert_eq!(current_id(&ctl), "p1");
    assert_eq!(backend.count(Op::Adapt), 0);
}

#[tokio::test]
async fn recorder_failure_keeps_local_completion() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    backend.push_record(Err(transport("timed out")));
    backend.push_verdict(false);

    let outcome = ctl.complete("u1", "a1").await.unwrap();

    let err = outcome.recorder_error.as_ref().expect("recorder error reported");
    assert_eq!(err.kind(), ErrorKind::RecorderFailed);
    assert!(ctl.store().is_completed("a1"));
    assert_eq!(backend.count(Op::Monitor), 1);
    assert_eq!(outcome.errors().len(), 1);
}

#[tokio::test]
async fn monitor_failure_is_reported_without_adapting() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    backend.push_verdict_error(ServiceError::Status {
        status: 503,
        message: "monitor offline".to_string(),
    });

    let outcome = ctl.complete("u1", "a1").await.unwrap();

    match &outcome.monitor {
        MonitorVerdict::Failed(e) => assert_eq!(e.kind(), ErrorKind::MonitorFailed),
        other => panic!("expected monitor failure, got {other:?}"),
    }
    assert!(ctl.store().is_completed("a1"));
    assert_eq!(backend.count(Op::Adapt), 0);
    assert_eq!(ctl.state(), SessionState::Ready);
}

#[tokio::test]
async fn completing_twice_is_idempotent() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;

    let first = ctl.complete("u1", "a1").await.unwrap();
    let second = ctl.complete("u1", "a1").await.unwrap();

    assert!(first.newly_completed);
    assert!(!second.newly_completed);
    assert_eq!(ctl.store().completed_count(), 1);
}

#[tokio::test]
async fn complete_outside_ready_is_rejected() {
    let backend = ScriptedBackend::new();
    let ctl = controller(&backend);

    let err = ctl.complete("u1", "a1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(!ctl.store().is_completed("a1"));
    assert_eq!(backend.count(Op::Record), 0);
}

#[tokio::test]
async fn complete_while_adapting_is_busy() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    let gate = backend.hold(Op::Adapt);
    backend.push_adapt(Ok(plan("p2")));

    let adapting = ctl.adapt(TriggerReason::UserRequest, None);
    let racer = async {
        gate.entered().await;
        let result = ctl.complete("u1", "a1").await;
        gate.release();
        result
    };

    let (_, completed) = tokio::join!(adapting, racer);
    assert_eq!(completed.unwrap_err().kind(), ErrorKind::Busy);
    assert!(!ctl.store().is_completed("a1"));
    assert_eq!(backend.count(Op::Record), 0);
}

#[tokio::test]
async fn monitor_sees_plan_id_captured_at_completion_start() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    let gate = backend.hold(Op::Record);
    backend.push_generate(Ok(PlanBuilder::new("d1").plan_type(PlanType::Daily).build()));
    backend.push_verdict(false);

    let completing = ctl.complete("u1", "a1");
    let racer = async {
        gate.entered().await;
        let generated = ctl.generate("u1", PlanType::Daily).await;
        gate.release();
        generated
    };

    let (outcome, generated) = tokio::join!(completing, racer);
    assert_eq!(generated.unwrap().id, "d1");
    let outcome = outcome.unwrap();
    assert_eq!(outcome.plan_id, "p1");
    assert!(backend.calls().contains(&Call::Monitor {
        user_id: "u1".to_string(),
        plan_id: "p1".to_string(),
    }));
    assert_eq!(current_id(&ctl), "d1");
}

#[tokio::test]
async fn positive_verdict_for_replaced_plan_does_not_adapt() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    let gate = backend.hold(Op::Record);
    backend.push_generate(Ok(PlanBuilder::new("d1").plan_type(PlanType::Daily).build()));
    backend.push_verdict(true);
    backend.push_adapt(Ok(plan("p2")));

    let completing = ctl.complete("u1", "a1");
    let racer = async {
        gate.entered().await;
        let generated = ctl.generate("u1", PlanType::Daily).await;
        gate.release();
        generated
    };

    let (outcome, generated) = tokio::join!(completing, racer);
    assert_eq!(generated.unwrap().id, "d1");
    let outcome = outcome.unwrap();

    assert!(matches!(outcome.monitor, MonitorVerdict::Adapt));
    match &outcome.adaptation {
        Some(Err(e)) => assert_eq!(e.kind(), ErrorKind::PlanSuperseded),
        other => panic!("expected a superseded adaptation, got {other:?}"),
    }
    assert!(outcome.adapted_plan().is_none());
    assert_eq!(backend.count(Op::Adapt), 0, "no adaptation may be sent for d1");
    assert_eq!(current_id(&ctl), "d1");
    assert_eq!(ctl.state(), SessionState::Ready);
}

#[tokio::test]
async fn completions_survive_adaptation() {
    let backend = ScriptedBackend::new();
    let ctl = ready_controller(&backend).await;
    backend.push_verdict(true);
    backend.push_adapt(Ok(PlanBuilder::new("p2").activities(&["a1", "b1"]).build()));

    ctl.complete("u1", "a1").await.unwrap();

    assert_eq!(current_id(&ctl), "p2");
    assert!(ctl.store().is_completed("a1"));
    let summary = ctl.store().completion_summary();
    assert_eq!((summary.completed, summary.total), (1, 2));
}
