//! Plan lifecycle controller: drives a session's plan from first load
//! through completions and adaptations.
//!
//! The controller is the only writer of the session's [`PlanStore`]. Every
//! operation either commits fully (plan installed, state advanced) or rolls
//! back (prior plan kept, prior state restored).

mod error;

pub use error::{ErrorKind, LifecycleError, Operation};

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use attune_model::{PlanType, TherapeuticPlan};

use crate::service::{Collaborators, ServiceError};
use crate::store::PlanStore;
use crate::trigger::{TriggerEvaluator, TriggerReason};

/// State of a plan session.
///
/// ```text
/// uninitialized -> loading -> ready | empty
/// loading       -> uninitialized        (fetch failed)
/// empty | ready -> generating -> ready  (restored on failure)
/// ready         -> adapting   -> ready
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    /// No plan exists and generation has not been requested.
    Empty,
    Ready,
    Generating,
    Adapting,
}

impl SessionState {
    /// Whether a collaborator call is in flight.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Loading | Self::Generating | Self::Adapting)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Empty => "empty",
            Self::Ready => "ready",
            Self::Generating => "generating",
            Self::Adapting => "adapting",
        };
        f.write_str(s)
    }
}

/// What the effectiveness monitor said after a completion.
#[derive(Debug)]
pub enum MonitorVerdict {
    NotQueried,
    Hold,
    Adapt,
    Failed(LifecycleError),
}

/// Result of completing an activity.
///
/// The completion itself always sticks locally; the remaining fields report
/// what happened downstream of it.
#[derive(Debug)]
pub struct CompletionOutcome {
    pub activity_id: String,
    /// The plan that was current when the completion started.
    pub plan_id: String,
    /// `false` if the activity was already completed this session.
    pub newly_completed: bool,
    /// Set when the recorder could not store the completion.
    pub recorder_error: Option<LifecycleError>,
    pub monitor: MonitorVerdict,
    /// Result of the adaptation the monitor verdict triggered, if any.
    pub adaptation: Option<Result<Arc<TherapeuticPlan>, LifecycleError>>,
}

impl CompletionOutcome {
    /// The plan installed by a triggered adaptation.
    pub fn adapted_plan(&self) -> Option<&Arc<TherapeuticPlan>> {
        match &self.adaptation {
            Some(Ok(plan)) => Some(plan),
            _ => None,
        }
    }

    /// Every error reported along the way, in order.
    pub fn errors(&self) -> Vec<&LifecycleError> {
        let mut errors = Vec::new();
        errors.extend(self.recorder_error.as_ref());
        if let MonitorVerdict::Failed(e) = &self.monitor {
            errors.push(e);
        }
        if let Some(Err(e)) = &self.adaptation {
            errors.push(e);
        }
        errors
    }
}

/// Orchestrates generation, completion and adaptation for one user session.
///
/// Methods take `&self` and may be polled concurrently. The state flag is
/// never held across an await, so an overlapping call observes the
/// in-flight state and is rejected with [`LifecycleError::Busy`] rather
/// than queued.
pub struct PlanLifecycleController {
    store: Arc<PlanStore>,
    services: Collaborators,
    state: Mutex<SessionState>,
}

impl PlanLifecycleController {
    pub fn new(store: Arc<PlanStore>, services: Collaborators) -> Self {
        Self {
            store,
            services,
            state: Mutex::new(SessionState::Uninitialized),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn store(&self) -> &Arc<PlanStore> {
        &self.store
    }

    /// Load the user's current plan.
    ///
    /// Valid only before the first successful load. Returns the installed
    /// plan, or `None` when the user has no plan (state `empty`). On a
    /// transport failure the session stays `uninitialized` and the call may
    /// be retried.
    pub async fn load(&self, user_id: &str) -> Result<Option<Arc<TherapeuticPlan>>, LifecycleError> {
        self.begin(Operation::Load, &[SessionState::Uninitialized], SessionState::Loading)?;
        debug!(user_id, "loading plan");

        let fetched = match self.services.plans.fetch_plan(user_id).await {
            Ok(Some(plan)) => plan
                .validate()
                .map(|()| Some(plan))
                .map_err(LifecycleError::from),
            Ok(None) => Ok(None),
            Err(ServiceError::Malformed(e)) => Err(LifecycleError::MalformedPlan(e)),
            Err(source) => Err(LifecycleError::FetchFailed {
                user_id: user_id.to_owned(),
                source,
            }),
        };

        match fetched {
            Ok(Some(plan)) => {
                let plan = self.install(plan);
                self.set_state(SessionState::Ready);
                Ok(Some(plan))
            }
            Ok(None) => {
                info!(user_id, "no plan exists for user");
                self.set_state(SessionState::Empty);
                Ok(None)
            }
            Err(e) => {
                warn!(user_id, error = %e, "plan load failed");
                self.set_state(SessionState::Uninitialized);
                Err(e)
            }
        }
    }

    /// Request a brand-new plan of the given cadence.
    ///
    /// Valid from `empty` or `ready`. On failure the previous plan (if any)
    /// stays current and the previous state is restored.
    pub async fn generate(
        &self,
        user_id: &str,
        plan_type: PlanType,
    ) -> Result<Arc<TherapeuticPlan>, LifecycleError> {
        if !plan_type.is_requestable() {
            return Err(LifecycleError::InvalidPlanType(plan_type));
        }
        let prior = self.begin(
            Operation::Generate,
            &[SessionState::Empty, SessionState::Ready],
            SessionState::Generating,
        )?;
        info!(user_id, %plan_type, "generating plan");

        let result = self.services.plans.generate_plan(user_id, plan_type).await;
        let accepted = accept_plan(result, |source| LifecycleError::GenerationFailed {
            user_id: user_id.to_owned(),
            plan_type,
            source,
        });

        match accepted {
            Ok(plan) => {
                let plan = self.install(plan);
                self.set_state(SessionState::Ready);
                Ok(plan)
            }
            Err(e) => {
                warn!(user_id, %plan_type, error = %e, "plan generation failed");
                self.set_state(prior);
                Err(e)
            }
        }
    }

    /// Complete an activity of the current plan.
    ///
    /// The activity is marked completed locally before the recorder is
    /// called, and stays marked if recording fails. The effectiveness
    /// monitor is then asked about the plan that was current when this call
    /// started; a positive verdict adapts the plan with
    /// [`TriggerReason::GoalAchievement`], unless that plan was replaced in
    /// the meantime ([`LifecycleError::PlanSuperseded`]).
    pub async fn complete(
        &self,
        user_id: &str,
        activity_id: &str,
    ) -> Result<CompletionOutcome, LifecycleError> {
        let plan = self.ready_plan(Operation::Complete)?;
        let plan_id = plan.id.clone();

        let signal = TriggerEvaluator::on_activity_completed(&plan, activity_id);
        if !signal.known_activity {
            warn!(plan_id = %plan_id, activity_id, "completed activity is not part of the current plan");
        }
        let newly_completed = self.store.mark_completed(activity_id);
        drop(plan);

        let recorder_error = match self
            .services
            .recorder
            .record_completion(user_id, activity_id, Utc::now())
            .await
        {
            Ok(()) => None,
            Err(source) => {
                warn!(user_id, activity_id, error = %source, "failed to record completion (kept locally)");
                Some(LifecycleError::RecorderFailed {
                    activity_id: activity_id.to_owned(),
                    source,
                })
            }
        };

        let mut outcome = CompletionOutcome {
            activity_id: activity_id.to_owned(),
            plan_id,
            newly_completed,
            recorder_error,
            monitor: MonitorVerdict::NotQueried,
            adaptation: None,
        };

        if !signal.should_query {
            return Ok(outcome);
        }

        match self
            .services
            .monitor
            .check_effectiveness(user_id, &outcome.plan_id)
            .await
        {
            Ok(report) => {
                let decision = TriggerEvaluator::on_monitor_result(report.should_adapt);
                debug!(plan_id = %outcome.plan_id, should_adapt = report.should_adapt, "effectiveness checked");
                match decision.into_reason() {
                    Some(reason) => {
                        outcome.monitor = MonitorVerdict::Adapt;
                        let adapted = self.adapt_judged(reason, None, Some(&outcome.plan_id)).await;
                        outcome.adaptation = Some(adapted);
                    }
                    None => outcome.monitor = MonitorVerdict::Hold,
                }
            }
            Err(source) => {
                warn!(plan_id = %outcome.plan_id, error = %source, "effectiveness check failed");
                outcome.monitor = MonitorVerdict::Failed(LifecycleError::MonitorFailed {
                    plan_id: outcome.plan_id.clone(),
                    source,
                });
            }
        }

        Ok(outcome)
    }

    /// Replace the current plan with a new revision from the adaptation
    /// service.
    ///
    /// Valid only in `ready`; at most one adaptation is in flight per
    /// session. On failure the prior plan stays current.
    pub async fn adapt(
        &self,
        trigger: TriggerReason,
        feedback: Option<serde_json::Value>,
    ) -> Result<Arc<TherapeuticPlan>, LifecycleError> {
        self.adapt_judged(trigger, feedback, None).await
    }

    /// Adapt the current plan, provided it is still the plan `judged`
    /// names.
    ///
    /// The check runs after the session entered `adapting`, so no other
    /// operation can replace the plan between the check and the request.
    async fn adapt_judged(
        &self,
        trigger: TriggerReason,
        feedback: Option<serde_json::Value>,
        judged: Option<&str>,
    ) -> Result<Arc<TherapeuticPlan>, LifecycleError> {
        self.begin(Operation::Adapt, &[SessionState::Ready], SessionState::Adapting)?;

        let Some(prior) = self.store.current_plan() else {
            self.set_state(SessionState::Ready);
            return Err(LifecycleError::InvalidState {
                operation: Operation::Adapt,
                state: SessionState::Ready,
            });
        };

        if let Some(judged) = judged.filter(|id| *id != prior.id) {
            warn!(
                judged_plan_id = judged,
                plan_id = %prior.id,
                %trigger,
                "plan replaced since the effectiveness check, not adapting"
            );
            self.set_state(SessionState::Ready);
            return Err(LifecycleError::PlanSuperseded {
                judged: judged.to_owned(),
                current: prior.id.clone(),
            });
        }

        match TriggerEvaluator::declared_rule(&prior, &trigger) {
            Some(rule) => info!(
                plan_id = %prior.id,
                %trigger,
                response_action = %rule.response_action,
                "adapting plan"
            ),
            None => info!(plan_id = %prior.id, %trigger, "adapting plan"),
        }

        let result = self
            .services
            .adapter
            .adapt_plan(&prior.id, &trigger, feedback.as_ref())
            .await;
        let accepted = accept_plan(result, |source| LifecycleError::AdaptationFailed {
            plan_id: prior.id.clone(),
            trigger: trigger.clone(),
            source,
        });

        match accepted {
            Ok(plan) => {
                let plan = self.install(plan);
                self.set_state(SessionState::Ready);
                Ok(plan)
            }
            Err(e) => {
                warn!(plan_id = %prior.id, error = %e, "adaptation failed, keeping prior plan");
                self.set_state(SessionState::Ready);
                Err(e)
            }
        }
    }

    /// Adapt on the user's explicit request.
    pub async fn request_adaptation(
        &self,
        feedback: Option<serde_json::Value>,
    ) -> Result<Arc<TherapeuticPlan>, LifecycleError> {
        let reason = TriggerEvaluator::on_user_request()
            .into_reason()
            .unwrap_or(TriggerReason::UserRequest);
        self.adapt(reason, feedback).await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Atomically check the current state and move to `next`.
    ///
    /// Returns the state that was left. In-flight states reject with
    /// `Busy`, anything else outside `from` with `InvalidState`.
    fn begin(
        &self,
        operation: Operation,
        from: &[SessionState],
        next: SessionState,
    ) -> Result<SessionState, LifecycleError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let current = *state;
        check_state(operation, current, from)?;
        *state = next;
        Ok(current)
    }

    /// The current plan, provided the session is `ready`.
    fn ready_plan(&self, operation: Operation) -> Result<Arc<TherapeuticPlan>, LifecycleError> {
        let state = self.state();
        check_state(operation, state, &[SessionState::Ready])?;
        self.store
            .current_plan()
            .ok_or(LifecycleError::InvalidState { operation, state })
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = next;
    }

    fn install(&self, plan: TherapeuticPlan) -> Arc<TherapeuticPlan> {
        let plan = Arc::new(plan);
        let previous = self.store.set_plan(Arc::clone(&plan));
        info!(
            plan_id = %plan.id,
            plan_type = %plan.plan_type,
            replaced = previous.as_ref().map(|p| p.id.as_str()).unwrap_or("-"),
            "plan installed"
        );
        plan
    }
}

impl fmt::Debug for PlanLifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanLifecycleController")
            .field("state", &self.state())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn check_state(
    operation: Operation,
    current: SessionState,
    allowed: &[SessionState],
) -> Result<(), LifecycleError> {
    if allowed.contains(&current) {
        Ok(())
    } else if current.is_in_flight() {
        Err(LifecycleError::Busy {
            operation,
            state: current,
        })
    } else {
        Err(LifecycleError::InvalidState {
            operation,
            state: current,
        })
    }
}

/// Validate a collaborator's plan response.
///
/// Undecodable or invariant-violating payloads become `MalformedPlan`; other
/// service errors are mapped by `failed`.
fn accept_plan(
    result: Result<TherapeuticPlan, ServiceError>,
    failed: impl FnOnce(ServiceError) -> LifecycleError,
) -> Result<TherapeuticPlan, LifecycleError> {
    let plan = result.map_err(|e| match e {
        ServiceError::Malformed(malformed) => LifecycleError::MalformedPlan(malformed),
        other => failed(other),
    })?;
    plan.validate()?;
    Ok(plan)
}
