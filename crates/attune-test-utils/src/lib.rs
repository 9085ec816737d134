//! Shared test utilities for attune integration tests.
//!
//! Provides:
//! - [`PlanBuilder`]: valid plan fixtures with sensible defaults.
//! - [`ScriptedBackend`]: an in-memory implementation of every collaborator
//!   trait that replays queued responses, logs each call, and can hold a
//!   call in flight until the test releases it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Notify;

use attune_core::service::{
    AdaptationService, Collaborators, CompletionRecorder, EffectivenessMonitor,
    EffectivenessReport, PlanSource, ServiceError,
};
use attune_core::trigger::TriggerReason;
use attune_model::{
    AdaptationTrigger, DailyActivity, Difficulty, PlanType, Priority, ProgressMetric,
    TherapeuticGoal, TherapeuticPlan, Trend, WeeklyMilestone,
};

// ===========================================================================
// Plan fixtures
// ===========================================================================

/// Fixed generation time so fixtures compare equal across runs.
pub fn fixture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

/// Builder for valid [`TherapeuticPlan`] fixtures.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    id: String,
    user_id: String,
    plan_type: PlanType,
    adaptation_level: f64,
    confidence_score: f64,
    activity_ids: Vec<String>,
}

impl PlanBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            user_id: "u1".to_string(),
            plan_type: PlanType::Weekly,
            adaptation_level: 0.0,
            confidence_score: 0.8,
            activity_ids: vec!["a1".to_string(), "a2".to_string()],
        }
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.user_id = user_id.to_string();
        self
    }

    pub fn plan_type(mut self, plan_type: PlanType) -> Self {
        self.plan_type = plan_type;
        self
    }

    pub fn adaptation_level(mut self, level: f64) -> Self {
        self.adaptation_level = level;
        self
    }

    pub fn confidence(mut self, score: f64) -> Self {
        self.confidence_score = score;
        self
    }

    pub fn activities(mut self, ids: &[&str]) -> Self {
        self.activity_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn build(self) -> TherapeuticPlan {
        let generated_at = fixture_time();
        let valid_for = match self.plan_type {
            PlanType::Daily | PlanType::CrisisIntervention => Duration::days(1),
            PlanType::Weekly => Duration::days(7),
            PlanType::Monthly => Duration::days(30),
        };

        TherapeuticPlan {
            id: self.id,
            user_id: self.user_id,
            plan_type: self.plan_type,
            generated_at,
            valid_until: generated_at + valid_for,
            adaptation_level: self.adaptation_level,
            confidence_score: self.confidence_score,
            therapeutic_goals: vec![TherapeuticGoal {
                id: "g1".to_string(),
                category: "anxiety_management".to_string(),
                title: "Calmer evenings".to_string(),
                description: "Lower anxiety before sleep".to_string(),
                priority: Priority::High,
                target_completion: generated_at + valid_for,
                measurable_outcomes: vec!["Evening anxiety below 4/10".to_string()],
                adaptive_strategies: vec!["breathing".to_string()],
                progress_indicators: vec!["mood log".to_string()],
            }],
            daily_activities: self
                .activity_ids
                .iter()
                .map(|id| DailyActivity {
                    id: id.clone(),
                    activity_type: "mindfulness".to_string(),
                    title: format!("Breathing session {id}"),
                    description: "Slow, paced breathing".to_string(),
                    estimated_duration: 10,
                    difficulty: Difficulty::Beginner,
                    emotional_focus: vec!["calm".to_string()],
                    instructions: vec!["Sit comfortably".to_string(), "Breathe in for 4".to_string()],
                    adaptation_notes: String::new(),
                    scheduled_time: Some("20:00".to_string()),
                    personalized_reason: "Evenings are your hardest time".to_string(),
                })
                .collect(),
            weekly_milestones: vec![WeeklyMilestone {
                id: "m1".to_string(),
                week: 1,
                goal_title: "Calmer evenings".to_string(),
                description: "Five sessions this week".to_string(),
                success_criteria: vec!["5 sessions logged".to_string()],
                reward_type: "badge_unlock".to_string(),
                adaptation_points: 10.0,
            }],
            progress_metrics: vec![ProgressMetric {
                category: "anxiety_level".to_string(),
                baseline: 7.0,
                current_value: 6.0,
                target_value: 4.0,
                trend: Trend::Improving,
                confidence_level: 0.6,
                last_updated: generated_at,
            }],
            adaptation_triggers: vec![AdaptationTrigger {
                trigger_type: "goal_achievement".to_string(),
                threshold: 0.8,
                response_action: "increase_challenge".to_string(),
                description: "Step up once goals are met".to_string(),
            }],
        }
    }
}

/// A valid plan with default contents.
pub fn plan(id: &str) -> TherapeuticPlan {
    PlanBuilder::new(id).build()
}

// ===========================================================================
// Scripted backend
// ===========================================================================

/// A collaborator call, as observed by [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Fetch {
        user_id: String,
    },
    Generate {
        user_id: String,
        plan_type: PlanType,
    },
    Adapt {
        plan_id: String,
        trigger: TriggerReason,
        feedback: Option<serde_json::Value>,
    },
    Record {
        user_id: String,
        activity_id: String,
    },
    Monitor {
        user_id: String,
        plan_id: String,
    },
}

/// Which collaborator call a [`Gate`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Fetch,
    Generate,
    Adapt,
    Record,
    Monitor,
}

/// Holds a scripted call in flight until released.
#[derive(Debug, Default)]
pub struct Gate {
    entered: Notify,
    released: Notify,
}

impl Gate {
    /// Wait until the held call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held call finish.
    pub fn release(&self) {
        self.released.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.released.notified().await;
    }
}

type Queue<T> = Mutex<VecDeque<Result<T, ServiceError>>>;

/// In-memory collaborator that replays queued responses.
///
/// Unscripted calls fall back to: no stored plan, a transport error for
/// generate/adapt, a successful record, and a "hold" monitor verdict.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    fetches: Queue<Option<TherapeuticPlan>>,
    generations: Queue<TherapeuticPlan>,
    adaptations: Queue<TherapeuticPlan>,
    records: Queue<()>,
    verdicts: Queue<EffectivenessReport>,
    calls: Mutex<Vec<Call>>,
    gates: Mutex<HashMap<Op, Arc<Gate>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Collaborators that route every role to this backend.
    pub fn collaborators(backend: &Arc<Self>) -> Collaborators {
        Collaborators::shared(Arc::clone(backend))
    }

    pub fn push_fetch(&self, response: Result<Option<TherapeuticPlan>, ServiceError>) {
        lock(&self.fetches).push_back(response);
    }

    pub fn push_generate(&self, response: Result<TherapeuticPlan, ServiceError>) {
        lock(&self.generations).push_back(response);
    }

    pub fn push_adapt(&self, response: Result<TherapeuticPlan, ServiceError>) {
        lock(&self.adaptations).push_back(response);
    }

    pub fn push_record(&self, response: Result<(), ServiceError>) {
        lock(&self.records).push_back(response);
    }

    pub fn push_verdict(&self, should_adapt: bool) {
        lock(&self.verdicts).push_back(Ok(EffectivenessReport { should_adapt }));
    }

    pub fn push_verdict_error(&self, error: ServiceError) {
        lock(&self.verdicts).push_back(Err(error));
    }

    /// Hold the next calls of `op` in flight until the returned gate is
    /// released.
    pub fn hold(&self, op: Op) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        lock(&self.gates).insert(op, Arc::clone(&gate));
        gate
    }

    /// Every call observed so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// Number of calls of the given kind.
    pub fn count(&self, op: Op) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call_op(call) == op)
            .count()
    }

    async fn enter(&self, call: Call) {
        let op = call_op(&call);
        lock(&self.calls).push(call);
        let gate = lock(&self.gates).get(&op).cloned();
        if let Some(gate) = gate {
            gate.pass().await;
        }
    }
}

fn call_op(call: &Call) -> Op {
    match call {
        Call::Fetch { .. } => Op::Fetch,
        Call::Generate { .. } => Op::Generate,
        Call::Adapt { .. } => Op::Adapt,
        Call::Record { .. } => Op::Record,
        Call::Monitor { .. } => Op::Monitor,
    }
}

fn unscripted(op: &str) -> ServiceError {
    ServiceError::Transport(format!("no scripted {op} response"))
}

#[async_trait]
impl PlanSource for ScriptedBackend {
    async fn fetch_plan(&self, user_id: &str) -> Result<Option<TherapeuticPlan>, ServiceError> {
        self.enter(Call::Fetch {
            user_id: user_id.to_string(),
        })
        .await;
        lock(&self.fetches).pop_front().unwrap_or(Ok(None))
    }

    async fn generate_plan(
        &self,
        user_id: &str,
        plan_type: PlanType,
    ) -> Result<TherapeuticPlan, ServiceError> {
        self.enter(Call::Generate {
            user_id: user_id.to_string(),
            plan_type,
        })
        .await;
        lock(&self.generations)
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("generate")))
    }
}

#[async_trait]
impl AdaptationService for ScriptedBackend {
    async fn adapt_plan(
        &self,
        plan_id: &str,
        trigger: &TriggerReason,
        feedback: Option<&serde_json::Value>,
    ) -> Result<TherapeuticPlan, ServiceError> {
        self.enter(Call::Adapt {
            plan_id: plan_id.to_string(),
            trigger: trigger.clone(),
            feedback: feedback.cloned(),
        })
        .await;
        lock(&self.adaptations)
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("adapt")))
    }
}

#[async_trait]
impl CompletionRecorder for ScriptedBackend {
    async fn record_completion(
        &self,
        user_id: &str,
        activity_id: &str,
        _completed_at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.enter(Call::Record {
            user_id: user_id.to_string(),
            activity_id: activity_id.to_string(),
        })
        .await;
        lock(&self.records).pop_front().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl EffectivenessMonitor for ScriptedBackend {
    async fn check_effectiveness(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<EffectivenessReport, ServiceError> {
        self.enter(Call::Monitor {
            user_id: user_id.to_string(),
            plan_id: plan_id.to_string(),
        })
        .await;
        lock(&self.verdicts)
            .pop_front()
            .unwrap_or(Ok(EffectivenessReport {
                should_adapt: false,
            }))
    }
}
