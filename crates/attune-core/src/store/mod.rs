//! Session-scoped plan store.
//!
//! Holds the single current plan of a session and the set of activity ids
//! the user completed during it. The store is the only thing the view layer
//! reads; the lifecycle controller is its only writer.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use attune_model::TherapeuticPlan;

/// Completed versus total activities of the current plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionSummary {
    pub completed: usize,
    pub total: usize,
}

/// The session's current plan and completed-activity set.
///
/// Replacing the plan never clears the completed set: completion is tracked
/// per session, not per plan revision.
#[derive(Debug)]
pub struct PlanStore {
    plan: watch::Sender<Option<Arc<TherapeuticPlan>>>,
    completed: Mutex<HashSet<String>>,
}

impl PlanStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (plan, _) = watch::channel(None);
        Self {
            plan,
            completed: Mutex::new(HashSet::new()),
        }
    }

    /// Replace the current plan, returning the snapshot it replaced.
    ///
    /// Readers see either the old or the new plan, never a mix.
    pub fn set_plan(
        &self,
        plan: impl Into<Arc<TherapeuticPlan>>,
    ) -> Option<Arc<TherapeuticPlan>> {
        self.plan.send_replace(Some(plan.into()))
    }

    /// Snapshot of the current plan, if one is installed.
    pub fn current_plan(&self) -> Option<Arc<TherapeuticPlan>> {
        self.plan.borrow().clone()
    }

    /// Observe every plan installed from now on.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<TherapeuticPlan>>> {
        self.plan.subscribe()
    }

    /// Record an activity as completed.
    ///
    /// Returns `true` if the id was not already completed. Completing the
    /// same id again is a no-op.
    pub fn mark_completed(&self, activity_id: &str) -> bool {
        let mut completed = self.completed.lock().unwrap_or_else(|e| e.into_inner());
        completed.insert(activity_id.to_owned())
    }

    pub fn is_completed(&self, activity_id: &str) -> bool {
        let completed = self.completed.lock().unwrap_or_else(|e| e.into_inner());
        completed.contains(activity_id)
    }

    /// Number of distinct activity ids completed this session, across plan
    /// revisions.
    pub fn completed_count(&self) -> usize {
        let completed = self.completed.lock().unwrap_or_else(|e| e.into_inner());
        completed.len()
    }

    /// How many activities of the current plan are completed.
    pub fn completion_summary(&self) -> CompletionSummary {
        let Some(plan) = self.current_plan() else {
            return CompletionSummary::default();
        };
        let completed = self.completed.lock().unwrap_or_else(|e| e.into_inner());
        CompletionSummary {
            completed: plan
                .daily_activities
                .iter()
                .filter(|a| completed.contains(&a.id))
                .count(),
            total: plan.daily_activities.len(),
        }
    }
}

impl Default for PlanStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attune_model::{DailyActivity, Difficulty, PlanType};
    use chrono::{Duration, Utc};

    fn activity(id: &str) -> DailyActivity {
        DailyActivity {
            id: id.to_string(),
            activity_type: "journaling".to_string(),
            title: format!("Activity {id}"),
            description: String::new(),
            estimated_duration: 10,
            difficulty: Difficulty::Beginner,
            emotional_focus: vec![],
            instructions: vec![],
            adaptation_notes: String::new(),
            scheduled_time: None,
            personalized_reason: String::new(),
        }
    }

    fn plan(id: &str, activity_ids: &[&str]) -> TherapeuticPlan {
        let now = Utc::now();
        TherapeuticPlan {
            id: id.to_string(),
            user_id: "u1".to_string(),
            plan_type: PlanType::Daily,
            generated_at: now,
            valid_until: now + Duration::days(1),
            adaptation_level: 0.0,
            confidence_score: 0.5,
            therapeutic_goals: vec![],
            daily_activities: activity_ids.iter().map(|id| activity(id)).collect(),
            weekly_milestones: vec![],
            progress_metrics: vec![],
            adaptation_triggers: vec![],
        }
    }

    #[test]
    fn empty_store_has_no_plan() {
        let store = PlanStore::new();
        assert!(store.current_plan().is_none());
        assert_eq!(store.completion_summary(), CompletionSummary::default());
    }

    #[test]
    fn set_plan_returns_previous_snapshot() {
        let store = PlanStore::new();
        assert!(store.set_plan(plan("p1", &[])).is_none());
        let previous = store.set_plan(plan("p2", &[])).expect("p1 was installed");
        assert_eq!(previous.id, "p1");
        assert_eq!(store.current_plan().unwrap().id, "p2");
    }

    #[test]
    fn mark_completed_is_idempotent() {
        let store = PlanStore::new();
        assert!(store.mark_completed("a1"));
        assert!(!store.mark_completed("a1"));
        assert_eq!(store.completed_count(), 1);
        assert!(store.is_completed("a1"));
        assert!(!store.is_completed("a2"));
    }

    #[test]
    fn completions_survive_plan_replacement() {
        let store = PlanStore::new();
        store.set_plan(plan("p1", &["a1", "a2"]));
        store.mark_completed("a1");

        store.set_plan(plan("p2", &["b1", "b2", "b3"]));
        assert!(store.is_completed("a1"));
        assert_eq!(
            store.completion_summary(),
            CompletionSummary {
                completed: 0,
                total: 3
            }
        );

        store.mark_completed("b2");
        assert_eq!(store.completion_summary().completed, 1);
        assert_eq!(store.completed_count(), 2);
    }

    #[test]
    fn subscribers_observe_installed_plans() {
        let store = PlanStore::new();
        let mut rx = store.subscribe();
        assert!(rx.borrow_and_update().is_none());

        store.set_plan(plan("p1", &[]));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().id, "p1");
    }
}
