//! Plain-text rendering of plans and command outcomes.

use std::fmt;

use attune_core::lifecycle::{CompletionOutcome, MonitorVerdict};
use attune_core::store::PlanStore;
use attune_model::TherapeuticPlan;

/// A plan together with the session's completion marks.
pub struct PlanReport<'a> {
    pub plan: &'a TherapeuticPlan,
    pub store: &'a PlanStore,
}

impl fmt::Display for PlanReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = self.plan;
        let summary = self.store.completion_summary();

        writeln!(f, "Plan {} ({})", plan.id, plan.plan_type)?;
        writeln!(f, "  User:             {}", plan.user_id)?;
        writeln!(f, "  Confidence:       {}%", plan.confidence_percent())?;
        writeln!(f, "  Adaptation level: {}%", plan.adaptation_percent())?;
        writeln!(
            f,
            "  Valid:            {} .. {}",
            plan.generated_at.format("%Y-%m-%d %H:%M"),
            plan.valid_until.format("%Y-%m-%d %H:%M"),
        )?;
        writeln!(
            f,
            "  Completed:        {}/{}",
            summary.completed, summary.total
        )?;

        writeln!(f)?;
        writeln!(f, "Activities:")?;
        if plan.daily_activities.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for activity in &plan.daily_activities {
            let mark = if self.store.is_completed(&activity.id) { "x" } else { " " };
            let time = activity.scheduled_time.as_deref().unwrap_or("--:--");
            writeln!(
                f,
                "  [{mark}] {time}  {:<28} {:>3} min  {:<12}  ({})",
                activity.title,
                activity.estimated_duration,
                activity.difficulty.to_string(),
                activity.id,
            )?;
            if !activity.personalized_reason.is_empty() {
                writeln!(f, "        {}", activity.personalized_reason)?;
            }
        }

        if !plan.therapeutic_goals.is_empty() {
            writeln!(f)?;
            writeln!(f, "Goals:")?;
            for goal in &plan.therapeutic_goals {
                writeln!(
                    f,
                    "  - {} [{} priority, due {}]",
                    goal.title,
                    goal.priority,
                    goal.target_completion.format("%Y-%m-%d"),
                )?;
            }
        }

        if !plan.progress_metrics.is_empty() {
            writeln!(f)?;
            writeln!(f, "Progress:")?;
            for metric in &plan.progress_metrics {
                writeln!(
                    f,
                    "  {:<24} {:>3}%  ({}, {} -> {} -> {})",
                    metric.category_label(),
                    metric.progress_percent(),
                    metric.trend,
                    metric.baseline,
                    metric.current_value,
                    metric.target_value,
                )?;
            }
        }

        if !plan.weekly_milestones.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "Milestones ({} pts total):",
                plan.total_adaptation_points()
            )?;
            for milestone in &plan.weekly_milestones {
                writeln!(
                    f,
                    "  Week {}: {} ({}, {} pts)",
                    milestone.week,
                    milestone.goal_title,
                    milestone.reward_label(),
                    milestone.adaptation_points,
                )?;
            }
        }

        Ok(())
    }
}

/// What a `complete` command did, one line per step.
pub struct OutcomeReport<'a>(pub &'a CompletionOutcome);

impl fmt::Display for OutcomeReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = self.0;

        if outcome.newly_completed {
            writeln!(f, "Activity {} completed.", outcome.activity_id)?;
        } else {
            writeln!(f, "Activity {} was already completed.", outcome.activity_id)?;
        }
        if let Some(e) = &outcome.recorder_error {
            writeln!(f, "  warning: {e}")?;
        }

        match &outcome.monitor {
            MonitorVerdict::NotQueried => {}
            MonitorVerdict::Hold => writeln!(f, "  Plan {} stays as is.", outcome.plan_id)?,
            MonitorVerdict::Adapt => writeln!(f, "  Plan {} is due for adaptation.", outcome.plan_id)?,
            MonitorVerdict::Failed(e) => writeln!(f, "  warning: {e}")?,
        }

        match &outcome.adaptation {
            None => {}
            Some(Ok(plan)) => writeln!(
                f,
                "  Adapted to plan {} (adaptation level {}%).",
                plan.id,
                plan.adaptation_percent()
            )?,
            Some(Err(e)) => writeln!(f, "  warning: {e}")?,
        }

        Ok(())
    }
}
