//! Canonical data shape of a therapeutic plan and the invariants every
//! issued plan must satisfy.

pub mod models;
pub mod validate;

pub use models::{
    AdaptationTrigger, DailyActivity, Difficulty, PlanType, Priority, ProgressMetric,
    TherapeuticGoal, TherapeuticPlan, Trend, WeeklyMilestone,
};
pub use validate::MalformedPlan;
