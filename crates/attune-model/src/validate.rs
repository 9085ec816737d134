//! Plan payload validation.
//!
//! Decodes a plan payload into a [`TherapeuticPlan`] and checks:
//! - Plan, goal, activity and milestone identifiers are present and unique
//!   within their collection.
//! - Scores and confidence levels lie in `[0, 1]`.
//! - The validity window is non-empty (`valid_until > generated_at`).
//! - Activity durations are positive, milestone weeks start at 1 and
//!   adaptation points are non-negative.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::TherapeuticPlan;

/// A plan payload that violates the data invariants.
///
/// A plan carrying any of these is rejected and never installed.
#[derive(Debug, Error)]
pub enum MalformedPlan {
    #[error("plan payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("empty identifier in {collection}")]
    EmptyId { collection: &'static str },

    #[error("duplicate identifier {id:?} in {collection}")]
    DuplicateId { collection: &'static str, id: String },

    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: String, value: f64 },

    #[error("validity window is empty: generated at {generated_at}, valid until {valid_until}")]
    EmptyValidityWindow {
        generated_at: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    },

    #[error("activity {activity:?} must have a positive estimated duration")]
    NonPositiveDuration { activity: String },

    #[error("milestone {milestone:?} has week {week}, weeks start at 1")]
    InvalidWeek { milestone: String, week: u32 },

    #[error("milestone {milestone:?} has invalid adaptation points {points}")]
    InvalidAdaptationPoints { milestone: String, points: f64 },
}

impl TherapeuticPlan {
    /// Decode and validate a plan payload.
    pub fn from_json(value: serde_json::Value) -> Result<Self, MalformedPlan> {
        let plan: TherapeuticPlan = serde_json::from_value(value)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check every data invariant of the plan.
    pub fn validate(&self) -> Result<(), MalformedPlan> {
        if self.id.trim().is_empty() {
            return Err(MalformedPlan::EmptyId { collection: "plan" });
        }

        if self.valid_until <= self.generated_at {
            return Err(MalformedPlan::EmptyValidityWindow {
                generated_at: self.generated_at,
                valid_until: self.valid_until,
            });
        }

        check_unit_interval("adaptationLevel", self.adaptation_level)?;
        check_unit_interval("confidenceScore", self.confidence_score)?;

        check_unique_ids(
            "therapeuticGoals",
            self.therapeutic_goals.iter().map(|g| g.id.as_str()),
        )?;
        check_unique_ids(
            "dailyActivities",
            self.daily_activities.iter().map(|a| a.id.as_str()),
        )?;
        check_unique_ids(
            "weeklyMilestones",
            self.weekly_milestones.iter().map(|m| m.id.as_str()),
        )?;

        for activity in &self.daily_activities {
            if activity.estimated_duration == 0 {
                return Err(MalformedPlan::NonPositiveDuration {
                    activity: activity.id.clone(),
                });
            }
        }

        for milestone in &self.weekly_milestones {
            if milestone.week == 0 {
                return Err(MalformedPlan::InvalidWeek {
                    milestone: milestone.id.clone(),
                    week: milestone.week,
                });
            }
            if !milestone.adaptation_points.is_finite() || milestone.adaptation_points < 0.0 {
                return Err(MalformedPlan::InvalidAdaptationPoints {
                    milestone: milestone.id.clone(),
                    points: milestone.adaptation_points,
                });
            }
        }

        for metric in &self.progress_metrics {
            check_unit_interval(
                &format!("progressMetrics[{}].confidenceLevel", metric.category),
                metric.confidence_level,
            )?;
        }

        Ok(())
    }
}

fn check_unit_interval(field: &str, value: f64) -> Result<(), MalformedPlan> {
    // NaN fails the range check as well.
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MalformedPlan::OutOfRange {
            field: field.to_string(),
            value,
        })
    }
}

fn check_unique_ids<'a>(
    collection: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), MalformedPlan> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(MalformedPlan::EmptyId { collection });
        }
        if !seen.insert(id) {
            return Err(MalformedPlan::DuplicateId {
                collection,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}
