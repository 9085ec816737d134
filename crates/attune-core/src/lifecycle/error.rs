use std::fmt;

use thiserror::Error;

use attune_model::{MalformedPlan, PlanType};

use crate::service::ServiceError;
use crate::trigger::TriggerReason;

use super::SessionState;

/// A controller operation, used to label rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Generate,
    Complete,
    Adapt,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Load => "load",
            Self::Generate => "generate",
            Self::Complete => "complete",
            Self::Adapt => "adapt",
        };
        f.write_str(s)
    }
}

/// Errors returned by the lifecycle controller.
///
/// Every variant leaves the session in a defined state: the transition that
/// produced it was either rolled back or never started.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A payload violated the plan invariants and was not installed.
    #[error("plan rejected: {0}")]
    MalformedPlan(#[from] MalformedPlan),

    #[error("failed to fetch plan for user {user_id}: {source}")]
    FetchFailed {
        user_id: String,
        source: ServiceError,
    },

    #[error("failed to generate {plan_type} plan for user {user_id}: {source}")]
    GenerationFailed {
        user_id: String,
        plan_type: PlanType,
        source: ServiceError,
    },

    #[error("failed to adapt plan {plan_id} ({trigger}): {source}")]
    AdaptationFailed {
        plan_id: String,
        trigger: TriggerReason,
        source: ServiceError,
    },

    /// A conflicting operation is in flight; nothing was sent.
    #[error("{operation} rejected while {state}")]
    Busy {
        operation: Operation,
        state: SessionState,
    },

    /// The completion stays visible locally.
    #[error("failed to record completion of activity {activity_id}: {source}")]
    RecorderFailed {
        activity_id: String,
        source: ServiceError,
    },

    #[error("effectiveness check failed for plan {plan_id}: {source}")]
    MonitorFailed {
        plan_id: String,
        source: ServiceError,
    },

    #[error("{operation} is not valid while {state}")]
    InvalidState {
        operation: Operation,
        state: SessionState,
    },

    #[error("{0} plans cannot be requested")]
    InvalidPlanType(PlanType),

    /// The plan an adaptation was decided for is no longer current.
    #[error("plan {judged} was replaced by {current} before it could be adapted")]
    PlanSuperseded { judged: String, current: String },
}

/// Discriminant of a [`LifecycleError`], for matching without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedPlan,
    FetchFailed,
    GenerationFailed,
    AdaptationFailed,
    Busy,
    RecorderFailed,
    MonitorFailed,
    InvalidState,
    InvalidPlanType,
    PlanSuperseded,
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedPlan(_) => ErrorKind::MalformedPlan,
            Self::FetchFailed { .. } => ErrorKind::FetchFailed,
            Self::GenerationFailed { .. } => ErrorKind::GenerationFailed,
            Self::AdaptationFailed { .. } => ErrorKind::AdaptationFailed,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::RecorderFailed { .. } => ErrorKind::RecorderFailed,
            Self::MonitorFailed { .. } => ErrorKind::MonitorFailed,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::InvalidPlanType(_) => ErrorKind::InvalidPlanType,
            Self::PlanSuperseded { .. } => ErrorKind::PlanSuperseded,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::FetchFailed { .. }
            | Self::GenerationFailed { .. }
            | Self::AdaptationFailed { .. }
            | Self::Busy { .. }
            | Self::RecorderFailed { .. }
            | Self::MonitorFailed { .. } => true,
            Self::MalformedPlan(_)
            | Self::InvalidState { .. }
            | Self::InvalidPlanType(_)
            | Self::PlanSuperseded { .. } => false,
        }
    }
}
