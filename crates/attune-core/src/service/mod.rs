//! Collaborator contracts for the plan lifecycle.
//!
//! The engine never talks to a backend directly: plan retrieval and
//! generation, adaptation, effectiveness monitoring and completion recording
//! each sit behind an object-safe trait. [`HttpPlanService`] binds all four
//! to the JSON routes of the plan backend.
//!
//! ```text
//! PlanLifecycleController
//!     |
//!     +-- PlanSource ............ fetch_plan / generate_plan
//!     +-- AdaptationService ..... adapt_plan
//!     +-- CompletionRecorder .... record_completion
//!     +-- EffectivenessMonitor .. check_effectiveness
//! ```

pub mod http;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use attune_model::{MalformedPlan, PlanType, TherapeuticPlan};

use crate::trigger::TriggerReason;

pub use http::HttpPlanService;

/// Errors reported by a collaborator call.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request never produced a response (connection, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("service returned {status}: {message}")]
    Status { status: u16, message: String },

    /// A plan payload could not be decoded.
    #[error(transparent)]
    Malformed(#[from] MalformedPlan),

    /// The response was well-formed HTTP but not the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid service endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ServiceError {
    /// Wrap any displayable transport failure.
    pub fn transport(err: impl fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Verdict of the effectiveness monitor for a user's current plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectivenessReport {
    pub should_adapt: bool,
}

/// Retrieves the stored plan for a user and generates new ones.
#[async_trait]
pub trait PlanSource: Send + Sync {
    /// Fetch the user's current plan. `Ok(None)` means no plan exists.
    async fn fetch_plan(&self, user_id: &str) -> Result<Option<TherapeuticPlan>, ServiceError>;

    /// Generate a brand-new plan of the given cadence.
    async fn generate_plan(
        &self,
        user_id: &str,
        plan_type: PlanType,
    ) -> Result<TherapeuticPlan, ServiceError>;
}

/// Produces a new revision of an existing plan.
#[async_trait]
pub trait AdaptationService: Send + Sync {
    async fn adapt_plan(
        &self,
        plan_id: &str,
        trigger: &TriggerReason,
        feedback: Option<&serde_json::Value>,
    ) -> Result<TherapeuticPlan, ServiceError>;
}

/// Durably records that an activity was completed.
#[async_trait]
pub trait CompletionRecorder: Send + Sync {
    async fn record_completion(
        &self,
        user_id: &str,
        activity_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), ServiceError>;
}

/// Judges whether a plan's trajectory warrants adaptation.
#[async_trait]
pub trait EffectivenessMonitor: Send + Sync {
    async fn check_effectiveness(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<EffectivenessReport, ServiceError>;
}

// Compile-time assertion: every collaborator trait must be object-safe.
const _: () = {
    fn _assert_object_safe(
        _: &dyn PlanSource,
        _: &dyn AdaptationService,
        _: &dyn CompletionRecorder,
        _: &dyn EffectivenessMonitor,
    ) {
    }
};

/// The set of collaborators a controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub plans: Arc<dyn PlanSource>,
    pub adapter: Arc<dyn AdaptationService>,
    pub recorder: Arc<dyn CompletionRecorder>,
    pub monitor: Arc<dyn EffectivenessMonitor>,
}

impl Collaborators {
    /// Use one backend for every collaborator role.
    pub fn shared<T>(backend: Arc<T>) -> Self
    where
        T: PlanSource + AdaptationService + CompletionRecorder + EffectivenessMonitor + 'static,
    {
        Self {
            plans: backend.clone(),
            adapter: backend.clone(),
            recorder: backend.clone(),
            monitor: backend,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
