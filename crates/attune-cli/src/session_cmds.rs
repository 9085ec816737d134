//! CLI handlers for the one-shot session commands.
//!
//! Implements:
//! - `attune show`               -- load and print the current plan
//! - `attune generate [--type]`  -- load, then request a new plan
//! - `attune complete <id>`      -- load, then complete an activity
//! - `attune adapt [--feedback]` -- load, then request an adaptation
//!
//! Each command opens a fresh session against the configured backend.

use std::sync::Arc;

use anyhow::{Context, Result, bail};

use attune_core::lifecycle::PlanLifecycleController;
use attune_core::service::{Collaborators, HttpPlanService};
use attune_core::store::PlanStore;
use attune_model::{PlanType, TherapeuticPlan};

use crate::config::AttuneConfig;
use crate::render::{OutcomeReport, PlanReport};

// -----------------------------------------------------------------------
// Session
// -----------------------------------------------------------------------

/// A controller bound to one user and the configured backend.
pub struct Session {
    controller: PlanLifecycleController,
    user_id: String,
}

impl Session {
    pub fn connect(config: &AttuneConfig) -> Result<Self> {
        let service = HttpPlanService::new(&config.service).with_context(|| {
            format!("invalid plan service URL: {}", config.service.base_url)
        })?;
        Ok(Self::with_services(
            Collaborators::shared(Arc::new(service)),
            &config.user_id,
        ))
    }

    pub fn with_services(services: Collaborators, user_id: &str) -> Self {
        Self {
            controller: PlanLifecycleController::new(Arc::new(PlanStore::new()), services),
            user_id: user_id.to_string(),
        }
    }

    /// Load the user's plan, if any.
    pub async fn load(&self) -> Result<Option<Arc<TherapeuticPlan>>> {
        self.controller
            .load(&self.user_id)
            .await
            .with_context(|| format!("failed to load plan for user {}", self.user_id))
    }

    /// Load the user's plan, failing if none exists.
    async fn load_existing(&self) -> Result<Arc<TherapeuticPlan>> {
        match self.load().await? {
            Some(plan) => Ok(plan),
            None => bail!(
                "user {} has no plan yet. Use `attune generate` to create one.",
                self.user_id
            ),
        }
    }

    fn report<'a>(&'a self, plan: &'a TherapeuticPlan) -> PlanReport<'a> {
        PlanReport {
            plan,
            store: self.controller.store(),
        }
    }
}

// -----------------------------------------------------------------------
// Commands
// -----------------------------------------------------------------------

pub async fn run_show(session: &Session) -> Result<()> {
    match session.load().await? {
        Some(plan) => print!("{}", session.report(&plan)),
        None => println!(
            "No plan found for user {}. Use `attune generate` to create one.",
            session.user_id
        ),
    }
    Ok(())
}

pub async fn run_generate(session: &Session, plan_type: PlanType) -> Result<()> {
    session.load().await?;
    let plan = session
        .controller
        .generate(&session.user_id, plan_type)
        .await
        .with_context(|| format!("failed to generate a {plan_type} plan"))?;

    println!("Generated {plan_type} plan {}.", plan.id);
    println!();
    print!("{}", session.report(&plan));
    Ok(())
}

pub async fn run_complete(session: &Session, activity_id: &str) -> Result<()> {
    let plan = session.load_existing().await?;
    if plan.activity(activity_id).is_none() {
        bail!("activity {activity_id} is not part of plan {}", plan.id);
    }

    let outcome = session
        .controller
        .complete(&session.user_id, activity_id)
        .await
        .with_context(|| format!("failed to complete activity {activity_id}"))?;

    print!("{}", OutcomeReport(&outcome));
    Ok(())
}

pub async fn run_adapt(session: &Session, feedback: Option<&str>) -> Result<()> {
    let feedback = feedback
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--feedback must be a JSON document")?;

    let before = session.load_existing().await?;
    let plan = session
        .controller
        .request_adaptation(feedback)
        .await
        .with_context(|| format!("failed to adapt plan {}", before.id))?;

    println!(
        "Plan {} adapted to {} (adaptation level {}% -> {}%).",
        before.id,
        plan.id,
        before.adaptation_percent(),
        plan.adaptation_percent()
    );
    println!();
    print!("{}", session.report(&plan));
    Ok(())
}
