//! Plan lifecycle and adaptation engine.
//!
//! The [`lifecycle::PlanLifecycleController`] drives generation, completion
//! and adaptation against the external collaborators in [`service`], keeping
//! the session's [`store::PlanStore`] consistent. The
//! [`trigger::TriggerEvaluator`] decides when adaptation fires.

pub mod config;
pub mod lifecycle;
pub mod service;
pub mod store;
pub mod trigger;

pub use attune_model as model;
