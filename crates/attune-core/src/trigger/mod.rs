//! Adaptation trigger evaluation.
//!
//! Separates "something happened" from "we should adapt": a completion only
//! ever asks for an effectiveness check, the monitor's verdict decides
//! implicit adaptation, and an explicit user request always fires.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use attune_model::{AdaptationTrigger, TherapeuticPlan};

/// The reason sent along with an adaptation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerReason {
    /// The user explicitly asked for a new revision.
    UserRequest,
    /// The effectiveness monitor judged the plan's goals met or off track.
    GoalAchievement,
    /// Any other label, e.g. one declared by a plan's adaptation triggers.
    Custom(String),
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserRequest => f.write_str("user_request"),
            Self::GoalAchievement => f.write_str("goal_achievement"),
            Self::Custom(label) => f.write_str(label),
        }
    }
}

impl FromStr for TriggerReason {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "user_request" => Self::UserRequest,
            "goal_achievement" => Self::GoalAchievement,
            other => Self::Custom(other.to_owned()),
        })
    }
}

impl Serialize for TriggerReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TriggerReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(match label.parse() {
            Ok(reason) => reason,
            Err(never) => match never {},
        })
    }
}

/// Whether to request adaptation, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerDecision {
    Fire(TriggerReason),
    Hold,
}

impl TriggerDecision {
    pub fn fires(&self) -> bool {
        matches!(self, Self::Fire(_))
    }

    pub fn into_reason(self) -> Option<TriggerReason> {
        match self {
            Self::Fire(reason) => Some(reason),
            Self::Hold => None,
        }
    }
}

/// What a completion event asks the controller to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionSignal {
    /// Query the effectiveness monitor. Always set.
    pub should_query: bool,
    /// The completed id belongs to the plan the completion was issued
    /// against.
    pub known_activity: bool,
}

/// Stateless trigger rules.
///
/// Holds no thresholds: the effectiveness monitor's verdict is authoritative
/// for implicit adaptation.
pub struct TriggerEvaluator;

impl TriggerEvaluator {
    /// A completion always asks for an effectiveness check and never fires
    /// adaptation directly.
    ///
    /// Ids unknown to `plan` still query; they may come from an earlier
    /// revision of the plan.
    pub fn on_activity_completed(plan: &TherapeuticPlan, activity_id: &str) -> CompletionSignal {
        CompletionSignal {
            should_query: true,
            known_activity: plan.activity(activity_id).is_some(),
        }
    }

    pub fn on_monitor_result(should_adapt: bool) -> TriggerDecision {
        if should_adapt {
            TriggerDecision::Fire(TriggerReason::GoalAchievement)
        } else {
            TriggerDecision::Hold
        }
    }

    /// An explicit user request always fires, regardless of monitor state.
    ///
    /// The controller still rejects it while another adaptation is in
    /// flight.
    pub fn on_user_request() -> TriggerDecision {
        TriggerDecision::Fire(TriggerReason::UserRequest)
    }

    /// The rule a plan declares for `reason`, matched on its type tag.
    pub fn declared_rule<'a>(
        plan: &'a TherapeuticPlan,
        reason: &TriggerReason,
    ) -> Option<&'a AdaptationTrigger> {
        let label = reason.to_string();
        plan.adaptation_triggers
            .iter()
            .find(|rule| rule.trigger_type == label)
    }
}
