use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Cadence a plan was generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Daily,
    Weekly,
    Monthly,
    CrisisIntervention,
}

impl PlanType {
    /// Whether a client may ask the generation service for this cadence.
    ///
    /// Crisis plans are only ever issued by the service itself.
    pub fn is_requestable(self) -> bool {
        match self {
            Self::Daily | Self::Weekly | Self::Monthly => true,
            Self::CrisisIntervention => false,
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::CrisisIntervention => "crisis_intervention",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanType {
    type Err = PlanTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "crisis_intervention" => Ok(Self::CrisisIntervention),
            other => Err(PlanTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanType`] string.
#[derive(Debug, Clone)]
pub struct PlanTypeParseError(pub String);

impl fmt::Display for PlanTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan type: {:?}", self.0)
    }
}

impl std::error::Error for PlanTypeParseError {}

// ---------------------------------------------------------------------------

/// Priority of a therapeutic goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = PriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(PriorityParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Priority`] string.
#[derive(Debug, Clone)]
pub struct PriorityParseError(pub String);

impl fmt::Display for PriorityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid priority: {:?}", self.0)
    }
}

impl std::error::Error for PriorityParseError {}

// ---------------------------------------------------------------------------

/// Difficulty tier of a daily activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        };
        f.write_str(s)
    }
}

impl FromStr for Difficulty {
    type Err = DifficultyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(DifficultyParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Difficulty`] string.
#[derive(Debug, Clone)]
pub struct DifficultyParseError(pub String);

impl fmt::Display for DifficultyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid difficulty: {:?}", self.0)
    }
}

impl std::error::Error for DifficultyParseError {}

// ---------------------------------------------------------------------------

/// Direction a progress metric is moving in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Declining => "declining",
        };
        f.write_str(s)
    }
}

impl FromStr for Trend {
    type Err = TrendParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "improving" => Ok(Self::Improving),
            "stable" => Ok(Self::Stable),
            "declining" => Ok(Self::Declining),
            other => Err(TrendParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Trend`] string.
#[derive(Debug, Clone)]
pub struct TrendParseError(pub String);

impl fmt::Display for TrendParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid trend: {:?}", self.0)
    }
}

impl std::error::Error for TrendParseError {}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A generated bundle of goals, activities, milestones and metrics valid for
/// a bounded period.
///
/// Issued plans are shared as `Arc<TherapeuticPlan>` snapshots and never
/// mutated; adaptation produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TherapeuticPlan {
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    pub plan_type: PlanType,
    pub generated_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub adaptation_level: f64,
    pub confidence_score: f64,
    pub therapeutic_goals: Vec<TherapeuticGoal>,
    pub daily_activities: Vec<DailyActivity>,
    pub weekly_milestones: Vec<WeeklyMilestone>,
    pub progress_metrics: Vec<ProgressMetric>,
    pub adaptation_triggers: Vec<AdaptationTrigger>,
}

impl TherapeuticPlan {
    /// Look up an activity of this plan by id.
    pub fn activity(&self, activity_id: &str) -> Option<&DailyActivity> {
        self.daily_activities.iter().find(|a| a.id == activity_id)
    }

    /// Confidence score as a whole percentage.
    pub fn confidence_percent(&self) -> u8 {
        percent(self.confidence_score)
    }

    /// Adaptation level as a whole percentage.
    pub fn adaptation_percent(&self) -> u8 {
        percent(self.adaptation_level)
    }

    /// Sum of the adaptation points carried by the plan's milestones.
    pub fn total_adaptation_points(&self) -> f64 {
        self.weekly_milestones
            .iter()
            .map(|m| m.adaptation_points)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TherapeuticGoal {
    pub id: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub target_completion: DateTime<Utc>,
    #[serde(default)]
    pub measurable_outcomes: Vec<String>,
    #[serde(default)]
    pub adaptive_strategies: Vec<String>,
    #[serde(default)]
    pub progress_indicators: Vec<String>,
}

/// A scheduled activity. Completion is tracked by the session store, never
/// on the activity itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    pub id: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub title: String,
    pub description: String,
    /// Minutes; must be positive.
    pub estimated_duration: u32,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub emotional_focus: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub adaptation_notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,
    #[serde(default)]
    pub personalized_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyMilestone {
    pub id: String,
    pub week: u32,
    pub goal_title: String,
    pub description: String,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub reward_type: String,
    pub adaptation_points: f64,
}

impl WeeklyMilestone {
    /// Human-readable reward name, falling back to a generic unlock.
    pub fn reward_label(&self) -> String {
        if self.reward_type.trim().is_empty() {
            "achievement unlock".to_string()
        } else {
            self.reward_type.replace('_', " ")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMetric {
    pub category: String,
    pub baseline: f64,
    pub current_value: f64,
    pub target_value: f64,
    pub trend: Trend,
    pub confidence_level: f64,
    pub last_updated: DateTime<Utc>,
}

impl ProgressMetric {
    /// `(current - baseline) / (target - baseline)`, clamped to `[0, 1]`.
    ///
    /// A degenerate span (target equal to baseline) or any non-finite
    /// intermediate yields 0.
    pub fn progress_fraction(&self) -> f64 {
        let fraction = (self.current_value - self.baseline) / (self.target_value - self.baseline);
        if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Progress fraction as a whole percentage.
    pub fn progress_percent(&self) -> u8 {
        percent(self.progress_fraction())
    }

    /// Category key with underscores replaced by spaces.
    pub fn category_label(&self) -> String {
        self.category.replace('_', " ")
    }
}

/// A declarative threshold rule. Evaluation lives outside the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptationTrigger {
    #[serde(rename = "type")]
    pub trigger_type: String,
    pub threshold: f64,
    pub response_action: String,
    #[serde(default)]
    pub description: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn percent(fraction: f64) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Accept user ids encoded either as JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Uint(n) => n.to_string(),
    })
}
