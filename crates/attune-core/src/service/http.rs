//! HTTP/JSON binding of the collaborator traits.
//!
//! Routes, relative to [`ServiceConfig::base_url`]:
//!
//! | call | route |
//! |------|-------|
//! | fetch | `GET  /api/adaptive-therapy/plan/{userId}` |
//! | generate | `POST /api/adaptive-therapy/generate` |
//! | adapt | `POST /api/adaptive-therapy/adapt` |
//! | record | `POST /api/adaptive-therapy/complete-activity` |
//! | monitor | `GET  /api/adaptive-therapy/monitor/{userId}/{planId}` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::{Value, json};
use tracing::debug;

use attune_model::{MalformedPlan, PlanType, TherapeuticPlan};

use super::{
    AdaptationService, CompletionRecorder, EffectivenessMonitor, EffectivenessReport, PlanSource,
    ServiceError,
};
use crate::config::ServiceConfig;
use crate::trigger::TriggerReason;

/// Path prefix shared by every plan backend route.
const API_PREFIX: [&str; 2] = ["api", "adaptive-therapy"];

/// Plan backend client implementing every collaborator role over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPlanService {
    http: Client,
    base_url: Url,
}

impl HttpPlanService {
    /// Build a client from configuration.
    ///
    /// The configured timeout bounds every request; an expired request is
    /// reported as [`ServiceError::Transport`].
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ServiceError::InvalidEndpoint(format!("{}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::InvalidEndpoint(config.base_url.clone()));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ServiceError::transport)?;

        Ok(Self { http, base_url })
    }

    /// Build the URL for a route below the API prefix, escaping each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ServiceError::InvalidEndpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, segments: &[&str]) -> Result<Response, ServiceError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        self.http
            .get(url)
            .send()
            .await
            .map_err(ServiceError::transport)
    }

    async fn post(&self, segments: &[&str], body: &Value) -> Result<Response, ServiceError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        self.http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(ServiceError::transport)
    }
}

/// Turn a non-2xx response into [`ServiceError::Status`].
async fn ensure_success(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Read the response body as JSON.
async fn read_json(response: Response) -> Result<Value, ServiceError> {
    let bytes = response.bytes().await.map_err(ServiceError::transport)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ServiceError::InvalidResponse(format!("body is not JSON: {e}")))
}

/// Decode the plan carried under `field`, if any.
fn plan_field(mut body: Value, field: &str) -> Result<Option<TherapeuticPlan>, ServiceError> {
    match body.get_mut(field).map(Value::take) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let plan = serde_json::from_value(value).map_err(MalformedPlan::from)?;
            Ok(Some(plan))
        }
    }
}

fn require_plan(body: Value, field: &str) -> Result<TherapeuticPlan, ServiceError> {
    plan_field(body, field)?
        .ok_or_else(|| ServiceError::InvalidResponse(format!("response carries no {field:?}")))
}

#[async_trait]
impl PlanSource for HttpPlanService {
    async fn fetch_plan(&self, user_id: &str) -> Result<Option<TherapeuticPlan>, ServiceError> {
        let response = self.get(&["plan", user_id]).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(user_id, "no plan stored for user");
            return Ok(None);
        }
        let body = read_json(ensure_success(response).await?).await?;
        plan_field(body, "plan")
    }

    async fn generate_plan(
        &self,
        user_id: &str,
        plan_type: PlanType,
    ) -> Result<TherapeuticPlan, ServiceError> {
        let body = json!({ "userId": user_id, "planType": plan_type });
        let response = self.post(&["generate"], &body).await?;
        let body = read_json(ensure_success(response).await?).await?;
        require_plan(body, "plan")
    }
}

#[async_trait]
impl AdaptationService for HttpPlanService {
    async fn adapt_plan(
        &self,
        plan_id: &str,
        trigger: &TriggerReason,
        feedback: Option<&Value>,
    ) -> Result<TherapeuticPlan, ServiceError> {
        let mut body = json!({ "planId": plan_id, "triggerType": trigger.to_string() });
        if let Some(feedback) = feedback {
            body["feedback"] = feedback.clone();
        }
        let response = self.post(&["adapt"], &body).await?;
        let body = read_json(ensure_success(response).await?).await?;
        require_plan(body, "adaptedPlan")
    }
}

#[async_trait]
impl CompletionRecorder for HttpPlanService {
    async fn record_completion(
        &self,
        user_id: &str,
        activity_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let body = json!({
            "userId": user_id,
            "activityId": activity_id,
            "completedAt": completed_at.to_rfc3339(),
        });
        let response = self.post(&["complete-activity"], &body).await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl EffectivenessMonitor for HttpPlanService {
    async fn check_effectiveness(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<EffectivenessReport, ServiceError> {
        let response = self.get(&["monitor", user_id, plan_id]).await?;
        let body = read_json(ensure_success(response).await?).await?;
        serde_json::from_value(body)
            .map_err(|e| ServiceError::InvalidResponse(format!("effectiveness report: {e}")))
    }
}
