use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::tier::{Tier, TierLookup};
use crate::usage::{UsageError, UsageEventInput};

use super::types::{
    AdmitRequest, AdmitResponse, ErrorResponse, GetEventsResponse, GetUsageResponse,
    RecordUsageResponse, SetTierRequest, SetTierResponse, TierResponse,
};
use super::ApiState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

const MAX_EVENT_PAGE: usize = 500;

pub async fn admit(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<AdmitRequest>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    if request.user_id.trim().is_empty() {
        return Err(bad_request("invalid_user_id", "user_id cannot be empty"));
    }

    let tier = match request.tier {
        Some(tier) => tier,
        None => match state.tiers.resolve(&request.user_id).await {
            TierLookup::Assigned(tier) => tier,
            TierLookup::DefaultFree => Tier::Free,
            TierLookup::Unavailable => {
                // Tier store down: admit without touching counters rather
                // than guessing limits for the wrong tier.
                warn!(user_id = %request.user_id, "tier store unavailable, admitting fail-open");
                let body = AdmitResponse {
                    allowed: true,
                    tier: Tier::Free,
                    limited_by: None,
                    retry_after_seconds: None,
                };
                return Ok((StatusCode::OK, Json(body)).into_response());
            }
        },
    };

    let decision = state
        .limiter
        .admit_all(&request.user_id, tier, Utc::now())
        .await;

    let body = AdmitResponse {
        allowed: decision.allowed,
        tier,
        limited_by: decision.limited_by,
        retry_after_seconds: decision.retry_after_seconds,
    };

    if decision.allowed {
        Ok((StatusCode::OK, Json(body)).into_response())
    } else {
        let retry_after = decision.retry_after_seconds.unwrap_or(1);
        Ok((
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.to_string())],
            Json(body),
        )
            .into_response())
    }
}

pub async fn record_usage(
    State(state): State<Arc<ApiState>>,
    Json(input): Json<UsageEventInput>,
) -> ApiResult<RecordUsageResponse> {
    match state.recorder.record(input).await {
        Ok(usage) => Ok(Json(RecordUsageResponse {
            recorded: true,
            usage,
        })),
        Err(UsageError::InvalidInput(reason)) => Err(bad_request("invalid_event", &reason)),
        Err(err) => Err(internal_error(err)),
    }
}

pub async fn get_usage(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<String>,
) -> ApiResult<GetUsageResponse> {
    match state.recorder.current_month_usage(&user_id).await {
        Ok(usage) => Ok(Json(GetUsageResponse { usage })),
        Err(UsageError::Store(err)) => Err(unavailable(err)),
        Err(err) => Err(internal_error(err)),
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

pub async fn get_events(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<GetEventsResponse> {
    let limit = query.limit.unwrap_or(50).min(MAX_EVENT_PAGE);
    match state.recorder.recent_events(&user_id, limit).await {
        Ok(events) => Ok(Json(GetEventsResponse { events })),
        Err(UsageError::Store(err)) => Err(unavailable(err)),
        Err(err) => Err(internal_error(err)),
    }
}

pub async fn get_tier(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<String>,
) -> ApiResult<TierResponse> {
    match state.tiers.resolve(&user_id).await {
        TierLookup::Assigned(tier) => Ok(Json(TierResponse {
            user_id,
            tier,
            assigned: true,
        })),
        TierLookup::DefaultFree => Ok(Json(TierResponse {
            user_id,
            tier: Tier::Free,
            assigned: false,
        })),
        TierLookup::Unavailable => Err(unavailable("tier store unreachable")),
    }
}

pub async fn set_tier(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<String>,
    Json(request): Json<SetTierRequest>,
) -> ApiResult<SetTierResponse> {
    if user_id.trim().is_empty() {
        return Err(bad_request("invalid_user_id", "user_id cannot be empty"));
    }

    let tier = Tier::from_str(&request.tier)
        .map_err(|err| bad_request("unknown_tier", &err.to_string()))?;

    state
        .tiers
        .assign(&user_id, tier)
        .await
        .map_err(internal_error)?;

    info!(%user_id, %tier, "tier assigned");
    Ok(Json(SetTierResponse { success: true }))
}

pub async fn health_check() -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "inference-meter"
    })))
}

fn bad_request(code: &str, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

fn unavailable<E: std::fmt::Display>(err: E) -> (StatusCode, Json<ErrorResponse>) {
    warn!(error = %err, "store unavailable for read query");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "store unavailable".to_string(),
            code: "store_unavailable".to_string(),
            details: None,
        }),
    )
}

fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, Json<ErrorResponse>) {
    error!(error = %err, "meter API internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal server error".to_string(),
            code: "internal_error".to_string(),
            details: Some(serde_json::json!({ "message": err.to_string() })),
        }),
    )
}
