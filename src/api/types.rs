use serde::{Deserialize, Serialize};

use crate::limiter::QuotaScope;
use crate::tier::Tier;
use crate::usage::{MonthlyUsage, RecordedUsage, UsageEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmitRequest {
    pub user_id: String,
    /// Optional tier override supplied by the serving path; resolved from
    /// the tier store when absent.
    pub tier: Option<Tier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmitResponse {
    pub allowed: bool,
    pub tier: Tier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limited_by: Option<QuotaScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordUsageResponse {
    pub recorded: bool,
    #[serde(flatten)]
    pub usage: RecordedUsage,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetUsageResponse {
    pub usage: MonthlyUsage,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetEventsResponse {
    pub events: Vec<UsageEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierResponse {
    pub user_id: String,
    pub tier: Tier,
    /// False when the user has no record yet and the free default applies.
    pub assigned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTierRequest {
    pub tier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTierResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}
