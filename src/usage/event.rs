use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pricing::CostBreakdown;

use super::error::UsageError;

/// Aggregate month key, e.g. "2026-08".
pub fn month_key(at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

/// Facts the serving path reports once a request completed. Token counts
/// are unsigned by construction; the remaining shape checks happen in
/// `validate` before anything reaches the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEventInput {
    pub user_id: String,
    pub model_id: String,
    pub provider: Option<String>,
    pub session_id: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub latency_ms: u64,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default)]
    pub tools_used: Vec<String>,
    pub success: bool,
    pub error_type: Option<String>,
}

impl UsageEventInput {
    pub fn validate(&self) -> Result<(), UsageError> {
        if self.user_id.trim().is_empty() {
            return Err(UsageError::InvalidInput("user_id cannot be empty".into()));
        }
        if self.model_id.trim().is_empty() {
            return Err(UsageError::InvalidInput("model_id cannot be empty".into()));
        }
        if self.cached_tokens > self.input_tokens {
            return Err(UsageError::InvalidInput(
                "cached_tokens cannot exceed input_tokens".into(),
            ));
        }
        Ok(())
    }
}

/// Immutable record of one completed request. Appended once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub event_id: String,
    pub user_id: String,
    pub model_id: String,
    pub provider: Option<String>,
    pub session_id: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub cost: Decimal,
    pub cached_savings: Decimal,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub tools_used: Vec<String>,
    pub success: bool,
    pub error_type: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    pub fn from_input(
        input: UsageEventInput,
        breakdown: CostBreakdown,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            user_id: input.user_id,
            model_id: input.model_id,
            provider: input.provider,
            session_id: input.session_id,
            input_tokens: input.input_tokens,
            output_tokens: input.output_tokens,
            cached_tokens: input.cached_tokens,
            cost: breakdown.cost,
            cached_savings: breakdown.cached_savings,
            latency_ms: input.latency_ms,
            cache_hit: input.cache_hit,
            tools_used: input.tools_used,
            success: input.success,
            error_type: input.error_type,
            timestamp,
        }
    }
}

/// Additive contribution of one event to the monthly aggregate.
#[derive(Debug, Clone, Copy)]
pub struct UsageDelta {
    pub message_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub cost: Decimal,
    pub cached_savings: Decimal,
}

impl UsageDelta {
    pub fn from_event(event: &UsageEvent) -> Self {
        Self {
            message_count: 1,
            input_tokens: event.input_tokens,
            output_tokens: event.output_tokens,
            cached_tokens: event.cached_tokens,
            cost: event.cost,
            cached_savings: event.cached_savings,
        }
    }
}

/// Running per-user totals for one calendar month. Non-decreasing within
/// the month; rows are created on first event and only ever added to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyUsage {
    pub user_id: String,
    pub month: String,
    pub message_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub total_cost: Decimal,
    pub cached_savings: Decimal,
}

impl MonthlyUsage {
    pub fn empty(user_id: &str, month: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            month: month.to_string(),
            message_count: 0,
            input_tokens: 0,
            output_tokens: 0,
            cached_tokens: 0,
            total_cost: Decimal::ZERO,
            cached_savings: Decimal::ZERO,
        }
    }
}
