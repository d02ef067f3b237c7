use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::pricing::PricingTable;
use crate::storage::StoreHandle;

use super::error::UsageError;
use super::event::{month_key, MonthlyUsage, UsageDelta, UsageEvent, UsageEventInput};

/// What `record` hands back to the caller: the priced facts of the event it
/// just accounted for.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedUsage {
    pub event_id: String,
    pub cost: Decimal,
    pub cached_savings: Decimal,
}

/// Prices completed requests, appends the immutable event, and folds the
/// delta into the caller's monthly aggregate.
#[derive(Clone)]
pub struct UsageRecorder {
    store: StoreHandle,
    pricing: Arc<PricingTable>,
}

impl UsageRecorder {
    pub fn new(store: StoreHandle, pricing: Arc<PricingTable>) -> Self {
        Self { store, pricing }
    }

    /// Accounts for one completed request. Invalid input is rejected before
    /// anything is written; store failures after that point are logged and
    /// swallowed, since the user response this event describes has already
    /// been delivered.
    pub async fn record(&self, input: UsageEventInput) -> Result<RecordedUsage, UsageError> {
        input.validate()?;

        let breakdown = self.pricing.cost(
            &input.model_id,
            input.input_tokens,
            input.output_tokens,
            input.cached_tokens,
        );

        let now = Utc::now();
        let event = UsageEvent::from_input(input, breakdown, now);
        let delta = UsageDelta::from_event(&event);
        let month = month_key(now);

        let recorded = RecordedUsage {
            event_id: event.event_id.clone(),
            cost: event.cost,
            cached_savings: event.cached_savings,
        };
        let user_id = event.user_id.clone();

        let to_append = event.clone();
        if let Err(err) = self.store.run(move |db| db.append_event(&to_append)).await {
            warn!(%user_id, event_id = %recorded.event_id, error = %err, "usage event append failed");
        }

        let user = event.user_id.clone();
        match self
            .store
            .run(move |db| db.apply_usage_delta(&user, &month, &delta))
            .await
        {
            Ok(()) => {
                debug!(%user_id, event_id = %recorded.event_id, cost = %recorded.cost, "usage recorded");
            }
            Err(err) => {
                warn!(%user_id, event_id = %recorded.event_id, error = %err, "monthly aggregate update failed");
            }
        }

        Ok(recorded)
    }

    /// Dashboard read: the caller's running totals for the current month,
    /// zeroed when no event has landed yet.
    pub async fn current_month_usage(&self, user_id: &str) -> Result<MonthlyUsage, UsageError> {
        let month = month_key(Utc::now());
        let user = user_id.to_string();
        let lookup_month = month.clone();

        let usage = self
            .store
            .run(move |db| db.get_monthly_usage(&user, &lookup_month))
            .await?;

        Ok(usage.unwrap_or_else(|| MonthlyUsage::empty(user_id, &month)))
    }

    /// Dashboard read: the caller's latest events, newest first.
    pub async fn recent_events(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<UsageEvent>, UsageError> {
        let user = user_id.to_string();
        let events = self
            .store
            .run(move |db| db.recent_events(&user, limit))
            .await?;
        Ok(events)
    }
}
