use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::storage::StoreHandle;
use crate::tier::{Tier, TierPolicy};
use crate::usage::month_key;

use super::decision::{AdmitDecision, LimitType, QuotaScope};

/// Fixed-window admission over the shared store. Windows are epoch-aligned
/// so concurrent lazy creators land on the same row, and the increment is a
/// single conditional store update. Any store trouble fails open: a metering
/// outage must never block the serving path.
#[derive(Clone)]
pub struct RateLimiter {
    store: StoreHandle,
    policy: Arc<TierPolicy>,
}

impl RateLimiter {
    pub fn new(store: StoreHandle, policy: Arc<TierPolicy>) -> Self {
        Self { store, policy }
    }

    /// One window class: lazily create the aligned window, then consume a
    /// slot. Admission and increment are one conditional update, so N
    /// concurrent callers admit at most `limit_value` and count exactly one
    /// per admit.
    pub async fn admit(
        &self,
        user_id: &str,
        tier: Tier,
        limit_type: LimitType,
        now: DateTime<Utc>,
    ) -> AdmitDecision {
        let limits = self.policy.limits_for(tier);
        let limit_value = match limit_type {
            LimitType::PerMinute => limits.messages_per_minute,
            LimitType::PerDay => limits.messages_per_day,
        };

        let duration = limit_type.window_secs();
        let now_ts = now.timestamp();
        let window_start = now_ts - now_ts.rem_euclid(duration);
        let window_end = window_start + duration;

        let user = user_id.to_string();
        let ensured = self
            .store
            .run(move |db| db.ensure_window(&user, limit_type, window_start, window_end, limit_value))
            .await;
        if let Err(err) = ensured {
            warn!(user_id, %limit_type, error = %err, "window creation failed, admitting fail-open");
            return AdmitDecision::allow();
        }

        let user = user_id.to_string();
        match self
            .store
            .run(move |db| db.try_increment_window(&user, limit_type, now_ts))
            .await
        {
            Ok(true) => AdmitDecision::allow(),
            Ok(false) => {
                // The window was just ensured, so a failed increment means
                // the limit is consumed.
                let retry_after = (window_end - now_ts).max(1) as u64;
                debug!(user_id, %limit_type, retry_after, "quota exceeded");
                AdmitDecision::reject(limit_type.into(), retry_after)
            }
            Err(err) => {
                warn!(user_id, %limit_type, error = %err, "quota increment failed, admitting fail-open");
                AdmitDecision::allow()
            }
        }
    }

    /// Read-only monthly gate against the aggregate the recorder maintains.
    pub async fn monthly_admit(&self, user_id: &str, tier: Tier, now: DateTime<Utc>) -> bool {
        let limit = self.policy.limits_for(tier).messages_per_month;
        let user = user_id.to_string();
        let month = month_key(now);

        match self
            .store
            .run(move |db| db.get_monthly_usage(&user, &month))
            .await
        {
            Ok(Some(usage)) => usage.message_count < limit,
            Ok(None) => true,
            Err(err) => {
                warn!(user_id, error = %err, "monthly usage lookup failed, admitting fail-open");
                true
            }
        }
    }

    /// Serving-path entry point: per-minute, per-day, then monthly. The
    /// first rejection wins; already-consumed window slots are not refunded
    /// (quota is consumed even for work that never dispatches).
    pub async fn admit_all(&self, user_id: &str, tier: Tier, now: DateTime<Utc>) -> AdmitDecision {
        let decision = self.admit(user_id, tier, LimitType::PerMinute, now).await;
        if !decision.allowed {
            return decision;
        }

        let decision = self.admit(user_id, tier, LimitType::PerDay, now).await;
        if !decision.allowed {
            return decision;
        }

        if !self.monthly_admit(user_id, tier, now).await {
            return AdmitDecision::reject(QuotaScope::PerMonth, seconds_until_next_month(now));
        }

        AdmitDecision::allow()
    }

    /// Background purge of long-expired windows. Expired rows are inert
    /// (superseded, never read on the admission path), so this only bounds
    /// table growth.
    pub fn start_reaper_task(&self, reap_interval: Duration, retention: Duration) -> JoinHandle<()> {
        let store = self.store.clone();
        tokio::spawn(async move {
            let mut ticker = interval(reap_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let cutoff = Utc::now().timestamp() - retention.as_secs() as i64;
                match store.run(move |db| db.purge_expired_windows(cutoff)).await {
                    Ok(purged) if purged > 0 => {
                        debug!(purged, "purged expired quota windows");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!(error = %err, "failed to purge expired quota windows");
                    }
                }
            }
        })
    }
}

fn seconds_until_next_month(now: DateTime<Utc>) -> u64 {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    match Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0) {
        chrono::LocalResult::Single(next) => (next - now).num_seconds().max(1) as u64,
        _ => 86_400,
    }
}
