use std::sync::Arc;

pub mod handlers;
pub mod router;
pub mod types;

pub use router::create_router;
pub use types::*;

use crate::config::MeterConfig;
use crate::limiter::RateLimiter;
use crate::tier::TierResolver;
use crate::usage::UsageRecorder;

pub struct ApiState {
    pub limiter: RateLimiter,
    pub recorder: UsageRecorder,
    pub tiers: TierResolver,
    pub config: Arc<MeterConfig>,
}

impl ApiState {
    pub fn new(
        limiter: RateLimiter,
        recorder: UsageRecorder,
        tiers: TierResolver,
        config: MeterConfig,
    ) -> Self {
        Self {
            limiter,
            recorder,
            tiers,
            config: Arc::new(config),
        }
    }
}
