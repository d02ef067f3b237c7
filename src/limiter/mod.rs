pub mod decision;
pub mod manager;

pub use decision::{AdmitDecision, LimitType, QuotaScope};
pub use manager::RateLimiter;
