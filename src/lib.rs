//! Quota enforcement and usage metering for multi-tenant inference
//! workloads.
//!
//! The serving path calls [`limiter::RateLimiter::admit_all`] before
//! dispatching a request and [`usage::UsageRecorder::record`] once token
//! usage is known. Admission is fixed-window counting against a shared
//! SQLite store with atomic conditional increments; recording appends an
//! immutable event and folds an additive delta into the caller's monthly
//! aggregate. Store trouble fails open for admission and silent for
//! recording, so a metering outage never blocks serving.

pub mod api;
pub mod cache;
pub mod config;
pub mod limiter;
pub mod pricing;
pub mod storage;
pub mod tier;
pub mod usage;
