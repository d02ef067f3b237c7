use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed-window limit classes. Monthly quota is aggregate-backed and has no
/// window row, so it is not represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    PerMinute,
    PerDay,
}

impl LimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitType::PerMinute => "per_minute",
            LimitType::PerDay => "per_day",
        }
    }

    pub fn window_secs(&self) -> i64 {
        match self {
            LimitType::PerMinute => 60,
            LimitType::PerDay => 86_400,
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "per_minute" => Ok(LimitType::PerMinute),
            "per_day" => Ok(LimitType::PerDay),
            _ => Err(()),
        }
    }
}

/// Which quota produced a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaScope {
    PerMinute,
    PerDay,
    PerMonth,
}

impl From<LimitType> for QuotaScope {
    fn from(limit_type: LimitType) -> Self {
        match limit_type {
            LimitType::PerMinute => QuotaScope::PerMinute,
            LimitType::PerDay => QuotaScope::PerDay,
        }
    }
}

/// Admission outcome. A rejection is a normal decision value carrying a
/// retry hint, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmitDecision {
    pub allowed: bool,
    pub limited_by: Option<QuotaScope>,
    pub retry_after_seconds: Option<u64>,
}

impl AdmitDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            limited_by: None,
            retry_after_seconds: None,
        }
    }

    pub fn reject(scope: QuotaScope, retry_after_seconds: u64) -> Self {
        Self {
            allowed: false,
            limited_by: Some(scope),
            retry_after_seconds: Some(retry_after_seconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_type_round_trips_through_storage_form() {
        for limit_type in [LimitType::PerMinute, LimitType::PerDay] {
            assert_eq!(limit_type.as_str().parse::<LimitType>().unwrap(), limit_type);
        }
    }

    #[test]
    fn window_durations() {
        assert_eq!(LimitType::PerMinute.window_secs(), 60);
        assert_eq!(LimitType::PerDay.window_secs(), 86_400);
    }
}
