mod resolver;

pub use resolver::{TierLookup, TierResolver};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TierError {
    #[error("unknown tier '{0}'")]
    UnknownTier(String),
    #[error("invalid limits for tier {tier}: {reason}")]
    InvalidLimits { tier: Tier, reason: String },
}

/// Subscription class determining quota limits. Closed enum: the policy
/// table below is total over it, so admission never sees an unknown tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Premium,
    Enterprise,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Pro, Tier::Premium, Tier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Premium => "premium",
            Tier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = TierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "premium" => Ok(Tier::Premium),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(TierError::UnknownTier(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub messages_per_minute: u64,
    pub messages_per_day: u64,
    pub messages_per_month: u64,
}

/// Static tier-to-limits policy. Built once at startup and validated there;
/// admission only ever performs the pure lookup.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    free: TierLimits,
    pro: TierLimits,
    premium: TierLimits,
    enterprise: TierLimits,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            free: TierLimits {
                messages_per_minute: 3,
                messages_per_day: 50,
                messages_per_month: 500,
            },
            pro: TierLimits {
                messages_per_minute: 10,
                messages_per_day: 500,
                messages_per_month: 5_000,
            },
            premium: TierLimits {
                messages_per_minute: 30,
                messages_per_day: 2_000,
                messages_per_month: 30_000,
            },
            enterprise: TierLimits {
                messages_per_minute: 120,
                messages_per_day: 10_000,
                messages_per_month: 200_000,
            },
        }
    }
}

impl TierPolicy {
    pub fn limits_for(&self, tier: Tier) -> TierLimits {
        match tier {
            Tier::Free => self.free,
            Tier::Pro => self.pro,
            Tier::Premium => self.premium,
            Tier::Enterprise => self.enterprise,
        }
    }

    pub fn with_limits(mut self, tier: Tier, limits: TierLimits) -> Self {
        match tier {
            Tier::Free => self.free = limits,
            Tier::Pro => self.pro = limits,
            Tier::Premium => self.premium = limits,
            Tier::Enterprise => self.enterprise = limits,
        }
        self
    }

    /// Startup validation: every tier must carry non-zero limits and the
    /// windows must nest (minute <= day <= month).
    pub fn validate(&self) -> Result<(), TierError> {
        for tier in Tier::ALL {
            let limits = self.limits_for(tier);
            if limits.messages_per_minute == 0
                || limits.messages_per_day == 0
                || limits.messages_per_month == 0
            {
                return Err(TierError::InvalidLimits {
                    tier,
                    reason: "limits must be greater than zero".into(),
                });
            }
            if limits.messages_per_minute > limits.messages_per_day
                || limits.messages_per_day > limits.messages_per_month
            {
                return Err(TierError::InvalidLimits {
                    tier,
                    reason: "limits must be non-decreasing from minute to month".into(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_parses_from_lowercase_and_mixed_case() {
        assert_eq!("free".parse::<Tier>().unwrap(), Tier::Free);
        assert_eq!("Pro".parse::<Tier>().unwrap(), Tier::Pro);
        assert_eq!("PREMIUM".parse::<Tier>().unwrap(), Tier::Premium);
        assert_eq!("enterprise".parse::<Tier>().unwrap(), Tier::Enterprise);
        assert!("platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn tier_display_round_trips() {
        for tier in Tier::ALL {
            assert_eq!(tier.to_string().parse::<Tier>().unwrap(), tier);
        }
    }

    #[test]
    fn default_policy_is_total_and_valid() {
        let policy = TierPolicy::default();
        policy.validate().unwrap();
        assert_eq!(policy.limits_for(Tier::Free).messages_per_minute, 3);
        assert_eq!(policy.limits_for(Tier::Enterprise).messages_per_month, 200_000);
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let policy = TierPolicy::default().with_limits(
            Tier::Pro,
            TierLimits {
                messages_per_minute: 0,
                messages_per_day: 500,
                messages_per_month: 5_000,
            },
        );
        assert!(policy.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_windows() {
        let policy = TierPolicy::default().with_limits(
            Tier::Free,
            TierLimits {
                messages_per_minute: 100,
                messages_per_day: 50,
                messages_per_month: 500,
            },
        );
        assert!(policy.validate().is_err());
    }
}
