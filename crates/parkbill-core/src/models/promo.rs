//! Promotional rule model
//!
//! Code-addressable discount definitions redeemed at settlement time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a discount value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiscountKind {
    /// Value is the percentage of the balance the customer still pays
    /// (80 = pay 80%, i.e. 20% off)
    Percent,
    /// Value is a flat amount in minor currency units
    Fixed,
    /// The whole remaining balance is waived (membership free parking)
    Free,
}

impl fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountKind::Percent => write!(f, "PERCENT"),
            DiscountKind::Fixed => write!(f, "FIXED"),
            DiscountKind::Free => write!(f, "FREE"),
        }
    }
}

impl DiscountKind {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PERCENT" => Some(DiscountKind::Percent),
            "FIXED" => Some(DiscountKind::Fixed),
            "FREE" => Some(DiscountKind::Free),
            _ => None,
        }
    }
}

/// Promotional rule entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionalRule {
    /// Unique identifier
    pub id: i64,

    /// Code presented at settlement time
    pub code: String,

    /// Display name, denormalized onto discount line items
    pub name: String,

    /// Free-form description
    pub description: Option<String>,

    /// PERCENT or FIXED
    pub kind: DiscountKind,

    /// Percentage still payable (PERCENT) or amount in minor units (FIXED)
    pub value: i32,

    /// Per-use discount cap in minor currency units
    pub max_discount: Option<i64>,

    /// 1 = enabled, 0 = disabled
    pub status: i32,

    /// Start of the redemption window (unset = unbounded)
    pub effective_start: Option<DateTime<Utc>>,

    /// End of the redemption window (unset = unbounded)
    pub effective_end: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl PromotionalRule {
    /// Enabled and inside the redemption window at `at`
    pub fn is_effective(&self, at: DateTime<Utc>) -> bool {
        if self.status != 1 {
            return false;
        }
        if let Some(start) = self.effective_start {
            if at < start {
                return false;
            }
        }
        if let Some(end) = self.effective_end {
            if at > end {
                return false;
            }
        }
        true
    }
}

impl Default for PromotionalRule {
    fn default() -> Self {
        Self {
            id: 0,
            code: String::new(),
            name: String::new(),
            description: None,
            kind: DiscountKind::Percent,
            value: 0,
            max_discount: None,
            status: 1,
            effective_start: None,
            effective_end: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_is_effective_window() {
        let now = Utc::now();

        let rule = PromotionalRule {
            effective_start: Some(now - Duration::hours(1)),
            effective_end: Some(now + Duration::hours(1)),
            ..Default::default()
        };
        assert!(rule.is_effective(now));

        let expired = PromotionalRule {
            effective_end: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        assert!(!expired.is_effective(now));

        let upcoming = PromotionalRule {
            effective_start: Some(now + Duration::hours(1)),
            ..Default::default()
        };
        assert!(!upcoming.is_effective(now));
    }

    #[test]
    fn test_disabled_rule_never_effective() {
        let rule = PromotionalRule {
            status: 0,
            ..Default::default()
        };
        assert!(!rule.is_effective(Utc::now()));
    }

    #[test]
    fn test_kind_round_trip() {
        assert_eq!(DiscountKind::from_str("percent"), Some(DiscountKind::Percent));
        assert_eq!(DiscountKind::from_str("FIXED"), Some(DiscountKind::Fixed));
        assert_eq!(DiscountKind::from_str("bogus"), None);
        assert_eq!(DiscountKind::Free.to_string(), "FREE");
    }
}
