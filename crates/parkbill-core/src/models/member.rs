//! Membership model
//!
//! A membership is a per-user billing privilege: a fractional discount rate
//! (1.0 = no discount) or outright free parking. At most one per user.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Membership entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    /// Unique identifier
    pub id: i64,

    /// Owning user
    pub user_id: i64,

    /// Membership tier (0 = standard)
    pub tier: i32,

    /// Fraction of the balance the member pays (0.8 = 20% off)
    pub discount_rate: Option<Decimal>,

    /// Member parks for free when set
    pub free_parking: bool,

    /// 1 = active, 0 = inactive
    pub status: i32,

    /// Free-form note
    pub remark: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    /// Active memberships are the only ones that grant discounts
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == 1
    }

    /// Discount rate that actually reduces the bill, if any
    pub fn effective_discount_rate(&self) -> Option<Decimal> {
        self.discount_rate.filter(|r| *r < Decimal::ONE)
    }
}

impl Default for Membership {
    fn default() -> Self {
        Self {
            id: 0,
            user_id: 0,
            tier: 0,
            discount_rate: None,
            free_parking: false,
            status: 1,
            remark: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_effective_discount_rate() {
        let m = Membership {
            discount_rate: Some(dec!(0.8)),
            ..Default::default()
        };
        assert_eq!(m.effective_discount_rate(), Some(dec!(0.8)));

        // Rate of 1.0 means no discount
        let m = Membership {
            discount_rate: Some(dec!(1.0)),
            ..Default::default()
        };
        assert_eq!(m.effective_discount_rate(), None);

        let m = Membership::default();
        assert_eq!(m.effective_discount_rate(), None);
    }

    #[test]
    fn test_is_active() {
        assert!(Membership::default().is_active());
        assert!(!Membership {
            status: 0,
            ..Default::default()
        }
        .is_active());
    }
}
