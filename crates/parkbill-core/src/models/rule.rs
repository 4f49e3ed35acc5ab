//! Billing rule model
//!
//! Site-scoped pricing policy. Several rules may exist per site; the
//! applicable one is the highest-priority rule that is enabled and inside
//! its effective date range at the time of settlement.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Billing rule entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingRule {
    /// Unique identifier
    pub id: i64,

    /// Site this rule prices
    pub site_id: i64,

    /// Rule name, denormalized onto orders for audit
    pub rule_name: String,

    /// Vehicle class the rule applies to (e.g. "CAR", "TRUCK")
    pub vehicle_class: Option<String>,

    /// Pricing mode; only hourly unit pricing is currently supported
    pub pricing_mode: i32,

    /// Grace period in minutes before billing starts
    pub free_minutes: i64,

    /// Price per billing unit (hour) in minor currency units
    pub unit_price: i64,

    /// Per-session cap in minor currency units
    pub max_amount_per_session: Option<i64>,

    /// Per-day cap in minor currency units (capping not yet applied, see
    /// `calculate_amount`)
    pub max_amount_per_day: Option<i64>,

    /// First day the rule is effective (unset = unbounded)
    pub effective_start_date: Option<NaiveDate>,

    /// Last day the rule is effective (unset = unbounded)
    pub effective_end_date: Option<NaiveDate>,

    /// Effective time-of-day window, e.g. "08:00-18:00"
    pub effective_time_range: Option<String>,

    /// Conflict resolution: higher wins
    pub priority: i32,

    /// 1 = enabled, 0 = disabled
    pub status: i32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl BillingRule {
    /// Compute the pre-discount amount for a parked duration.
    ///
    /// Free minutes come off the top; the remainder is rounded up to whole
    /// hours and priced at `unit_price`, then clamped to the per-session cap.
    ///
    /// # Arguments
    /// * `total_minutes` - Whole parked minutes
    ///
    /// # Returns
    /// Amount in minor currency units
    // TODO: apply max_amount_per_day once sessions are split at midnight
    #[inline]
    pub fn calculate_amount(&self, total_minutes: i64) -> i64 {
        let chargeable_minutes = total_minutes - self.free_minutes;
        if chargeable_minutes <= 0 {
            return 0;
        }

        let hours = (chargeable_minutes + 59) / 60;
        let mut amount = hours * self.unit_price;

        if let Some(cap) = self.max_amount_per_session {
            if cap > 0 && amount > cap {
                amount = cap;
            }
        }

        amount
    }

    /// Check whether the rule is enabled and inside its effective date range
    pub fn is_effective(&self, on: NaiveDate) -> bool {
        if self.status != 1 {
            return false;
        }
        if let Some(start) = self.effective_start_date {
            if on < start {
                return false;
            }
        }
        if let Some(end) = self.effective_end_date {
            if on > end {
                return false;
            }
        }
        true
    }
}

impl Default for BillingRule {
    fn default() -> Self {
        Self {
            id: 0,
            site_id: 0,
            rule_name: String::new(),
            vehicle_class: None,
            pricing_mode: 1,
            free_minutes: 0,
            unit_price: 0,
            max_amount_per_session: None,
            max_amount_per_day: None,
            effective_start_date: None,
            effective_end_date: None,
            effective_time_range: None,
            priority: 0,
            status: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(free_minutes: i64, unit_price: i64) -> BillingRule {
        BillingRule {
            free_minutes,
            unit_price,
            ..Default::default()
        }
    }

    #[test]
    fn test_free_minutes_boundary() {
        let r = rule(30, 500);

        // Inside the grace period
        assert_eq!(r.calculate_amount(30), 0);
        // One minute over starts the first hour
        assert_eq!(r.calculate_amount(31), 500);
    }

    #[test]
    fn test_hour_ceiling_boundary() {
        let r = rule(30, 500);

        // 90 minutes parked, 60 chargeable, exactly one unit
        assert_eq!(r.calculate_amount(90), 500);
        // 91 minutes parked, 61 chargeable, rolls into the second unit
        assert_eq!(r.calculate_amount(91), 1000);
        // 95 minutes parked, 65 chargeable, two units
        assert_eq!(r.calculate_amount(95), 1000);
    }

    #[test]
    fn test_session_cap() {
        let r = BillingRule {
            free_minutes: 0,
            unit_price: 500,
            max_amount_per_session: Some(1000),
            ..Default::default()
        };

        // 5 hours raw would be 2500, clamped to the cap
        assert_eq!(r.calculate_amount(300), 1000);
        // Under the cap is untouched
        assert_eq!(r.calculate_amount(60), 500);
    }

    #[test]
    fn test_zero_cap_is_ignored() {
        let r = BillingRule {
            unit_price: 500,
            max_amount_per_session: Some(0),
            ..Default::default()
        };

        assert_eq!(r.calculate_amount(60), 500);
    }

    #[test]
    fn test_is_effective() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();

        let r = BillingRule {
            effective_start_date: Some(today - chrono::Duration::days(1)),
            effective_end_date: Some(today + chrono::Duration::days(1)),
            ..Default::default()
        };
        assert!(r.is_effective(today));

        let expired = BillingRule {
            effective_end_date: Some(today - chrono::Duration::days(1)),
            ..Default::default()
        };
        assert!(!expired.is_effective(today));

        let disabled = BillingRule {
            status: 0,
            ..Default::default()
        };
        assert!(!disabled.is_effective(today));

        // Unbounded dates are always in range
        let open = BillingRule::default();
        assert!(open.is_effective(today));
    }
}
