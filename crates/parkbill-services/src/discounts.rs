//! Discount engine
//!
//! Discounts apply in two ordered stages against a running balance:
//! membership first, then an optional promotional rule against whatever the
//! membership left over. Stages never stack against the original amount, and
//! the final payable can never go negative.

use parkbill_core::{
    models::{DiscountKind, DiscountSource, Membership, PromotionalRule},
    traits::{AppliedDiscount, DiscountOutcome},
};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Display name for the membership free-parking line item
const MEMBER_FREE_NAME: &str = "Member free parking";

/// Display name for the membership rate line item
const MEMBER_RATE_NAME: &str = "Member discount";

/// Stateless two-stage discount computation
pub struct DiscountEngine;

impl DiscountEngine {
    /// Run both stages over an original amount.
    ///
    /// # Arguments
    /// * `original_amount` - Pre-discount amount in minor currency units
    /// * `member` - Membership to apply, already resolved for the user
    /// * `promo` - Promotional rule to apply after the membership stage
    /// * `at` - Settlement instant, used for promo effectiveness
    pub fn apply(
        original_amount: i64,
        member: Option<&Membership>,
        promo: Option<&PromotionalRule>,
        at: DateTime<Utc>,
    ) -> DiscountOutcome {
        let mut remaining = original_amount.max(0);
        let mut applied = Vec::new();

        if let Some(m) = member {
            if let Some(item) = Self::member_stage(remaining, m) {
                remaining -= item.amount;
                applied.push(item);
            }
        }

        if let Some(p) = promo {
            if let Some(item) = Self::promo_stage(remaining, p, at) {
                remaining -= item.amount;
                applied.push(item);
            }
        }

        debug!(
            "Discounts: {} -> {} ({} applied)",
            original_amount,
            remaining,
            applied.len()
        );

        DiscountOutcome {
            payable: remaining.max(0),
            applied,
        }
    }

    /// Membership stage: free parking waives everything, otherwise the
    /// discount rate scales the balance down.
    ///
    /// The member pays `floor(remaining * rate)`; rounding always favors
    /// the customer.
    pub fn member_stage(remaining: i64, member: &Membership) -> Option<AppliedDiscount> {
        if remaining <= 0 || !member.is_active() {
            return None;
        }

        if member.free_parking {
            return Some(AppliedDiscount {
                source: DiscountSource::Member,
                code: None,
                name: MEMBER_FREE_NAME.to_string(),
                kind: DiscountKind::Free,
                value: 0,
                amount: remaining,
            });
        }

        let rate = member.effective_discount_rate()?;

        // A misconfigured negative rate waives the balance at most once;
        // the discount can never exceed what is left to pay
        let pay = (Decimal::from(remaining) * rate)
            .floor()
            .to_i64()
            .unwrap_or(remaining)
            .max(0);
        let discount = remaining - pay;
        if discount <= 0 {
            return None;
        }

        // Advertise the rate as the percentage still payable (0.8 -> 80)
        let value = (rate * Decimal::from(100)).to_i32().unwrap_or(100).max(0);

        Some(AppliedDiscount {
            source: DiscountSource::Member,
            code: None,
            name: MEMBER_RATE_NAME.to_string(),
            kind: DiscountKind::Percent,
            value,
            amount: discount,
        })
    }

    /// Promo stage: runs against whatever the membership stage left over.
    ///
    /// Percent rules where the value is outside (0, 100) are treated as
    /// misconfigured and skipped. Fixed discounts clamp to the remaining
    /// balance; both kinds clamp to the rule's per-use cap.
    pub fn promo_stage(
        remaining: i64,
        promo: &PromotionalRule,
        at: DateTime<Utc>,
    ) -> Option<AppliedDiscount> {
        if remaining <= 0 {
            return None;
        }
        if !promo.is_effective(at) {
            debug!("Promo {} not effective at {}", promo.code, at);
            return None;
        }

        let mut discount = match promo.kind {
            DiscountKind::Percent => {
                if promo.value <= 0 || promo.value >= 100 {
                    warn!(
                        "Promo {} has out-of-range percent value {}",
                        promo.code, promo.value
                    );
                    return None;
                }
                let pay = (Decimal::from(remaining) * Decimal::from(promo.value)
                    / Decimal::from(100))
                .floor()
                .to_i64()
                .unwrap_or(remaining);
                remaining - pay
            }
            DiscountKind::Fixed => {
                if promo.value <= 0 {
                    warn!("Promo {} has non-positive fixed value", promo.code);
                    return None;
                }
                i64::from(promo.value).min(remaining)
            }
            // Full waivers belong to memberships; a FREE promotional rule
            // is misconfiguration
            DiscountKind::Free => {
                warn!("Promo {} has unsupported kind FREE", promo.code);
                return None;
            }
        };

        if let Some(cap) = promo.max_discount {
            if cap > 0 && discount > cap {
                discount = cap;
            }
        }

        if discount <= 0 {
            return None;
        }

        Some(AppliedDiscount {
            source: DiscountSource::Rule,
            code: Some(promo.code.clone()),
            name: promo.name.clone(),
            kind: promo.kind,
            value: promo.value,
            amount: discount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn member_with_rate(rate: Decimal) -> Membership {
        Membership {
            discount_rate: Some(rate),
            ..Default::default()
        }
    }

    fn free_member() -> Membership {
        Membership {
            free_parking: true,
            ..Default::default()
        }
    }

    fn percent_promo(value: i32) -> PromotionalRule {
        PromotionalRule {
            code: "P".to_string(),
            name: "Percent promo".to_string(),
            kind: DiscountKind::Percent,
            value,
            ..Default::default()
        }
    }

    fn fixed_promo(value: i32) -> PromotionalRule {
        PromotionalRule {
            code: "F".to_string(),
            name: "Fixed promo".to_string(),
            kind: DiscountKind::Fixed,
            value,
            ..Default::default()
        }
    }

    #[test]
    fn test_member_rate_rounds_in_customer_favor() {
        // 999 * 0.8 = 799.2, member pays 799, discount 200
        let item = DiscountEngine::member_stage(999, &member_with_rate(dec!(0.8))).unwrap();
        assert_eq!(item.amount, 200);
        assert_eq!(item.kind, DiscountKind::Percent);
        assert_eq!(item.value, 80);
    }

    #[test]
    fn test_free_member_waives_everything() {
        let item = DiscountEngine::member_stage(1500, &free_member()).unwrap();
        assert_eq!(item.amount, 1500);
        assert_eq!(item.kind, DiscountKind::Free);
    }

    #[test]
    fn test_inactive_member_is_ignored() {
        let mut m = free_member();
        m.status = 0;
        assert!(DiscountEngine::member_stage(1500, &m).is_none());
    }

    #[test]
    fn test_rate_of_one_gives_no_discount() {
        assert!(DiscountEngine::member_stage(1000, &member_with_rate(dec!(1.0))).is_none());
    }

    #[test]
    fn test_percent_promo() {
        // Pay 80% of 1000: discount 200
        let item = DiscountEngine::promo_stage(1000, &percent_promo(80), Utc::now()).unwrap();
        assert_eq!(item.amount, 200);
        assert_eq!(item.source, DiscountSource::Rule);
    }

    #[test]
    fn test_percent_promo_out_of_range_skipped() {
        assert!(DiscountEngine::promo_stage(1000, &percent_promo(0), Utc::now()).is_none());
        assert!(DiscountEngine::promo_stage(1000, &percent_promo(100), Utc::now()).is_none());
        assert!(DiscountEngine::promo_stage(1000, &percent_promo(150), Utc::now()).is_none());
    }

    #[test]
    fn test_fixed_promo_clamps_to_remaining() {
        let item = DiscountEngine::promo_stage(300, &fixed_promo(500), Utc::now()).unwrap();
        assert_eq!(item.amount, 300);
    }

    #[test]
    fn test_promo_cap() {
        let mut promo = percent_promo(50);
        promo.max_discount = Some(100);

        // Raw discount would be 500, capped to 100
        let item = DiscountEngine::promo_stage(1000, &promo, Utc::now()).unwrap();
        assert_eq!(item.amount, 100);
    }

    #[test]
    fn test_expired_promo_skipped() {
        let mut promo = fixed_promo(100);
        promo.effective_end = Some(Utc::now() - chrono::Duration::hours(1));
        assert!(DiscountEngine::promo_stage(1000, &promo, Utc::now()).is_none());
    }

    #[test]
    fn test_stages_chain_on_remaining_balance() {
        // 1000 -> member pays 80% -> 800 remaining
        // promo pays 50% of 800 -> 400 remaining
        let outcome = DiscountEngine::apply(
            1000,
            Some(&member_with_rate(dec!(0.8))),
            Some(&percent_promo(50)),
            Utc::now(),
        );

        assert_eq!(outcome.payable, 400);
        assert_eq!(outcome.applied.len(), 2);
        assert_eq!(outcome.applied[0].amount, 200);
        assert_eq!(outcome.applied[1].amount, 400);
        assert_eq!(outcome.total_discount(), 600);
    }

    #[test]
    fn test_free_member_leaves_nothing_for_promo() {
        let outcome = DiscountEngine::apply(
            1000,
            Some(&free_member()),
            Some(&fixed_promo(100)),
            Utc::now(),
        );

        assert_eq!(outcome.payable, 0);
        // Promo stage sees zero remaining and applies nothing
        assert_eq!(outcome.applied.len(), 1);
    }

    #[test]
    fn test_payable_never_negative() {
        let outcome =
            DiscountEngine::apply(100, None, Some(&fixed_promo(50000)), Utc::now());
        assert_eq!(outcome.payable, 50);

        let outcome = DiscountEngine::apply(0, Some(&free_member()), None, Utc::now());
        assert_eq!(outcome.payable, 0);
        assert!(outcome.applied.is_empty());
    }

    #[test]
    fn test_negative_rate_waives_at_most_the_balance() {
        // floor(1000 * -0.5) would be -500; the member pays 0, not -500,
        // so the discount stays within the base amount
        let item = DiscountEngine::member_stage(1000, &member_with_rate(dec!(-0.5))).unwrap();
        assert_eq!(item.amount, 1000);
        assert_eq!(item.value, 0);

        let outcome = DiscountEngine::apply(
            1000,
            Some(&member_with_rate(dec!(-0.5))),
            Some(&fixed_promo(100)),
            Utc::now(),
        );
        assert_eq!(outcome.payable, 0);
        assert!(outcome.total_discount() <= 1000);
    }

    #[test]
    fn test_free_kind_promo_skipped() {
        let mut promo = fixed_promo(100);
        promo.kind = DiscountKind::Free;
        assert!(DiscountEngine::promo_stage(1000, &promo, Utc::now()).is_none());
    }

    #[test]
    fn test_no_discounts() {
        let outcome = DiscountEngine::apply(750, None, None, Utc::now());
        assert_eq!(outcome.payable, 750);
        assert!(outcome.applied.is_empty());
    }
}
