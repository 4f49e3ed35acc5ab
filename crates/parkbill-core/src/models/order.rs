//! Charge order and discount line item models
//!
//! A charge order is the billable artifact of one settlement. Exactly one
//! non-duplicate order may exist per (session, exit-time) pair; that pair is
//! the idempotency key and is enforced by a storage-level unique constraint.

use crate::models::promo::DiscountKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment status of a charge order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PayStatus {
    #[default]
    Unpaid,
    Paid,
    Refunded,
}

impl fmt::Display for PayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayStatus::Unpaid => write!(f, "UNPAID"),
            PayStatus::Paid => write!(f, "PAID"),
            PayStatus::Refunded => write!(f, "REFUNDED"),
        }
    }
}

impl PayStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "UNPAID" => Some(PayStatus::Unpaid),
            "PAID" => Some(PayStatus::Paid),
            "REFUNDED" => Some(PayStatus::Refunded),
            _ => None,
        }
    }
}

/// Where a discount line item came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiscountSource {
    /// Membership entitlement
    Member,
    /// Promotional rule redeemed by code
    Rule,
}

impl fmt::Display for DiscountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountSource::Member => write!(f, "MEMBER"),
            DiscountSource::Rule => write!(f, "RULE"),
        }
    }
}

impl DiscountSource {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MEMBER" => Some(DiscountSource::Member),
            "RULE" => Some(DiscountSource::Rule),
            _ => None,
        }
    }
}

/// Charge order entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeOrder {
    /// Unique identifier
    pub id: i64,

    /// Business order number, human-traceable
    pub order_no: String,

    /// Settled session
    pub session_id: i64,

    /// User the order bills, when known; refunds and wallet payments need it
    pub user_id: Option<i64>,

    /// Payable amount after discounts, minor currency units
    pub amount: i64,

    /// Payment status
    pub pay_status: PayStatus,

    /// Channel the order was paid through
    pub pay_channel: Option<String>,

    /// When payment was confirmed
    pub pay_time: Option<DateTime<Utc>>,

    /// Name of the billing rule applied, for audit
    pub rule_name: String,

    /// Exit time this order settles; half of the idempotency key
    pub exit_time: DateTime<Utc>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ChargeOrder {
    /// Only unpaid orders may be confirmed
    #[inline]
    pub fn can_confirm_payment(&self) -> bool {
        self.pay_status == PayStatus::Unpaid
    }
}

impl Default for ChargeOrder {
    fn default() -> Self {
        Self {
            id: 0,
            order_no: String::new(),
            session_id: 0,
            user_id: None,
            amount: 0,
            pay_status: PayStatus::Unpaid,
            pay_channel: None,
            pay_time: None,
            rule_name: String::new(),
            exit_time: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

/// One applied discount against an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountLineItem {
    /// Unique identifier
    pub id: i64,

    /// Owning order
    pub order_id: i64,

    /// MEMBER or RULE
    pub source: DiscountSource,

    /// Promotional code, when source is RULE
    pub promo_code: Option<String>,

    /// Display name ("Member free parking", promo rule name, ...)
    pub name: String,

    /// FREE, PERCENT or FIXED
    pub kind: DiscountKind,

    /// Raw discount value (percentage or minor units, per kind)
    pub value: i32,

    /// Absolute discount amount in minor currency units
    pub amount: i64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Default for DiscountLineItem {
    fn default() -> Self {
        Self {
            id: 0,
            order_id: 0,
            source: DiscountSource::Member,
            promo_code: None,
            name: String::new(),
            kind: DiscountKind::Percent,
            value: 0,
            amount: 0,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_confirm_payment() {
        let order = ChargeOrder::default();
        assert!(order.can_confirm_payment());

        let paid = ChargeOrder {
            pay_status: PayStatus::Paid,
            ..Default::default()
        };
        assert!(!paid.can_confirm_payment());

        let refunded = ChargeOrder {
            pay_status: PayStatus::Refunded,
            ..Default::default()
        };
        assert!(!refunded.can_confirm_payment());
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(PayStatus::from_str("unpaid"), Some(PayStatus::Unpaid));
        assert_eq!(PayStatus::from_str("PAID"), Some(PayStatus::Paid));
        assert_eq!(PayStatus::from_str("other"), None);
        assert_eq!(DiscountSource::from_str("member"), Some(DiscountSource::Member));
        assert_eq!(DiscountSource::from_str("RULE"), Some(DiscountSource::Rule));
    }
}
