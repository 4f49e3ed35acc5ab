//! Order modification request model
//!
//! After-the-fact adjustments to settled orders go through a review queue.
//! A request is created PENDING and reviewed exactly once, either APPROVED
//! or REJECTED.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of change the request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModificationType {
    /// Change the payable amount of an unpaid order
    AmountAdjust,
    /// Refund a paid order
    Refund,
}

impl fmt::Display for ModificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModificationType::AmountAdjust => write!(f, "AMOUNT_ADJUST"),
            ModificationType::Refund => write!(f, "REFUND"),
        }
    }
}

impl ModificationType {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "AMOUNT_ADJUST" => Some(ModificationType::AmountAdjust),
            "REFUND" => Some(ModificationType::Refund),
            _ => None,
        }
    }
}

/// Review status of a modification request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModificationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ModificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModificationStatus::Pending => write!(f, "PENDING"),
            ModificationStatus::Approved => write!(f, "APPROVED"),
            ModificationStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

impl ModificationStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(ModificationStatus::Pending),
            "APPROVED" => Some(ModificationStatus::Approved),
            "REJECTED" => Some(ModificationStatus::Rejected),
            _ => None,
        }
    }
}

/// Order modification request entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderModification {
    /// Unique identifier
    pub id: i64,

    /// Order the request targets
    pub order_id: i64,

    /// AMOUNT_ADJUST or REFUND
    pub kind: ModificationType,

    /// Requested amount: new payable for adjusts, refund amount for refunds
    pub requested_amount: i64,

    /// Payable amount at request time, for audit
    pub original_amount: i64,

    /// Why the change was requested
    pub reason: String,

    /// Requesting operator
    pub requested_by: i64,

    /// Review status
    pub status: ModificationStatus,

    /// Reviewing operator, set on review
    pub reviewed_by: Option<i64>,

    /// Reviewer's note
    pub review_note: Option<String>,

    /// When the request was reviewed
    pub reviewed_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl OrderModification {
    /// Only pending requests may be reviewed
    #[inline]
    pub fn is_reviewable(&self) -> bool {
        self.status == ModificationStatus::Pending
    }
}

impl Default for OrderModification {
    fn default() -> Self {
        Self {
            id: 0,
            order_id: 0,
            kind: ModificationType::AmountAdjust,
            requested_amount: 0,
            original_amount: 0,
            reason: String::new(),
            requested_by: 0,
            status: ModificationStatus::Pending,
            reviewed_by: None,
            review_note: None,
            reviewed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
