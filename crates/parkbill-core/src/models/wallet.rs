//! Wallet model
//!
//! Per-user prepaid balance. All amounts are minor currency units; the
//! balance never goes negative because debits are conditional at the
//! storage layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wallet entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique identifier
    pub id: i64,

    /// Owning user, one wallet per user
    pub user_id: i64,

    /// Current balance in minor currency units
    pub balance: i64,

    /// Lifetime recharged total
    pub total_recharge: i64,

    /// Lifetime consumed total
    pub total_consume: i64,

    /// 1 = active, 0 = frozen
    pub status: i32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Frozen wallets accept neither recharges nor debits
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == 1
    }

    /// Whether the balance covers `amount`
    #[inline]
    pub fn can_cover(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self {
            id: 0,
            user_id: 0,
            balance: 0,
            total_recharge: 0,
            total_consume: 0,
            status: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_cover() {
        let w = Wallet {
            balance: 1000,
            ..Default::default()
        };
        assert!(w.can_cover(1000));
        assert!(w.can_cover(999));
        assert!(!w.can_cover(1001));
    }

    #[test]
    fn test_is_active() {
        assert!(Wallet::default().is_active());
        assert!(!Wallet {
            status: 0,
            ..Default::default()
        }
        .is_active());
    }
}
