//! Parking site model
//!
//! Site metadata carries the fallback unit price used when no billing rule
//! is configured for the site.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parking site entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParkingSite {
    /// Unique identifier
    pub id: i64,

    /// Short site code
    pub code: String,

    /// Human-readable site name
    pub name: String,

    /// Fallback hourly unit price in minor currency units
    pub unit_price: Option<i64>,

    /// Grace period for the fallback policy, minutes
    pub free_minutes: Option<i64>,

    /// 1 = operating, 0 = closed
    pub status: i32,

    /// Opening hours, e.g. "08:00-22:00"
    pub open_hours: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ParkingSite {
    /// Usable fallback unit price, if one is configured
    pub fn usable_unit_price(&self) -> Option<i64> {
        self.unit_price.filter(|p| *p > 0)
    }
}

impl Default for ParkingSite {
    fn default() -> Self {
        Self {
            id: 0,
            code: String::new(),
            name: String::new(),
            unit_price: None,
            free_minutes: None,
            status: 1,
            open_hours: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_unit_price() {
        let site = ParkingSite {
            unit_price: Some(500),
            ..Default::default()
        };
        assert_eq!(site.usable_unit_price(), Some(500));

        let site = ParkingSite {
            unit_price: Some(0),
            ..Default::default()
        };
        assert_eq!(site.usable_unit_price(), None);

        let site = ParkingSite::default();
        assert_eq!(site.usable_unit_price(), None);
    }
}
