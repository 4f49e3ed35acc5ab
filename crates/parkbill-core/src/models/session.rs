//! Parking session model
//!
//! A session is one vehicle's presence interval at a site, created by entry
//! ingestion and settled on exit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    /// Vehicle is on site, or has exited but not yet paid
    #[default]
    Active,
    /// Payment confirmed, session closed
    Finished,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "ACTIVE"),
            SessionStatus::Finished => write!(f, "FINISHED"),
        }
    }
}

impl SessionStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Some(SessionStatus::Active),
            "FINISHED" => Some(SessionStatus::Finished),
            _ => None,
        }
    }
}

/// Parking session entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParkingSession {
    /// Unique identifier
    pub id: i64,

    /// Vehicle plate number
    pub plate_number: String,

    /// Site the vehicle entered
    pub site_id: i64,

    /// Entry timestamp
    pub entry_time: DateTime<Utc>,

    /// Exit timestamp, set by settlement
    pub exit_time: Option<DateTime<Utc>>,

    /// Amount paid in minor currency units, set on payment confirmation
    pub paid_amount: Option<i64>,

    /// Lifecycle status
    pub status: SessionStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ParkingSession {
    /// Whole parked minutes between entry and the given exit, floored at 1.
    ///
    /// Sub-minute stays are billed as one minute.
    pub fn parked_minutes(&self, exit_time: DateTime<Utc>) -> i64 {
        let minutes = (exit_time - self.entry_time).num_minutes();
        minutes.max(1)
    }
}

impl Default for ParkingSession {
    fn default() -> Self {
        Self {
            id: 0,
            plate_number: String::new(),
            site_id: 0,
            entry_time: Utc::now(),
            exit_time: None,
            paid_amount: None,
            status: SessionStatus::Active,
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
    fn test_parked_minutes() {
        let entry = Utc::now();
        let session = ParkingSession {
            entry_time: entry,
            ..Default::default()
        };

        assert_eq!(session.parked_minutes(entry + Duration::minutes(95)), 95);
        assert_eq!(session.parked_minutes(entry + Duration::seconds(90)), 1);
    }

    #[test]
    fn test_parked_minutes_floors_at_one() {
        let entry = Utc::now();
        let session = ParkingSession {
            entry_time: entry,
            ..Default::default()
        };

        // Instant turnaround still bills one minute
        assert_eq!(session.parked_minutes(entry), 1);
        assert_eq!(session.parked_minutes(entry + Duration::seconds(30)), 1);
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(SessionStatus::from_str("active"), Some(SessionStatus::Active));
        assert_eq!(
            SessionStatus::from_str("FINISHED"),
            Some(SessionStatus::Finished)
        );
        assert_eq!(SessionStatus::from_str("gone"), None);
        assert_eq!(SessionStatus::Finished.to_string(), "FINISHED");
    }
}
