use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Appointment row. Patient and doctor references are nulled when the
/// underlying user rows are deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Appointment lifecycle. Transitions are linear and checked at the
/// controller layer; the database only constrains the value set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Declined,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Approved => "APPROVED",
            AppointmentStatus::Declined => "DECLINED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(AppointmentStatus::Pending),
            "APPROVED" => Some(AppointmentStatus::Approved),
            "DECLINED" => Some(AppointmentStatus::Declined),
            "COMPLETED" => Some(AppointmentStatus::Completed),
            "CANCELLED" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Declined | AppointmentStatus::Completed | AppointmentStatus::Cancelled
        )
    }

    /// Legal lifecycle moves:
    /// PENDING -> APPROVED | DECLINED | CANCELLED
    /// APPROVED -> COMPLETED | CANCELLED
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Declined)
                | (Pending, Cancelled)
                | (Approved, Completed)
                | (Approved, Cancelled)
        )
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Appointment {
    pub fn current_status(&self) -> Option<AppointmentStatus> {
        AppointmentStatus::parse(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        for status in [
            AppointmentStatus::Pending,
            AppointmentStatus::Approved,
            AppointmentStatus::Declined,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ] {
            assert_eq!(AppointmentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AppointmentStatus::parse("pending"), None);
        assert_eq!(AppointmentStatus::parse("NOPE"), None);
    }

    #[test]
    fn pending_fan_out() {
        let pending = AppointmentStatus::Pending;
        assert!(pending.can_transition_to(AppointmentStatus::Approved));
        assert!(pending.can_transition_to(AppointmentStatus::Declined));
        assert!(pending.can_transition_to(AppointmentStatus::Cancelled));
        assert!(!pending.can_transition_to(AppointmentStatus::Completed));
        assert!(!pending.can_transition_to(AppointmentStatus::Pending));
    }

    #[test]
    fn approved_moves_forward_only() {
        let approved = AppointmentStatus::Approved;
        assert!(approved.can_transition_to(AppointmentStatus::Completed));
        assert!(approved.can_transition_to(AppointmentStatus::Cancelled));
        assert!(!approved.can_transition_to(AppointmentStatus::Pending));
        assert!(!approved.can_transition_to(AppointmentStatus::Declined));
    }

    #[test]
    fn terminal_states_do_not_move() {
        for terminal in [
            AppointmentStatus::Declined,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                AppointmentStatus::Pending,
                AppointmentStatus::Approved,
                AppointmentStatus::Declined,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }
}
