use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Role a tenant user holds, derived from which profile row is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Doctor,
    Patient,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Doctor => "doctor",
            UserRole::Patient => "patient",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User row in a tenant database. Carries at most one role profile; the
/// database enforces the same rule with a CHECK constraint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrgUser {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub refresh_token_hash: Option<String>,
    pub admin_profile_id: Option<Uuid>,
    pub doctor_profile_id: Option<Uuid>,
    pub patient_profile_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrgUser {
    pub fn profile_count(&self) -> usize {
        [
            self.admin_profile_id.is_some(),
            self.doctor_profile_id.is_some(),
            self.patient_profile_id.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Role derived from the attached profile, if any
    pub fn role(&self) -> Option<UserRole> {
        if self.admin_profile_id.is_some() {
            Some(UserRole::Admin)
        } else if self.doctor_profile_id.is_some() {
            Some(UserRole::Doctor)
        } else if self.patient_profile_id.is_some() {
            Some(UserRole::Patient)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub specialization: String,
    pub license_number: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PatientProfile {
    pub id: Uuid,
    pub date_of_birth: NaiveDate,
    pub phone: String,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub conditions: Option<String>,
    pub registration_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_user() -> OrgUser {
        OrgUser {
            id: Uuid::new_v4(),
            email: "u@example.com".to_string(),
            password_hash: "x".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            refresh_token_hash: None,
            admin_profile_id: None,
            doctor_profile_id: None,
            patient_profile_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn role_follows_attached_profile() {
        let mut user = bare_user();
        assert_eq!(user.role(), None);
        assert_eq!(user.profile_count(), 0);

        user.doctor_profile_id = Some(Uuid::new_v4());
        assert_eq!(user.role(), Some(UserRole::Doctor));
        assert_eq!(user.profile_count(), 1);
    }

    #[test]
    fn profile_count_flags_constraint_violations() {
        let mut user = bare_user();
        user.admin_profile_id = Some(Uuid::new_v4());
        user.patient_profile_id = Some(Uuid::new_v4());
        // two profiles set would violate the users_single_profile CHECK
        assert_eq!(user.profile_count(), 2);
    }
}
