use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::auth::{self, AuthError};
use crate::database::models::OrgUser;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("Email already registered: {0}")]
    EmailTaken(String),
    #[error("User not found")]
    NotFound,
}

impl From<sqlx::Error> for UserError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            // The only unique key on tenant users is the email column
            return UserError::EmailTaken("email already registered".to_string());
        }
        UserError::Database(err)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

/// Doctor as returned by the API: user row joined with its doctor profile
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Doctor {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub specialization: String,
    pub license_number: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Patient as returned by the API: user row joined with its patient profile
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Patient {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
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

#[derive(Debug, Deserialize)]
pub struct NewDoctor {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub specialization: String,
    pub license_number: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDoctor {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewPatient {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub phone: String,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub conditions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePatient {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub conditions: Option<String>,
}

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, refresh_token_hash, \
     admin_profile_id, doctor_profile_id, patient_profile_id, created_at, updated_at";

/// Tenant-user operations against one organization's database. Users are
/// always created together with exactly one role profile, inside a
/// transaction, which keeps the single-profile rule true by construction.
pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<OrgUser>, UserError> {
        let user = sqlx::query_as::<_, OrgUser>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<OrgUser>, UserError> {
        let user = sqlx::query_as::<_, OrgUser>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Persist (or clear) the hash of a user's current refresh token
    pub async fn set_refresh_hash(&self, id: Uuid, hash: Option<&str>) -> Result<(), UserError> {
        sqlx::query("UPDATE users SET refresh_token_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_doctor(&self, new: NewDoctor) -> Result<Doctor, UserError> {
        let password_hash = auth::hash_password(&new.password)?;
        let mut tx = self.pool.begin().await?;

        let profile_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO doctor_profiles (id, specialization, license_number, phone)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(profile_id)
        .bind(&new.specialization)
        .bind(&new.license_number)
        .bind(&new.phone)
        .execute(&mut *tx)
        .await?;

        let user_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, doctor_profile_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user_id)
        .bind(&new.email)
        .bind(&password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(profile_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_doctor(user_id).await?.ok_or(UserError::NotFound)
    }

    pub async fn get_doctor(&self, id: Uuid) -> Result<Option<Doctor>, UserError> {
        let doctor = sqlx::query_as::<_, Doctor>(
            r#"
            SELECT u.id, u.email, u.first_name, u.last_name,
                   p.specialization, p.license_number, p.phone, u.created_at
            FROM users u
            JOIN doctor_profiles p ON p.id = u.doctor_profile_id
            WHERE u.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(doctor)
    }

    pub async fn list_doctors(&self) -> Result<Vec<Doctor>, UserError> {
        let doctors = sqlx::query_as::<_, Doctor>(
            r#"
            SELECT u.id, u.email, u.first_name, u.last_name,
                   p.specialization, p.license_number, p.phone, u.created_at
            FROM users u
            JOIN doctor_profiles p ON p.id = u.doctor_profile_id
            ORDER BY u.last_name, u.first_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(doctors)
    }

    pub async fn update_doctor(&self, id: Uuid, update: UpdateDoctor) -> Result<Doctor, UserError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                updated_at = NOW()
            WHERE id = $1 AND doctor_profile_id IS NOT NULL
            "#,
        )
        .bind(id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(UserError::NotFound);
        }

        sqlx::query(
            r#"
            UPDATE doctor_profiles
            SET specialization = COALESCE($2, specialization),
                license_number = COALESCE($3, license_number),
                phone = COALESCE($4, phone)
            WHERE id = (SELECT doctor_profile_id FROM users WHERE id = $1)
            "#,
        )
        .bind(id)
        .bind(&update.specialization)
        .bind(&update.license_number)
        .bind(&update.phone)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_doctor(id).await?.ok_or(UserError::NotFound)
    }

    pub async fn delete_doctor(&self, id: Uuid) -> Result<(), UserError> {
        self.delete_user_with_profile(id, "doctor_profile_id", "doctor_profiles").await
    }

    pub async fn create_patient(
        &self,
        new: NewPatient,
        registration_ip: Option<String>,
    ) -> Result<Patient, UserError> {
        let password_hash = auth::hash_password(&new.password)?;
        let mut tx = self.pool.begin().await?;

        let profile_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO patient_profiles
                (id, date_of_birth, phone, address, emergency_contact,
                 blood_type, allergies, conditions, registration_ip)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(profile_id)
        .bind(new.date_of_birth)
        .bind(&new.phone)
        .bind(&new.address)
        .bind(&new.emergency_contact)
        .bind(&new.blood_type)
        .bind(&new.allergies)
        .bind(&new.conditions)
        .bind(&registration_ip)
        .execute(&mut *tx)
        .await?;

        let user_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, patient_profile_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user_id)
        .bind(&new.email)
        .bind(&password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(profile_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_patient(user_id).await?.ok_or(UserError::NotFound)
    }

    pub async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, UserError> {
        let patient = sqlx::query_as::<_, Patient>(
            r#"
            SELECT u.id, u.email, u.first_name, u.last_name,
                   p.date_of_birth, p.phone, p.address, p.emergency_contact,
                   p.blood_type, p.allergies, p.conditions, p.registration_ip,
                   u.created_at
            FROM users u
            JOIN patient_profiles p ON p.id = u.patient_profile_id
            WHERE u.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(patient)
    }

    pub async fn list_patients(&self) -> Result<Vec<Patient>, UserError> {
        let patients = sqlx::query_as::<_, Patient>(
            r#"
            SELECT u.id, u.email, u.first_name, u.last_name,
                   p.date_of_birth, p.phone, p.address, p.emergency_contact,
                   p.blood_type, p.allergies, p.conditions, p.registration_ip,
                   u.created_at
            FROM users u
            JOIN patient_profiles p ON p.id = u.patient_profile_id
            ORDER BY u.last_name, u.first_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(patients)
    }

    pub async fn update_patient(&self, id: Uuid, update: UpdatePatient) -> Result<Patient, UserError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                updated_at = NOW()
            WHERE id = $1 AND patient_profile_id IS NOT NULL
            "#,
        )
        .bind(id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(UserError::NotFound);
        }

        sqlx::query(
            r#"
            UPDATE patient_profiles
            SET phone = COALESCE($2, phone),
                address = COALESCE($3, address),
                emergency_contact = COALESCE($4, emergency_contact),
                blood_type = COALESCE($5, blood_type),
                allergies = COALESCE($6, allergies),
                conditions = COALESCE($7, conditions)
            WHERE id = (SELECT patient_profile_id FROM users WHERE id = $1)
            "#,
        )
        .bind(id)
        .bind(&update.phone)
        .bind(&update.address)
        .bind(&update.emergency_contact)
        .bind(&update.blood_type)
        .bind(&update.allergies)
        .bind(&update.conditions)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_patient(id).await?.ok_or(UserError::NotFound)
    }

    pub async fn delete_patient(&self, id: Uuid) -> Result<(), UserError> {
        self.delete_user_with_profile(id, "patient_profile_id", "patient_profiles").await
    }

    /// Remove a user row and its role profile. Appointments referencing the
    /// user keep their rows; the foreign keys null out on delete.
    async fn delete_user_with_profile(
        &self,
        id: Uuid,
        profile_column: &str,
        profile_table: &str,
    ) -> Result<(), UserError> {
        let mut tx = self.pool.begin().await?;

        let profile_id: Option<(Option<Uuid>,)> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE id = $1",
            profile_column
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let profile_id = match profile_id {
            Some((Some(pid),)) => pid,
            _ => return Err(UserError::NotFound),
        };

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(&format!("DELETE FROM {} WHERE id = $1", profile_table))
            .bind(profile_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
