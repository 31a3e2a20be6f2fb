use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::{Appointment, AppointmentStatus};

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Appointment not found")]
    NotFound,
    #[error("Unknown appointment status: {0}")]
    InvalidStatus(String),
    #[error("Cannot move appointment from {from} to {to}")]
    IllegalTransition { from: AppointmentStatus, to: AppointmentStatus },
    #[error("Appointment can only be rescheduled while pending")]
    NotReschedulable,
    #[error("Doctor not found")]
    UnknownDoctor,
}

const APPOINTMENT_COLUMNS: &str =
    "id, patient_id, doctor_id, scheduled_at, status, notes, created_at, updated_at";

/// Appointment CRUD and lifecycle transitions for one tenant database.
/// The status machine lives here; role rules stay with the handlers.
pub struct AppointmentService {
    pool: PgPool,
}

impl AppointmentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Book a new appointment in PENDING for a patient with a doctor
    pub async fn create(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        scheduled_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let doctor: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM users WHERE id = $1 AND doctor_profile_id IS NOT NULL",
        )
        .bind(doctor_id)
        .fetch_optional(&self.pool)
        .await?;

        if doctor.is_none() {
            return Err(AppointmentError::UnknownDoctor);
        }

        let appointment = sqlx::query_as::<_, Appointment>(&format!(
            r#"
            INSERT INTO appointments (id, patient_id, doctor_id, scheduled_at, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            APPOINTMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(patient_id)
        .bind(doctor_id)
        .bind(scheduled_at)
        .bind(AppointmentStatus::Pending.as_str())
        .bind(&notes)
        .fetch_one(&self.pool)
        .await?;

        Ok(appointment)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let appointment = sqlx::query_as::<_, Appointment>(&format!(
            "SELECT {} FROM appointments WHERE id = $1",
            APPOINTMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(appointment)
    }

    pub async fn list_all(
        &self,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let rows = sqlx::query_as::<_, Appointment>(&format!(
            r#"
            SELECT {} FROM appointments
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY scheduled_at
            "#,
            APPOINTMENT_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn list_for_patient(
        &self,
        patient_id: Uuid,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.list_for("patient_id", patient_id, status).await
    }

    pub async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.list_for("doctor_id", doctor_id, status).await
    }

    async fn list_for(
        &self,
        column: &str,
        user_id: Uuid,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let rows = sqlx::query_as::<_, Appointment>(&format!(
            r#"
            SELECT {} FROM appointments
            WHERE {} = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY scheduled_at
            "#,
            APPOINTMENT_COLUMNS, column
        ))
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Reschedule or annotate a PENDING appointment
    pub async fn update_details(
        &self,
        id: Uuid,
        scheduled_at: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get(id).await?.ok_or(AppointmentError::NotFound)?;

        if current.current_status() != Some(AppointmentStatus::Pending) {
            return Err(AppointmentError::NotReschedulable);
        }

        let appointment = sqlx::query_as::<_, Appointment>(&format!(
            r#"
            UPDATE appointments
            SET scheduled_at = COALESCE($2, scheduled_at),
                notes = COALESCE($3, notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            APPOINTMENT_COLUMNS
        ))
        .bind(id)
        .bind(scheduled_at)
        .bind(&notes)
        .fetch_one(&self.pool)
        .await?;

        Ok(appointment)
    }

    /// Apply a lifecycle transition after validating it against the current
    /// status. Returns the updated row.
    pub async fn transition(
        &self,
        id: Uuid,
        next: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get(id).await?.ok_or(AppointmentError::NotFound)?;

        let from = current
            .current_status()
            .ok_or_else(|| AppointmentError::InvalidStatus(current.status.clone()))?;

        if !from.can_transition_to(next) {
            return Err(AppointmentError::IllegalTransition { from, to: next });
        }

        let appointment = sqlx::query_as::<_, Appointment>(&format!(
            r#"
            UPDATE appointments
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = $3
            RETURNING {}
            "#,
            APPOINTMENT_COLUMNS
        ))
        .bind(id)
        .bind(next.as_str())
        .bind(from.as_str())
        .fetch_optional(&self.pool)
        .await?
        // The status guard in the WHERE clause lost a race with another write
        .ok_or(AppointmentError::IllegalTransition { from, to: next })?;

        Ok(appointment)
    }
}
