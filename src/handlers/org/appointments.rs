use axum::{
    extract::{Extension, Path, Query},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::models::{Appointment, AppointmentStatus, UserRole};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, OrgPool};
use crate::services::mailer;
use crate::services::{AppointmentService, UserService};

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub doctor_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

/// POST /:org/appointments - a patient books with a doctor; starts PENDING
/// and the doctor is notified by email
pub async fn create(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<BookRequest>,
) -> ApiResult<Value> {
    if !current.is_patient() {
        return Err(ApiError::forbidden("Only patients can book appointments"));
    }

    if payload.scheduled_at <= Utc::now() {
        return Err(ApiError::unprocessable_entity("Appointment time must be in the future"));
    }

    let appointment = AppointmentService::new(pool.clone())
        .create(current.user.id, payload.doctor_id, payload.scheduled_at, payload.notes)
        .await?;

    if let Ok(Some(doctor)) = UserService::new(pool).find_by_id(payload.doctor_id).await {
        let patient_name = format!("{} {}", current.user.first_name, current.user.last_name);
        mailer::notify_appointment_requested(
            &doctor.email,
            &patient_name,
            &appointment.scheduled_at.to_rfc3339(),
        );
    }

    Ok(ApiResponse::created(json!({ "appointment": appointment })))
}

/// GET /:org/appointments - role-scoped listing with an optional status
/// filter (patients and doctors see their own, admins see all)
pub async fn list(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Value> {
    let status = parse_status_filter(query.status.as_deref())?;
    let service = AppointmentService::new(pool);

    let appointments = match current.role {
        UserRole::Admin => service.list_all(status).await?,
        UserRole::Doctor => service.list_for_doctor(current.user.id, status).await?,
        UserRole::Patient => service.list_for_patient(current.user.id, status).await?,
    };

    Ok(ApiResponse::success(json!({ "appointments": appointments })))
}

/// GET /:org/appointments/:id
pub async fn show(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
    Path((_org, id)): Path<(String, Uuid)>,
) -> ApiResult<Value> {
    let appointment = AppointmentService::new(pool)
        .get(id)
        .await?
        .filter(|a| can_view(&current, a))
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;

    Ok(ApiResponse::success(json!({ "appointment": appointment })))
}

/// PUT /:org/appointments/:id - reschedule or annotate a pending
/// appointment (the booking patient, or an admin)
pub async fn update(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
    Path((_org, id)): Path<(String, Uuid)>,
    Json(payload): Json<UpdateRequest>,
) -> ApiResult<Value> {
    if let Some(when) = payload.scheduled_at {
        if when <= Utc::now() {
            return Err(ApiError::unprocessable_entity("Appointment time must be in the future"));
        }
    }

    let service = AppointmentService::new(pool);

    let appointment = service
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;

    let owns = appointment.patient_id == Some(current.user.id);
    if !current.is_admin() && !(current.is_patient() && owns) {
        return Err(ApiError::forbidden("Only the booking patient or an admin can change this appointment"));
    }

    let appointment = service
        .update_details(id, payload.scheduled_at, payload.notes)
        .await?;

    Ok(ApiResponse::success(json!({ "appointment": appointment })))
}

/// PUT /:org/appointments/:id/status - lifecycle transition. Doctors drive
/// approve/decline/complete on their own appointments, patients cancel their
/// own, admins may apply any legal move. Counterparties are emailed.
pub async fn set_status(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
    Path((_org, id)): Path<(String, Uuid)>,
    Json(payload): Json<StatusRequest>,
) -> ApiResult<Value> {
    let next = AppointmentStatus::parse(&payload.status)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown appointment status: {}", payload.status)))?;

    let service = AppointmentService::new(pool.clone());

    let appointment = service
        .get(id)
        .await?
        .filter(|a| can_view(&current, a))
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;

    if !may_transition(&current, &appointment, next) {
        return Err(ApiError::forbidden(format!(
            "Your role cannot move this appointment to {}",
            next
        )));
    }

    let appointment = service.transition(id, next).await?;

    notify_counterparty(pool, &current, &appointment, next).await;

    Ok(ApiResponse::success(json!({ "appointment": appointment })))
}

fn can_view(current: &CurrentUser, appointment: &Appointment) -> bool {
    match current.role {
        UserRole::Admin => true,
        UserRole::Doctor => appointment.doctor_id == Some(current.user.id),
        UserRole::Patient => appointment.patient_id == Some(current.user.id),
    }
}

/// Role rules for lifecycle moves; legality of the move itself is checked by
/// the appointment service against the current status
fn may_transition(current: &CurrentUser, appointment: &Appointment, next: AppointmentStatus) -> bool {
    match current.role {
        UserRole::Admin => true,
        UserRole::Doctor => {
            appointment.doctor_id == Some(current.user.id)
                && matches!(
                    next,
                    AppointmentStatus::Approved
                        | AppointmentStatus::Declined
                        | AppointmentStatus::Completed
                )
        }
        UserRole::Patient => {
            appointment.patient_id == Some(current.user.id) && next == AppointmentStatus::Cancelled
        }
    }
}

/// Staff actions notify the patient; a patient cancelling notifies the doctor
async fn notify_counterparty(
    pool: sqlx::PgPool,
    current: &CurrentUser,
    appointment: &Appointment,
    next: AppointmentStatus,
) {
    let target = if current.is_patient() {
        appointment.doctor_id
    } else {
        appointment.patient_id
    };

    let Some(user_id) = target else { return };

    if let Ok(Some(user)) = UserService::new(pool).find_by_id(user_id).await {
        mailer::notify_appointment_status(
            &user.email,
            next.as_str(),
            &appointment.scheduled_at.to_rfc3339(),
        );
    }
}

fn parse_status_filter(raw: Option<&str>) -> Result<Option<AppointmentStatus>, ApiError> {
    match raw {
        None => Ok(None),
        Some(value) => AppointmentStatus::parse(value)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("Unknown appointment status: {}", value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::OrgUser;
    use chrono::Utc;

    fn user_with_role(role: UserRole) -> CurrentUser {
        let mut user = OrgUser {
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
        };
        match role {
            UserRole::Admin => user.admin_profile_id = Some(Uuid::new_v4()),
            UserRole::Doctor => user.doctor_profile_id = Some(Uuid::new_v4()),
            UserRole::Patient => user.patient_profile_id = Some(Uuid::new_v4()),
        }
        CurrentUser { user, role }
    }

    fn appointment_between(patient: &CurrentUser, doctor: &CurrentUser) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Some(patient.user.id),
            doctor_id: Some(doctor.user.id),
            scheduled_at: Utc::now(),
            status: "PENDING".to_string(),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn doctors_drive_their_own_appointments_only() {
        let patient = user_with_role(UserRole::Patient);
        let doctor = user_with_role(UserRole::Doctor);
        let other_doctor = user_with_role(UserRole::Doctor);
        let appt = appointment_between(&patient, &doctor);

        assert!(may_transition(&doctor, &appt, AppointmentStatus::Approved));
        assert!(may_transition(&doctor, &appt, AppointmentStatus::Declined));
        assert!(may_transition(&doctor, &appt, AppointmentStatus::Completed));
        assert!(!may_transition(&doctor, &appt, AppointmentStatus::Cancelled));
        assert!(!may_transition(&other_doctor, &appt, AppointmentStatus::Approved));
    }

    #[test]
    fn patients_only_cancel_their_own() {
        let patient = user_with_role(UserRole::Patient);
        let other_patient = user_with_role(UserRole::Patient);
        let doctor = user_with_role(UserRole::Doctor);
        let appt = appointment_between(&patient, &doctor);

        assert!(may_transition(&patient, &appt, AppointmentStatus::Cancelled));
        assert!(!may_transition(&patient, &appt, AppointmentStatus::Approved));
        assert!(!may_transition(&other_patient, &appt, AppointmentStatus::Cancelled));
    }

    #[test]
    fn admins_may_apply_any_move() {
        let patient = user_with_role(UserRole::Patient);
        let doctor = user_with_role(UserRole::Doctor);
        let admin = user_with_role(UserRole::Admin);
        let appt = appointment_between(&patient, &doctor);

        assert!(may_transition(&admin, &appt, AppointmentStatus::Approved));
        assert!(may_transition(&admin, &appt, AppointmentStatus::Cancelled));
    }

    #[test]
    fn visibility_is_participant_scoped() {
        let patient = user_with_role(UserRole::Patient);
        let doctor = user_with_role(UserRole::Doctor);
        let stranger = user_with_role(UserRole::Patient);
        let admin = user_with_role(UserRole::Admin);
        let appt = appointment_between(&patient, &doctor);

        assert!(can_view(&patient, &appt));
        assert!(can_view(&doctor, &appt));
        assert!(can_view(&admin, &appt));
        assert!(!can_view(&stranger, &appt));
    }

    #[test]
    fn status_filter_parsing() {
        assert_eq!(parse_status_filter(None).unwrap(), None);
        assert_eq!(
            parse_status_filter(Some("PENDING")).unwrap(),
            Some(AppointmentStatus::Pending)
        );
        assert!(parse_status_filter(Some("pending")).is_err());
    }
}
