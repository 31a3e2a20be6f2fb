pub mod admin;
pub mod appointment;
pub mod organization;
pub mod user;

pub use admin::Admin;
pub use appointment::{Appointment, AppointmentStatus};
pub use organization::Organization;
pub use user::{DoctorProfile, OrgUser, PatientProfile, UserRole};
