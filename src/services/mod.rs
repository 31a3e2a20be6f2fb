pub mod appointment_service;
pub mod mailer;
pub mod org_service;
pub mod secret_store;
pub mod user_service;

pub use appointment_service::{AppointmentError, AppointmentService};
pub use org_service::{OrgError, OrgService};
pub use secret_store::{secret_store, DbCredentials, SecretStore};
pub use user_service::{UserError, UserService};
