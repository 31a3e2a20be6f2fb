// Two route tiers: central registry operations (scope: central admins) and
// per-organization operations (scope: the resolved tenant database).
pub mod central;
pub mod org;

mod validate;

pub(crate) use validate::{validate_email, validate_password};
