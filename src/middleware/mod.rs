pub mod auth;
pub mod rate_limit;
pub mod require_role;
pub mod resolve_org;
pub mod response;

pub use auth::{jwt_auth_middleware, AuthUser};
pub use rate_limit::rate_limit_middleware;
pub use require_role::{load_org_user_middleware, require_central_admin_middleware, CurrentUser};
pub use resolve_org::{resolve_org_middleware, OrgContext, OrgPool};
pub use response::{ApiResponse, ApiResult};
