use axum::http::HeaderValue;
use axum::middleware::from_fn;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use clinica_api::handlers::{central, org};
use clinica_api::middleware::{
    jwt_auth_middleware, load_org_user_middleware, rate_limit_middleware,
    require_central_admin_middleware, resolve_org_middleware,
};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    let config = clinica_api::config::config();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinica_api=debug,tower_http=info".into()),
        )
        .init();

    tracing::info!("Starting Clinica API in {:?} mode", config.environment);

    let app = app();

    // Allow tests or deployments to override port via env
    let port = std::env::var("CLINICA_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Clinica API listening on http://{}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server");
}

fn app() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/central", central_routes())
        .nest("/:org", org_routes())
        // Global middleware
        .layer(from_fn(rate_limit_middleware))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Registry tier: token acquisition plus organization management, the latter
/// restricted to central admins
fn central_routes() -> Router {
    let public = Router::new()
        .route("/auth/login", post(central::auth::login))
        .route("/auth/refresh", post(central::auth::refresh));

    let protected = Router::new()
        .route("/auth/session", delete(central::auth::logout))
        .route(
            "/organizations",
            get(central::organizations::list).post(central::organizations::create),
        )
        .route(
            "/organizations/:id",
            get(central::organizations::show).delete(central::organizations::destroy),
        )
        .layer(from_fn(require_central_admin_middleware))
        .layer(from_fn(jwt_auth_middleware));

    Router::new().merge(public).merge(protected)
}

/// Tenant tier, nested under the organization slug. Every request resolves
/// the slug against the registry first; protected routes additionally verify
/// the token and load the user's role profile from the tenant database.
fn org_routes() -> Router {
    let public = Router::new()
        .route("/auth/register", post(org::auth::register))
        .route("/auth/login", post(org::auth::login))
        .route("/auth/refresh", post(org::auth::refresh));

    let protected = Router::new()
        .route("/auth/whoami", get(org::auth::whoami))
        .route("/auth/session", delete(org::auth::logout))
        .route("/doctors", get(org::doctors::list).post(org::doctors::create))
        .route(
            "/doctors/:id",
            get(org::doctors::show)
                .put(org::doctors::update)
                .delete(org::doctors::destroy),
        )
        .route("/patients", get(org::patients::list))
        .route(
            "/patients/:id",
            get(org::patients::show)
                .put(org::patients::update)
                .delete(org::patients::destroy),
        )
        .route(
            "/appointments",
            get(org::appointments::list).post(org::appointments::create),
        )
        .route(
            "/appointments/:id",
            get(org::appointments::show).put(org::appointments::update),
        )
        .route("/appointments/:id/status", put(org::appointments::set_status))
        .layer(from_fn(load_org_user_middleware))
        .layer(from_fn(jwt_auth_middleware));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(from_fn(resolve_org_middleware))
}

fn cors_layer() -> CorsLayer {
    let origins: Vec<HeaderValue> = clinica_api::config::config()
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Clinica API",
            "version": version,
            "description": "Multi-tenant clinic management API",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "central_auth": "/central/auth/* (public - token acquisition)",
                "organizations": "/central/organizations (central admins)",
                "org_auth": "/:org/auth/* (register/login public, session protected)",
                "doctors": "/:org/doctors (protected)",
                "patients": "/:org/patients (protected)",
                "appointments": "/:org/appointments (protected)",
            }
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match clinica_api::database::DatabaseManager::health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
