use crate::app::account_use_case::AccountUseCase;
use crate::app::catalog_use_case::CatalogUseCase;
use crate::app::certificate_use_case::CertificateUseCase;
use crate::app::content_use_case::ContentUseCase;
use crate::app::enrollment_use_case::EnrollmentUseCase;
use crate::app::learning_use_case::LearningUseCase;
use crate::app::payment_use_case::PaymentUseCase;
use crate::app::ports::PaymentGatewayPort;
use crate::app::review_use_case::ReviewUseCase;
use crate::config::PaymentConfig;
use crate::constants::SERVICE_NAME;
use crate::error::LmsError;
use crate::storage::Storage;
use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use hyper::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub mod auth;
pub mod courses;
pub mod learning;
pub mod payments;

/// Use cases shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountUseCase>,
    pub catalog: Arc<CatalogUseCase>,
    pub content: Arc<ContentUseCase>,
    pub enrollments: Arc<EnrollmentUseCase>,
    pub learning: Arc<LearningUseCase>,
    pub certificates: Arc<CertificateUseCase>,
    pub reviews: Arc<ReviewUseCase>,
    pub payments: Arc<PaymentUseCase>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        gateway: Arc<dyn PaymentGatewayPort>,
        payment: PaymentConfig,
    ) -> Self {
        Self {
            accounts: Arc::new(AccountUseCase::new(storage.clone())),
            catalog: Arc::new(CatalogUseCase::new(storage.clone())),
            content: Arc::new(ContentUseCase::new(storage.clone())),
            enrollments: Arc::new(EnrollmentUseCase::new(storage.clone())),
            learning: Arc::new(LearningUseCase::new(storage.clone())),
            certificates: Arc::new(CertificateUseCase::new(storage.clone())),
            reviews: Arc::new(ReviewUseCase::new(storage.clone())),
            payments: Arc::new(PaymentUseCase::new(storage, gateway, payment)),
        }
    }
}

impl IntoResponse for LmsError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if self.is_client_facing() {
            self.to_string()
        } else {
            error!("Request failed: {}", self);
            "internal server error".to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Create the HTTP router with all API routes
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        // Accounts
        .route("/api/users", post(learning::register))
        .route("/api/me", get(learning::me))
        // Catalog and authoring
        .route("/api/courses", get(courses::list_courses).post(courses::create_course))
        .route(
            "/api/courses/:id",
            get(courses::get_course)
                .put(courses::update_course)
                .delete(courses::delete_course),
        )
        .route("/api/instructor/courses", get(courses::instructor_courses))
        .route("/api/courses/:id/materials", post(courses::create_material))
        .route(
            "/api/materials/:id",
            put(courses::update_material).delete(courses::delete_material),
        )
        .route("/api/materials/:id/details", post(courses::create_detail))
        .route("/api/materials/:id/quizzes", post(courses::create_quiz))
        .route("/api/details/:id", delete(courses::delete_detail))
        // Learning
        .route("/api/courses/:id/enroll", post(learning::enroll))
        .route("/api/enrollments", get(learning::enrollments))
        .route("/api/courses/:id/progress", get(learning::progress))
        .route("/api/details/:id/complete", post(learning::complete_detail))
        .route("/api/courses/:id/submissions", get(learning::submissions))
        .route("/api/quizzes/:id/submit", post(learning::submit_quiz))
        .route("/api/courses/:id/certificate", post(learning::claim_certificate))
        .route("/api/certificates/:number", get(learning::verify_certificate))
        .route(
            "/api/courses/:id/reviews",
            get(learning::list_reviews).post(learning::create_review),
        )
        .route("/api/reviews/:id", delete(learning::delete_review))
        // Payments
        .route("/api/courses/:id/checkout", post(payments::checkout))
        .route("/api/payments", get(payments::list_payments))
        .route("/api/payments/webhook", post(payments::webhook))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

/// Start the HTTP server on the given address
pub async fn start_server(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_server(state);
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    info!("HTTP server running on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
