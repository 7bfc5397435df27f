//! rdms-sv library - Research data governance supervisor
//!
//! HTTP service coordinating RDMP lifecycle, role-gated operations, the
//! ingest review pipeline, and derived remediation guidance over a shared
//! SQLite database.

use axum::{middleware, Router};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod services;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

/// Build application router
///
/// Everything under `/api` requires bearer-token authentication; the
/// health endpoint does not.
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    let protected = Router::new()
        // Projects
        .route("/api/projects", post(api::projects::create_project).get(api::projects::list_projects))
        .route("/api/projects/:id", get(api::projects::get_project).patch(api::projects::update_project))
        .route("/api/projects/:id/detect-sample-id", post(api::projects::detect_preview))
        .route("/api/projects/:id/remediation", get(api::remediation::project_remediation))
        // RDMP lifecycle
        .route("/api/projects/:id/rdmps", post(api::rdmp::create_draft).get(api::rdmp::list_versions))
        .route("/api/projects/:id/rdmps/active", get(api::rdmp::get_active))
        .route("/api/rdmps/:id", get(api::rdmp::get_rdmp).patch(api::rdmp::update_draft))
        .route("/api/rdmps/:id/activate", post(api::rdmp::activate))
        // Ingest pipeline
        .route("/api/projects/:id/pending-ingests", post(api::ingest::create_pending).get(api::ingest::list_pending))
        .route("/api/pending-ingests/:id", get(api::ingest::get_pending).delete(api::ingest::cancel))
        .route("/api/pending-ingests/:id/finalize", post(api::ingest::finalize))
        // Samples
        .route("/api/projects/:id/samples", get(api::samples::list_samples).post(api::samples::create_sample))
        .route("/api/samples/:id", get(api::samples::get_sample))
        .route("/api/samples/:id/fields/:key", put(api::samples::set_field_value))
        // Storage
        .route("/api/projects/:id/storage-roots", post(api::storage::create_root).get(api::storage::list_roots))
        .route("/api/projects/:id/raw-data-items", get(api::storage::list_items))
        .route("/api/raw-data-items/:id/sample", put(api::storage::assign_sample))
        // Labs
        .route("/api/labs/:id/my-role", get(api::labs::my_role))
        .route("/api/labs/:id/activity", get(api::labs::list_activity))
        .route("/api/labs/:id/status", get(api::remediation::lab_status))
        .route(
            "/api/labs/:id/checklist-dismissed",
            get(api::labs::get_checklist_dismissed).put(api::labs::set_checklist_dismissed),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    Router::new()
        .merge(protected)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
