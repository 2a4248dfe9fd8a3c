//! HTTP API (spec §4.10, §6, C10): the REST surface under `/api/v0`. Routing,
//! CORS and tracing mirror the teacher's `http_server.rs` layering; the
//! handlers themselves are specific to this catalog.

mod handlers;

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
        .allow_origin(tower_http::cors::Any);

    let api = Router::new()
        .route("/projects", get(handlers::list_projects).post(handlers::add_project))
        .route(
            "/projects/:project",
            get(handlers::get_project)
                .put(handlers::update_project)
                .delete(handlers::delete_project),
        )
        .route("/projects/:project/connections", get(handlers::list_connections))
        .route("/projects/:project/connections/:connection", get(handlers::get_connection))
        .route("/projects/:project/connections/:connection/test", get(handlers::test_connection))
        .route("/projects/:project/connections/:connection/sqlSource", get(handlers::sql_source))
        .route("/projects/:project/connections/:connection/tableSource", get(handlers::table_source))
        .route("/projects/:project/connections/:connection/queryData", get(handlers::query_data))
        .route(
            "/projects/:project/connections/:connection/temporaryTable",
            get(handlers::temporary_table),
        )
        .route(
            "/projects/:project/packages",
            get(handlers::list_packages).post(handlers::add_package),
        )
        .route(
            "/projects/:project/packages/:package",
            get(handlers::get_package)
                .put(handlers::update_package)
                .delete(handlers::delete_package),
        )
        .route("/projects/:project/packages/:package/models", get(handlers::list_models))
        .route(
            "/projects/:project/packages/:package/models/*model_path",
            get(handlers::get_model),
        )
        .route(
            "/projects/:project/packages/:package/queryResults/*model_path",
            get(handlers::query_results),
        )
        .route("/projects/:project/packages/:package/databases", get(handlers::list_databases))
        .route("/projects/:project/packages/:package/schedules", get(handlers::list_schedules))
        .route("/watchMode/start", post(handlers::watch_start))
        .route("/watchMode/stop", post(handlers::watch_stop))
        .route("/watchMode/status", get(handlers::watch_status))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v0", api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}
