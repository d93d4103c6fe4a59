//! HTTP surface of the engine.

pub mod error;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{jwt_middleware, JwtKeys};
use crate::engine::GarageEngine;

/// Application state shared with every route handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GarageEngine>,
    pub keys: Arc<JwtKeys>,
}

/// Creates the main application router.
///
/// `/health` is public; everything under `/api` requires a bearer token
/// whose claims name the tenant.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/board", get(handlers::board))
        .route("/jobs/:job_id/move", post(handlers::move_job))
        .route("/jobs/:job_id/estimate", get(handlers::get_estimate))
        .route(
            "/jobs/:job_id/estimate/items",
            post(handlers::add_estimate_item),
        )
        .route(
            "/jobs/:job_id/estimate/items/:item_id",
            put(handlers::update_estimate_item).delete(handlers::remove_estimate_item),
        )
        .route("/jobs/:job_id/invoice", post(handlers::generate_invoice))
        .route("/invoices/:invoice_id", get(handlers::get_invoice))
        .route(
            "/invoices/:invoice_id/payments",
            post(handlers::apply_payment),
        )
        .route_layer(middleware::from_fn_with_state(
            state.keys.clone(),
            jwt_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
