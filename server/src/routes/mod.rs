use axum::{
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::{apply_security_headers, create_cors_layer, HttpConfig};
use crate::handlers::{health_check, tiers, transactions};
use crate::services::Engine;

pub fn create_routes(engine: Engine, http: &HttpConfig) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/transactions", get(transactions::list_transactions))
        .route("/transactions/purchase", post(transactions::purchase))
        .route("/transactions/:id", get(transactions::get_transaction))
        .route("/transactions/:id/refund", post(transactions::refund))
        .route("/my-tickets", get(transactions::my_tickets))
        .route("/tiers/:id/availability", get(tiers::availability))
        .route("/tiers/:id/capacity", put(tiers::adjust_capacity))
        .with_state(engine);

    apply_security_headers(api, http.include_hsts).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(create_cors_layer(&http.cors_allowed_origins)),
    )
}
