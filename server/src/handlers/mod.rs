use axum::response::Response;
use serde::Serialize;

use crate::utils::response::success;

pub mod actor;
pub mod tiers;
pub mod transactions;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "agora-ticketing",
    };

    success(payload, "Health check successful")
}
