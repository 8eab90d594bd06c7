use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::Actor;
use crate::services::Engine;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct CapacityRequest {
    pub quantity: i32,
}

pub async fn availability(
    State(engine): State<Engine>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(tier_id) = path.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let availability = engine.availability(tier_id).await?;
    Ok(success(availability, "Ticket availability retrieved successfully"))
}

pub async fn adjust_capacity(
    State(engine): State<Engine>,
    actor: Actor,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CapacityRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Path(tier_id) = path.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let Json(request) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let availability = engine.adjust_capacity(&actor, tier_id, request.quantity).await?;
    Ok(success(availability, "Ticket capacity updated successfully"))
}
