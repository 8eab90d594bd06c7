use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::Actor;
use crate::services::{Engine, ListTransactionsQuery, PurchaseRequest, TicketTiming};
use crate::utils::error::AppError;
use crate::utils::response::{created, paginated, success};

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MyTicketsQuery {
    #[serde(rename = "type")]
    pub timing: Option<TicketTiming>,
}

pub async fn purchase(
    State(engine): State<Engine>,
    actor: Actor,
    payload: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let receipt = engine.purchase(&actor, request).await?;
    Ok(created(receipt, "Tickets purchased successfully"))
}

pub async fn list_transactions(
    State(engine): State<Engine>,
    actor: Actor,
    query: Result<Query<ListTransactionsQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let (rows, pagination) = engine.list_transactions(&actor, query).await?;
    Ok(paginated(rows, pagination, "Transactions retrieved successfully"))
}

pub async fn get_transaction(
    State(engine): State<Engine>,
    actor: Actor,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = path.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let txn = engine.get_transaction(&actor, id).await?;
    Ok(success(txn, "Transaction retrieved successfully"))
}

pub async fn refund(
    State(engine): State<Engine>,
    actor: Actor,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<RefundRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Path(id) = path.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let Json(request) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let receipt = engine.refund(&actor, id, &request.reason).await?;
    Ok(success(receipt, "Refund processed successfully"))
}

pub async fn my_tickets(
    State(engine): State<Engine>,
    actor: Actor,
    query: Result<Query<MyTicketsQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let tickets = engine.my_tickets(&actor, query.timing).await?;
    Ok(success(tickets, "Tickets retrieved successfully"))
}
