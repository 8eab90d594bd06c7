use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::models::{Actor, Role};
use crate::utils::error::AppError;

/// Set by the upstream authentication layer; never trusted from the open
/// internet.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, AppError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| AppError::AuthError(format!("Header {} is not valid text", name)))
        })
        .transpose()
}

pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, AppError> {
    let id = header(headers, ACTOR_ID_HEADER)?
        .ok_or_else(|| AppError::AuthError("Authentication required".to_string()))?;
    let id = Uuid::parse_str(id.trim())
        .map_err(|_| AppError::AuthError(format!("Header {} is not a valid id", ACTOR_ID_HEADER)))?;

    let role = match header(headers, ACTOR_ROLE_HEADER)? {
        Some(raw) => raw.parse::<Role>().map_err(AppError::AuthError)?,
        None => Role::User,
    };

    Ok(Actor::new(id, role))
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)
    }
}
