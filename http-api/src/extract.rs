use airyra_core::{error::DomainError, AGENT_HEADER};
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Agent identity taken from the `X-Airyra-Agent` header.
///
/// The value is self-asserted and treated as an opaque token; mutating
/// routes extract this and fail with `VALIDATION_FAILED` when the header is
/// missing or blank.
#[derive(Debug, Clone)]
pub struct Agent(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Agent
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AGENT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Agent(value.to_string()))
            .ok_or_else(|| {
                DomainError::invalid(format!("missing {AGENT_HEADER} header")).into()
            })
    }
}

/// JSON body extractor whose rejection is the wire `VALIDATION_FAILED`
/// error instead of axum's plain-text 4xx.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(DomainError::invalid(format!(
                "invalid request body: {}",
                rejection.body_text()
            ))
            .into()),
        }
    }
}

/// Query-string extractor with the same `VALIDATION_FAILED` rejection.
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(DomainError::invalid(format!(
                "invalid query parameters: {rejection}"
            ))
            .into()),
        }
    }
}
