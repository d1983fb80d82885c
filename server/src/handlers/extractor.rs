use axum::async_trait;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::models::Admin;
use crate::state::AppState;
use crate::utils::error::AppError;

/// JSON body whose rejections use the API error envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::ValidationError(e.body_text()))?;
        Ok(Self(value))
    }
}

/// JSON body that may be left out. An empty body is `None`; anything else must be
/// `application/json` and parse, or the request is rejected.
pub struct OptionalJson<T>(pub Option<T>);

#[async_trait]
impl<S, T> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::ValidationError(e.body_text()))?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(None));
        }
        if !is_json {
            return Err(AppError::ValidationError(
                "Expected request with `Content-Type: application/json`".to_string(),
            ));
        }

        let value = serde_json::from_slice(&body).map_err(|e| {
            AppError::ValidationError(format!("Failed to parse the request body as JSON: {}", e))
        })?;
        Ok(Self(Some(value)))
    }
}

/// Query string whose rejections use the API error envelope.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::ValidationError(e.body_text()))?;
        Ok(Self(value))
    }
}

/// Path parameters whose rejections use the API error envelope.
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::ValidationError(e.body_text()))?;
        Ok(Self(value))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// An admin resolved from the `Authorization: Bearer` header.
pub struct AuthenticatedAdmin {
    pub admin: Admin,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::AuthError("Missing bearer token".to_string()))?;
        let admin = state.admin_auth.authenticate(token).await?;

        Ok(Self {
            admin,
            token: token.to_string(),
        })
    }
}

/// Like [`AuthenticatedAdmin`] but absent when no token is sent. A token that is
/// sent must still be valid.
pub struct MaybeAdmin(pub Option<Admin>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(Self(None));
        }
        let AuthenticatedAdmin { admin, .. } =
            AuthenticatedAdmin::from_request_parts(parts, state).await?;
        Ok(Self(Some(admin)))
    }
}
