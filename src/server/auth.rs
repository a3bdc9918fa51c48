use super::AppState;
use crate::domain::User;
use crate::error::LmsError;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request},
    Json,
};
use serde::de::DeserializeOwned;

/// The caller, resolved from an `Authorization: Bearer <token>` header.
pub struct AuthUser(pub User);

/// Like [`AuthUser`], but anonymous callers are let through.
pub struct OptionalUser(pub Option<User>);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = LmsError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| LmsError::Unauthorized("missing bearer token".to_string()))?;
        let user = state.accounts.authenticate(token).await?;
        Ok(AuthUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = LmsError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if parts.headers.get(AUTHORIZATION).is_none() {
            return Ok(OptionalUser(None));
        }
        // A token that is present but wrong is still an error
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        Ok(OptionalUser(Some(user)))
    }
}

/// JSON body whose rejections come back as 400 with the error envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for ApiJson<T>
where
    Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
    T: DeserializeOwned,
{
    type Rejection = LmsError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(LmsError::validation(rejection.body_text())),
        }
    }
}
