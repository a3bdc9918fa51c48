//! Checkout and gateway callback handlers.

use super::auth::AuthUser;
use super::AppState;
use crate::app::payment_use_case::{CheckoutResponse, WebhookOutcome};
use crate::constants::CALLBACK_TOKEN_HEADER;
use crate::domain::Payment;
use crate::error::Result;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;

pub async fn checkout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<(StatusCode, Json<CheckoutResponse>)> {
    let response = state.payments.checkout(&user, course_id).await?;
    let status = if response.reused {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(response)))
}

pub async fn list_payments(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Payment>>> {
    Ok(Json(state.payments.list_payments(&user).await?))
}

/// Gateway invoice callback. Only a bad token is refused; anything else is
/// acknowledged so the gateway stops retrying.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>> {
    let token = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    state.payments.verify_callback_token(token)?;
    Ok(Json(state.payments.handle_webhook(&body).await))
}
