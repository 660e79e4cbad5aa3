use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::ErrorResponse;
use crate::AppState;
use crate::error::ApiError;
use crate::identity::AuthUser;
use crate::store::UserUsageStats;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedUser {
    pub uid: String,
    pub created_at: DateTime<Utc>,
    pub usage_stats: UserUsageStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new_user: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct VerifyResponse {
    pub user: VerifiedUser,
}

/// Confirm the bearer token and bootstrap the user document on first call
#[utoipa::path(
    get,
    path = "/auth/verify",
    tag = "auth",
    responses(
        (status = 200, body = VerifyResponse),
        (status = 401, body = ErrorResponse),
    )
)]
pub async fn verify(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<VerifyResponse>, ApiError> {
    let (record, created) = state
        .store
        .ensure_user(&user_id)
        .await
        .map_err(|_| ApiError::Internal)?;

    Ok(Json(VerifyResponse {
        user: VerifiedUser {
            uid: user_id,
            created_at: record.created_at,
            usage_stats: record.usage_stats,
            is_new_user: created.then_some(true),
        },
    }))
}
