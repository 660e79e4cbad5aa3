use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ErrorResponse, validate_message, validate_temperature};
use crate::AppState;
use crate::chat::ChatCommand;
use crate::error::ApiError;
use crate::identity::AuthUser;
use crate::limits::{self, EffectiveLimits};
use crate::providers::ProviderKind;
use crate::store::{KeyUsageStats, UserUsageStats};

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub key_id: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub provider: ProviderKind,
    pub model: String,
    pub key_name: String,
    pub tokens_used: u64,
}

/// Per-key usage entry with fully resolved limits (no-cap renders as null)
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyUsageView {
    pub id: String,
    pub name: String,
    pub provider: ProviderKind,
    pub model: String,
    pub is_active: bool,
    pub usage_stats: KeyUsageStats,
    pub last_used: Option<DateTime<Utc>>,
    pub rate_limits: EffectiveLimits,
}

#[derive(Serialize, ToSchema)]
pub struct UsageResponse {
    pub usage: UserUsageStats,
    pub keys: Vec<KeyUsageView>,
}

/// Send a chat message through the best (or requested) API key
#[utoipa::path(
    post,
    path = "/chat",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, body = ChatResponse),
        (status = 400, body = ErrorResponse),
        (status = 429, body = ErrorResponse),
        (status = 500, body = ErrorResponse),
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    validate_message(&body.message)?;
    if let Some(temperature) = body.temperature {
        validate_temperature(temperature)?;
    }

    let command = ChatCommand {
        message: body.message,
        key_id: body.key_id,
        system_prompt: body.system_prompt,
        temperature: body.temperature,
    };

    let reply = state.dispatcher.dispatch(&user_id, &command).await?;
    Ok(Json(ChatResponse {
        response: reply.response,
        provider: reply.provider,
        model: reply.model,
        key_name: reply.key_name,
        tokens_used: reply.tokens_used,
    }))
}

/// Aggregate usage plus per-key stats and resolved limits
#[utoipa::path(
    get,
    path = "/chat/usage",
    tag = "chat",
    responses(
        (status = 200, body = UsageResponse),
    )
)]
pub async fn usage(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Json<UsageResponse> {
    let Some(user) = state.store.get(&user_id).await else {
        return Json(UsageResponse {
            usage: UserUsageStats::default(),
            keys: Vec::new(),
        });
    };

    let keys = user
        .api_keys
        .iter()
        .map(|key| KeyUsageView {
            id: key.id.clone(),
            name: key.name.clone(),
            provider: key.provider,
            model: key.model.clone(),
            is_active: key.is_active,
            usage_stats: key.usage_stats,
            last_used: key.last_used,
            rate_limits: limits::resolve(key.provider, &key.model, &key.rate_limit_overrides),
        })
        .collect();

    Json(UsageResponse {
        usage: user.usage_stats,
        keys,
    })
}
