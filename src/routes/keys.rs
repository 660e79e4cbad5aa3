use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    ErrorResponse, SuccessResponse, validate_key_material, validate_key_name, validate_model,
    validate_overrides,
};
use crate::AppState;
use crate::constants::default_model;
use crate::error::ApiError;
use crate::identity::AuthUser;
use crate::limits::{self, EffectiveLimits};
use crate::providers::ProviderKind;
use crate::store::{ApiKeyRecord, KeyPatch, KeyUsageStats, RateLimitOverrides, StoreError};

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddKeyRequest {
    pub name: String,
    /// Plaintext provider API key; encrypted before it is stored
    pub key: String,
    pub provider: ProviderKind,
    pub model: Option<String>,
}

/// Registration echo: identity fields only, never the key material
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedKeyView {
    pub id: String,
    pub name: String,
    pub provider: ProviderKind,
    pub model: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct AddKeyResponse {
    pub message: String,
    pub key: CreatedKeyView,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyView {
    pub id: String,
    pub name: String,
    pub provider: ProviderKind,
    pub model: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub usage_stats: KeyUsageStats,
    pub rate_limits: EffectiveLimits,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListKeysResponse {
    pub api_keys: Vec<KeyView>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateKeyRequest {
    pub name: Option<String>,
    pub model: Option<String>,
    pub is_active: Option<bool>,
    pub rate_limit_overrides: Option<RateLimitOverrides>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedKeyView {
    pub id: String,
    pub name: String,
    pub provider: ProviderKind,
    pub model: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub usage_stats: KeyUsageStats,
}

#[derive(Serialize, ToSchema)]
pub struct UpdateKeyResponse {
    pub message: String,
    pub key: UpdatedKeyView,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateName => ApiError::DuplicateKey,
            StoreError::KeyNotFound => ApiError::KeyNotFound,
            StoreError::Io(_) => ApiError::Internal,
        }
    }
}

/// Register a new provider API key
#[utoipa::path(
    post,
    path = "/auth/api-keys",
    tag = "keys",
    request_body = AddKeyRequest,
    responses(
        (status = 200, body = AddKeyResponse),
        (status = 400, body = ErrorResponse),
        (status = 500, body = ErrorResponse),
    )
)]
pub async fn add_key(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<AddKeyRequest>,
) -> Result<Json<AddKeyResponse>, ApiError> {
    let name = body.name.trim().to_string();
    validate_key_name(&name)?;
    validate_key_material(&body.key)?;

    let model = match body.model {
        Some(model) => {
            validate_model(&model)?;
            model
        }
        None => default_model(body.provider).to_string(),
    };

    let encrypted_key = state
        .codec
        .encrypt(&body.key)
        .map_err(|_| ApiError::Encryption)?;

    let record = ApiKeyRecord {
        id: Uuid::new_v4().to_string(),
        name,
        provider: body.provider,
        model,
        encrypted_key,
        is_active: true,
        created_at: Utc::now(),
        last_used: None,
        usage_stats: KeyUsageStats::default(),
        rate_limit_overrides: RateLimitOverrides::default(),
    };

    let view = CreatedKeyView {
        id: record.id.clone(),
        name: record.name.clone(),
        provider: record.provider,
        model: record.model.clone(),
        is_active: record.is_active,
        created_at: record.created_at,
    };

    state.store.add_key(&user_id, record).await?;

    Ok(Json(AddKeyResponse {
        message: "API key added successfully".to_string(),
        key: view,
    }))
}

/// List the caller's keys with resolved limits
#[utoipa::path(
    get,
    path = "/auth/api-keys",
    tag = "keys",
    responses(
        (status = 200, body = ListKeysResponse),
    )
)]
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Json<ListKeysResponse> {
    let api_keys = match state.store.get(&user_id).await {
        Some(user) => user
            .api_keys
            .iter()
            .map(|key| KeyView {
                id: key.id.clone(),
                name: key.name.clone(),
                provider: key.provider,
                model: key.model.clone(),
                is_active: key.is_active,
                created_at: key.created_at,
                last_used: key.last_used,
                usage_stats: key.usage_stats,
                rate_limits: limits::resolve(key.provider, &key.model, &key.rate_limit_overrides),
            })
            .collect(),
        None => Vec::new(),
    };

    Json(ListKeysResponse { api_keys })
}

/// Update a key's name, model, active flag, or limit overrides
#[utoipa::path(
    put,
    path = "/auth/api-keys/{key_id}",
    tag = "keys",
    params(("key_id" = String, Path, description = "Key identifier")),
    request_body = UpdateKeyRequest,
    responses(
        (status = 200, body = UpdateKeyResponse),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
    )
)]
pub async fn update_key(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(key_id): Path<String>,
    Json(body): Json<UpdateKeyRequest>,
) -> Result<Json<UpdateKeyResponse>, ApiError> {
    let name = match body.name {
        Some(name) => {
            let name = name.trim().to_string();
            validate_key_name(&name)?;
            Some(name)
        }
        None => None,
    };
    if let Some(model) = &body.model {
        validate_model(model)?;
    }
    if let Some(overrides) = &body.rate_limit_overrides {
        validate_overrides(overrides)?;
    }

    let patch = KeyPatch {
        name,
        model: body.model,
        is_active: body.is_active,
        rate_limit_overrides: body.rate_limit_overrides,
    };

    let key = state.store.update_key(&user_id, &key_id, patch).await?;
    Ok(Json(UpdateKeyResponse {
        message: "API key updated successfully".to_string(),
        key: UpdatedKeyView {
            id: key.id,
            name: key.name,
            provider: key.provider,
            model: key.model,
            is_active: key.is_active,
            created_at: key.created_at,
            last_used: key.last_used,
            usage_stats: key.usage_stats,
        },
    }))
}

/// Delete a key
#[utoipa::path(
    delete,
    path = "/auth/api-keys/{key_id}",
    tag = "keys",
    params(("key_id" = String, Path, description = "Key identifier")),
    responses(
        (status = 200, body = SuccessResponse),
        (status = 404, body = ErrorResponse),
    )
)]
pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(key_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if !state.store.delete_key(&user_id, &key_id).await? {
        return Err(ApiError::KeyNotFound);
    }
    Ok(Json(SuccessResponse {
        message: "API key deleted successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::test_support::{TestApp, test_app};

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn add_body(name: &str) -> Value {
        json!({
            "name": name,
            "key": "sk-test-0123456789abcdef0123",
            "provider": "openai",
            "model": "gpt-4o",
        })
    }

    #[tokio::test]
    async fn add_list_update_delete_roundtrip() {
        let app = test_app().await;

        let (status, body) =
            send(&app, json_request("POST", "/auth/api-keys", add_body("work"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "API key added successfully");
        assert_eq!(body["key"]["name"], "work");
        assert!(body["key"].get("encryptedKey").is_none());
        let key_id = body["key"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Request::builder()
                .uri("/auth/api-keys")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["apiKeys"].as_array().unwrap().len(), 1);
        assert_eq!(body["apiKeys"][0]["rateLimits"]["requestsPerMinute"], 20);

        let (status, body) = send(
            &app,
            json_request(
                "PUT",
                &format!("/auth/api-keys/{key_id}"),
                json!({ "isActive": false, "model": "gpt-4o-mini" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "API key updated successfully");
        assert_eq!(body["key"]["isActive"], false);
        assert_eq!(body["key"]["model"], "gpt-4o-mini");

        let (status, body) = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri(&format!("/auth/api-keys/{key_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "API key deleted successfully");

        let (status, body) = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri(&format!("/auth/api-keys/{key_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not Found");
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let app = test_app().await;
        send(&app, json_request("POST", "/auth/api-keys", add_body("same"))).await;
        let (status, body) =
            send(&app, json_request("POST", "/auth/api-keys", add_body("same"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Duplicate Key");
    }

    #[tokio::test]
    async fn short_key_material_rejected() {
        let app = test_app().await;
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/auth/api-keys",
                json!({ "name": "short", "key": "sk-tiny", "provider": "openai" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Validation Error");
    }

    #[tokio::test]
    async fn omitted_model_gets_provider_default() {
        let app = test_app().await;
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/auth/api-keys",
                json!({
                    "name": "gem",
                    "key": "AIza-test-0123456789abcdef",
                    "provider": "gemini",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["key"]["model"], "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn zero_override_rejected_at_the_edge() {
        let app = test_app().await;
        let (_, body) =
            send(&app, json_request("POST", "/auth/api-keys", add_body("work"))).await;
        let key_id = body["key"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            json_request(
                "PUT",
                &format!("/auth/api-keys/{key_id}"),
                json!({ "rateLimitOverrides": { "requestsPerMinute": 0 } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Validation Error");
    }

    #[tokio::test]
    async fn unlimited_override_persists() {
        let app = test_app().await;
        let (_, body) =
            send(&app, json_request("POST", "/auth/api-keys", add_body("work"))).await;
        let key_id = body["key"]["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            json_request(
                "PUT",
                &format!("/auth/api-keys/{key_id}"),
                json!({ "rateLimitOverrides": { "requestsPerDay": "unlimited" } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(
            &app,
            Request::builder()
                .uri("/auth/api-keys")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert!(body["apiKeys"][0]["rateLimits"]["requestsPerDay"].is_null());
    }
}
