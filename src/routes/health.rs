use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{BUILD_TIME, GIT_HASH, VERSION};

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize, ToSchema)]
pub struct VersionResponse {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_time: &'static str,
}

/// Liveness probe; always answers when the process is up
#[utoipa::path(
    get,
    path = "/health",
    tag = "ops",
    responses(
        (status = 200, body = HealthResponse),
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Build metadata stamped in at compile time
#[utoipa::path(
    get,
    path = "/version",
    tag = "ops",
    responses(
        (status = 200, body = VersionResponse),
    )
)]
pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: VERSION,
        git_hash: GIT_HASH,
        build_time: BUILD_TIME,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_ok() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn version_reports_build_metadata() {
        let Json(body) = version().await;
        assert_eq!(body.version, VERSION);
        assert_eq!(body.git_hash, GIT_HASH);
        assert_eq!(body.build_time, BUILD_TIME);
    }
}
