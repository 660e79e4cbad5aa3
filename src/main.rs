mod chat;
mod config;
mod constants;
mod crypto;
mod error;
mod identity;
mod limits;
mod providers;
mod routes;
mod store;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::ServiceExt;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::get,
};
use clap::Parser;
use reqwest::Client;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::normalize_path::NormalizePath;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa_axum::{router::OpenApiRouter, routes};

use chat::ChatDispatcher;
use config::{Config, CorsMode};
use crypto::SecretCodec;
use identity::TokenSigner;
use limits::RateWindowTracker;
use providers::AdapterRegistry;
use store::UserStore;

/// TTL for tokens minted with --dev-token
const DEV_TOKEN_TTL_SECS: u64 = 86400;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIME: &str = env!("BUILD_TIME");

pub struct AppState {
    pub store: Arc<UserStore>,
    pub codec: Arc<SecretCodec>,
    pub dispatcher: ChatDispatcher,
    pub tokens: TokenSigner,
    /// When true, every request runs as the "dev" user (local development)
    pub disable_auth: bool,
}

#[derive(Parser)]
#[command(name = "modelgate")]
#[command(about = "Multi-provider AI key manager with per-model rate limiting")]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, env = "MODELGATE_HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "MODELGATE_PORT")]
    port: Option<u16>,

    /// Print a 24h bearer token for the given user id and exit
    #[arg(long, value_name = "USER")]
    dev_token: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    if let Some(user_id) = args.dev_token {
        let signer = TokenSigner::new(&config.token_secret);
        println!("{}", signer.issue(&user_id, DEV_TOKEN_TTL_SECS));
        return;
    }

    // Resolve the store path before CLI overrides move fields out of config
    let users_path = config.users_path();

    let host = args.host.unwrap_or(config.host);
    let port = args.port.unwrap_or(config.port);

    let codec = Arc::new(
        SecretCodec::from_base64_key(&config.master_key)
            .expect("MODELGATE_MASTER_KEY must be 32 bytes of base64"),
    );

    let store = Arc::new(UserStore::new(users_path).await);

    // Shared HTTP client with connection pooling
    let http_client = Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(10)
        .build()
        .expect("Failed to create HTTP client");

    let dispatcher = ChatDispatcher::new(
        store.clone(),
        Arc::new(RateWindowTracker::new()),
        Arc::new(AdapterRegistry::new(http_client)),
        codec.clone(),
    );

    if config.disable_auth {
        tracing::warn!("Authentication is DISABLED (MODELGATE_DISABLE_AUTH=1)");
    }

    let state = Arc::new(AppState {
        store,
        codec,
        dispatcher,
        tokens: TokenSigner::new(&config.token_secret),
        disable_auth: config.disable_auth,
    });

    // CORS configuration based on environment
    let cors_origins = config.cors_mode.clone();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let Ok(origin_str) = origin.to_str() else {
                return false;
            };

            match &cors_origins {
                CorsMode::AllowAll => true,
                CorsMode::LocalhostOnly => {
                    let Ok(url) = url::Url::parse(origin_str) else {
                        return false;
                    };
                    matches!(
                        url.host_str(),
                        Some("localhost") | Some("127.0.0.1") | Some("::1")
                    )
                }
                CorsMode::AllowList(allowed) => allowed.iter().any(|a| a == origin_str),
            }
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    match &config.cors_mode {
        CorsMode::AllowAll => info!("CORS: Allowing all origins"),
        CorsMode::LocalhostOnly => info!("CORS: Localhost only"),
        CorsMode::AllowList(list) => info!("CORS: Allowing origins: {:?}", list),
    }

    // Authenticated API with OpenAPI spec generation
    let (api_router, openapi) = OpenApiRouter::with_openapi(Default::default())
        .routes(routes!(routes::chat::chat))
        .routes(routes!(routes::chat::usage))
        .routes(routes!(routes::keys::add_key, routes::keys::list_keys))
        .routes(routes!(routes::keys::update_key, routes::keys::delete_key))
        .routes(routes!(routes::auth::verify))
        .split_for_parts();

    let protected_routes = api_router.layer(middleware::from_fn_with_state(
        state.clone(),
        identity::auth_middleware,
    ));

    let swagger_routes = Router::new().merge(
        utoipa_swagger_ui::SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi),
    );

    let app = NormalizePath::trim_trailing_slash(
        Router::new()
            .route("/health", get(routes::health::health))
            .route("/version", get(routes::health::version))
            .merge(swagger_routes)
            .merge(protected_routes)
            .layer(cors)
            .with_state(state),
    );

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid address");
    info!(
        "Starting modelgate v{}-{} (built {})",
        VERSION, GIT_HASH, BUILD_TIME
    );
    info!("Listening on http://{}", addr);
    info!("API docs: http://{}/docs", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        ServiceExt::<axum::extract::Request>::into_make_service(app),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    })
    .await
    .unwrap();
}
