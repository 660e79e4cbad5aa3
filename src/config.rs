use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;

/// CORS configuration mode
#[derive(Debug, Clone)]
pub enum CorsMode {
    /// Only allow localhost origins (default, for local development)
    LocalhostOnly,
    /// Allow all origins (for public deployment behind token auth)
    AllowAll,
    /// Allow specific origins (comma-separated list)
    AllowList(Vec<String>),
}

pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Shared secret for HMAC-signed bearer tokens
    pub token_secret: String,
    /// Base64-encoded 32-byte AES-256 master key for API key encryption
    pub master_key: String,
    pub cors_mode: CorsMode,
    pub disable_auth: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let host = env::var("MODELGATE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("MODELGATE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(4310);

        let data_dir = env::var("MODELGATE_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("modelgate")
        });

        let disable_auth = env::var("MODELGATE_DISABLE_AUTH")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let token_secret = if disable_auth {
            env::var("MODELGATE_TOKEN_SECRET").unwrap_or_default()
        } else {
            env::var("MODELGATE_TOKEN_SECRET").expect("MODELGATE_TOKEN_SECRET must be set")
        };

        let master_key =
            env::var("MODELGATE_MASTER_KEY").expect("MODELGATE_MASTER_KEY must be set");

        // CORS configuration: "localhost" (default), "*" (allow all), or comma-separated origins
        let cors_mode = match env::var("MODELGATE_CORS_ORIGINS").as_deref() {
            Ok("*") => CorsMode::AllowAll,
            Ok(origins) if !origins.is_empty() => {
                CorsMode::AllowList(origins.split(',').map(|s| s.trim().to_string()).collect())
            }
            _ => CorsMode::LocalhostOnly,
        };

        Self {
            host,
            port,
            data_dir,
            token_secret,
            master_key,
            cors_mode,
            disable_auth,
        }
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }
}
