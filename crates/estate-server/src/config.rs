use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use estate_api::ApiConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Server settings, read from `ESTATE_*` environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub api: ApiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or blank values take the default.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("ESTATE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("ESTATE_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let port = match var("ESTATE_PORT") {
            Some(p) => p.parse().with_context(|| format!("invalid ESTATE_PORT '{}'", p))?,
            None => 3000,
        };
        let token_ttl_days = match var("ESTATE_TOKEN_TTL_DAYS") {
            Some(d) => d
                .parse()
                .with_context(|| format!("invalid ESTATE_TOKEN_TTL_DAYS '{}'", d))?,
            None => 30,
        };

        Ok(Self {
            host: var("ESTATE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("ESTATE_DB_PATH").unwrap_or_else(|| "estate.db".into()).into(),
            api: ApiConfig {
                jwt_secret,
                token_ttl_days,
                upload_dir: var("ESTATE_UPLOAD_DIR")
                    .unwrap_or_else(|| "./uploads".into())
                    .into(),
                public_file_url: var("ESTATE_PUBLIC_FILE_URL").unwrap_or_else(|| "/files".into()),
                admin_email: var("ESTATE_ADMIN_EMAIL").map(|e| e.to_lowercase()),
            },
        })
    }
}
