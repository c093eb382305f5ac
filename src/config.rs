use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    /// Talk to the docker-compose bank sandboxes instead of the hosted ones.
    pub use_local_banks: bool,
    /// Directory-default sandbox credentials, used when a connection has no
    /// client id/secret of its own.
    pub bank_client_id: String,
    pub bank_client_secret: String,
    /// Base64-encoded 32-byte key for encrypting bank tokens at rest.
    pub token_key: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "multibank".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "multibank-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };
        Ok(Self {
            database_url,
            jwt,
            use_local_banks: std::env::var("USE_LOCAL_BANKS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            bank_client_id: std::env::var("BANK_CLIENT_ID").unwrap_or_else(|_| "team227".into()),
            bank_client_secret: std::env::var("BANK_CLIENT_SECRET").unwrap_or_default(),
            token_key: std::env::var("TOKEN_KEY")?,
        })
    }
}
