use anyhow::{Context, Result};
use std::env;
use zeroize::{Zeroize, Zeroizing};

/// Which backend serves session storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvBackend {
    /// Direct Redis protocol client.
    Redis,
    /// Redis behind a Webdis HTTP proxy.
    Webdis,
    /// In-process map; tests and local development only.
    Memory,
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The KV backend selected at startup.
    pub kv_backend: KvBackend,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The base URL of the Webdis proxy.
    pub redis_http_url: String,
    /// The URL of the PostgreSQL database backing the account directory.
    pub database_url: String,
    /// TTL of an authenticated session, in days.
    pub session_ttl_days: i64,
    /// TTL of an anonymous session, in days.
    pub anon_session_ttl_days: i64,
    /// Deployment environment name; "production" turns on secure cookies.
    pub app_env: String,
    /// The secret used to sign session identifiers.
    pub session_secret: Zeroizing<Vec<u8>>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let mut secret_hex = env::var("SESSION_SECRET")
            .context("SESSION_SECRET must be set (generate with: openssl rand -hex 32)")?;

        let secret_bytes =
            hex::decode(&secret_hex).context("SESSION_SECRET must be valid hexadecimal")?;

        secret_hex.zeroize();

        if secret_bytes.len() != 32 {
            anyhow::bail!("SESSION_SECRET must be exactly 32 bytes (64 hex characters)");
        }

        let kv_backend = match env::var("KV_BACKEND")
            .unwrap_or_else(|_| "redis".to_string())
            .as_str()
        {
            "redis" => KvBackend::Redis,
            "webdis" => KvBackend::Webdis,
            "memory" => KvBackend::Memory,
            other => anyhow::bail!("Unknown KV_BACKEND '{other}' (expected redis, webdis, or memory)"),
        };

        Ok(Self {
            kv_backend,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            redis_http_url: env::var("REDIS_HTTP_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:7379".to_string()),
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            session_ttl_days: env::var("SESSION_TTL_DAYS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("Invalid SESSION_TTL_DAYS")?,
            anon_session_ttl_days: env::var("ANON_SESSION_TTL_DAYS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .context("Invalid ANON_SESSION_TTL_DAYS")?,
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            session_secret: Zeroizing::new(secret_bytes),
        })
    }

    /// Whether session cookies should carry the `Secure` attribute.
    pub fn cookie_secure(&self) -> bool {
        self.app_env == "production"
    }

    pub fn logged_in_ttl_secs(&self) -> u64 {
        (self.session_ttl_days * 86_400) as u64
    }

    pub fn logged_out_ttl_secs(&self) -> u64 {
        (self.anon_session_ttl_days * 86_400) as u64
    }
}
