use async_trait::async_trait;
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use rand::RngCore;
use rand::rngs::OsRng;
use tokio_postgres::NoTls;
use tokio_postgres::config::Host;
use tokio_postgres::error::SqlState;
use uuid::Uuid;
use zeroize::Zeroize;

use argon2::{
    Argon2, ParamsBuilder,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};

use crate::error::{AppError, Result};
use crate::session::UserRef;

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 6;

/// Account Directory collaborator.
///
/// Owns credential storage and verification; the session core only ever
/// receives the opaque `UserRef { id }` back, never a password or hash.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Creates an account, returning its reference. A taken username is a
    /// `Validation` error.
    async fn create(&self, username: &str, password: &str) -> Result<UserRef>;

    /// Verifies credentials. Unknown username and wrong password are both
    /// `None`, indistinguishable to the caller.
    async fn verify(&self, username: &str, password: &str) -> Result<Option<UserRef>>;
}

/// Postgres-backed directory.
///
/// Expects a table:
/// `users (id UUID PRIMARY KEY, username TEXT UNIQUE NOT NULL, password TEXT NOT NULL)`.
pub struct PgDirectory {
    db: Pool,
}

impl PgDirectory {
    pub fn new(db: Pool) -> Self {
        Self { db }
    }

    /// Builds a lazy connection pool for the directory.
    ///
    /// # Arguments
    ///
    /// * `database_url` - The URL of the PostgreSQL database.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `PgDirectory`.
    pub fn connect(database_url: &str) -> Result<Self> {
        let pg_config: tokio_postgres::Config = database_url.parse()?;

        let mut cfg = PoolConfig::new();
        if let Some(Host::Tcp(hostname)) = pg_config.get_hosts().first() {
            cfg.host = Some(hostname.clone());
        }
        if let Some(port) = pg_config.get_ports().first() {
            cfg.port = Some(*port);
        }
        if let Some(dbname) = pg_config.get_dbname() {
            cfg.dbname = Some(dbname.to_string());
        }
        if let Some(user) = pg_config.get_user() {
            cfg.user = Some(user.to_string());
        }
        if let Some(password) = pg_config.get_password() {
            cfg.password = Some(String::from_utf8_lossy(password).to_string());
        }
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let db = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(AppError::from)?;
        Ok(Self::new(db))
    }
}

#[async_trait]
impl AccountDirectory for PgDirectory {
    async fn create(&self, username: &str, password: &str) -> Result<UserRef> {
        tracing::debug!("🔐 Creating account: {}", username);
        let hashed = hash_password(password)?;
        let id = Uuid::new_v4();

        let client = self.db.get().await?;
        let stmt = client
            .prepare_cached("INSERT INTO users (id, username, password) VALUES ($1, $2, $3)")
            .await?;
        client
            .execute(&stmt, &[&id, &username, &hashed])
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    AppError::Validation("Username is already taken".to_string())
                } else {
                    AppError::from(e)
                }
            })?;

        tracing::info!("✅ Account created with ID: {}", id);
        Ok(UserRef { id: id.to_string() })
    }

    async fn verify(&self, username: &str, password: &str) -> Result<Option<UserRef>> {
        tracing::debug!("🔐 Verifying credentials for: {}", username);

        let client = self.db.get().await?;
        let stmt = client
            .prepare_cached("SELECT id, password FROM users WHERE username = $1")
            .await?;
        let Some(row) = client.query_opt(&stmt, &[&username]).await? else {
            return Ok(None);
        };

        let id: Uuid = row.get(0);
        let stored: String = row.get(1);
        if !verify_password(password, &stored)? {
            return Ok(None);
        }

        tracing::info!("✅ Credentials verified for account: {}", id);
        Ok(Some(UserRef { id: id.to_string() }))
    }
}

/// Hashes a password using Argon2id.
fn hash_password(password: &str) -> Result<String> {
    let mut password_bytes = password.as_bytes().to_vec();

    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Encryption(format!("Salt encoding error: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Encryption(format!("Argon2 params: {}", e)))?,
    );

    let password_hash = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AppError::Encryption(format!("Argon2 hash error: {}", e)))?
        .to_string();

    password_bytes.zeroize();
    Ok(password_hash)
}

/// Verifies a password against a stored hash.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let mut password_bytes = password.as_bytes().to_vec();
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Encryption(format!("Hash parse error: {}", e)))?;
    let result = Argon2::default()
        .verify_password(&password_bytes, &parsed_hash)
        .is_ok();

    password_bytes.zeroize();
    Ok(result)
}
