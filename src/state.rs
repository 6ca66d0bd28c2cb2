use std::sync::Arc;

use crate::botcheck::{BotClassifier, UaBotClassifier};
use crate::config::Config;
use crate::directory::{AccountDirectory, PgDirectory};
use crate::error::Result;
use crate::kv;
use crate::session::{SessionManager, TtlPolicy};
use crate::signer::Signer;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The session manager over the configured KV backend.
    pub sessions: SessionManager,
    /// The account directory collaborator.
    pub directory: Arc<dyn AccountDirectory>,
    /// The bot classifier collaborator.
    pub bots: Arc<dyn BotClassifier>,
    /// The application's configuration.
    pub config: Config,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// Connections are lazy on both sides: the KV backend connects on
    /// first use and the directory pool hands out connections on demand,
    /// so construction itself never touches the network.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub fn new(config: &Config) -> Result<Self> {
        let kv = kv::from_config(config);
        tracing::info!("✅ KV store selected: {:?}", config.kv_backend);

        let signer = Signer::new(&config.session_secret)?;
        let sessions = SessionManager::new(
            kv,
            signer,
            TtlPolicy {
                logged_out_secs: config.logged_out_ttl_secs(),
                logged_in_secs: config.logged_in_ttl_secs(),
            },
        );
        tracing::info!("✅ Session manager initialized");

        let directory = Arc::new(PgDirectory::connect(&config.database_url)?);
        tracing::info!("✅ Account directory pool initialized");

        Ok(AppState {
            sessions,
            directory,
            bots: Arc::new(UaBotClassifier),
            config: config.clone(),
        })
    }
}
