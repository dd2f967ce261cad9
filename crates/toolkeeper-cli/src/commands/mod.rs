pub mod api;
pub mod auth;
pub mod config;
pub mod inbox;
pub mod push;
pub mod reminders;

use std::sync::Arc;

use toolkeeper_core::api::{ApiClient, TcpProbe};
use toolkeeper_core::error::Result;
use toolkeeper_core::{Config, KeyValueStore, KeyringStore, SqliteStore, TokenManager};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Everything a networked command needs, wired from the config file.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn KeyValueStore>,
    pub client: ApiClient,
}

impl AppContext {
    pub async fn load() -> Result<Self> {
        let config = Config::load()?;
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open()?);
        let token_store: Arc<dyn KeyValueStore> = if config.session.use_keyring {
            Arc::new(KeyringStore::new())
        } else {
            Arc::clone(&store)
        };

        let session = TokenManager::new(token_store);
        session.init().await;

        let mut builder = ApiClient::builder_from_config(&config)
            .store(Arc::clone(&store))
            .session(session);
        if let Some(probe) = TcpProbe::for_base_url(&config.api.base_url) {
            builder = builder.connectivity(Arc::new(probe));
        }
        let client = builder.build()?;
        tracing::debug!(base_url = %client.base_url(), keyring = config.session.use_keyring, "client ready");

        Ok(Self {
            config,
            store,
            client,
        })
    }
}

/// Pretty-print a JSON value to stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
