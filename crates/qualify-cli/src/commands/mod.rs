//! Command implementations.

use std::path::Path;

use anyhow::{Context as _, Result};
use qualify_core::{QualifyConfig, Store};
use tracing::debug;

pub mod mutate;
pub mod registry;
pub mod report;

/// Store and configuration shared by all commands.
pub struct Context {
    pub store: Store,
    pub config: QualifyConfig,
}

impl Context {
    /// Loads the configuration and opens the store.
    pub fn open(config_path: Option<&Path>, db: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => QualifyConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => QualifyConfig::default(),
        };
        if let Some(db) = db {
            config.store.path = db.to_path_buf();
        }

        let store = Store::open(&config.store.path)
            .with_context(|| format!("failed to open store {}", config.store.path.display()))?
            .with_default_cut_limit(config.ranking.default_cut_limit);
        debug!(db = %config.store.path.display(), "store opened");

        Ok(Self { store, config })
    }
}
