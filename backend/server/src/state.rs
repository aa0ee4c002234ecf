use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::{
    config::Config, database::RedisStore, engine::Engine, memory::MemoryStore, store::ScoreStore,
};

pub struct State {
    pub config: Config,
    pub engine: Engine,
}

impl State {
    pub async fn new() -> Result<Arc<Self>> {
        let config = Config::load()?;

        let store: Arc<dyn ScoreStore> = if config.uses_memory_store() {
            warn!("Using the in-memory store, nothing survives a restart");
            Arc::new(MemoryStore::new())
        } else {
            info!("Connecting to {}", config.store_url);
            Arc::new(RedisStore::connect(&config.store_url, config.store_timeout()).await?)
        };

        let engine = Engine::new(store, config.engine_settings());

        Ok(Self::with_engine(config, engine))
    }

    pub fn with_engine(config: Config, engine: Engine) -> Arc<Self> {
        Arc::new(Self { config, engine })
    }
}
