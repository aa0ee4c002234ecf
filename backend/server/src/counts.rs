use std::sync::Arc;

use tracing::debug;

use crate::{
    error::EngineError,
    keys::Keys,
    models::{PostId, require_id},
    store::ScoreStore,
};

/// Displayed vote counts: upvoters only, not the weighted ranking score.
pub struct VoteTally {
    store: Arc<dyn ScoreStore>,
    keys: Keys,
}

impl VoteTally {
    pub fn new(store: Arc<dyn ScoreStore>, keys: Keys) -> Self {
        Self { store, keys }
    }

    /// One count per id, same order, pipelined into a single round trip.
    pub async fn up_votes(&self, post_ids: &[PostId]) -> Result<Vec<u64>, EngineError> {
        for &post_id in post_ids {
            require_id("post", post_id)?;
        }

        debug!("Counting votes for {} posts", post_ids.len());

        let keys: Vec<String> = post_ids.iter().map(|&id| self.keys.post_voted(id)).collect();

        Ok(self.store.count_in_range(&keys, 1.0, 1.0).await?)
    }
}
