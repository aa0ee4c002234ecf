use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    counts::VoteTally,
    error::EngineError,
    keys::{DEFAULT_PREFIX, Keys},
    models::{CommunityId, Direction, Order, Page, PostId, UserId},
    posts::PostIndex,
    ranking::RankingQuery,
    store::ScoreStore,
    votes::{VoteEngine, VoteLocks},
};

pub const VOTE_WINDOW_SECS: i64 = 7 * 24 * 3600;
pub const VOTE_WEIGHT: f64 = 432.0;
pub const CACHE_TTL_SECS: u64 = 60;
pub const VOTE_LOCK_SHARDS: usize = 64;
pub const VOTE_COMMIT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub key_prefix: String,
    pub vote_window_secs: i64,
    pub vote_weight: f64,
    pub cache_ttl_secs: u64,
    pub vote_lock_shards: usize,
    /// How long a vote request waits on its MULTI/EXEC before answering with an unknown outcome.
    pub vote_commit_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_PREFIX.to_string(),
            vote_window_secs: VOTE_WINDOW_SECS,
            vote_weight: VOTE_WEIGHT,
            cache_ttl_secs: CACHE_TTL_SECS,
            vote_lock_shards: VOTE_LOCK_SHARDS,
            vote_commit_timeout: VOTE_COMMIT_TIMEOUT,
        }
    }
}

/// Every component shares the one store handle passed in here.
pub struct Engine {
    pub posts: PostIndex,
    pub votes: VoteEngine,
    pub ranking: RankingQuery,
    pub tally: VoteTally,
}

impl Engine {
    pub fn new(store: Arc<dyn ScoreStore>, settings: EngineSettings) -> Self {
        let keys = Keys::new(settings.key_prefix);

        Self {
            posts: PostIndex::new(store.clone(), keys.clone()),
            votes: VoteEngine::new(
                store.clone(),
                keys.clone(),
                settings.vote_window_secs,
                settings.vote_weight,
                VoteLocks::new(settings.vote_lock_shards),
            )
            .with_commit_timeout(settings.vote_commit_timeout),
            ranking: RankingQuery::new(store.clone(), keys.clone(), settings.cache_ttl_secs),
            tally: VoteTally::new(store, keys),
        }
    }

    pub async fn create_post(
        &self,
        post_id: PostId,
        community_id: CommunityId,
        created_at: DateTime<Utc>,
        author_id: UserId,
    ) -> Result<(), EngineError> {
        self.posts
            .create(post_id, community_id, created_at, author_id)
            .await
    }

    pub async fn delete_post(
        &self,
        post_id: PostId,
        community_id: CommunityId,
    ) -> Result<(), EngineError> {
        self.posts.delete(post_id, community_id).await
    }

    pub async fn vote(
        &self,
        user_id: UserId,
        post_id: PostId,
        direction: Direction,
    ) -> Result<(), EngineError> {
        self.votes.vote(user_id, post_id, direction).await
    }

    pub async fn list(
        &self,
        community_id: Option<CommunityId>,
        order: Order,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<PostId>, EngineError> {
        self.ranking
            .list(community_id, order, Page::new(page, page_size)?)
            .await
    }

    pub async fn vote_counts(&self, post_ids: &[PostId]) -> Result<Vec<u64>, EngineError> {
        self.tally.up_votes(post_ids).await
    }
}
