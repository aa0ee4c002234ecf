//! # Listings
//!
//! Post ids in descending rank, by creation time or by score, for everything or for one community.
//!
//! ## Global
//! Straight ZREVRANGE on `post:time` or `post:score`. Always current.
//!
//! ## Community
//! - Cache key `post:<order>:<community>` holds the community's posts with their global scores
//! - Read the cache key first, a non-empty page is served as is
//! - An empty read is a miss: ZINTERSTORE MAX of `community:<community>` and the global key, EXPIRE, and
//!   the ZREVRANGE itself go in one MULTI/EXEC, so the key cannot expire between building and reading it
//! - Community members weigh 1 in the intersection so MAX always keeps the global score
//! - Votes never invalidate the cache, listings trail the global rankings by at most the TTL
//! - A page past the end also reads empty and pays for a rebuild, the answer stays empty
//! - Two requests missing together both rebuild, the second write is identical
use std::sync::Arc;

use tracing::debug;

use crate::{
    error::EngineError,
    keys::Keys,
    models::{CommunityId, Order, Page, PostId},
    store::{Batch, ScoreStore},
};

pub struct RankingQuery {
    store: Arc<dyn ScoreStore>,
    keys: Keys,
    cache_ttl_secs: u64,
}

impl RankingQuery {
    pub fn new(store: Arc<dyn ScoreStore>, keys: Keys, cache_ttl_secs: u64) -> Self {
        Self {
            store,
            keys,
            cache_ttl_secs,
        }
    }

    pub async fn list(
        &self,
        community_id: Option<CommunityId>,
        order: Order,
        page: Page,
    ) -> Result<Vec<PostId>, EngineError> {
        let (start, stop) = page.bounds()?;

        let Some(community_id) = community_id else {
            let key = self.keys.global(order);
            debug!("Listing {key} ranks {start}..={stop}");

            return Ok(self.store.rev_range(&key, start, stop).await?);
        };

        let key = self.keys.community_order(order, community_id);
        debug!("Listing {key} ranks {start}..={stop}");

        let cached = self.store.rev_range(&key, start, stop).await?;
        if !cached.is_empty() {
            return Ok(cached);
        }

        debug!("Cache miss on {key}, rebuilding");

        let mut batch = Batch::new();
        batch
            .inter_store_max(
                &key,
                vec![self.keys.community(community_id), self.keys.global(order)],
            )
            .expire(&key, self.cache_ttl_secs);

        Ok(self.store.execute_then_range(batch, &key, start, stop).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::{
        memory::MemoryStore,
        models::Direction,
        posts::PostIndex,
        store::StoreError,
        votes::{VoteEngine, VoteLocks},
    };

    /// Lets the clock run on before every range read lands.
    struct LaggingReads {
        inner: MemoryStore,
        lag: Duration,
    }

    #[async_trait]
    impl ScoreStore for LaggingReads {
        async fn score(&self, key: &str, member: i64) -> Result<Option<f64>, StoreError> {
            self.inner.score(key, member).await
        }

        async fn exists(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.exists(key).await
        }

        async fn is_member(&self, key: &str, member: i64) -> Result<bool, StoreError> {
            self.inner.is_member(key, member).await
        }

        async fn rev_range(
            &self,
            key: &str,
            start: isize,
            stop: isize,
        ) -> Result<Vec<i64>, StoreError> {
            tokio::time::advance(self.lag).await;
            self.inner.rev_range(key, start, stop).await
        }

        async fn count_in_range(
            &self,
            keys: &[String],
            min: f64,
            max: f64,
        ) -> Result<Vec<u64>, StoreError> {
            self.inner.count_in_range(keys, min, max).await
        }

        async fn execute(&self, batch: Batch) -> Result<(), StoreError> {
            self.inner.execute(batch).await
        }

        async fn execute_then_range(
            &self,
            batch: Batch,
            key: &str,
            start: isize,
            stop: isize,
        ) -> Result<Vec<i64>, StoreError> {
            self.inner.execute_then_range(batch, key, start, stop).await
        }

        async fn commit(&self, batch: Batch) -> Result<(), StoreError> {
            self.inner.commit(batch).await
        }
    }

    const TTL: u64 = 60;

    struct Fixture {
        posts: PostIndex,
        votes: VoteEngine,
        ranking: RankingQuery,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let keys = Keys::default();

        Fixture {
            posts: PostIndex::new(store.clone(), keys.clone()),
            votes: VoteEngine::new(store.clone(), keys.clone(), i64::MAX / 2, 432.0, VoteLocks::new(4)),
            ranking: RankingQuery::new(store, keys, TTL),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn page(n: u64, size: u64) -> Page {
        Page::new(n, size).unwrap()
    }

    #[tokio::test]
    async fn test_global_orderings() {
        let f = fixture();
        f.posts.create(1, 1, at(1000), 50).await.unwrap();
        f.posts.create(2, 2, at(2000), 50).await.unwrap();
        f.posts.create(3, 1, at(3000), 50).await.unwrap();

        assert_eq!(f.ranking.list(None, Order::Time, page(1, 10)).await.unwrap(), vec![3, 2, 1]);

        for user in 10..13 {
            f.votes.vote_at(user, 1, Direction::Up, at(3000)).await.unwrap();
        }

        // 1000 + 3 * 432 = 2296
        assert_eq!(f.ranking.list(None, Order::Score, page(1, 10)).await.unwrap(), vec![3, 1, 2]);
        assert_eq!(f.ranking.list(None, Order::Time, page(1, 10)).await.unwrap(), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_community_scope() {
        let f = fixture();
        f.posts.create(1, 1, at(1000), 50).await.unwrap();
        f.posts.create(2, 2, at(2000), 50).await.unwrap();
        f.posts.create(3, 1, at(3000), 50).await.unwrap();

        assert_eq!(f.ranking.list(Some(1), Order::Time, page(1, 10)).await.unwrap(), vec![3, 1]);
        assert_eq!(f.ranking.list(Some(2), Order::Score, page(1, 10)).await.unwrap(), vec![2]);
        assert!(f.ranking.list(Some(9), Order::Time, page(1, 10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pages_are_disjoint_and_contiguous() {
        let f = fixture();
        for id in 1..=25 {
            f.posts.create(id, 1, at(1000 + id), 50).await.unwrap();
        }

        for community in [None, Some(1)] {
            let first = f.ranking.list(community, Order::Time, page(1, 10)).await.unwrap();
            let second = f.ranking.list(community, Order::Time, page(2, 10)).await.unwrap();
            let third = f.ranking.list(community, Order::Time, page(3, 10)).await.unwrap();

            assert_eq!(first, (16..=25).rev().collect::<Vec<_>>());
            assert_eq!(second, (6..=15).rev().collect::<Vec<_>>());
            assert_eq!(third, (1..=5).rev().collect::<Vec<_>>());
            assert!(f.ranking.list(community, Order::Time, page(4, 10)).await.unwrap().is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_community_cache_trails_by_ttl() {
        let f = fixture();
        f.posts.create(1, 1, at(1000), 50).await.unwrap();
        f.posts.create(2, 1, at(2000), 50).await.unwrap();

        assert_eq!(f.ranking.list(Some(1), Order::Score, page(1, 10)).await.unwrap(), vec![2, 1]);

        for user in 10..13 {
            f.votes.vote_at(user, 1, Direction::Up, at(2000)).await.unwrap();
        }

        assert_eq!(f.ranking.list(None, Order::Score, page(1, 10)).await.unwrap(), vec![1, 2]);
        assert_eq!(f.ranking.list(Some(1), Order::Score, page(1, 10)).await.unwrap(), vec![2, 1]);

        tokio::time::advance(Duration::from_secs(TTL + 1)).await;

        assert_eq!(f.ranking.list(Some(1), Order::Score, page(1, 10)).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_post_leaves_cache_until_expiry() {
        let f = fixture();
        f.posts.create(1, 1, at(1000), 50).await.unwrap();
        f.posts.create(2, 1, at(2000), 50).await.unwrap();
        assert_eq!(f.ranking.list(Some(1), Order::Time, page(1, 10)).await.unwrap(), vec![2, 1]);

        f.posts.delete(2, 1).await.unwrap();

        assert_eq!(f.ranking.list(None, Order::Time, page(1, 10)).await.unwrap(), vec![1]);
        assert_eq!(f.ranking.list(Some(1), Order::Time, page(1, 10)).await.unwrap(), vec![2, 1]);

        tokio::time::advance(Duration::from_secs(TTL + 1)).await;

        assert_eq!(f.ranking.list(Some(1), Order::Time, page(1, 10)).await.unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expiring_mid_request_still_lists() {
        let store = Arc::new(LaggingReads {
            inner: MemoryStore::new(),
            lag: Duration::from_millis(5),
        });
        let keys = Keys::default();
        let posts = PostIndex::new(store.clone(), keys.clone());
        let ranking = RankingQuery::new(store, keys, TTL);

        posts.create(1, 1, at(1000), 50).await.unwrap();
        posts.create(2, 1, at(2000), 50).await.unwrap();

        // Builds the cache, the clock now sits at the build instant.
        assert_eq!(ranking.list(Some(1), Order::Score, page(1, 10)).await.unwrap(), vec![2, 1]);

        // The key is alive when the request starts and gone when its read lands.
        tokio::time::advance(Duration::from_secs(TTL) - Duration::from_millis(3)).await;

        assert_eq!(ranking.list(Some(1), Order::Score, page(1, 10)).await.unwrap(), vec![2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_past_the_end_of_live_cache_is_empty() {
        let f = fixture();
        f.posts.create(1, 1, at(1000), 50).await.unwrap();

        assert_eq!(f.ranking.list(Some(1), Order::Time, page(1, 10)).await.unwrap(), vec![1]);
        assert!(f.ranking.list(Some(1), Order::Time, page(2, 10)).await.unwrap().is_empty());
        assert_eq!(f.ranking.list(Some(1), Order::Time, page(1, 10)).await.unwrap(), vec![1]);
    }
}
