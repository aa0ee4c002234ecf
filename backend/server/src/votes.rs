//! # Vote transitions
//!
//! A vote moves one user's standing on one post between `Down`, `NoVote` and `Up`.
//!
//! ## Flow
//!
//! 1. Lock the `(user, post)` shard
//! 2. Reject if the post is older than the vote window
//! 3. Read the previous direction from `post:voted:<post>`, absent means `NoVote`
//! 4. Reject if nothing changes
//! 5. One MULTI/EXEC: ZINCRBY `post:score` by `(new - old) * weight`, then ZADD or ZREM the voter
//!
//! Up straight to Down is one transition worth twice the weight.
//!
//! ## Concurrency
//!
//! - Different users on one post only share the ZINCRBY, which commutes
//! - The same user on the same post serializes on the shard lock, so the read in step 3 is never stale
//! - Step 5 runs on its own task holding the lock and waits for the store's reply with no deadline.
//!   Once submitted it finishes even if the caller goes away.
//!
//! ## Retries
//!
//! The caller stops waiting after the commit timeout and gets `OutcomeUnknown`, which is not
//! retryable: the increment may or may not have landed. The lock is still held until the reply
//! comes in, so a rerun by the same user blocks until then and reads the settled record. A store
//! error that came back before anything was applied stays `Unavailable` and is safe to rerun.
use std::{
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    time::timeout,
};
use tracing::{debug, warn};

use crate::{
    engine::VOTE_COMMIT_TIMEOUT,
    error::EngineError,
    keys::Keys,
    models::{Direction, PostId, UserId, require_id},
    store::{Batch, ScoreStore},
};

pub struct VoteLocks {
    shards: Vec<Arc<Mutex<()>>>,
}

impl VoteLocks {
    pub fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Arc::new(Mutex::new(()))).collect(),
        }
    }

    fn shard(&self, user_id: UserId, post_id: PostId) -> usize {
        let mut hasher = DefaultHasher::new();
        (user_id, post_id).hash(&mut hasher);

        (hasher.finish() % self.shards.len() as u64) as usize
    }

    pub async fn acquire(&self, user_id: UserId, post_id: PostId) -> OwnedMutexGuard<()> {
        let shard = self.shard(user_id, post_id);

        self.shards[shard].clone().lock_owned().await
    }
}

pub struct VoteEngine {
    store: Arc<dyn ScoreStore>,
    keys: Keys,
    window_secs: i64,
    weight: f64,
    locks: VoteLocks,
    commit_timeout: Duration,
}

impl VoteEngine {
    pub fn new(
        store: Arc<dyn ScoreStore>,
        keys: Keys,
        window_secs: i64,
        weight: f64,
        locks: VoteLocks,
    ) -> Self {
        Self {
            store,
            keys,
            window_secs,
            weight,
            locks,
            commit_timeout: VOTE_COMMIT_TIMEOUT,
        }
    }

    pub fn with_commit_timeout(mut self, commit_timeout: Duration) -> Self {
        self.commit_timeout = commit_timeout;
        self
    }

    pub async fn vote(
        &self,
        user_id: UserId,
        post_id: PostId,
        direction: Direction,
    ) -> Result<(), EngineError> {
        self.vote_at(user_id, post_id, direction, Utc::now()).await
    }

    pub async fn vote_at(
        &self,
        user_id: UserId,
        post_id: PostId,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        require_id("user", user_id)?;
        require_id("post", post_id)?;

        debug!("Vote by {user_id} on {post_id}: {}", direction.as_i8());

        let guard = self.locks.acquire(user_id, post_id).await;

        let posted_at = self
            .store
            .score(&self.keys.post_time(), post_id)
            .await?
            .ok_or_else(|| EngineError::Inconsistent(format!("post {post_id} has no creation time")))?;

        if now.timestamp() as f64 - posted_at > self.window_secs as f64 {
            return Err(EngineError::VoteWindowExpired);
        }

        let voted_key = self.keys.post_voted(post_id);
        let previous = Direction::from_recorded(self.store.score(&voted_key, user_id).await?)?;

        if previous == direction {
            return Err(EngineError::VoteUnchanged);
        }

        let delta = f64::from(direction.as_i8() - previous.as_i8());

        let mut batch = Batch::new();
        batch.zincr(self.keys.post_score(), post_id, delta * self.weight);
        match direction {
            Direction::NoVote => batch.zrem(voted_key, user_id),
            recorded => batch.zadd(voted_key, user_id, f64::from(recorded.as_i8())),
        };

        let store = self.store.clone();
        let submit = tokio::spawn(async move {
            let _guard = guard;
            store.commit(batch).await
        });

        match timeout(self.commit_timeout, submit).await {
            Ok(Ok(committed)) => Ok(committed?),
            Ok(Err(e)) => Err(EngineError::OutcomeUnknown(format!(
                "vote by {user_id} on {post_id}: {e}"
            ))),
            Err(_) => {
                warn!("Vote by {user_id} on {post_id} still waiting on the store");
                Err(EngineError::OutcomeUnknown(format!(
                    "vote by {user_id} on {post_id} not acknowledged within {:?}",
                    self.commit_timeout
                )))
            }
        }
    }
}
