use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    error::EngineError,
    keys::Keys,
    models::{CommunityId, PostId, UserId, require_id},
    store::{Batch, ScoreStore},
};

/// Seeds and removes the ranking entries of a post.
pub struct PostIndex {
    store: Arc<dyn ScoreStore>,
    keys: Keys,
}

impl PostIndex {
    pub fn new(store: Arc<dyn ScoreStore>, keys: Keys) -> Self {
        Self { store, keys }
    }

    /// The author's upvote, both global rankings and the community entry land in one MULTI/EXEC.
    /// The post is not live until this returns `Ok`.
    ///
    /// Rerunning a create is a no-op: every sorted-set write is ZADD NX, so votes cast in between
    /// keep their weight. Reusing the id for another community is rejected.
    pub async fn create(
        &self,
        post_id: PostId,
        community_id: CommunityId,
        created_at: DateTime<Utc>,
        author_id: UserId,
    ) -> Result<(), EngineError> {
        require_id("post", post_id)?;
        require_id("community", community_id)?;
        require_id("author", author_id)?;

        debug!("Creating post {post_id} in community {community_id} by {author_id}");

        self.check_community(post_id, community_id).await?;

        let created_at = created_at.timestamp() as f64;

        let mut batch = Batch::new();
        batch
            .zadd_nx(self.keys.post_voted(post_id), author_id, 1.0)
            .zadd_nx(self.keys.post_time(), post_id, created_at)
            .zadd_nx(self.keys.post_score(), post_id, created_at)
            .sadd(self.keys.community(community_id), post_id);

        self.store.execute(batch).await?;

        Ok(())
    }

    /// Cached community orderings are left alone, they age out on their TTL.
    /// A live post must be deleted from the community it was created in. An unknown post is a no-op.
    pub async fn delete(&self, post_id: PostId, community_id: CommunityId) -> Result<(), EngineError> {
        require_id("post", post_id)?;
        require_id("community", community_id)?;

        self.check_community(post_id, community_id).await?;

        debug!("Deleting post {post_id} from community {community_id}");

        let mut batch = Batch::new();
        batch
            .zrem(self.keys.post_time(), post_id)
            .zrem(self.keys.post_score(), post_id)
            .srem(self.keys.community(community_id), post_id)
            .del(self.keys.post_voted(post_id));

        self.store.execute(batch).await?;

        Ok(())
    }

    async fn check_community(&self, post_id: PostId, community_id: CommunityId) -> Result<(), EngineError> {
        let live = self.store.score(&self.keys.post_time(), post_id).await?.is_some();
        if live && !self.store.is_member(&self.keys.community(community_id), post_id).await? {
            return Err(EngineError::Validation(format!(
                "post {post_id} is not in community {community_id}"
            )));
        }

        Ok(())
    }
}
