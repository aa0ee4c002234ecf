//! Key layout inside the score store. Every key sits under one prefix.
use crate::models::{CommunityId, Order, PostId};

pub const DEFAULT_PREFIX: &str = "bluebell:";

const POST_TIME: &str = "post:time";
const POST_SCORE: &str = "post:score";
const POST_VOTED: &str = "post:voted:";
const COMMUNITY: &str = "community:";

#[derive(Debug, Clone)]
pub struct Keys {
    prefix: String,
}

impl Default for Keys {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl Keys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// GlobalByTime
    pub fn post_time(&self) -> String {
        format!("{}{POST_TIME}", self.prefix)
    }

    /// GlobalByScore
    pub fn post_score(&self) -> String {
        format!("{}{POST_SCORE}", self.prefix)
    }

    pub fn global(&self, order: Order) -> String {
        match order {
            Order::Time => self.post_time(),
            Order::Score => self.post_score(),
        }
    }

    /// VoterRecord
    pub fn post_voted(&self, post_id: PostId) -> String {
        format!("{}{POST_VOTED}{post_id}", self.prefix)
    }

    /// CommunityMembership
    pub fn community(&self, community_id: CommunityId) -> String {
        format!("{}{COMMUNITY}{community_id}", self.prefix)
    }

    /// CommunityOrderCache, the global key with the community appended.
    pub fn community_order(&self, order: Order, community_id: CommunityId) -> String {
        format!("{}:{community_id}", self.global(order))
    }
}
