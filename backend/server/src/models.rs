use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub type PostId = i64;
pub type UserId = i64;
pub type CommunityId = i64;

/// Ids are positive, zero is what an unset field decodes to.
pub fn require_id(what: &str, id: i64) -> Result<(), EngineError> {
    if id <= 0 {
        return Err(EngineError::Validation(format!("missing {what} id")));
    }

    Ok(())
}

/// A user's standing vote on a post.
///
/// `NoVote` is stored as absence from the post's voter set, never as a zero score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Down,
    NoVote,
    Up,
}

impl Direction {
    pub fn as_i8(self) -> i8 {
        match self {
            Direction::Down => -1,
            Direction::NoVote => 0,
            Direction::Up => 1,
        }
    }

    /// Reads a voter-record score. Anything other than absent, 1 or -1 means the record was corrupted.
    pub fn from_recorded(score: Option<f64>) -> Result<Self, EngineError> {
        match score {
            None => Ok(Direction::NoVote),
            Some(s) if s == 1.0 => Ok(Direction::Up),
            Some(s) if s == -1.0 => Ok(Direction::Down),
            Some(s) => Err(EngineError::Inconsistent(format!(
                "voter record holds direction {s}"
            ))),
        }
    }
}

impl TryFrom<i8> for Direction {
    type Error = EngineError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Direction::Down),
            0 => Ok(Direction::NoVote),
            1 => Ok(Direction::Up),
            other => Err(EngineError::Validation(format!(
                "direction must be -1, 0 or 1, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Time,
    Score,
}

/// 1-indexed page of a descending ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    page: u64,
    size: u64,
}

impl Page {
    pub fn new(page: u64, size: u64) -> Result<Self, EngineError> {
        if page == 0 {
            return Err(EngineError::Validation("page starts at 1".to_string()));
        }
        if size == 0 {
            return Err(EngineError::Validation("page size must be positive".to_string()));
        }

        Ok(Self { page, size })
    }

    /// Inclusive rank bounds.
    pub fn bounds(&self) -> Result<(isize, isize), EngineError> {
        let overflow = || EngineError::Validation("page out of range".to_string());

        let start = (self.page - 1).checked_mul(self.size).ok_or_else(overflow)?;
        let stop = self.page.checked_mul(self.size).ok_or_else(overflow)? - 1;

        Ok((
            isize::try_from(start).map_err(|_| overflow())?,
            isize::try_from(stop).map_err(|_| overflow())?,
        ))
    }
}

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_SIZE: u64 = 10;

fn default_page() -> u64 {
    DEFAULT_PAGE
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatePostPayload {
    pub post_id: PostId,
    pub community_id: CommunityId,
    /// Unix seconds, defaults to now.
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VotePayload {
    pub post_id: PostId,
    pub direction: i8,
}

#[derive(Debug, Deserialize)]
pub struct DeletePostQuery {
    pub community_id: CommunityId,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub community_id: Option<CommunityId>,
    #[serde(default)]
    pub order: Order,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
pub struct VoteCountQuery {
    /// Comma separated post ids.
    pub ids: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankedPost {
    pub id: PostId,
    pub votes: u64,
}
