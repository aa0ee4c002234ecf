//! # Ordered Score Store
//!
//! Everything the engine knows lives in a key-value store that speaks sorted sets.
//!
//! ## Contract
//!
//! - Sorted sets: member (post or user id) to **f64** score
//! - Plain sets: membership only, a plain-set member weighs 1 when intersected
//! - `execute` applies a whole [`Batch`] or none of it, no reader sees the middle
//! - `commit` is `execute` without a client deadline, for batches that must not be abandoned once sent
//! - `execute_then_range` reads a sorted set inside the same MULTI/EXEC as the batch
//! - `count_in_range` is pipelined, not transactional
//! - Keys may carry a TTL, an expired key reads as absent
//!
//! Two implementations:
//! - [`RedisStore`](crate::database::RedisStore) for deployments
//! - [`MemoryStore`](crate::memory::MemoryStore) for tests and local runs
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store call timed out")]
    Timeout,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Wrong value type at {0}")]
    WrongType(String),

    /// The batch was sent but no reply came back, it may or may not have been applied.
    #[error("Store did not acknowledge: {0}")]
    Unacknowledged(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    ZAdd { key: String, member: i64, score: f64 },
    /// ZADD NX, leaves an existing member's score alone.
    ZAddNx { key: String, member: i64, score: f64 },
    ZIncrBy { key: String, member: i64, delta: f64 },
    ZRem { key: String, member: i64 },
    SAdd { key: String, member: i64 },
    SRem { key: String, member: i64 },
    Del { key: String },
    /// ZINTERSTORE with AGGREGATE MAX, replaces `dest`.
    InterStoreMax { dest: String, keys: Vec<String> },
    Expire { key: String, ttl_secs: u64 },
}

/// Mutations submitted together as one MULTI/EXEC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    ops: Vec<Op>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zadd(&mut self, key: impl Into<String>, member: i64, score: f64) -> &mut Self {
        self.push(Op::ZAdd {
            key: key.into(),
            member,
            score,
        })
    }

    pub fn zadd_nx(&mut self, key: impl Into<String>, member: i64, score: f64) -> &mut Self {
        self.push(Op::ZAddNx {
            key: key.into(),
            member,
            score,
        })
    }

    pub fn zincr(&mut self, key: impl Into<String>, member: i64, delta: f64) -> &mut Self {
        self.push(Op::ZIncrBy {
            key: key.into(),
            member,
            delta,
        })
    }

    pub fn zrem(&mut self, key: impl Into<String>, member: i64) -> &mut Self {
        self.push(Op::ZRem {
            key: key.into(),
            member,
        })
    }

    pub fn sadd(&mut self, key: impl Into<String>, member: i64) -> &mut Self {
        self.push(Op::SAdd {
            key: key.into(),
            member,
        })
    }

    pub fn srem(&mut self, key: impl Into<String>, member: i64) -> &mut Self {
        self.push(Op::SRem {
            key: key.into(),
            member,
        })
    }

    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Op::Del { key: key.into() })
    }

    pub fn inter_store_max(&mut self, dest: impl Into<String>, keys: Vec<String>) -> &mut Self {
        self.push(Op::InterStoreMax {
            dest: dest.into(),
            keys,
        })
    }

    pub fn expire(&mut self, key: impl Into<String>, ttl_secs: u64) -> &mut Self {
        self.push(Op::Expire {
            key: key.into(),
            ttl_secs,
        })
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<Op> {
        self.ops
    }

    fn push(&mut self, op: Op) -> &mut Self {
        self.ops.push(op);
        self
    }
}

#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// ZSCORE. None when either the key or the member is missing.
    async fn score(&self, key: &str, member: i64) -> Result<Option<f64>, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// SISMEMBER on a plain set.
    async fn is_member(&self, key: &str, member: i64) -> Result<bool, StoreError>;

    /// ZREVRANGE, both bounds inclusive.
    async fn rev_range(&self, key: &str, start: isize, stop: isize)
    -> Result<Vec<i64>, StoreError>;

    /// One ZCOUNT per key, pipelined. Output order follows `keys`.
    async fn count_in_range(
        &self,
        keys: &[String],
        min: f64,
        max: f64,
    ) -> Result<Vec<u64>, StoreError>;

    async fn execute(&self, batch: Batch) -> Result<(), StoreError>;

    /// Applies `batch` and then ZREVRANGEs `key`, all in one MULTI/EXEC.
    async fn execute_then_range(
        &self,
        batch: Batch,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<i64>, StoreError>;

    /// Resolves only once the store answers or the connection fails. A failure after the
    /// batch went out is `Unacknowledged`.
    async fn commit(&self, batch: Batch) -> Result<(), StoreError>;
}
