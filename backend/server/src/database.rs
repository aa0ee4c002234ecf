//! # Redis
//!
//! RAM database.
//!
//! Core purpose is to hold every ranking and vote structure for posts. Also, used for atomic increments
//! on post scores.
//!
//! ## Requirements
//!
//! - Fast rank-range reads for listings
//! - Atomic multi-key batches for post creation and vote transitions
//! - Commutative increments so different users voting on one post never contend
//!
//! ## Implementation
//!
//! - Sorted sets: `post:time`, `post:score`, one `post:voted:<post>` per post
//! - Plain sets: one `community:<community>` per community
//! - Derived sorted sets: `post:<order>:<community>`, ZINTERSTORE with MAX, 60 second TTL
//! - Batches go through MULTI/EXEC, vote counts through a plain pipeline
//! - Every call but `commit` is bounded by the configured store timeout
//! - `commit` waits for the EXEC reply however long it takes, a dropped connection is reported as
//!   unacknowledged since the transaction may already have run
use std::{future::Future, time::Duration};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, RedisResult,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tokio::time::timeout;

use crate::store::{Batch, Op, ScoreStore, StoreError};

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, StoreError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    Ok(connection_manager)
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    timeout: Duration,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager, timeout: Duration) -> Self {
        Self {
            connection,
            timeout,
        }
    }

    pub async fn connect(redis_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let connection = init_redis(redis_url).await?;

        Ok(Self::new(connection, timeout))
    }

    async fn bounded<T>(&self, call: impl Future<Output = RedisResult<T>>) -> Result<T, StoreError> {
        timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(StoreError::from)
    }

    fn transaction(batch: Batch) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch.into_ops() {
            queue(&mut pipe, op);
        }

        pipe
    }
}

fn acknowledged(err: redis::RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        StoreError::Unacknowledged(err.to_string())
    } else {
        StoreError::Redis(err)
    }
}

fn queue(pipe: &mut redis::Pipeline, op: Op) {
    match op {
        Op::ZAdd { key, member, score } => {
            pipe.zadd(key, member, score).ignore();
        }
        Op::ZAddNx { key, member, score } => {
            pipe.cmd("ZADD")
                .arg(key)
                .arg("NX")
                .arg(score)
                .arg(member)
                .ignore();
        }
        Op::ZIncrBy { key, member, delta } => {
            pipe.zincr(key, member, delta).ignore();
        }
        Op::ZRem { key, member } => {
            pipe.zrem(key, member).ignore();
        }
        Op::SAdd { key, member } => {
            pipe.sadd(key, member).ignore();
        }
        Op::SRem { key, member } => {
            pipe.srem(key, member).ignore();
        }
        Op::Del { key } => {
            pipe.del(key).ignore();
        }
        Op::InterStoreMax { dest, keys } => {
            pipe.zinterstore_max(dest, keys).ignore();
        }
        Op::Expire { key, ttl_secs } => {
            pipe.expire(key, ttl_secs as i64).ignore();
        }
    }
}

#[async_trait]
impl ScoreStore for RedisStore {
    async fn score(&self, key: &str, member: i64) -> Result<Option<f64>, StoreError> {
        let mut connection = self.connection.clone();

        self.bounded(connection.zscore(key, member)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();

        self.bounded(connection.exists(key)).await
    }

    async fn is_member(&self, key: &str, member: i64) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();

        self.bounded(connection.sismember(key, member)).await
    }

    async fn rev_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<i64>, StoreError> {
        let mut connection = self.connection.clone();

        self.bounded(connection.zrevrange(key, start, stop)).await
    }

    async fn count_in_range(
        &self,
        keys: &[String],
        min: f64,
        max: f64,
    ) -> Result<Vec<u64>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut connection = self.connection.clone();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.zcount(key, min, max);
        }

        self.bounded(pipe.query_async(&mut connection)).await
    }

    async fn execute(&self, batch: Batch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut connection = self.connection.clone();
        let pipe = Self::transaction(batch);

        self.bounded(pipe.query_async::<()>(&mut connection)).await
    }

    async fn execute_then_range(
        &self,
        batch: Batch,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<i64>, StoreError> {
        let mut connection = self.connection.clone();
        let mut pipe = Self::transaction(batch);
        pipe.zrevrange(key, start, stop);

        let (ids,): (Vec<i64>,) = self.bounded(pipe.query_async(&mut connection)).await?;

        Ok(ids)
    }

    async fn commit(&self, batch: Batch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut connection = self.connection.clone();
        let pipe = Self::transaction(batch);

        pipe.query_async::<()>(&mut connection)
            .await
            .map_err(acknowledged)
    }
}
