//! # In-memory store
//!
//! Single-process stand-in for Redis with the same observable behavior for the
//! commands the engine issues.
//!
//! - Batches are staged on a copy of the keys they touch and written back whole, so a failing op
//!   leaves nothing behind
//! - Expiry is lazy and measured on [`tokio::time::Instant`], which lets paused test clocks drive it
//! - Reverse ranges break score ties by member bytes, descending, as ZREVRANGE does
//! - An intersection with no survivors deletes the destination, as ZINTERSTORE does
use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::store::{Batch, Op, ScoreStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Sorted(HashMap<i64, f64>),
    Set(HashSet<i64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

type Entries = HashMap<String, Entry>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// SISMEMBER
    pub fn set_contains(&self, key: &str, member: i64) -> Result<bool, StoreError> {
        let entries = self.live_entries()?;

        match entries.get(key).map(|entry| &entry.value) {
            None => Ok(false),
            Some(Value::Set(members)) => Ok(members.contains(&member)),
            Some(Value::Sorted(_)) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    /// Runs `batch` against a staged copy of the keys it touches, then writes those keys back.
    fn apply_batch(entries: &mut Entries, batch: Batch) -> Result<(), StoreError> {
        let now = Instant::now();
        let ops = batch.into_ops();

        let touched: HashSet<String> = ops.iter().flat_map(touched_keys).collect();
        let mut staged: Entries = touched
            .iter()
            .filter_map(|key| entries.get(key).map(|entry| (key.clone(), entry.clone())))
            .collect();

        for op in ops {
            apply(&mut staged, op, now)?;
        }

        for key in touched {
            match staged.remove(&key) {
                Some(entry) => entries.insert(key, entry),
                None => entries.remove(&key),
            };
        }

        Ok(())
    }

    /// ZCARD or SCARD, zero when absent.
    pub fn cardinality(&self, key: &str) -> Result<usize, StoreError> {
        let entries = self.live_entries()?;

        Ok(match entries.get(key).map(|entry| &entry.value) {
            None => 0,
            Some(Value::Set(members)) => members.len(),
            Some(Value::Sorted(members)) => members.len(),
        })
    }

    fn live_entries(&self) -> Result<MutexGuard<'_, Entries>, StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;

        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at.is_none_or(|deadline| deadline > now));

        Ok(entries)
    }
}

fn sorted<'a>(entries: &'a Entries, key: &str) -> Result<Option<&'a HashMap<i64, f64>>, StoreError> {
    match entries.get(key).map(|entry| &entry.value) {
        None => Ok(None),
        Some(Value::Sorted(members)) => Ok(Some(members)),
        Some(Value::Set(_)) => Err(StoreError::WrongType(key.to_string())),
    }
}

fn sorted_mut<'a>(entries: &'a mut Entries, key: &str) -> Result<&'a mut HashMap<i64, f64>, StoreError> {
    let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
        value: Value::Sorted(HashMap::new()),
        expires_at: None,
    });

    match &mut entry.value {
        Value::Sorted(members) => Ok(members),
        Value::Set(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

fn set_mut<'a>(entries: &'a mut Entries, key: &str) -> Result<&'a mut HashSet<i64>, StoreError> {
    let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
        value: Value::Set(HashSet::new()),
        expires_at: None,
    });

    match &mut entry.value {
        Value::Set(members) => Ok(members),
        Value::Sorted(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

fn drop_if_empty(entries: &mut Entries, key: &str) {
    let empty = match entries.get(key).map(|entry| &entry.value) {
        Some(Value::Sorted(members)) => members.is_empty(),
        Some(Value::Set(members)) => members.is_empty(),
        None => false,
    };

    if empty {
        entries.remove(key);
    }
}

/// Plain-set members weigh 1, missing keys are empty.
fn weighted(entries: &Entries, key: &str) -> HashMap<i64, f64> {
    match entries.get(key).map(|entry| &entry.value) {
        None => HashMap::new(),
        Some(Value::Sorted(members)) => members.clone(),
        Some(Value::Set(members)) => members.iter().map(|&member| (member, 1.0)).collect(),
    }
}

fn touched_keys(op: &Op) -> Vec<String> {
    match op {
        Op::ZAdd { key, .. }
        | Op::ZAddNx { key, .. }
        | Op::ZIncrBy { key, .. }
        | Op::ZRem { key, .. }
        | Op::SAdd { key, .. }
        | Op::SRem { key, .. }
        | Op::Del { key }
        | Op::Expire { key, .. } => vec![key.clone()],
        Op::InterStoreMax { dest, keys } => {
            let mut all = keys.clone();
            all.push(dest.clone());
            all
        }
    }
}

fn apply(entries: &mut Entries, op: Op, now: Instant) -> Result<(), StoreError> {
    match op {
        Op::ZAdd { key, member, score } => {
            sorted_mut(entries, &key)?.insert(member, score);
        }
        Op::ZAddNx { key, member, score } => {
            sorted_mut(entries, &key)?.entry(member).or_insert(score);
        }
        Op::ZIncrBy { key, member, delta } => {
            *sorted_mut(entries, &key)?.entry(member).or_insert(0.0) += delta;
        }
        Op::ZRem { key, member } => {
            if entries.contains_key(&key) {
                sorted_mut(entries, &key)?.remove(&member);
                drop_if_empty(entries, &key);
            }
        }
        Op::SAdd { key, member } => {
            set_mut(entries, &key)?.insert(member);
        }
        Op::SRem { key, member } => {
            if entries.contains_key(&key) {
                set_mut(entries, &key)?.remove(&member);
                drop_if_empty(entries, &key);
            }
        }
        Op::Del { key } => {
            entries.remove(&key);
        }
        Op::InterStoreMax { dest, keys } => {
            let inputs: Vec<HashMap<i64, f64>> =
                keys.iter().map(|key| weighted(&*entries, key)).collect();
            let mut inputs = inputs.into_iter();

            let mut result = inputs.next().unwrap_or_default();
            for input in inputs {
                result = result
                    .into_iter()
                    .filter_map(|(member, score)| {
                        input.get(&member).map(|other| (member, score.max(*other)))
                    })
                    .collect();
            }

            if result.is_empty() {
                entries.remove(&dest);
            } else {
                entries.insert(
                    dest,
                    Entry {
                        value: Value::Sorted(result),
                        expires_at: None,
                    },
                );
            }
        }
        Op::Expire { key, ttl_secs } => {
            if let Some(entry) = entries.get_mut(&key) {
                entry.expires_at = Some(now + Duration::from_secs(ttl_secs));
            }
        }
    }

    Ok(())
}

fn rank_order(a: &(i64, f64), b: &(i64, f64)) -> Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| b.0.to_string().cmp(&a.0.to_string()))
}

fn rev_range_of(entries: &Entries, key: &str, start: isize, stop: isize) -> Result<Vec<i64>, StoreError> {
    let Some(members) = sorted(entries, key)? else {
        return Ok(Vec::new());
    };

    let mut ranked: Vec<(i64, f64)> = members.iter().map(|(&m, &s)| (m, s)).collect();
    ranked.sort_by(rank_order);

    let len = ranked.len() as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len {
        return Ok(Vec::new());
    }

    Ok(ranked[start as usize..=stop as usize]
        .iter()
        .map(|(member, _)| *member)
        .collect())
}

#[async_trait]
impl ScoreStore for MemoryStore {
    async fn score(&self, key: &str, member: i64) -> Result<Option<f64>, StoreError> {
        let entries = self.live_entries()?;

        Ok(sorted(&entries, key)?.and_then(|members| members.get(&member).copied()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.live_entries()?.contains_key(key))
    }

    async fn is_member(&self, key: &str, member: i64) -> Result<bool, StoreError> {
        self.set_contains(key, member)
    }

    async fn rev_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<i64>, StoreError> {
        let entries = self.live_entries()?;

        rev_range_of(&entries, key, start, stop)
    }

    async fn count_in_range(
        &self,
        keys: &[String],
        min: f64,
        max: f64,
    ) -> Result<Vec<u64>, StoreError> {
        let entries = self.live_entries()?;

        keys.iter()
            .map(|key| {
                Ok(sorted(&entries, key)?.map_or(0, |members| {
                    members
                        .values()
                        .filter(|&&score| score >= min && score <= max)
                        .count() as u64
                }))
            })
            .collect()
    }

    async fn execute(&self, batch: Batch) -> Result<(), StoreError> {
        let mut entries = self.live_entries()?;

        Self::apply_batch(&mut entries, batch)
    }

    async fn execute_then_range(
        &self,
        batch: Batch,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<i64>, StoreError> {
        let mut entries = self.live_entries()?;
        Self::apply_batch(&mut entries, batch)?;

        rev_range_of(&entries, key, start, stop)
    }

    async fn commit(&self, batch: Batch) -> Result<(), StoreError> {
        self.execute(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rev_range_ties_and_bounds() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        batch.zadd("z", 1, 5.0).zadd("z", 2, 5.0).zadd("z", 10, 5.0).zadd("z", 3, 9.0);
        store.execute(batch).await.unwrap();

        // "2" > "10" > "1" bytewise
        assert_eq!(store.rev_range("z", 0, -1).await.unwrap(), vec![3, 2, 10, 1]);
        assert_eq!(store.rev_range("z", 1, 2).await.unwrap(), vec![2, 10]);
        assert_eq!(store.rev_range("z", 3, 100).await.unwrap(), vec![1]);
        assert!(store.rev_range("z", 4, 8).await.unwrap().is_empty());
        assert!(store.rev_range("missing", 0, 9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_applies_nothing() {
        let store = MemoryStore::new();
        let mut setup = Batch::new();
        setup.sadd("plain", 1);
        store.execute(setup).await.unwrap();

        let mut batch = Batch::new();
        batch.zadd("z", 1, 1.0).zadd("plain", 2, 1.0);

        assert!(matches!(
            store.execute(batch).await,
            Err(StoreError::WrongType(key)) if key == "plain"
        ));
        assert!(!store.exists("z").await.unwrap());
    }

    #[tokio::test]
    async fn test_intersection_takes_max_and_plain_sets_weigh_one() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        batch
            .zadd("global", 1, 1000.0)
            .zadd("global", 2, 2000.0)
            .zadd("global", 3, 0.5)
            .sadd("members", 1)
            .sadd("members", 3)
            .sadd("members", 4)
            .inter_store_max("cache", vec!["members".to_string(), "global".to_string()]);
        store.execute(batch).await.unwrap();

        assert_eq!(store.score("cache", 1).await.unwrap(), Some(1000.0));
        assert_eq!(store.score("cache", 3).await.unwrap(), Some(1.0));
        assert_eq!(store.score("cache", 2).await.unwrap(), None);
        assert_eq!(store.cardinality("cache").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_intersection_removes_destination() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        batch
            .zadd("cache", 9, 1.0)
            .sadd("members", 1)
            .inter_store_max("cache", vec!["members".to_string(), "global".to_string()]);
        store.execute(batch).await.unwrap();

        assert!(!store.exists("cache").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_expire() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        batch.zadd("z", 1, 1.0).expire("z", 60);
        store.execute(batch).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.exists("z").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!store.exists("z").await.unwrap());
    }

    #[tokio::test]
    async fn test_removing_last_member_drops_key() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        batch.zadd("z", 1, 1.0).zrem("z", 1).sadd("s", 1).srem("s", 1);
        store.execute(batch).await.unwrap();

        assert!(!store.exists("z").await.unwrap());
        assert!(!store.exists("s").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_untouched_keys_alone() {
        let store = MemoryStore::new();
        let mut setup = Batch::new();
        setup.zadd("other", 7, 7.0).zadd("z", 1, 1.0).sadd("plain", 1);
        store.execute(setup).await.unwrap();

        let mut batch = Batch::new();
        batch.zincr("z", 1, 5.0).del("other").sadd("plain", 2).zincr("plain", 1, 1.0);
        assert!(store.execute(batch).await.is_err());

        assert_eq!(store.score("z", 1).await.unwrap(), Some(1.0));
        assert_eq!(store.score("other", 7).await.unwrap(), Some(7.0));
        assert!(store.set_contains("plain", 1).unwrap());
        assert!(!store.set_contains("plain", 2).unwrap());
    }

    #[tokio::test]
    async fn test_zadd_nx_keeps_existing_score() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        batch.zadd("z", 1, 5.0).zadd_nx("z", 1, 9.0).zadd_nx("z", 2, 3.0);
        store.execute(batch).await.unwrap();

        assert_eq!(store.score("z", 1).await.unwrap(), Some(5.0));
        assert_eq!(store.score("z", 2).await.unwrap(), Some(3.0));
    }

    #[tokio::test]
    async fn test_execute_then_range_reads_what_it_built() {
        let store = MemoryStore::new();
        let mut setup = Batch::new();
        setup.zadd("global", 1, 10.0).zadd("global", 2, 20.0).sadd("members", 1).sadd("members", 2);
        store.execute(setup).await.unwrap();

        let mut build = Batch::new();
        build
            .inter_store_max("cache", vec!["members".to_string(), "global".to_string()])
            .expire("cache", 60);

        assert_eq!(
            store.execute_then_range(build, "cache", 0, -1).await.unwrap(),
            vec![2, 1]
        );
        assert!(store.is_member("members", 2).await.unwrap());
        assert!(!store.is_member("members", 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_count_in_range() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        batch.zadd("a", 1, 1.0).zadd("a", 2, -1.0).zadd("a", 3, 1.0).zadd("b", 1, -1.0);
        store.execute(batch).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(
            store.count_in_range(&keys, 1.0, 1.0).await.unwrap(),
            vec![2, 0, 0]
        );
    }
}
