use std::{sync::Arc, time::Duration};

use anyhow::{Result, ensure};
use chrono::Utc;
use clap::{Parser, Subcommand};
use ranking::{
    database::RedisStore,
    engine::{Engine, EngineSettings},
    error::EngineError,
    models::{Direction, Order},
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "redis://127.0.0.1:6379")]
    store_url: String,

    #[arg(long, default_value = "tester:")]
    key_prefix: String,

    /// Community cache TTL, kept short so the scenario can wait it out.
    #[arg(long, default_value_t = 2)]
    cache_ttl_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Two posts, three upvotes, and the community ranking flips once the cache expires.
    Scenario,

    /// Bulk posts and votes for eyeballing listings.
    Seed {
        posts: i64,

        communities: i64,

        voters: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let store = RedisStore::connect(&args.store_url, Duration::from_millis(500)).await?;
    let settings = EngineSettings {
        key_prefix: args.key_prefix.clone(),
        cache_ttl_secs: args.cache_ttl_secs,
        ..EngineSettings::default()
    };
    let engine = Engine::new(Arc::new(store), settings);

    match args.command {
        Command::Scenario => scenario(&engine, args.cache_ttl_secs).await,
        Command::Seed {
            posts,
            communities,
            voters,
        } => seed(&engine, posts, communities.max(1), voters).await,
    }
}

async fn scenario(engine: &Engine, cache_ttl_secs: u64) -> Result<()> {
    let now = Utc::now();
    let (a, b, community) = (1, 2, 1);

    engine
        .create_post(a, community, now - chrono::Duration::seconds(1000), 100)
        .await?;
    engine.create_post(b, community, now, 101).await?;

    let by_time = engine.list(Some(community), Order::Time, 1, 10).await?;
    println!("By time: {by_time:?}");
    ensure!(by_time == vec![b, a], "expected newest first");

    let by_score = engine.list(Some(community), Order::Score, 1, 10).await?;
    println!("By score before votes: {by_score:?}");

    for user in 200..203 {
        engine.vote(user, a, Direction::Up).await?;
    }

    println!("Waiting {cache_ttl_secs}s for the community cache to expire");
    tokio::time::sleep(Duration::from_secs(cache_ttl_secs + 1)).await;

    let by_score = engine.list(Some(community), Order::Score, 1, 10).await?;
    let votes = engine.vote_counts(&by_score).await?;
    println!("By score after votes: {by_score:?}, votes {votes:?}");
    ensure!(by_score == vec![a, b], "expected upvoted post first");

    engine.delete_post(a, community).await?;
    engine.delete_post(b, community).await?;

    println!("Scenario passed");
    Ok(())
}

async fn seed(engine: &Engine, posts: i64, communities: i64, voters: i64) -> Result<()> {
    let now = Utc::now();

    for post_id in 1..=posts {
        let community_id = post_id % communities + 1;
        let created_at = now - chrono::Duration::minutes(posts - post_id);

        engine
            .create_post(post_id, community_id, created_at, 1)
            .await?;

        // Direction rotates with the ids, a third of voters abstain.
        for user_id in 2..2 + voters {
            let direction = match (post_id + user_id) % 3 {
                0 => Direction::Down,
                1 => Direction::Up,
                _ => continue,
            };

            match engine.vote(user_id, post_id, direction).await {
                Ok(()) | Err(EngineError::VoteUnchanged) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    info!("Seeded {posts} posts across {communities} communities");

    let top = engine.list(None, Order::Score, 1, 10).await?;
    let votes = engine.vote_counts(&top).await?;
    for (post_id, votes) in top.iter().zip(votes) {
        println!("{post_id}: {votes} votes");
    }

    Ok(())
}
