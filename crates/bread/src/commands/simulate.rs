//! Simulate command - drives concurrent reader traffic through the cache.
//!
//! Readers are spread over a fixed pool of session ids, some of which
//! already exist in the backend. Each request marks a story as read, the
//! way a page view does. Every fourth request uses the non-blocking
//! lookup and is deferred when the session is not resident yet.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use bread_cache::CacheStats;
use bread_session::{MemoryBackend, Session, SessionBackend, SessionCache};
use clap::Args;
use console::{Style, style};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::Context;

/// Arguments for the simulate command.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of distinct reader sessions
    #[arg(long, default_value_t = 200)]
    pub sessions: usize,

    /// How many of those sessions already exist in the backend
    #[arg(long, default_value_t = 100)]
    pub existing: usize,

    /// Total number of requests
    #[arg(long, default_value_t = 5000)]
    pub requests: usize,

    /// Number of concurrent request tasks
    #[arg(long, default_value_t = 32)]
    pub concurrency: usize,

    /// Simulated backend latency per call, in milliseconds
    #[arg(long, default_value_t = 2)]
    pub latency_ms: u64,

    /// Override the configured cache capacity
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Override the configured TTL in seconds (0 disables expiry)
    #[arg(long)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Default)]
struct Tally {
    served: usize,
    deferred: usize,
    failed: usize,
}

/// Simulation report for JSON output.
#[derive(Debug, Serialize)]
struct SimulateOutput {
    requests: usize,
    served: usize,
    deferred: usize,
    failed: usize,
    elapsed_ms: u128,
    persisted_sessions: usize,
    cache: StatsOutput,
}

#[derive(Debug, Serialize)]
struct StatsOutput {
    size: usize,
    capacity: usize,
    pending: usize,
    hits: u64,
    misses: u64,
    loads: u64,
    not_found: u64,
    load_failures: u64,
    evictions: u64,
    expirations: u64,
    copy_backs: u64,
    save_failures: u64,
}

impl From<CacheStats> for StatsOutput {
    fn from(stats: CacheStats) -> Self {
        Self {
            size: stats.size,
            capacity: stats.capacity,
            pending: stats.pending,
            hits: stats.hits,
            misses: stats.misses,
            loads: stats.loads,
            not_found: stats.not_found,
            load_failures: stats.load_failures,
            evictions: stats.evictions,
            expirations: stats.expirations,
            copy_backs: stats.copy_backs,
            save_failures: stats.save_failures,
        }
    }
}

/// Run the simulate command.
pub async fn run(args: SimulateArgs, ctx: &Context) -> Result<()> {
    anyhow::ensure!(args.sessions > 0, "--sessions must be at least 1");
    anyhow::ensure!(args.concurrency > 0, "--concurrency must be at least 1");

    let mut section = ctx.config.cache.clone();
    if let Some(capacity) = args.capacity {
        section.capacity = capacity;
    }
    if let Some(ttl_secs) = args.ttl_secs {
        section.ttl_secs = ttl_secs;
    }
    let cache_config = section.to_cache_config()?;

    let backend = seed(MemoryBackend::new(), args.existing.min(args.sessions))?
        .with_latency(Duration::from_millis(args.latency_ms));
    let backend = Arc::new(backend);
    let sessions = SessionCache::new(cache_config, Arc::clone(&backend))?;

    info!(
        sessions = args.sessions,
        requests = args.requests,
        concurrency = args.concurrency,
        "Starting simulation"
    );

    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for worker in 0..args.concurrency {
        let sessions = sessions.clone();
        let share = requests_for(worker, args.requests, args.concurrency);
        let pool = args.sessions;
        tasks.spawn(async move { drive(sessions, worker, share, pool).await });
    }

    let mut tally = Tally::default();
    while let Some(joined) = tasks.join_next().await {
        let part = joined.context("request task panicked")?;
        tally.served += part.served;
        tally.deferred += part.deferred;
        tally.failed += part.failed;
    }
    let elapsed = started.elapsed();

    let stats = sessions.stats().await?;
    sessions.shutdown().await?;

    let output = SimulateOutput {
        requests: args.requests,
        served: tally.served,
        deferred: tally.deferred,
        failed: tally.failed,
        elapsed_ms: elapsed.as_millis(),
        persisted_sessions: backend.len(),
        cache: stats.into(),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&output, ctx.verbose);
    }
    Ok(())
}

fn seed(backend: MemoryBackend, count: usize) -> Result<MemoryBackend> {
    for n in 0..count {
        backend.create(&Session::new(reader_id(n)).to_record())?;
    }
    debug!(count, "Seeded backend");
    Ok(backend)
}

fn reader_id(n: usize) -> String {
    format!("reader-{n:05}")
}

/// Split `total` requests over `workers`, handing the remainder to the
/// first few.
fn requests_for(worker: usize, total: usize, workers: usize) -> usize {
    total / workers + usize::from(worker < total % workers)
}

async fn drive(
    sessions: SessionCache<Arc<MemoryBackend>>,
    worker: usize,
    requests: usize,
    pool: usize,
) -> Tally {
    let mut tally = Tally::default();
    for i in 0..requests {
        // Stride through the pool so workers collide on popular ids
        let id = reader_id((worker * 7 + i * 13) % pool);
        let story = (i % 500) as i64;

        let session = if i % 4 == 3 {
            match sessions.session_async(&id).await {
                Ok(Some(session)) => Ok(session),
                Ok(None) => {
                    tally.deferred += 1;
                    continue;
                }
                Err(e) => Err(e),
            }
        } else {
            sessions.session(&id).await
        };

        match session {
            Ok(session) => {
                session.mark_read(story);
                session.mark_browsed(story);
                tally.served += 1;
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "Request failed");
                tally.failed += 1;
            }
        }
    }
    tally
}

fn print_report(output: &SimulateOutput, verbose: bool) {
    let dim = Style::new().dim();
    let green = Style::new().green();
    let red = Style::new().red();
    let stats = &output.cache;

    println!();
    println!("{}", style("Simulation").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}", dim.apply_to("Requests:"), output.requests);
    println!("  {} {}", dim.apply_to("Served:  "), green.apply_to(output.served));
    println!("  {} {}", dim.apply_to("Deferred:"), output.deferred);
    if output.failed > 0 {
        println!("  {} {}", dim.apply_to("Failed:  "), red.apply_to(output.failed));
    }
    println!("  {} {} ms", dim.apply_to("Elapsed: "), output.elapsed_ms);

    println!();
    println!("{}", style("Cache Statistics").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}/{}", dim.apply_to("Resident:   "), stats.size, stats.capacity);
    println!("  {} {}", dim.apply_to("Hits:       "), stats.hits);
    println!("  {} {}", dim.apply_to("Misses:     "), stats.misses);
    println!("  {} {}", dim.apply_to("Loads:      "), stats.loads);
    println!("  {} {}", dim.apply_to("Evictions:  "), stats.evictions);
    println!("  {} {}", dim.apply_to("Copy-backs: "), stats.copy_backs);
    if verbose {
        println!("  {} {}", dim.apply_to("Pending:    "), stats.pending);
        println!("  {} {}", dim.apply_to("Not found:  "), stats.not_found);
        println!("  {} {}", dim.apply_to("Load fails: "), stats.load_failures);
        println!("  {} {}", dim.apply_to("Expirations:"), stats.expirations);
        println!("  {} {}", dim.apply_to("Save fails: "), stats.save_failures);
    }
    println!("  {} {}", dim.apply_to("Persisted:  "), output.persisted_sessions);
    println!();
}
