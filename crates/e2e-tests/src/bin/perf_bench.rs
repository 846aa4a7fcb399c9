use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use ann_index::{Agent, AgentConfig};
use ann_types::{DistanceType, InsertConfig, SearchConfig};
use e2e_tests::random_vectors;

const DEFAULT_ITERATIONS: usize = 3;

#[derive(Parser, Debug)]
#[command(name = "perf_bench", about = "ANN agent performance benchmark harness")]
struct Args {
    #[arg(long, value_enum, default_value = "small")]
    tier: DatasetTier,
    #[arg(long, default_value_t = 64)]
    dimension: usize,
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,
    /// Commit batch size, 0 for the agent default
    #[arg(long, default_value_t = 0)]
    pool_size: u32,
    #[arg(long, default_value_t = 100)]
    queries: usize,
    /// Write the JSON report here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum DatasetTier {
    Small,
    Medium,
    Large,
}

impl DatasetTier {
    fn records(&self) -> usize {
        match self {
            DatasetTier::Small => 1_000,
            DatasetTier::Medium => 10_000,
            DatasetTier::Large => 100_000,
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct IterationReport {
    insert_ms: f64,
    commit_ms: f64,
    save_ms: f64,
    search_p50_us: f64,
    search_p99_us: f64,
    linear_search_p50_us: f64,
    reload_ms: f64,
}

#[derive(Debug, Serialize)]
struct Report {
    tier: DatasetTier,
    records: usize,
    dimension: usize,
    pool_size: u32,
    queries: usize,
    iterations: Vec<IterationReport>,
}

fn percentile(samples: &mut [f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.sort_by(|a, b| a.total_cmp(b));
    let rank = ((samples.len() - 1) as f64 * p).round() as usize;
    samples[rank]
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1_000.0
}

fn run_iteration(args: &Args, seed: u64) -> Result<IterationReport, Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let config = AgentConfig::new(args.dimension)
        .with_index_path(dir.path())
        .with_distance(DistanceType::L2);
    let agent = Agent::open(config.clone())?;
    let cancel = CancellationToken::new();
    let vectors = random_vectors(args.tier.records(), args.dimension, seed);

    let mut report = IterationReport::default();

    let start = Instant::now();
    for (i, vector) in vectors.iter().enumerate() {
        agent.insert(&format!("id-{}", i), vector.clone(), &InsertConfig::default())?;
    }
    report.insert_ms = elapsed_ms(start);

    let start = Instant::now();
    agent.commit(&cancel, args.pool_size)?;
    report.commit_ms = elapsed_ms(start);

    let start = Instant::now();
    agent.save(&cancel)?;
    report.save_ms = elapsed_ms(start);

    let queries = random_vectors(args.queries, args.dimension, seed + 1);
    let search_config = SearchConfig::default().with_num(10);
    let mut approx = Vec::with_capacity(queries.len());
    let mut exact = Vec::with_capacity(queries.len());
    for query in &queries {
        let start = Instant::now();
        agent.search(query, &search_config)?;
        approx.push(start.elapsed().as_secs_f64() * 1_000_000.0);

        let start = Instant::now();
        agent.linear_search(query, &search_config)?;
        exact.push(start.elapsed().as_secs_f64() * 1_000_000.0);
    }
    report.search_p50_us = percentile(&mut approx, 0.50);
    report.search_p99_us = percentile(&mut approx, 0.99);
    report.linear_search_p50_us = percentile(&mut exact, 0.50);

    drop(agent);
    let start = Instant::now();
    let reloaded = Agent::open(config)?;
    report.reload_ms = elapsed_ms(start);
    if reloaded.index_info().stored != vectors.len() {
        return Err(format!(
            "reload found {} records, expected {}",
            reloaded.index_info().stored,
            vectors.len()
        )
        .into());
    }

    Ok(report)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut iterations = Vec::with_capacity(args.iterations);
    for i in 0..args.iterations {
        let report = run_iteration(&args, 42 + i as u64)?;
        eprintln!(
            "iteration {}: insert {:.1}ms commit {:.1}ms save {:.1}ms search p50 {:.0}us",
            i + 1,
            report.insert_ms,
            report.commit_ms,
            report.save_ms,
            report.search_p50_us
        );
        iterations.push(report);
    }

    let report = Report {
        tier: args.tier,
        records: args.tier.records(),
        dimension: args.dimension,
        pool_size: args.pool_size,
        queries: args.queries,
        iterations,
    };
    let json = serde_json::to_string_pretty(&report)?;
    match &args.out {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{}", json),
    }
    Ok(())
}
