use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hdrhistogram::Histogram;
use pointstore::core::{
    Clock, DataKind, Measurement, MeasurementStore, MemoryDirectory, MemoryStore, Metrics,
    SeriesDescriptor, SystemClock, ThreadExecutor,
};
use pointstore::ingest::IngestEngine;
use pointstore::migrate::{MigrationContext, MigrationSeries, ProgressTracker};
use pointstore::{PointStoreConfig, RandomPointValueGenerator};

#[derive(Parser)]
#[command(name = "pointstore", version, about = "Point value store tooling")]
struct Cli {
    /// JSON configuration file; defaults apply when omitted.
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the ingestion engine against an in-memory store.
    IngestBench {
        #[arg(long = "mode", value_enum, default_value_t = Mode::Async)]
        mode: Mode,
        #[arg(long = "series", default_value_t = 10)]
        series: i32,
        #[arg(long = "values", default_value_t = 100_000)]
        values: usize,
        #[arg(long = "period-ms", default_value_t = 1_000)]
        period_ms: u64,
        #[arg(long = "writers", default_value_t = 8)]
        writers: usize,
    },
    /// Generate history in one in-memory store and migrate it to another.
    Migrate {
        #[arg(long = "series", default_value_t = 5)]
        series: i32,
        #[arg(long = "hours", default_value_t = 24)]
        hours: i64,
        #[arg(long = "period-ms", default_value_t = 60_000)]
        period_ms: u64,
    },
    /// Print the effective configuration.
    Config,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Sync,
    Async,
    Stream,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PointStoreConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PointStoreConfig::default(),
    };

    match cli.command {
        Commands::IngestBench {
            mode,
            series,
            values,
            period_ms,
            writers,
        } => ingest_bench(&config, mode, series, values, period_ms, writers),
        Commands::Migrate {
            series,
            hours,
            period_ms,
        } => migrate(&config, series, hours, period_ms),
        Commands::Config => {
            println!("{}", config.to_json()?);
            Ok(())
        }
    }
}

fn ingest_bench(
    config: &PointStoreConfig,
    mode: Mode,
    series: i32,
    values: usize,
    period_ms: u64,
    writers: usize,
) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let executor = Arc::new(ThreadExecutor::new("batch-writer", writers));
    let metrics = Arc::new(Metrics::new());
    let engine = IngestEngine::with_parts(
        store.clone(),
        executor,
        Arc::new(SystemClock),
        metrics.clone(),
        config.ingest.clone(),
    )
    .context("invalid ingest configuration")?;

    let generator = RandomPointValueGenerator::new(0, Duration::from_millis(period_ms));
    let mut histogram = Histogram::<u64>::new(3)?;
    let started = Instant::now();

    for series_id in 1..=series {
        let measurements = generator.values(series_id).take(values);
        match mode {
            Mode::Stream => {
                let t0 = Instant::now();
                let summary = engine.write_stream(measurements);
                histogram.record(t0.elapsed().as_micros() as u64)?;
                log::info!("series {}: {:?}", series_id, summary);
            }
            Mode::Sync | Mode::Async => {
                for measurement in measurements {
                    let t0 = Instant::now();
                    if mode == Mode::Sync {
                        engine.write_sync(measurement);
                    } else {
                        engine
                            .write_async(measurement)
                            .context("write-behind pool rejected work")?;
                    }
                    histogram.record(t0.elapsed().as_micros() as u64)?;
                }
            }
        }
    }
    let submitted = started.elapsed();
    engine.flush();
    while engine.pool().worker_count() > 0 {
        std::thread::sleep(Duration::from_millis(10));
    }
    let total = started.elapsed();

    let written = store.sample_count();
    println!("written:        {written}");
    println!("submit time:    {:.3}s", submitted.as_secs_f64());
    println!("total time:     {:.3}s", total.as_secs_f64());
    println!(
        "throughput:     {:.0} values/s",
        written as f64 / total.as_secs_f64().max(f64::EPSILON)
    );
    println!(
        "latency (us):   p50={} p99={} p999={} max={}",
        histogram.value_at_quantile(0.5),
        histogram.value_at_quantile(0.99),
        histogram.value_at_quantile(0.999),
        histogram.max()
    );
    for (name, value) in metrics.snapshot() {
        println!("{name:<24}{value}");
    }
    Ok(())
}

fn migrate(config: &PointStoreConfig, series: i32, hours: i64, period_ms: u64) -> Result<()> {
    let clock = Arc::new(SystemClock);
    let now = clock.now();
    let start = now - hours * 3_600_000;

    let source = Arc::new(MemoryStore::new());
    let destination = Arc::new(MemoryStore::new());
    let directory = Arc::new(MemoryDirectory::new());
    let generator =
        RandomPointValueGenerator::new(start, Duration::from_millis(period_ms)).until(now);
    for series_id in 1..=series {
        directory.register(SeriesDescriptor {
            series_id,
            name: format!("series-{series_id}"),
            kind: DataKind::Numeric,
        });
        let history: Vec<Measurement> = generator.values(series_id).collect();
        source
            .write(&history)
            .context("failed to generate history")?;
    }
    log::info!("generated {} samples", source.sample_count());

    let metrics = Arc::new(Metrics::new());
    let tracker = Arc::new(ProgressTracker::new(metrics.clone()));
    let context = Arc::new(
        MigrationContext::new(source, destination.clone(), directory, config.migration.clone())
            .context("invalid migration configuration")?
            .with_clock(clock)
            .with_progress(tracker.clone()),
    );
    let all: Vec<MigrationSeries> = (1..=series)
        .map(|series_id| MigrationSeries::new(Arc::clone(&context), series_id))
        .collect();

    let started = Instant::now();
    loop {
        let pending: Vec<&MigrationSeries> =
            all.iter().filter(|s| !s.status().is_terminal()).collect();
        if pending.is_empty() {
            break;
        }
        let copied: u64 = pending.iter().map(|s| s.run()).sum();
        let stalled = pending
            .iter()
            .all(|s| s.status() == pointstore::MigrationStatus::Error);
        if stalled {
            anyhow::bail!("every remaining series failed; copied {copied} samples in last pass");
        }
    }

    println!(
        "migrated {} samples in {:.3}s",
        tracker.total_samples(),
        started.elapsed().as_secs_f64()
    );
    for (status, count) in tracker.status_counts() {
        println!("{status:<24}{count}");
    }
    println!("destination rows: {}", destination.sample_count());
    Ok(())
}
