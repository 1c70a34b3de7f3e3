//! Standardizes a directory of raw search exports, derives the feature matrix for each file
//! and precomputes the dashboard artifacts of the first matrix.
//!
//! ```text
//! cargo run --example featurize -- [CONFIG_DIR] [RAW_DIR] [OUT_DIR]
//! ```

use std::{env, fs, path::PathBuf, time::Instant};

use anyhow::{Context, Result, bail};
use booking_features::prelude::*;
use time::macros::format_description;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let _guard = init_tracing()?;

    let mut args = env::args().skip(1);
    let config_dir = PathBuf::from(args.next().unwrap_or_else(|| "configs".into()));
    let raw_dir = PathBuf::from(args.next().unwrap_or_else(|| "data/raw".into()));
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| "data".into()));

    let interim_dir = out_dir.join("interim");
    let processed_dir = out_dir.join("processed");
    let viz_dir = out_dir.join("viz");

    let loader = ConfigLoader::new(&config_dir);
    let cfg = loader.bundle().context("Failed to load configuration")?;

    let start = Instant::now();
    let raw = list_files(&raw_dir, FileExtension::Csv)?;
    if raw.is_empty() {
        bail!("No CSV files in {}", raw_dir.display());
    }
    let standardized = Standardizer::from_config(&cfg).standardize_files(
        &raw,
        &interim_dir,
        cfg.pipeline.show_progress,
    )?;
    let standardize_time = start.elapsed();

    let start = Instant::now();
    let pipeline = FeaturePipeline::new(cfg.pipeline.clone())?;
    let inputs = standardized
        .succeeded
        .iter()
        .map(|r| r.output.clone())
        .collect::<Vec<_>>();
    let features = pipeline.process_files(&inputs, &processed_dir)?;
    let feature_time = start.elapsed();

    let start = Instant::now();
    let Some(first) = features.succeeded.first() else {
        bail!("No feature matrix was produced");
    };
    let matrix = read_parquet(&first.output)?;
    let artifacts = ArtifactWriter::new(&viz_dir)
        .with_mad_threshold(cfg.pipeline.outliers.threshold)
        .write(&matrix)?;
    let artifact_time = start.elapsed();

    let store = ArtifactStore::new(&viz_dir);
    if let Some(summary) = store.summary() {
        summary.to_csv(&viz_dir, None, None)?;
        fs::write(
            viz_dir.join("feature_summary.json"),
            serde_json::to_string_pretty(&summary.to_json()?)?,
        )?;
    }

    println!("\n--- Featurization ---");
    println!(
        "Standardized: {} ok, {} failed",
        standardized.succeeded.len(),
        standardized.failed.len()
    );
    println!(
        "Features:     {} ok, {} failed, {} rows",
        features.succeeded.len(),
        features.failed.len(),
        features.total_rows()
    );
    println!(
        "Artifacts:    {} features, {} failed",
        artifacts.written.len(),
        artifacts.failed.len()
    );
    println!("\n--- Timings ---");
    println!("1. Standardization: {}", humantime::format_duration(standardize_time));
    println!("2. Features:        {}", humantime::format_duration(feature_time));
    println!("3. Artifacts:       {}", humantime::format_duration(artifact_time));

    drop(_guard);
    Ok(())
}

// ================================================================================================
// Tracing Configuration
// ================================================================================================

fn init_tracing() -> Result<Option<WorkerGuard>> {
    let app_name = "booking-features";

    let in_container =
        env::var("CONTAINER").is_ok() || std::path::Path::new("/.dockerenv").exists();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if in_container {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();

        info!("Logging to stdout (container mode)");
        Ok(None)
    } else {
        let log_dir = match dirs::state_dir().or_else(|| dirs::home_dir().map(|h| h.join(".local/state"))) {
            Some(base) => base.join(app_name).join("logs"),
            None => bail!("Failed to find a state or home directory for logs"),
        };
        fs::create_dir_all(&log_dir)?;

        let timestamp = time::OffsetDateTime::now_utc()
            .format(&format_description!(
                "[year][month][day]-[hour][minute][second]"
            ))
            .context("Failed to format timestamp")?;
        let file_name = format!("{app_name}-{timestamp}.log");

        let file_appender = tracing_appender::rolling::never(&log_dir, &file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(non_blocking)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();

        info!(log_file = %log_dir.join(file_name).display(), "Logging to file (local mode)");
        Ok(Some(guard))
    }
}
