use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::DataFrame;

use crate::error::{ConfigError, FeatureResult};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Outcome of one input file that was processed and persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub file: PathBuf,
    pub output: PathBuf,
    pub rows: usize,
    pub columns: usize,
    /// Estimated in-memory size of the materialized table.
    pub bytes: usize,
    pub elapsed: Duration,
}

impl FileReport {
    pub fn new(file: &Path, output: &Path, df: &DataFrame, elapsed: Duration) -> Self {
        Self {
            file: file.to_path_buf(),
            output: output.to_path_buf(),
            rows: df.height(),
            columns: df.width(),
            bytes: df.estimated_size(),
            elapsed,
        }
    }

    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / BYTES_PER_MB
    }
}

/// An input file whose output was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file: PathBuf,
    pub error: String,
}

/// Per-file results of a multi-file run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub succeeded: Vec<FileReport>,
    pub failed: Vec<FileFailure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.succeeded.iter().map(|r| r.rows).sum()
    }

    pub fn total_files(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Runs `process` on every file, isolating failures.
///
/// A failing file is logged and recorded in [`BatchReport::failed`]; the remaining files are
/// still processed. Only progress bar construction can fail the whole batch.
pub fn run_files<F>(
    stage: &str,
    files: &[PathBuf],
    show_progress: bool,
    mut process: F,
) -> FeatureResult<BatchReport>
where
    F: FnMut(&Path) -> FeatureResult<FileReport>,
{
    let bar = if show_progress {
        Some(progress_bar(files.len() as u64)?)
    } else {
        None
    };

    let mut report = BatchReport::default();
    for file in files {
        if let Some(bar) = &bar {
            bar.set_message(file.display().to_string());
        }

        match process(file) {
            Ok(r) => {
                tracing::info!(
                    stage,
                    file = %r.file.display(),
                    output = %r.output.display(),
                    rows = r.rows,
                    columns = r.columns,
                    size_mb = format!("{:.2}", r.megabytes()),
                    elapsed = %humantime::format_duration(r.elapsed),
                    "File processed"
                );
                report.succeeded.push(r);
            }
            Err(e) => {
                tracing::error!(
                    stage,
                    file = %file.display(),
                    error = %e,
                    "File failed; skipping output"
                );
                report.failed.push(FileFailure {
                    file: file.clone(),
                    error: e.to_string(),
                });
            }
        }

        if let Some(bar) = &bar {
            bar.inc(1);
        }
    }

    if let Some(bar) = bar {
        bar.finish_with_message(format!("{stage} done"));
    }

    tracing::info!(
        stage,
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        rows = report.total_rows(),
        "Batch finished"
    );
    Ok(report)
}

fn progress_bar(capacity: u64) -> FeatureResult<ProgressBar> {
    let bar = ProgressBar::new(capacity);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta_precise}) {msg}")
            .map_err(ConfigError::ProgressBar)?
            .progress_chars("#>-"));
    Ok(bar)
}

#[cfg(test)]
mod tests {
    use polars::df;

    use crate::error::{FeatureError, IoError};

    use super::*;

    #[test]
    fn run_files_continues_past_failures() {
        let files = vec![
            PathBuf::from("a.csv"),
            PathBuf::from("bad.csv"),
            PathBuf::from("c.csv"),
        ];
        let df = df!["x" => &[1, 2, 3]].expect("Failed to create DF");

        let report = run_files("test", &files, false, |path| {
            if path.ends_with("bad.csv") {
                return Err(FeatureError::Io(IoError::ReadFailed("corrupt".into())));
            }
            Ok(FileReport::new(path, path, &df, Duration::from_millis(5)))
        })
        .expect("Batch must not abort");

        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].file, PathBuf::from("bad.csv"));
        assert!(report.failed[0].error.contains("corrupt"));
        assert_eq!(report.total_rows(), 6);
        assert_eq!(report.total_files(), 3);
        assert!(!report.is_clean());
    }
}
