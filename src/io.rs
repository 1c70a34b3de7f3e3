use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use polars::prelude::{
    DataFrame, IntoLazy, LazyCsvReader, LazyFileListReader, LazyFrame, NullValues,
    ParquetReader, ParquetWriteOptions, PlPath, SerReader, SinkOptions, SinkTarget,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::{DataError, FeatureResult, IoError},
    polars_ext::polars_to_feature_error,
};

/// Token used by the raw export for missing values.
pub const NULL_TOKEN: &str = "NULL";

/// Rows inspected when inferring raw CSV column types.
const INFER_SCHEMA_ROWS: usize = 10_000;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum FileExtension {
    Csv,
    Parquet,
}

// ================================================================================================
// Readers
// ================================================================================================

/// Lazily scans a raw delimited export with a header row.
///
/// The `NULL` token is read as a missing value and date-like columns are parsed.
pub fn scan_raw_csv(path: &Path) -> FeatureResult<LazyFrame> {
    let uri = path_to_uri(path)?;
    LazyCsvReader::new(PlPath::new(uri))
        .with_has_header(true)
        .with_null_values(Some(NullValues::AllColumnsSingle(NULL_TOKEN.into())))
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .with_try_parse_dates(true)
        .finish()
        .map_err(|e| IoError::ReadFailed(format!("{}: {e}", path.display())).into())
}

pub fn read_parquet(path: &Path) -> FeatureResult<DataFrame> {
    let file = File::open(path)
        .map_err(|e| IoError::ReadFailed(format!("{}: {e}", path.display())))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| IoError::ReadFailed(format!("{}: {e}", path.display())).into())
}

/// Lists the files in `dir` carrying `ext`, sorted by path.
pub fn list_files(dir: &Path, ext: FileExtension) -> FeatureResult<Vec<PathBuf>> {
    let wanted = ext.to_string();
    let mut files = fs::read_dir(dir)
        .map_err(|e| IoError::FileSystem(format!("Failed to list {}: {e}", dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(wanted.as_str()))
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

// ================================================================================================
// Writers
// ================================================================================================

/// Writes `df` to `path` as Parquet, creating parent directories as needed.
pub fn write_parquet(df: &DataFrame, path: &Path) -> FeatureResult<()> {
    write_parquet_with(df, path, None, None)
}

pub fn write_parquet_with(
    df: &DataFrame,
    path: &Path,
    opts: Option<&ParquetWriteOptions>,
    sink_opts: Option<&SinkOptions>,
) -> FeatureResult<()> {
    if let Some(dir) = path.parent() {
        ensure_dir(dir)?;
    }

    let uri = path_to_uri(path)?;
    let target = SinkTarget::Path(PlPath::new(uri));
    let options = opts.cloned().unwrap_or_default();
    let sink_opts = sink_opts.cloned().unwrap_or_default();

    let sink_plan = df
        .clone()
        .lazy()
        .sink_parquet(target, options, None, sink_opts)
        .map_err(|e| DataError::DataFrame(format!("Failed to build Parquet sink plan: {e}")))?;

    let _ = sink_plan.collect().map_err(|e| {
        IoError::WriteFailed(format!(
            "Failed to write Parquet to '{}': {e}",
            path.display()
        ))
    })?;

    Ok(())
}

pub(crate) fn ensure_dir(dir: &Path) -> FeatureResult<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| {
        IoError::FileSystem(format!(
            "Failed to create directory {}: {}",
            dir.display(),
            e
        ))
        .into()
    })
}

pub(crate) fn path_to_uri(path: &Path) -> FeatureResult<&str> {
    path.to_str().ok_or_else(|| {
        IoError::FileSystem(format!(
            "Path contains invalid UTF-8 characters: {}",
            path.display()
        ))
        .into()
    })
}

/// File stem used to name per-input outputs.
pub(crate) fn file_stem(path: &Path) -> FeatureResult<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            IoError::FileSystem(format!("Path has no usable file name: {}", path.display())).into()
        })
}

/// Collects a lazy frame, labelling failures with the stage that built it.
pub(crate) fn collect(lf: LazyFrame, stage: &str) -> FeatureResult<DataFrame> {
    lf.collect().map_err(|e| polars_to_feature_error(stage, e))
}
