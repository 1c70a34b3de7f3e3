use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use itertools::Itertools;
use polars::{
    frame::DataFrame,
    prelude::{
        DataType, Expr, Field, IdxCa, IdxSize, IntoLazy, LazyFrame, PlSmallStr, Schema,
        SchemaRef, SortMultipleOptions, col, len, lit, when,
    },
};
use rand::{SeedableRng, rngs::StdRng, seq::index};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::{FeatureResult, IoError},
    io::{self, FileExtension},
    polars_ext::{DataFrameExt, polars_to_feature_error},
    report::{
        io::{Report, ReportName, ToJson, ToParquet, ToSchema},
        summary::FeatureSummary,
    },
    schema::RecordCol,
};

pub const DEFAULT_BINS: usize = 50;
/// Integer features with at most this many distinct values get a bar table.
pub const DISCRETE_THRESHOLD: usize = 10;
pub const BOXPLOT_SAMPLE_SIZE: usize = 100;
pub const SAMPLE_SEED: u64 = 42;

/// Column holding the engagement outcome used to split every artifact.
pub const TARGET_LABEL: &str = "target_label";

// ================================================================================================
// Labels & Columns
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
pub enum TargetLabel {
    Booked,
    Clicked,
    #[strum(to_string = "Not Clicked")]
    #[serde(rename = "Not Clicked")]
    NotClicked,
}

impl TargetLabel {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// `Booked` wins over `Clicked`; missing indicators count as not clicked.
    pub fn expr() -> Expr {
        let booked = col(RecordCol::WasBooked).cast(DataType::Boolean).fill_null(lit(false));
        let clicked = col(RecordCol::WasClicked).cast(DataType::Boolean).fill_null(lit(false));
        when(booked)
            .then(lit(TargetLabel::Booked.as_str()))
            .when(clicked)
            .then(lit(TargetLabel::Clicked.as_str()))
            .otherwise(lit(TargetLabel::NotClicked.as_str()))
            .alias(TARGET_LABEL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum HistogramCol {
    BinCenter,
    TargetLabel,
    Count,
    /// Share of all binned values, across labels.
    RelFreq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BarplotCol {
    Value,
    TargetLabel,
    CountRows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BoxplotCol {
    Value,
    TargetLabel,
}

macro_rules! impl_col_name {
    ($($t:ty),+) => {
        $(
            impl From<$t> for PlSmallStr {
                fn from(value: $t) -> Self {
                    value.as_str().into()
                }
            }

            impl $t {
                pub fn as_str(&self) -> &'static str {
                    self.into()
                }
            }
        )+
    };
}

impl_col_name!(HistogramCol, BarplotCol, BoxplotCol);

/// The artifact files written per feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ArtifactKind {
    Histogram,
    Barplot,
    BoxplotSample,
}

// ================================================================================================
// Tables
// ================================================================================================

macro_rules! artifact_table {
    ($name:ident, $kind:expr, [$(($col:expr, $dtype:expr)),+ $(,)?]) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            df: DataFrame,
        }

        impl $name {
            pub fn new(df: DataFrame) -> Self {
                Self { df }
            }
        }

        impl Report for $name {
            fn as_df(&self) -> &DataFrame {
                &self.df
            }
        }

        impl ReportName for $name {
            fn base_name(&self) -> String {
                $kind.to_string()
            }
        }

        impl ToSchema for $name {
            fn to_schema() -> SchemaRef {
                Arc::new(Schema::from_iter([
                    $(Field::new(PlSmallStr::from($col), $dtype)),+
                ]))
            }
        }
    };
}

artifact_table!(
    Histogram,
    ArtifactKind::Histogram,
    [
        (HistogramCol::BinCenter, DataType::Float64),
        (HistogramCol::TargetLabel, DataType::String),
        (HistogramCol::Count, DataType::UInt32),
        (HistogramCol::RelFreq, DataType::Float64),
    ]
);

artifact_table!(
    Barplot,
    ArtifactKind::Barplot,
    [
        (BarplotCol::Value, DataType::Int64),
        (BarplotCol::TargetLabel, DataType::String),
        (BarplotCol::CountRows, DataType::UInt32),
    ]
);

artifact_table!(
    BoxplotSample,
    ArtifactKind::BoxplotSample,
    [
        (BoxplotCol::Value, DataType::Float64),
        (BoxplotCol::TargetLabel, DataType::String),
    ]
);

// ================================================================================================
// Writer
// ================================================================================================

/// What was written for one feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureArtifacts {
    pub feature: String,
    /// [`ArtifactKind::Histogram`] or [`ArtifactKind::Barplot`].
    pub distribution: ArtifactKind,
    pub sample_rows: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ArtifactReport {
    pub written: Vec<FeatureArtifacts>,
    /// Features whose artifacts could not be produced, with the error message.
    pub failed: Vec<(String, String)>,
    pub summary_rows: usize,
}

/// Precomputes the per-feature visualization tables read by the dashboard.
///
/// Layout: `<root>/<feature>/{histogram,barplot,boxplot_sample}.parquet` plus
/// `<root>/feature_summary.parquet`. Features are independent and written in parallel.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
    bins: usize,
    discrete_threshold: usize,
    sample_size: usize,
    seed: u64,
    mad_threshold: f64,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bins: DEFAULT_BINS,
            discrete_threshold: DISCRETE_THRESHOLD,
            sample_size: BOXPLOT_SAMPLE_SIZE,
            seed: SAMPLE_SEED,
            mad_threshold: crate::config::DEFAULT_MAD_THRESHOLD,
        }
    }

    pub fn with_bins(self, bins: usize) -> Self {
        Self {
            bins: bins.max(1),
            ..self
        }
    }

    pub fn with_sample_size(self, sample_size: usize) -> Self {
        Self {
            sample_size,
            ..self
        }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }

    pub fn with_mad_threshold(self, mad_threshold: f64) -> Self {
        Self {
            mad_threshold,
            ..self
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the artifacts of every numeric column of `df` and the feature summary.
    ///
    /// A feature that fails is logged and reported; the others are still written.
    #[tracing::instrument(skip_all, fields(root = %self.root.display()))]
    pub fn write(&self, df: &DataFrame) -> FeatureResult<ArtifactReport> {
        let labeled = self.with_target_label(df)?;
        let features = df
            .get_columns()
            .iter()
            .filter(|c| c.dtype().is_primitive_numeric())
            .map(|c| (c.name().clone(), c.dtype().clone()))
            .collect::<Vec<_>>();

        let results = features
            .par_iter()
            .map(|(name, dtype)| (name, self.write_feature(&labeled, name, dtype)))
            .collect::<Vec<_>>();

        let mut report = ArtifactReport::default();
        for (name, result) in results {
            match result {
                Ok(Some(artifacts)) => report.written.push(artifacts),
                Ok(None) => tracing::warn!(feature = %name, "Feature has no values; no artifacts"),
                Err(e) => {
                    tracing::error!(feature = %name, error = %e, "Artifact generation failed");
                    report.failed.push((name.to_string(), e.to_string()));
                }
            }
        }

        let summary = FeatureSummary::compute_with_threshold(df, self.mad_threshold)?;
        summary.to_parquet(&self.root, None, None)?;
        report.summary_rows = summary.as_df().height();

        tracing::info!(
            written = report.written.len(),
            failed = report.failed.len(),
            "Visualization artifacts written"
        );
        Ok(report)
    }

    fn with_target_label(&self, df: &DataFrame) -> FeatureResult<DataFrame> {
        let has_indicators = [RecordCol::WasBooked, RecordCol::WasClicked]
            .iter()
            .all(|c| df.column(c.as_str()).is_ok());
        if !has_indicators {
            tracing::warn!("Booking/click indicators missing; artifacts are not split by target");
            return Ok(df.clone());
        }
        io::collect(
            df.clone().lazy().with_column(TargetLabel::expr()),
            "target label",
        )
    }

    fn write_feature(
        &self,
        labeled: &DataFrame,
        feature: &PlSmallStr,
        dtype: &DataType,
    ) -> FeatureResult<Option<FeatureArtifacts>> {
        let dir = self.root.join(feature.as_str());
        let lf = self.values(labeled, feature);
        let present = io::collect(lf.clone(), "artifact values")?;
        if present.height() == 0 {
            return Ok(None);
        }

        let distinct = present
            .column(BoxplotCol::Value.as_str())
            .and_then(|c| c.n_unique())
            .map_err(|e| polars_to_feature_error("artifact cardinality", e))?;

        let distribution = if dtype.is_integer() && distinct <= self.discrete_threshold {
            Barplot::new(self.barplot(lf.clone())?).to_parquet(&dir, None, None)?;
            ArtifactKind::Barplot
        } else {
            Histogram::new(self.histogram(lf, &present)?).to_parquet(&dir, None, None)?;
            ArtifactKind::Histogram
        };
        remove_stale(&dir, distribution)?;

        let sample = self.sample(&present)?;
        let sample_rows = sample.height();
        BoxplotSample::new(sample).to_parquet(&dir, None, None)?;

        Ok(Some(FeatureArtifacts {
            feature: feature.to_string(),
            distribution,
            sample_rows,
        }))
    }

    /// Non-null values of `feature` as `value`, with the label when available.
    fn values(&self, labeled: &DataFrame, feature: &PlSmallStr) -> LazyFrame {
        let mut exprs = vec![col(feature.clone()).alias(BoxplotCol::Value)];
        if labeled.column(TARGET_LABEL).is_ok() {
            exprs.push(col(TARGET_LABEL));
        }
        labeled
            .clone()
            .lazy()
            .select(exprs)
            .filter(col(BoxplotCol::Value).is_not_null())
    }

    fn group_keys(&self, present: &DataFrame, key: Expr) -> Vec<Expr> {
        let mut keys = vec![key];
        if present.column(TARGET_LABEL).is_ok() {
            keys.push(col(TARGET_LABEL));
        }
        keys
    }

    fn barplot(&self, lf: LazyFrame) -> FeatureResult<DataFrame> {
        let mut values = lf.clone();
        let has_label = values
            .collect_schema()
            .map_err(|e| polars_to_feature_error("barplot schema", e))?
            .contains(TARGET_LABEL);

        let mut keys = vec![col(BoxplotCol::Value).cast(DataType::Int64).alias(BarplotCol::Value)];
        if has_label {
            keys.push(col(TARGET_LABEL));
        }
        io::collect(
            lf.group_by(keys)
                .agg([len().cast(DataType::UInt32).alias(BarplotCol::CountRows)])
                .sort([BarplotCol::Value.as_str()], SortMultipleOptions::default()),
            "barplot",
        )
    }

    /// Equal-width bins over [min, max]; a constant column falls into a single bin.
    fn histogram(&self, lf: LazyFrame, present: &DataFrame) -> FeatureResult<DataFrame> {
        let bounds = io::collect(
            lf.clone().select([
                col(BoxplotCol::Value).cast(DataType::Float64).min().alias("min"),
                col(BoxplotCol::Value).cast(DataType::Float64).max().alias("max"),
            ]),
            "histogram bounds",
        )?;
        let min = bounds.scalar_f64("min")?.unwrap_or(0.0);
        let max = bounds.scalar_f64("max")?.unwrap_or(min);

        let (bins, width) = if max > min {
            (self.bins, (max - min) / self.bins as f64)
        } else {
            (1, 0.0)
        };
        let last = (bins - 1) as i64;

        let bin = if width > 0.0 {
            let raw = ((col(BoxplotCol::Value).cast(DataType::Float64) - lit(min)) / lit(width))
                .floor()
                .cast(DataType::Int64);
            when(raw.clone().gt(lit(last))).then(lit(last)).otherwise(raw)
        } else {
            lit(0i64)
        };
        let center = lit(min) + (bin.clone().cast(DataType::Float64) + lit(0.5)) * lit(width);
        let center = if width > 0.0 { center } else { lit(min) };

        let counts = lf
            .group_by(self.group_keys(present, center.alias(HistogramCol::BinCenter)))
            .agg([len().cast(DataType::UInt32).alias(HistogramCol::Count)]);

        io::collect(
            counts
                .with_column(
                    (col(HistogramCol::Count).cast(DataType::Float64)
                        / col(HistogramCol::Count).cast(DataType::Float64).sum())
                    .alias(HistogramCol::RelFreq),
                )
                .sort(
                    [HistogramCol::BinCenter.as_str()],
                    SortMultipleOptions::default(),
                ),
            "histogram",
        )
    }

    /// Up to `sample_size` rows drawn without replacement, reproducible through the seed.
    fn sample(&self, present: &DataFrame) -> FeatureResult<DataFrame> {
        let height = present.height();
        if height <= self.sample_size {
            return as_float_values(present.clone());
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let picked = index::sample(&mut rng, height, self.sample_size)
            .into_iter()
            .map(|i| i as IdxSize)
            .sorted()
            .collect::<Vec<_>>();
        let idx = IdxCa::from_vec("idx".into(), picked);

        let sampled = present
            .take(&idx)
            .map_err(|e| polars_to_feature_error("boxplot sample", e))?;
        as_float_values(sampled)
    }
}

/// Removes the distribution table of the other kind left behind by an earlier run.
fn remove_stale(dir: &Path, written: ArtifactKind) -> FeatureResult<()> {
    let stale = match written {
        ArtifactKind::Barplot => ArtifactKind::Histogram,
        ArtifactKind::Histogram => ArtifactKind::Barplot,
        ArtifactKind::BoxplotSample => return Ok(()),
    };
    let path = dir.join(artifact_file(stale));
    if path.is_file() {
        fs::remove_file(&path).map_err(IoError::Io)?;
        tracing::debug!(path = %path.display(), "Removed stale distribution table");
    }
    Ok(())
}

fn as_float_values(df: DataFrame) -> FeatureResult<DataFrame> {
    io::collect(
        df.lazy()
            .with_column(col(BoxplotCol::Value).cast(DataType::Float64)),
        "boxplot sample",
    )
}

// ================================================================================================
// Store
// ================================================================================================

/// Read side of the artifact layout.
///
/// Every read returns `None` for a missing or unreadable artifact so that callers can treat
/// the feature as unavailable.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Features with at least one artifact, sorted by name.
    pub fn features(&self) -> FeatureResult<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root).map_err(IoError::Io)?;
        Ok(entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .filter(|p| {
                ArtifactKind::iter().any(|k| p.join(artifact_file(k)).is_file())
            })
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .sorted()
            .collect())
    }

    pub fn histogram(&self, feature: &str) -> Option<Histogram> {
        self.read::<Histogram>(feature, ArtifactKind::Histogram)
            .map(Histogram::new)
    }

    pub fn barplot(&self, feature: &str) -> Option<Barplot> {
        self.read::<Barplot>(feature, ArtifactKind::Barplot)
            .map(Barplot::new)
    }

    pub fn boxplot_sample(&self, feature: &str) -> Option<BoxplotSample> {
        self.read::<BoxplotSample>(feature, ArtifactKind::BoxplotSample)
            .map(BoxplotSample::new)
    }

    pub fn summary(&self) -> Option<FeatureSummary> {
        let path = self.root.join(format!(
            "feature_summary.{}",
            FileExtension::Parquet
        ));
        read_table::<FeatureSummary>(&path).map(FeatureSummary::from_df)
    }

    /// The feature summary as an array of row objects.
    pub fn summary_json(&self) -> FeatureResult<Option<Value>> {
        self.summary().map(|s| s.to_json()).transpose()
    }

    fn read<T: ToSchema>(&self, feature: &str, kind: ArtifactKind) -> Option<DataFrame> {
        read_table::<T>(&self.root.join(feature).join(artifact_file(kind)))
    }
}

fn artifact_file(kind: ArtifactKind) -> String {
    format!("{kind}.{}", FileExtension::Parquet)
}

/// Reads an artifact and checks it against the table layout. The target label is optional.
fn read_table<T: ToSchema>(path: &Path) -> Option<DataFrame> {
    let df = read_optional(path)?;
    let missing = T::missing_columns(df.schema(), &[TARGET_LABEL]);
    if !missing.is_empty() {
        tracing::warn!(
            path = %path.display(),
            columns = ?missing,
            "Artifact layout out of date; treated as unavailable"
        );
        return None;
    }
    Some(df)
}

fn read_optional(path: &Path) -> Option<DataFrame> {
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "Artifact not available");
        return None;
    }
    match io::read_parquet(path) {
        Ok(df) => Some(df),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable artifact treated as unavailable");
            None
        }
    }
}
