use std::sync::Arc;

use polars::{
    df,
    frame::DataFrame,
    prelude::{DataType, Expr, Field, IntoLazy, PlSmallStr, Schema, SchemaRef, col, len, lit},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    config::DEFAULT_MAD_THRESHOLD,
    error::FeatureResult,
    io,
    polars_ext::{DataFrameExt, ExprExt},
    report::io::{Report, ReportName, ToSchema},
    stats::mad::mad_outlier_count_expr,
};

/// Decimal places kept in the summary for display stability.
const PRECISION: i32 = 4;

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
    PartialOrd,
    Ord,
    EnumIter,
    EnumCount,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum SummaryCol {
    Feature,
    Mean,
    Std,
    Min,
    Max,
    /// Fraction of null values.
    NullPct,
    /// Fraction of exact zeros.
    ZeroPct,
    OutlierCount,
    NUnique,
    Skew,
    Kurt,
}

impl From<SummaryCol> for PlSmallStr {
    fn from(value: SummaryCol) -> Self {
        value.as_str().into()
    }
}

impl SummaryCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    fn dtype(&self) -> DataType {
        match self {
            SummaryCol::Feature => DataType::String,
            SummaryCol::OutlierCount | SummaryCol::NUnique => DataType::UInt32,
            _ => DataType::Float64,
        }
    }
}

impl ToSchema for FeatureSummary {
    fn to_schema() -> SchemaRef {
        Arc::new(Schema::from_iter(
            SummaryCol::iter().map(|c| Field::new(c.into(), c.dtype())),
        ))
    }
}

/// One row per numeric feature with distribution statistics.
///
/// # Columns
///
/// | feature     | mean   | std   | min | max  | null_pct | zero_pct | outlier_count | n_unique | skew   | kurt   |
/// |-------------|--------|-------|-----|------|----------|----------|---------------|----------|--------|--------|
/// | click_prob  | 0.0447 | 0.081 | 0.0 | 1.0  | 0.0      | 0.7012   | 1532          | 88       | 4.1203 | 25.771 |
///
/// Skewness and kurtosis are the third and fourth central moments over the sample standard
/// deviation raised to the same power; they are null for constant columns.
#[derive(Debug, Clone)]
pub struct FeatureSummary {
    df: DataFrame,
}

impl Report for FeatureSummary {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }
}

impl ReportName for FeatureSummary {
    fn base_name(&self) -> String {
        "feature_summary".to_string()
    }
}

impl FeatureSummary {
    /// Profiles every numeric column of `df` with the default MAD threshold.
    pub fn compute(df: &DataFrame) -> FeatureResult<Self> {
        Self::compute_with_threshold(df, DEFAULT_MAD_THRESHOLD)
    }

    /// Profiles every numeric column of `df` in a single pass.
    ///
    /// Outliers are counted with the MAD rule at `threshold`, without touching the data.
    #[tracing::instrument(skip(df), fields(columns = df.width()))]
    pub fn compute_with_threshold(df: &DataFrame, threshold: f64) -> FeatureResult<Self> {
        let features = df
            .get_columns()
            .iter()
            .filter(|c| c.dtype().is_primitive_numeric())
            .map(|c| c.name().clone())
            .collect::<Vec<_>>();

        if features.is_empty() {
            tracing::warn!("No numeric columns to summarize");
            return Ok(Self {
                df: DataFrame::empty_with_schema(&Self::to_schema()),
            });
        }

        let exprs = features
            .iter()
            .enumerate()
            .flat_map(|(i, name)| stat_exprs(i, name, threshold))
            .collect::<Vec<_>>();
        let stats = io::collect(df.clone().lazy().select(exprs), "feature summary")?;

        let mut columns: [Vec<Option<f64>>; 10] = Default::default();
        for i in 0..features.len() {
            for (slot, stat) in SummaryCol::iter().skip(1).enumerate() {
                let value = stats.scalar_f64(&stat_alias(i, stat))?;
                columns[slot].push(match stat {
                    SummaryCol::OutlierCount | SummaryCol::NUnique => value,
                    _ => value.map(round),
                });
            }
        }
        let [mean, std, min, max, null_pct, zero_pct, outliers, n_unique, skew, kurt] = columns;
        let as_u32 = |v: Vec<Option<f64>>| v.into_iter().map(|x| x.map(|x| x as u32)).collect::<Vec<_>>();
        let names = features.iter().map(|f| f.to_string()).collect::<Vec<_>>();

        let df = df![
            SummaryCol::Feature.as_str() => names,
            SummaryCol::Mean.as_str() => mean,
            SummaryCol::Std.as_str() => std,
            SummaryCol::Min.as_str() => min,
            SummaryCol::Max.as_str() => max,
            SummaryCol::NullPct.as_str() => null_pct,
            SummaryCol::ZeroPct.as_str() => zero_pct,
            SummaryCol::OutlierCount.as_str() => as_u32(outliers),
            SummaryCol::NUnique.as_str() => as_u32(n_unique),
            SummaryCol::Skew.as_str() => skew,
            SummaryCol::Kurt.as_str() => kurt,
        ]
        .map_err(|e| crate::polars_ext::polars_to_feature_error("feature summary frame", e))?;

        tracing::info!(features = df.height(), "Feature summary computed");
        Ok(Self { df })
    }

    /// Wraps a summary that was read back from storage.
    pub fn from_df(df: DataFrame) -> Self {
        Self { df }
    }

    pub fn features(&self) -> Vec<String> {
        self.df
            .column(SummaryCol::Feature.as_str())
            .ok()
            .and_then(|c| c.str().ok().cloned())
            .map(|ca| ca.into_iter().flatten().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

fn stat_alias(i: usize, stat: SummaryCol) -> String {
    format!("{i}:{stat}")
}

fn stat_exprs(i: usize, name: &PlSmallStr, threshold: f64) -> Vec<Expr> {
    let x = col(name.clone()).cast(DataType::Float64);
    let rows = len().cast(DataType::Float64);
    let std = x.clone().std(1);
    let centered = x.clone() - x.clone().mean();
    let cubed = centered.clone() * centered.clone() * centered.clone();
    let fourth = cubed.clone() * centered;

    SummaryCol::iter()
        .skip(1)
        .map(|stat| {
            let expr = match stat {
                SummaryCol::Mean => x.clone().mean(),
                SummaryCol::Std => std.clone(),
                SummaryCol::Min => x.clone().min(),
                SummaryCol::Max => x.clone().max(),
                SummaryCol::NullPct => x
                    .clone()
                    .null_count()
                    .cast(DataType::Float64)
                    .safe_div(rows.clone(), None),
                SummaryCol::ZeroPct => x
                    .clone()
                    .eq(lit(0.0))
                    .cast(DataType::Float64)
                    .sum()
                    .safe_div(rows.clone(), None),
                SummaryCol::OutlierCount => mad_outlier_count_expr(x.clone(), threshold),
                SummaryCol::NUnique => x.clone().drop_nulls().n_unique().cast(DataType::UInt32),
                SummaryCol::Skew => cubed
                    .clone()
                    .mean()
                    .safe_div(std.clone() * std.clone() * std.clone(), None),
                SummaryCol::Kurt => fourth
                    .clone()
                    .mean()
                    .safe_div(std.clone() * std.clone() * std.clone() * std.clone(), None),
                SummaryCol::Feature => lit(name.as_str()),
            };
            expr.alias(stat_alias(i, stat))
        })
        .collect()
}

fn round(v: f64) -> f64 {
    let scale = 10f64.powi(PRECISION);
    (v * scale).round() / scale
}
