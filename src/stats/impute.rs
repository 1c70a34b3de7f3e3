use polars::prelude::{DataType, Expr, LazyFrame, PlSmallStr, col, lit};

use crate::{
    config::{GlobalImputationSpec, ImputationSpec},
    error::FeatureResult,
    io,
    polars_ext::DataFrameExt,
    stats::Aggregator,
};

/// Fills nulls with a statistic of the row's group.
///
/// The statistic is computed over non-null values only. A group without any non-null value
/// keeps its nulls; a column-wide fallback must be requested explicitly with
/// [`GlobalImputer`].
#[derive(Debug, Clone, PartialEq)]
pub struct GroupImputer {
    column: String,
    group_by: Vec<String>,
    aggregator: Aggregator,
}

impl GroupImputer {
    pub fn new(column: impl Into<String>, group_by: Vec<String>, aggregator: Aggregator) -> Self {
        Self {
            column: column.into(),
            group_by,
            aggregator,
        }
    }

    pub fn from_spec(spec: &ImputationSpec) -> Self {
        Self::new(spec.column.as_str(), spec.group_by.clone(), spec.aggregator)
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    pub fn apply(&self, lf: LazyFrame) -> LazyFrame {
        lf.with_column(self.expr())
    }

    pub fn expr(&self) -> Expr {
        let target = col(self.column.as_str());
        let filled = target
            .clone()
            .cast(DataType::Float64)
            .fill_null(self.aggregator.apply(target.clone()).over(self.group_exprs()));
        filled.alias(self.column.as_str())
    }

    /// Number of groups whose target column has no non-null value.
    pub fn unfilled_groups(&self, lf: &LazyFrame) -> FeatureResult<usize> {
        let target = col(self.column.as_str());
        let per_group = lf
            .clone()
            .group_by(self.group_exprs())
            .agg([target.clone().count().alias("__present")])
            .filter(col("__present").eq(lit(0)))
            .select([col("__present").len().alias("__empty")]);
        let counted = io::collect(per_group, "imputation diagnostics")?;
        Ok(counted.scalar_f64("__empty")?.unwrap_or(0.0) as usize)
    }

    fn group_exprs(&self) -> Vec<Expr> {
        self.group_by
            .iter()
            .map(|g| col(PlSmallStr::from(g.as_str())))
            .collect()
    }
}

/// Column-wide imputation, applied only when configured.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalImputer {
    column: String,
    aggregator: Aggregator,
}

impl GlobalImputer {
    pub fn new(column: impl Into<String>, aggregator: Aggregator) -> Self {
        Self {
            column: column.into(),
            aggregator,
        }
    }

    pub fn from_spec(spec: &GlobalImputationSpec) -> Self {
        Self::new(spec.column.as_str(), spec.aggregator)
    }

    pub fn apply(&self, lf: LazyFrame) -> LazyFrame {
        let target = col(self.column.as_str());
        lf.with_column(
            target
                .clone()
                .cast(DataType::Float64)
                .fill_null(self.aggregator.apply(target))
                .alias(self.column.as_str()),
        )
    }
}
