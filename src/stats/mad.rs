use polars::prelude::{DataType, Expr, LazyFrame, Null, col, lit, when};

use crate::{
    config::{DEFAULT_MAD_THRESHOLD, OutlierConfig},
    error::FeatureResult,
    io,
    polars_ext::DataFrameExt,
};

/// Guard added to the MAD wherever it is used as a divisor-like scale in read-only statistics.
pub const MAD_EPSILON: f64 = 1e-6;

const MEDIAN: &str = "__median";
const MAD: &str = "__mad";

/// Robust location and scale of a column, computed once per filter pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MadStats {
    pub median: f64,
    pub mad: f64,
}

impl MadStats {
    /// Absolute distance from the median beyond which a value counts as an outlier.
    pub fn cutoff(&self, threshold: f64) -> f64 {
        threshold * self.mad
    }
}

/// Median Absolute Deviation outlier filter.
///
/// Outliers are replaced with null; rows are never dropped so joins and group operations
/// downstream stay aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct MadFilter {
    column: String,
    threshold: f64,
    output: Option<String>,
}

impl MadFilter {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            threshold: DEFAULT_MAD_THRESHOLD,
            output: None,
        }
    }

    /// One filter per configured column.
    pub fn from_config(cfg: &OutlierConfig) -> Vec<Self> {
        cfg.columns
            .iter()
            .map(|c| {
                let filter = MadFilter::new(c.as_str()).with_threshold(cfg.threshold);
                match &cfg.output_suffix {
                    Some(suffix) => filter.with_output(format!("{c}{suffix}")),
                    None => filter,
                }
            })
            .collect()
    }

    pub fn with_threshold(self, threshold: f64) -> Self {
        Self { threshold, ..self }
    }

    /// Writes the filtered values to `output` instead of overwriting the column.
    pub fn with_output(self, output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..self
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn output_name(&self) -> &str {
        self.output.as_deref().unwrap_or(&self.column)
    }

    /// Computes median and MAD over the current state of the column.
    ///
    /// Returns `None` when the column has no non-null values.
    pub fn fit(&self, lf: &LazyFrame) -> FeatureResult<Option<MadStats>> {
        let x = col(self.column.as_str()).cast(DataType::Float64);
        let medians = io::collect(
            lf.clone().select([x.clone().median().alias(MEDIAN)]),
            "MAD median",
        )?;
        let Some(median) = medians.scalar_f64(MEDIAN)? else {
            return Ok(None);
        };

        let deviations = io::collect(
            lf.clone()
                .select([(x - lit(median)).abs().median().alias(MAD)]),
            "MAD deviation",
        )?;
        let mad = deviations.scalar_f64(MAD)?.unwrap_or(0.0);

        Ok(Some(MadStats { median, mad }))
    }

    /// Nulls the outliers of the column using statistics fitted on `lf`.
    ///
    /// A column with zero MAD (constant or near-constant) or without values is left
    /// unfiltered and a warning is logged.
    #[tracing::instrument(skip(self, lf), fields(column = %self.column, threshold = self.threshold))]
    pub fn apply(&self, lf: LazyFrame) -> FeatureResult<LazyFrame> {
        let Some(stats) = self.fit(&lf)? else {
            tracing::warn!("Column has no values; outlier filter skipped");
            return Ok(self.passthrough(lf));
        };

        if stats.mad == 0.0 {
            tracing::warn!(
                median = stats.median,
                "MAD is zero; column left unfiltered"
            );
            return Ok(self.passthrough(lf));
        }

        tracing::debug!(median = stats.median, mad = stats.mad, "Fitted MAD statistics");
        Ok(lf.with_column(self.filtered_expr(stats)))
    }

    /// Number of values `apply` would null, without mutating anything.
    pub fn count_outliers(&self, lf: &LazyFrame) -> FeatureResult<u32> {
        let Some(stats) = self.fit(lf)? else {
            return Ok(0);
        };
        if stats.mad == 0.0 {
            return Ok(0);
        }

        let counted = io::collect(
            lf.clone().select([self
                .outlier_mask(stats)
                .cast(DataType::UInt32)
                .sum()
                .alias("__outliers")]),
            "MAD outlier count",
        )?;
        Ok(counted.scalar_f64("__outliers")?.unwrap_or(0.0) as u32)
    }

    fn outlier_mask(&self, stats: MadStats) -> Expr {
        (col(self.column.as_str()).cast(DataType::Float64) - lit(stats.median))
            .abs()
            .gt(lit(stats.cutoff(self.threshold)))
    }

    fn filtered_expr(&self, stats: MadStats) -> Expr {
        when(self.outlier_mask(stats))
            .then(lit(Null {}))
            .otherwise(col(self.column.as_str()))
            .alias(self.output_name())
    }

    fn passthrough(&self, lf: LazyFrame) -> LazyFrame {
        match &self.output {
            Some(out) => lf.with_column(col(self.column.as_str()).alias(out.as_str())),
            None => lf,
        }
    }
}

/// Read-only count of MAD outliers within one aggregation context.
///
/// Uses the column's own median and MAD with [`MAD_EPSILON`] added to the scale. A column
/// whose MAD is zero but which still holds a few off-median values counts each of them as
/// an outlier; a constant column counts none.
pub fn mad_outlier_count_expr(x: Expr, threshold: f64) -> Expr {
    let x = x.cast(DataType::Float64);
    let median = x.clone().median();
    let deviation = (x - median).abs();
    let mad = deviation.clone().median();
    deviation
        .gt(lit(threshold) * (mad + lit(MAD_EPSILON)))
        .cast(DataType::UInt32)
        .sum()
}

#[cfg(test)]
mod tests {
    use polars::{
        df,
        prelude::{DataFrame, IntoLazy},
    };

    use super::*;

    fn prices() -> DataFrame {
        df!["price" => &[10.0, 12.0, 11.0, 1000.0, 9.0]].expect("Failed to create DF")
    }

    #[test]
    fn fit_computes_median_and_mad_once() {
        let stats = MadFilter::new("price")
            .fit(&prices().lazy())
            .expect("fit")
            .expect("stats");
        assert_eq!(stats.median, 11.0);
        assert_eq!(stats.mad, 1.0);
        assert_eq!(stats.cutoff(3.0), 3.0);
    }

    #[test]
    fn extreme_value_is_nulled_and_rows_are_kept() {
        let out = MadFilter::new("price")
            .with_threshold(3.0)
            .apply(prices().lazy())
            .expect("apply")
            .collect()
            .expect("collect");

        assert_eq!(out.height(), 5, "Rows must never be dropped");
        let price = out.column("price").expect("price").f64().expect("f64");
        let values = price.into_iter().collect::<Vec<_>>();
        assert_eq!(
            values,
            vec![Some(10.0), Some(12.0), Some(11.0), None, Some(9.0)]
        );
    }

    #[test]
    fn output_suffix_keeps_original_column() {
        let out = MadFilter::new("price")
            .with_threshold(3.0)
            .with_output("price_clean")
            .apply(prices().lazy())
            .expect("apply")
            .collect()
            .expect("collect");

        assert_eq!(out.column("price").expect("price").null_count(), 0);
        assert_eq!(out.column("price_clean").expect("clean").null_count(), 1);
    }

    #[test]
    fn zero_mad_leaves_column_unfiltered() {
        let df = df!["price" => &[5.0, 5.0, 5.0, 5.0, 90.0]].expect("Failed to create DF");
        let out = MadFilter::new("price")
            .with_threshold(3.0)
            .apply(df.clone().lazy())
            .expect("apply")
            .collect()
            .expect("collect");

        assert!(out.equals_missing(&df), "Degenerate MAD must not filter");
    }

    #[test]
    fn all_null_column_is_skipped() {
        let df = df!["price" => &[None::<f64>, None]].expect("Failed to create DF");
        let filter = MadFilter::new("price");
        assert_eq!(filter.fit(&df.clone().lazy()).expect("fit"), None);
        let out = filter.apply(df.lazy()).expect("apply").collect().expect("collect");
        assert_eq!(out.height(), 2);
    }

    #[test]
    fn outlier_count_is_monotone_in_threshold() {
        let df = df![
            "price" => &[1.0, 2.0, 2.5, 3.0, 3.2, 4.0, 7.0, 11.0, 19.0, 40.0, 95.0]
        ]
        .expect("Failed to create DF");
        let lf = df.lazy();

        let counts = [1.0, 2.0, 3.0, 3.5, 5.0, 10.0]
            .iter()
            .map(|t| {
                MadFilter::new("price")
                    .with_threshold(*t)
                    .count_outliers(&lf)
                    .expect("count")
            })
            .collect::<Vec<_>>();

        assert!(
            counts.windows(2).all(|w| w[0] >= w[1]),
            "Counts must not increase with the threshold: {counts:?}"
        );
        assert!(counts[0] > 0);
    }

    #[test]
    fn read_only_count_matches_filter_on_regular_data() {
        let lf = prices().lazy();
        let counted = io::collect(
            lf.clone()
                .select([mad_outlier_count_expr(col("price"), 3.0).alias("n")]),
            "test",
        )
        .expect("collect");
        let via_expr = counted.scalar_f64("n").expect("scalar");

        let via_filter = MadFilter::new("price")
            .with_threshold(3.0)
            .count_outliers(&lf)
            .expect("count");

        assert_eq!(via_expr, Some(via_filter as f64));
    }

    #[test]
    fn zero_mad_count_flags_only_off_median_values() {
        let count = |values: &[f64]| {
            let df = df!["price" => values].expect("Failed to create DF");
            let out = io::collect(
                df.lazy()
                    .select([mad_outlier_count_expr(col("price"), 3.0).alias("n")]),
                "test",
            )
            .expect("collect");
            out.scalar_f64("n").expect("scalar")
        };

        assert_eq!(count(&[5.0, 5.0, 5.0, 5.0, 90.0, 4.0]), Some(2.0));
        assert_eq!(count(&[5.0, 5.0, 5.0]), Some(0.0));
    }
}
