use polars::prelude::{DataType, Expr, LazyFrame, PlSmallStr, col, lit, max_horizontal};

use crate::{
    error::FeatureResult,
    features::{BatchKind, FeatureBatch, FeatureCol, names},
    polars_ext::{ExprExt, polars_to_feature_error},
    schema::{CompetitorCol, MAX_COMPETITORS},
};

/// Row-wise comparison of the offer against up to eight competitors.
///
/// Reductions skip null slots: a missing comparison is neither counted nor averaged.
#[derive(Debug, Clone)]
pub struct CompetitorBatch {
    slots: u8,
}

impl Default for CompetitorBatch {
    fn default() -> Self {
        Self::new(MAX_COMPETITORS)
    }
}

impl CompetitorBatch {
    pub fn new(slots: u8) -> Self {
        Self {
            slots: slots.clamp(1, MAX_COMPETITORS),
        }
    }

    fn slot_cols(&self, kind: CompetitorCol) -> Vec<Expr> {
        (1..=self.slots).map(|i| col(kind.name(i))).collect()
    }

    pub fn exprs(&self) -> FeatureResult<Vec<Expr>> {
        let rates = self.slot_cols(CompetitorCol::Rate);
        let inv = self.slot_cols(CompetitorCol::Inv);
        let diffs = self
            .slot_cols(CompetitorCol::RatePercentDiff)
            .into_iter()
            .map(|e| e.cast(DataType::Float64))
            .collect::<Vec<_>>();

        let rate_eq = |v: i32| count_where(&rates, |e| e.eq(lit(v)));
        let valid_diffs = count_where(&diffs, Expr::is_not_null);
        let diff_sum = sum_present(&diffs);
        let max_diff = max_horizontal(diffs)
            .map_err(|e| polars_to_feature_error("competitor max reduction", e))?;

        Ok(vec![
            rate_eq(1).alias(FeatureCol::NumCompCheaper),
            rate_eq(0).alias(FeatureCol::NumCompSamePrice),
            rate_eq(-1).alias(FeatureCol::NumCompMoreExpensive),
            count_where(&rates, Expr::is_not_null).alias(FeatureCol::NumValidCompRate),
            count_where(&inv, |e| e.eq(lit(1))).alias(FeatureCol::NumCompetitorUnavailable),
            count_where(&inv, Expr::is_not_null).alias(FeatureCol::NumValidCompInv),
            diff_sum
                .safe_div(valid_diffs, None)
                .alias(FeatureCol::MeanCompPriceDiffPct),
            max_diff.alias(FeatureCol::MaxCompPriceDiffPct),
        ])
    }
}

impl FeatureBatch for CompetitorBatch {
    fn kind(&self) -> BatchKind {
        BatchKind::Competitor
    }

    fn inputs(&self) -> Vec<PlSmallStr> {
        (1..=self.slots)
            .flat_map(|i| {
                [
                    CompetitorCol::Rate,
                    CompetitorCol::Inv,
                    CompetitorCol::RatePercentDiff,
                ]
                .map(|c| PlSmallStr::from(c.name(i)))
            })
            .collect()
    }

    fn outputs(&self) -> Vec<PlSmallStr> {
        names([
            FeatureCol::NumCompCheaper,
            FeatureCol::NumCompSamePrice,
            FeatureCol::NumCompMoreExpensive,
            FeatureCol::NumValidCompRate,
            FeatureCol::NumCompetitorUnavailable,
            FeatureCol::NumValidCompInv,
            FeatureCol::MeanCompPriceDiffPct,
            FeatureCol::MaxCompPriceDiffPct,
        ])
    }

    fn apply(&self, lf: LazyFrame) -> FeatureResult<LazyFrame> {
        Ok(lf.with_columns(self.exprs()?))
    }
}

/// Number of slots satisfying `pred`; a null predicate counts as false.
fn count_where(cols: &[Expr], pred: impl Fn(Expr) -> Expr) -> Expr {
    cols.iter()
        .map(|e| pred(e.clone()).cast(DataType::Int8).fill_null(lit(0)))
        .reduce(|acc, e| acc + e)
        .unwrap_or_else(|| lit(0))
        .cast(DataType::Int8)
}

fn sum_present(cols: &[Expr]) -> Expr {
    cols.iter()
        .map(|e| e.clone().fill_null(lit(0.0)))
        .reduce(|acc, e| acc + e)
        .unwrap_or_else(|| lit(0.0))
}
