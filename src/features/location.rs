use polars::prelude::{DataType, Expr, LazyFrame, PlSmallStr, col, lit};

use crate::{
    error::FeatureResult,
    features::{BatchKind, FeatureBatch, FeatureCol, names},
    polars_ext::ExprExt,
    schema::RecordCol,
};

/// Rescaled location desirability scores.
///
/// Min/max/mean/std are column-wide. A constant column has no spread, so its rescaled
/// values are null.
#[derive(Debug, Clone)]
pub struct LocationBatch {
    primary: PlSmallStr,
    secondary: PlSmallStr,
}

impl Default for LocationBatch {
    fn default() -> Self {
        Self {
            primary: RecordCol::LocationScorePrimary.name(),
            secondary: RecordCol::LocationScoreSecondary.name(),
        }
    }
}

impl LocationBatch {
    pub fn exprs(&self) -> Vec<Expr> {
        let primary = col(self.primary.clone()).cast(DataType::Float64);
        let secondary = col(self.secondary.clone()).cast(DataType::Float64);

        let primary_norm = min_max(primary.clone());
        let secondary_norm = min_max(secondary.clone());
        let primary_z = z_score(primary.clone());
        let secondary_z = z_score(secondary.clone());

        vec![
            primary_norm.clone().alias(FeatureCol::LocationScorePrimaryNorm),
            secondary_norm
                .clone()
                .alias(FeatureCol::LocationScoreSecondaryNorm),
            ((primary_norm + secondary_norm) / lit(2.0)).alias(FeatureCol::LocationScoreMeanNorm),
            primary_z.clone().alias(FeatureCol::LocationScorePrimaryZscore),
            secondary_z
                .clone()
                .alias(FeatureCol::LocationScoreSecondaryZscore),
            ((primary_z + secondary_z) / lit(2.0)).alias(FeatureCol::LocationScoreMeanStd),
            (primary - secondary).alias(FeatureCol::LocationScoreDiff),
        ]
    }
}

impl FeatureBatch for LocationBatch {
    fn kind(&self) -> BatchKind {
        BatchKind::Location
    }

    fn inputs(&self) -> Vec<PlSmallStr> {
        vec![self.primary.clone(), self.secondary.clone()]
    }

    fn outputs(&self) -> Vec<PlSmallStr> {
        names([
            FeatureCol::LocationScorePrimaryNorm,
            FeatureCol::LocationScoreSecondaryNorm,
            FeatureCol::LocationScoreMeanNorm,
            FeatureCol::LocationScorePrimaryZscore,
            FeatureCol::LocationScoreSecondaryZscore,
            FeatureCol::LocationScoreMeanStd,
            FeatureCol::LocationScoreDiff,
        ])
    }

    fn apply(&self, lf: LazyFrame) -> FeatureResult<LazyFrame> {
        Ok(lf.with_columns(self.exprs()))
    }
}

fn min_max(x: Expr) -> Expr {
    let min = x.clone().min();
    let range = x.clone().max() - min.clone();
    (x - min).safe_div(range, None)
}

fn z_score(x: Expr) -> Expr {
    let mean = x.clone().mean();
    let std = x.clone().std(1);
    (x - mean).safe_div(std, None)
}
