use polars::prelude::{DataType, Expr, LazyFrame, Null, PlSmallStr, col, lit, when};

use crate::{
    error::FeatureResult,
    features::{BatchKind, FeatureBatch, FeatureCol, names},
    schema::RecordCol,
};

// ================================================================================================
// Search Context
// ================================================================================================

/// Party size and trip shape of the search.
#[derive(Debug, Clone, Default)]
pub struct SearchContextBatch;

impl SearchContextBatch {
    pub fn exprs(&self) -> Vec<Expr> {
        let guests = col(RecordCol::NumAdults).cast(DataType::Int16)
            + col(RecordCol::NumChildren).cast(DataType::Int16);
        let rooms = col(RecordCol::NumRooms).cast(DataType::Float64);

        vec![
            guests.clone().alias(FeatureCol::TotalGuests),
            bucket(
                col(RecordCol::StayDuration),
                &[(2, "short"), (5, "medium")],
                "long",
            )
            .alias(FeatureCol::StayDurationBucket),
            bucket(
                col(RecordCol::DaysUntilCheckin),
                &[(3, "last_minute"), (14, "short_term")],
                "long_term",
            )
            .alias(FeatureCol::DaysUntilCheckinBucket),
            (rooms / guests.cast(DataType::Float64).clip(lit(1.0), lit(f64::MAX)))
                .alias(FeatureCol::RoomToGuestRatio),
        ]
    }
}

impl FeatureBatch for SearchContextBatch {
    fn kind(&self) -> BatchKind {
        BatchKind::SearchContext
    }

    fn inputs(&self) -> Vec<PlSmallStr> {
        names([
            RecordCol::NumAdults,
            RecordCol::NumChildren,
            RecordCol::NumRooms,
            RecordCol::StayDuration,
            RecordCol::DaysUntilCheckin,
        ])
    }

    fn outputs(&self) -> Vec<PlSmallStr> {
        names([
            FeatureCol::TotalGuests,
            FeatureCol::StayDurationBucket,
            FeatureCol::DaysUntilCheckinBucket,
            FeatureCol::RoomToGuestRatio,
        ])
    }

    fn apply(&self, lf: LazyFrame) -> FeatureResult<LazyFrame> {
        Ok(lf.with_columns(self.exprs()))
    }
}

/// Labels `x` by the first exclusive upper bound it falls under, `last` otherwise.
fn bucket(x: Expr, bounds: &[(i32, &'static str)], last: &'static str) -> Expr {
    let tail = when(x.clone().is_not_null())
        .then(lit(last))
        .otherwise(lit(Null {}));
    bounds
        .iter()
        .rev()
        .fold(tail, |rest, (bound, label)| {
            when(x.clone().lt(lit(*bound)))
                .then(lit(*label))
                .otherwise(rest)
        })
        .cast(DataType::String)
}

// ================================================================================================
// User History
// ================================================================================================

/// Offer relative to the visitor's booking history.
#[derive(Debug, Clone, Default)]
pub struct UserHistoryBatch;

impl UserHistoryBatch {
    pub fn exprs(&self) -> Vec<Expr> {
        let hist_price = col(RecordCol::UserHistAvgPrice).cast(DataType::Float64);
        let hist_stars = col(RecordCol::UserHistAvgStars).cast(DataType::Float64);

        vec![
            hist_price
                .clone()
                .is_not_null()
                .cast(DataType::Int8)
                .alias(FeatureCol::HasUserPriceHistory),
            hist_stars
                .clone()
                .is_not_null()
                .cast(DataType::Int8)
                .alias(FeatureCol::HasUserRatingHistory),
            (col(RecordCol::DisplayPrice).cast(DataType::Float64) - hist_price)
                .alias(FeatureCol::PriceDiffVsUserHistory),
            (col(RecordCol::HotelStarRating).cast(DataType::Float64) - hist_stars)
                .alias(FeatureCol::StarDiffVsUserHistory),
        ]
    }
}

impl FeatureBatch for UserHistoryBatch {
    fn kind(&self) -> BatchKind {
        BatchKind::UserHistory
    }

    fn inputs(&self) -> Vec<PlSmallStr> {
        names([
            RecordCol::UserHistAvgPrice,
            RecordCol::UserHistAvgStars,
            RecordCol::DisplayPrice,
            RecordCol::HotelStarRating,
        ])
    }

    fn outputs(&self) -> Vec<PlSmallStr> {
        names([
            FeatureCol::HasUserPriceHistory,
            FeatureCol::HasUserRatingHistory,
            FeatureCol::PriceDiffVsUserHistory,
            FeatureCol::StarDiffVsUserHistory,
        ])
    }

    fn apply(&self, lf: LazyFrame) -> FeatureResult<LazyFrame> {
        Ok(lf.with_columns(self.exprs()))
    }
}
