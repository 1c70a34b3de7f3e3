use polars::prelude::{DataType, Expr, LazyFrame, PlSmallStr, col, len, lit};

use crate::{
    aggregate::GroupJoin,
    error::FeatureResult,
    features::{BatchKind, FeatureBatch, FeatureCol, names},
    schema::RecordCol,
};

/// Per-hotel engagement rates and display statistics, plus a per-search position flag.
///
/// Rates divide by the number of impressions in the hotel's group, so a hotel seen twice
/// and clicked once has a click probability of 0.5 regardless of the rest of the table.
#[derive(Debug, Clone)]
pub struct BookingBatch {
    entity_key: PlSmallStr,
    query_key: PlSmallStr,
    clicked: PlSmallStr,
    booked: PlSmallStr,
    position: PlSmallStr,
}

impl Default for BookingBatch {
    fn default() -> Self {
        Self {
            entity_key: RecordCol::HotelId.name(),
            query_key: RecordCol::SearchId.name(),
            clicked: RecordCol::WasClicked.name(),
            booked: RecordCol::WasBooked.name(),
            position: RecordCol::DisplayPosition.name(),
        }
    }
}

impl BookingBatch {
    fn entity_aggs(&self) -> Vec<Expr> {
        let impressions = len().cast(DataType::Float64);
        let position = col(self.position.clone()).cast(DataType::Float64);
        vec![
            (col(self.clicked.clone()).cast(DataType::Float64).sum() / impressions.clone())
                .alias(FeatureCol::ClickProb),
            (col(self.booked.clone()).cast(DataType::Float64).sum() / impressions)
                .alias(FeatureCol::BookingProb),
            position.clone().mean().alias(FeatureCol::HotelAvgPosition),
            position.std(1).alias(FeatureCol::HotelPositionStd),
        ]
    }

    fn query_aggs(&self) -> Vec<Expr> {
        vec![
            col(self.position.clone())
                .null_count()
                .gt(lit(0))
                .cast(DataType::Int8)
                .alias(FeatureCol::QueryContainsMissingPosition),
        ]
    }
}

impl FeatureBatch for BookingBatch {
    fn kind(&self) -> BatchKind {
        BatchKind::Booking
    }

    fn inputs(&self) -> Vec<PlSmallStr> {
        vec![
            self.entity_key.clone(),
            self.query_key.clone(),
            self.clicked.clone(),
            self.booked.clone(),
            self.position.clone(),
        ]
    }

    fn outputs(&self) -> Vec<PlSmallStr> {
        names([
            FeatureCol::ClickProb,
            FeatureCol::BookingProb,
            FeatureCol::HotelAvgPosition,
            FeatureCol::HotelPositionStd,
            FeatureCol::QueryContainsMissingPosition,
        ])
    }

    fn apply(&self, lf: LazyFrame) -> FeatureResult<LazyFrame> {
        let lf = GroupJoin::on([self.entity_key.clone()]).aggregate(lf, self.entity_aggs())?;
        GroupJoin::on([self.query_key.clone()]).aggregate(lf, self.query_aggs())
    }
}
