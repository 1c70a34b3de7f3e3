pub mod booking;
pub mod competitor;
pub mod context;
pub mod entropy;
pub mod holiday;
pub mod location;
pub mod rolling;
pub mod temporal;

use std::collections::{HashMap, HashSet};

use polars::prelude::{LazyFrame, PlSmallStr, Schema};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

use crate::{
    config::PipelineConfig,
    error::{DataError, FeatureResult},
    features::{
        booking::BookingBatch,
        competitor::CompetitorBatch,
        context::{SearchContextBatch, UserHistoryBatch},
        entropy::EntropyBatch,
        location::LocationBatch,
        rolling::RollingBatch,
        temporal::TemporalBatch,
    },
};

// ================================================================================================
// Batch Interface
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
#[strum(serialize_all = "snake_case")]
pub enum BatchKind {
    Temporal,
    Booking,
    Location,
    Competitor,
    SearchContext,
    UserHistory,
    Rolling,
    Entropy,
}

/// A named group of derived columns applied as one step.
///
/// `inputs` and `outputs` are declarations, checked against the frame schema by
/// [`FeaturePlan::validate`] before any data is touched.
pub trait FeatureBatch: Send + Sync {
    fn kind(&self) -> BatchKind;

    /// Columns the batch reads.
    fn inputs(&self) -> Vec<PlSmallStr>;

    /// Columns the batch adds.
    fn outputs(&self) -> Vec<PlSmallStr>;

    fn apply(&self, lf: LazyFrame) -> FeatureResult<LazyFrame>;
}

// ================================================================================================
// Plan
// ================================================================================================

/// Ordered list of feature batches.
pub struct FeaturePlan {
    batches: Vec<Box<dyn FeatureBatch>>,
}

impl std::fmt::Debug for FeaturePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}

impl Default for FeaturePlan {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl FeaturePlan {
    pub fn empty() -> Self {
        Self {
            batches: Vec::new(),
        }
    }

    /// The standard batch sequence: temporal, booking, location, competitor, search context,
    /// user history, rolling, entropy.
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::empty()
            .with_batch(TemporalBatch::new(cfg.holiday_years))
            .with_batch(BookingBatch::default())
            .with_batch(LocationBatch::default())
            .with_batch(CompetitorBatch::new(cfg.competitor_slots))
            .with_batch(SearchContextBatch::default())
            .with_batch(UserHistoryBatch::default())
            .with_batch(RollingBatch::new(cfg.rolling_window))
            .with_batch(EntropyBatch::new(cfg.price_tiers))
    }

    pub fn with_batch(mut self, batch: impl FeatureBatch + 'static) -> Self {
        self.batches.push(Box::new(batch));
        self
    }

    pub fn batches(&self) -> &[Box<dyn FeatureBatch>] {
        &self.batches
    }

    pub fn kinds(&self) -> Vec<BatchKind> {
        self.batches.iter().map(|b| b.kind()).collect()
    }

    pub fn outputs(&self) -> Vec<PlSmallStr> {
        self.batches.iter().flat_map(|b| b.outputs()).collect()
    }

    /// Checks that every batch input is available when the batch runs.
    ///
    /// # Errors
    /// - [`DataError::DependencyOrder`] if an input is produced by a later batch.
    /// - [`DataError::MissingColumn`] if no one provides the input.
    pub fn validate(&self, schema: &Schema) -> FeatureResult<()> {
        let mut producer: HashMap<PlSmallStr, BatchKind> = HashMap::new();
        for batch in &self.batches {
            for out in batch.outputs() {
                producer.entry(out).or_insert(batch.kind());
            }
        }

        let mut available: HashSet<PlSmallStr> = schema.iter_names().cloned().collect();
        for batch in &self.batches {
            for input in batch.inputs() {
                if available.contains(&input) {
                    continue;
                }
                let err = match producer.get(&input) {
                    Some(later) => DataError::DependencyOrder {
                        batch: batch.kind().to_string(),
                        column: input.to_string(),
                        producer: later.to_string(),
                    },
                    None => DataError::MissingColumn {
                        batch: batch.kind().to_string(),
                        column: input.to_string(),
                    },
                };
                return Err(err.into());
            }
            available.extend(batch.outputs());
        }
        Ok(())
    }

    /// Applies every batch in order. Nothing is executed; the result is still lazy.
    pub fn apply(&self, lf: LazyFrame) -> FeatureResult<LazyFrame> {
        self.batches.iter().try_fold(lf, |lf, batch| {
            tracing::debug!(batch = %batch.kind(), outputs = batch.outputs().len(), "Applying feature batch");
            batch.apply(lf)
        })
    }
}

// ================================================================================================
// Derived Columns
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
    PartialOrd,
    Ord,
    EnumIter,
    IntoStaticStr,
    EnumCount,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FeatureCol {
    // === Temporal ===
    SearchHour,
    /// ISO weekday of the search, Monday = 1.
    SearchDayOfWeek,
    SearchWeek,
    SearchMonth,
    SearchYear,
    SearchDate,
    IsWeekendSearch,
    IsHolidaySearch,
    /// `night`, `morning`, `afternoon` or `evening`.
    SearchTimeOfDay,
    /// Search date plus the booking window, in calendar days.
    ExpectedCheckinDate,
    CheckinDayOfWeek,
    CheckinDayOfMonth,
    CheckinMonth,
    IsWeekendCheckin,
    IsHolidayCheckin,

    // === Booking behaviour ===
    /// Share of a hotel's impressions that were clicked.
    ClickProb,
    BookingProb,
    HotelAvgPosition,
    HotelPositionStd,
    /// 1 when any impression of the search has an unknown position.
    QueryContainsMissingPosition,

    // === Location ===
    LocationScorePrimaryNorm,
    LocationScoreSecondaryNorm,
    LocationScoreMeanNorm,
    LocationScorePrimaryZscore,
    LocationScoreSecondaryZscore,
    LocationScoreMeanStd,
    LocationScoreDiff,

    // === Competitors ===
    NumCompCheaper,
    NumCompSamePrice,
    NumCompMoreExpensive,
    NumValidCompRate,
    NumCompetitorUnavailable,
    NumValidCompInv,
    MeanCompPriceDiffPct,
    MaxCompPriceDiffPct,

    // === Search context ===
    TotalGuests,
    StayDurationBucket,
    DaysUntilCheckinBucket,
    RoomToGuestRatio,

    // === User history ===
    HasUserPriceHistory,
    HasUserRatingHistory,
    PriceDiffVsUserHistory,
    StarDiffVsUserHistory,

    // === Rolling ===
    RollingPriceMean,
    RollingPriceStd,
    RollingClickRate,

    // === Entropy ===
    PriceTier,
    /// Shannon entropy (bits) of a hotel's clicks across price tiers.
    ClickEntropyPriceTier,
}

impl From<FeatureCol> for PlSmallStr {
    fn from(value: FeatureCol) -> Self {
        value.as_str().into()
    }
}

impl FeatureCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

pub(crate) fn names<I, C>(cols: I) -> Vec<PlSmallStr>
where
    I: IntoIterator<Item = C>,
    C: Into<PlSmallStr>,
{
    cols.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use polars::prelude::{DataType, Field};

    use crate::{
        error::FeatureError,
        schema::{RecordCol, SchemaMap},
    };

    use super::*;

    struct StubBatch {
        kind: BatchKind,
        inputs: Vec<&'static str>,
        outputs: Vec<&'static str>,
    }

    impl FeatureBatch for StubBatch {
        fn kind(&self) -> BatchKind {
            self.kind
        }

        fn inputs(&self) -> Vec<PlSmallStr> {
            names(self.inputs.iter().copied())
        }

        fn outputs(&self) -> Vec<PlSmallStr> {
            names(self.outputs.iter().copied())
        }

        fn apply(&self, lf: LazyFrame) -> FeatureResult<LazyFrame> {
            Ok(lf)
        }
    }

    fn schema(cols: &[&str]) -> Schema {
        Schema::from_iter(
            cols.iter()
                .map(|c| Field::new((*c).into(), DataType::Float64)),
        )
    }

    #[test]
    fn default_plan_validates_against_canonical_schema() {
        let schema = SchemaMap::canonical().to_polars_schema();
        FeaturePlan::default()
            .validate(&schema)
            .expect("Canonical schema must satisfy every batch");
    }

    #[test]
    fn default_plan_keeps_declared_order() {
        assert_eq!(
            FeaturePlan::default().kinds(),
            vec![
                BatchKind::Temporal,
                BatchKind::Booking,
                BatchKind::Location,
                BatchKind::Competitor,
                BatchKind::SearchContext,
                BatchKind::UserHistory,
                BatchKind::Rolling,
                BatchKind::Entropy,
            ]
        );
    }

    #[test]
    fn validate_detects_batches_out_of_order() {
        let plan = FeaturePlan::empty()
            .with_batch(StubBatch {
                kind: BatchKind::Rolling,
                inputs: vec!["price", "search_date"],
                outputs: vec!["rolling"],
            })
            .with_batch(StubBatch {
                kind: BatchKind::Temporal,
                inputs: vec!["ts"],
                outputs: vec!["search_date"],
            });

        let err = plan
            .validate(&schema(&["price", "ts"]))
            .expect_err("Rolling before temporal must fail");
        assert!(
            matches!(
                err,
                FeatureError::Data(DataError::DependencyOrder { ref column, .. }) if column == "search_date"
            ),
            "Unexpected error: {err:?}"
        );
    }

    #[test]
    fn validate_reports_missing_columns() {
        let schema = SchemaMap::canonical().to_polars_schema();
        let mut fields = (*schema).clone();
        let _ = fields.shift_remove(RecordCol::DisplayPosition.as_str());

        let err = FeaturePlan::default()
            .validate(&fields)
            .expect_err("Missing position must fail");
        assert!(matches!(
            err,
            FeatureError::Data(DataError::MissingColumn { ref batch, .. }) if batch == "booking"
        ));
    }

    #[test]
    fn every_output_is_a_feature_column() {
        for out in FeaturePlan::default().outputs() {
            assert!(
                out.as_str().parse::<FeatureCol>().is_ok(),
                "'{out}' is not declared in FeatureCol"
            );
        }
    }
}
