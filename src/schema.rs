pub mod standardize;

use std::{collections::BTreeMap, sync::Arc};

use polars::prelude::{
    Categories, DataType, Expr, Field, Null, PlSmallStr, Schema, SchemaRef, TimeUnit, lit,
};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Number of competitor slots carried by a raw search record.
pub const MAX_COMPETITORS: u8 = 8;

// ================================================================================================
// Semantic Types
// ================================================================================================

/// Logical column type as named in the schema configuration.
///
/// Parsing is case-insensitive and accepts the common aliases (`Utf8`, `str`, `i32`, `bool`),
/// so a schema file written against Polars type names loads unchanged.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
    DeserializeFromStr,
    SerializeDisplay,
)]
#[strum(ascii_case_insensitive)]
pub enum SemanticType {
    #[strum(to_string = "int8", serialize = "i8")]
    Int8,
    #[strum(to_string = "int16", serialize = "i16")]
    Int16,
    #[strum(to_string = "int32", serialize = "i32")]
    Int32,
    #[strum(to_string = "int64", serialize = "i64")]
    Int64,
    #[strum(to_string = "uint8", serialize = "u8")]
    UInt8,
    #[strum(to_string = "uint16", serialize = "u16")]
    UInt16,
    #[strum(to_string = "uint32", serialize = "u32")]
    UInt32,
    #[strum(to_string = "uint64", serialize = "u64")]
    UInt64,
    #[strum(to_string = "float32", serialize = "f32")]
    Float32,
    #[strum(to_string = "float64", serialize = "f64")]
    Float64,
    #[strum(to_string = "boolean", serialize = "bool")]
    Boolean,
    #[strum(to_string = "string", serialize = "utf8", serialize = "str")]
    String,
    #[strum(to_string = "categorical")]
    Categorical,
    #[strum(to_string = "date")]
    Date,
    #[strum(to_string = "datetime")]
    Datetime,
    #[strum(to_string = "duration")]
    Duration,
}

impl SemanticType {
    pub fn to_dtype(self) -> DataType {
        match self {
            Self::Int8 => DataType::Int8,
            Self::Int16 => DataType::Int16,
            Self::Int32 => DataType::Int32,
            Self::Int64 => DataType::Int64,
            Self::UInt8 => DataType::UInt8,
            Self::UInt16 => DataType::UInt16,
            Self::UInt32 => DataType::UInt32,
            Self::UInt64 => DataType::UInt64,
            Self::Float32 => DataType::Float32,
            Self::Float64 => DataType::Float64,
            Self::Boolean => DataType::Boolean,
            Self::String => DataType::String,
            Self::Categorical => categorical_dtype(),
            Self::Date => DataType::Date,
            Self::Datetime => DataType::Datetime(TimeUnit::Microseconds, None),
            Self::Duration => DataType::Duration(TimeUnit::Microseconds),
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::UInt8
                | Self::UInt16
                | Self::UInt32
                | Self::UInt64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Typed stand-in for a column that is absent from an input file.
    ///
    /// Empty string for textual types, zero for numeric types, `false` for booleans
    /// and a typed null for temporal types.
    pub fn placeholder(self) -> Expr {
        let dtype = self.to_dtype();
        match self {
            Self::String | Self::Categorical => lit("").cast(dtype),
            Self::Boolean => lit(false),
            t if t.is_integer() => lit(0).cast(dtype),
            t if t.is_float() => lit(0.0).cast(dtype),
            _ => lit(Null {}).cast(dtype),
        }
    }
}

/// Categorical dtype backed by the process-global category registry.
pub(crate) fn categorical_dtype() -> DataType {
    DataType::from_categories(Categories::global())
}

// ================================================================================================
// Schema & Rename Maps
// ================================================================================================

/// Canonical column name to semantic type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaMap(BTreeMap<String, SemanticType>);

impl SchemaMap {
    /// The schema of a standardized search/booking table.
    pub fn canonical() -> Self {
        let mut map = RecordCol::iter()
            .map(|c| (c.as_str().to_string(), c.semantic_type()))
            .collect::<BTreeMap<_, _>>();
        for slot in 1..=MAX_COMPETITORS {
            for c in CompetitorCol::iter() {
                map.insert(c.name(slot), c.semantic_type());
            }
        }
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<SemanticType> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SemanticType)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: SemanticType) {
        self.0.insert(name.into(), ty);
    }

    pub fn to_polars_schema(&self) -> SchemaRef {
        let fields = self
            .iter()
            .map(|(name, ty)| Field::new(name.into(), ty.to_dtype()));
        Arc::new(Schema::from_iter(fields))
    }
}

impl FromIterator<(String, SemanticType)> for SchemaMap {
    fn from_iter<T: IntoIterator<Item = (String, SemanticType)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Raw column name to canonical column name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenameMap(BTreeMap<String, String>);

impl RenameMap {
    /// Maps the raw export headers (`srch_id`, `prop_id`, ...) onto [`RecordCol`] names.
    pub fn canonical() -> Self {
        Self(
            RecordCol::iter()
                .filter(|c| c.raw_name() != c.as_str())
                .map(|c| (c.raw_name().to_string(), c.as_str().to_string()))
                .collect(),
        )
    }

    pub fn get(&self, raw: &str) -> Option<&str> {
        self.0.get(raw).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for RenameMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ================================================================================================
// Canonical Columns
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
pub enum RecordCol {
    // === Search ===
    /// Identifier of the search query; groups the impressions shown together.
    SearchId,
    /// Moment the search was issued.
    SearchTimestamp,
    SiteId,
    VisitorLocationCountryId,
    DestinationId,
    /// Nights requested.
    StayDuration,
    /// Days between search and check-in.
    DaysUntilCheckin,
    NumAdults,
    NumChildren,
    NumRooms,
    SaturdayNightStay,
    QueryAffinityScore,
    OrigDestinationDistance,
    IsRandomOrdering,

    // === Visitor history ===
    UserHistAvgStars,
    UserHistAvgPrice,

    // === Property ===
    HotelId,
    HotelCountryId,
    HotelStarRating,
    HotelReviewScore,
    IsBrandHotel,
    LocationScorePrimary,
    LocationScoreSecondary,
    HotelLogHistPrice,

    // === Impression ===
    /// Rank of the hotel in the result list; null when the ordering is unknown.
    DisplayPosition,
    /// Displayed price in USD.
    DisplayPrice,
    HasPromotion,

    // === Outcome ===
    WasClicked,
    GrossBookingUsd,
    WasBooked,
}

impl From<RecordCol> for PlSmallStr {
    fn from(value: RecordCol) -> Self {
        value.as_str().into()
    }
}

impl RecordCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Header of this column in the raw search export.
    pub fn raw_name(&self) -> &'static str {
        match self {
            Self::SearchId => "srch_id",
            Self::SearchTimestamp => "date_time",
            Self::SiteId => "site_id",
            Self::VisitorLocationCountryId => "visitor_location_country_id",
            Self::DestinationId => "srch_destination_id",
            Self::StayDuration => "srch_length_of_stay",
            Self::DaysUntilCheckin => "srch_booking_window",
            Self::NumAdults => "srch_adults_count",
            Self::NumChildren => "srch_children_count",
            Self::NumRooms => "srch_room_count",
            Self::SaturdayNightStay => "srch_saturday_night_bool",
            Self::QueryAffinityScore => "srch_query_affinity_score",
            Self::OrigDestinationDistance => "orig_destination_distance",
            Self::IsRandomOrdering => "random_bool",
            Self::UserHistAvgStars => "visitor_hist_starrating",
            Self::UserHistAvgPrice => "visitor_hist_adr_usd",
            Self::HotelId => "prop_id",
            Self::HotelCountryId => "prop_country_id",
            Self::HotelStarRating => "prop_starrating",
            Self::HotelReviewScore => "prop_review_score",
            Self::IsBrandHotel => "prop_brand_bool",
            Self::LocationScorePrimary => "prop_location_score1",
            Self::LocationScoreSecondary => "prop_location_score2",
            Self::HotelLogHistPrice => "prop_log_historical_price",
            Self::DisplayPosition => "position",
            Self::DisplayPrice => "price_usd",
            Self::HasPromotion => "promotion_flag",
            Self::WasClicked => "click_bool",
            Self::GrossBookingUsd => "gross_bookings_usd",
            Self::WasBooked => "booking_bool",
        }
    }

    pub fn semantic_type(&self) -> SemanticType {
        match self {
            Self::SearchId
            | Self::SiteId
            | Self::VisitorLocationCountryId
            | Self::DestinationId
            | Self::HotelId
            | Self::HotelCountryId
            | Self::DisplayPosition => SemanticType::Int32,

            Self::StayDuration | Self::DaysUntilCheckin => SemanticType::Int16,

            Self::NumAdults | Self::NumChildren | Self::NumRooms | Self::HotelStarRating => {
                SemanticType::Int8
            }

            Self::UserHistAvgStars
            | Self::UserHistAvgPrice
            | Self::HotelReviewScore
            | Self::LocationScorePrimary
            | Self::LocationScoreSecondary
            | Self::HotelLogHistPrice
            | Self::DisplayPrice
            | Self::QueryAffinityScore
            | Self::OrigDestinationDistance
            | Self::GrossBookingUsd => SemanticType::Float64,

            Self::SaturdayNightStay
            | Self::IsRandomOrdering
            | Self::IsBrandHotel
            | Self::HasPromotion
            | Self::WasClicked
            | Self::WasBooked => SemanticType::Boolean,

            Self::SearchTimestamp => SemanticType::Datetime,
        }
    }
}

/// Per-competitor comparison columns, numbered `comp1_*` through `comp8_*`.
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
pub enum CompetitorCol {
    /// +1 when the competitor is cheaper, 0 when equal, -1 when more expensive.
    Rate,
    /// 1 when the competitor has no availability.
    Inv,
    /// Absolute percentage difference between the offers.
    RatePercentDiff,
}

impl CompetitorCol {
    pub fn name(&self, slot: u8) -> String {
        let suffix: &'static str = self.into();
        format!("comp{slot}_{suffix}")
    }

    pub fn semantic_type(&self) -> SemanticType {
        match self {
            Self::Rate | Self::Inv => SemanticType::Int8,
            Self::RatePercentDiff => SemanticType::Float64,
        }
    }
}
