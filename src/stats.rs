pub mod impute;
pub mod mad;

use polars::prelude::{DataType, Expr};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Statistic used to fill missing values.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    #[default]
    Mean,
    Median,
}

impl Aggregator {
    /// Aggregates the non-null values of `expr`.
    pub fn apply(self, expr: Expr) -> Expr {
        let expr = expr.cast(DataType::Float64);
        match self {
            Self::Mean => expr.mean(),
            Self::Median => expr.median(),
        }
    }
}
