use polars::prelude::{
    DataType, Expr, LazyFrame, Null, PlSmallStr, col, len, lit, when,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    aggregate::GroupJoin,
    config::PriceTiers,
    error::FeatureResult,
    features::{BatchKind, FeatureBatch, FeatureCol, names},
    schema::RecordCol,
};

const TIER_CLICKS: &str = "__tier_clicks";

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
#[serde(rename_all = "snake_case")]
pub enum PriceTierLabel {
    Budget,
    Mid,
    Luxury,
}

impl PriceTierLabel {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// How evenly a hotel's clicks spread across price tiers, in bits.
///
/// Only clicked rows with a known price count. Hotels without such rows have no
/// distribution and get a null entropy, never zero.
#[derive(Debug, Clone)]
pub struct EntropyBatch {
    entity_key: PlSmallStr,
    price: PlSmallStr,
    clicked: PlSmallStr,
    tiers: PriceTiers,
}

impl Default for EntropyBatch {
    fn default() -> Self {
        Self::new(PriceTiers::default())
    }
}

impl EntropyBatch {
    pub fn new(tiers: PriceTiers) -> Self {
        Self {
            entity_key: RecordCol::HotelId.name(),
            price: RecordCol::DisplayPrice.name(),
            clicked: RecordCol::WasClicked.name(),
            tiers,
        }
    }

    /// Bins the price into `budget`, `mid` or `luxury`; null prices stay null.
    pub fn tier_expr(&self) -> Expr {
        let price = col(self.price.clone()).cast(DataType::Float64);
        when(price.clone().is_null())
            .then(lit(Null {}).cast(DataType::String))
            .when(price.clone().lt(lit(self.tiers.budget_max)))
            .then(lit(PriceTierLabel::Budget.as_str()))
            .when(price.lt(lit(self.tiers.mid_max)))
            .then(lit(PriceTierLabel::Mid.as_str()))
            .otherwise(lit(PriceTierLabel::Luxury.as_str()))
            .alias(FeatureCol::PriceTier)
    }

    fn entropy_summary(&self, tiered: &LazyFrame) -> LazyFrame {
        let clicks = tiered
            .clone()
            .filter(
                col(self.clicked.clone())
                    .cast(DataType::Boolean)
                    .fill_null(lit(false))
                    .and(col(FeatureCol::PriceTier).is_not_null()),
            )
            .group_by([col(self.entity_key.clone()), col(FeatureCol::PriceTier)])
            .agg([len().alias(TIER_CLICKS)]);

        // `normalize` turns the per-tier counts into probabilities within each hotel
        clicks.group_by([col(self.entity_key.clone())]).agg([col(TIER_CLICKS)
            .cast(DataType::Float64)
            .entropy(2.0, true)
            .alias(FeatureCol::ClickEntropyPriceTier)])
    }
}

impl FeatureBatch for EntropyBatch {
    fn kind(&self) -> BatchKind {
        BatchKind::Entropy
    }

    fn inputs(&self) -> Vec<PlSmallStr> {
        vec![
            self.entity_key.clone(),
            self.price.clone(),
            self.clicked.clone(),
        ]
    }

    fn outputs(&self) -> Vec<PlSmallStr> {
        names([FeatureCol::PriceTier, FeatureCol::ClickEntropyPriceTier])
    }

    fn apply(&self, lf: LazyFrame) -> FeatureResult<LazyFrame> {
        let tiered = lf.with_column(self.tier_expr());
        let summary = self.entropy_summary(&tiered);
        GroupJoin::on([self.entity_key.clone()]).attach(tiered, summary)
    }
}

#[cfg(test)]
mod tests {
    use polars::{
        df,
        prelude::{DataFrame, IntoLazy},
    };

    use super::*;

    fn derive(df: DataFrame) -> DataFrame {
        EntropyBatch::default()
            .apply(df.lazy())
            .expect("apply")
            .collect()
            .expect("collect")
    }

    fn entropy(df: &DataFrame) -> Vec<Option<f64>> {
        df.column(FeatureCol::ClickEntropyPriceTier.as_str())
            .expect("entropy")
            .f64()
            .expect("f64")
            .into_iter()
            .collect()
    }

    #[test]
    fn even_split_over_two_tiers_is_one_bit() {
        let df = derive(
            df![
                "hotel_id" => &[1i32, 1, 1, 1, 1],
                "display_price" => &[50.0, 80.0, 150.0, 250.0, 500.0],
                "was_clicked" => &[true, true, true, true, false],
            ]
            .expect("Failed to create DF"),
        );

        for value in entropy(&df) {
            assert!(value.is_some_and(|h| (h - 1.0).abs() < 1e-12), "Got {value:?}");
        }
    }

    #[test]
    fn single_tier_has_zero_entropy_and_no_clicks_is_null() {
        let df = derive(
            df![
                "hotel_id" => &[1i32, 1, 2, 2],
                "display_price" => &[400.0, 900.0, 50.0, 60.0],
                "was_clicked" => &[true, true, false, false],
            ]
            .expect("Failed to create DF"),
        );

        let h = entropy(&df);
        assert!(h[0].is_some_and(|v| v.abs() < 1e-12));
        assert_eq!(h[2], None, "Hotel without clicks must be null, not zero");
        assert_eq!(df.height(), 4);
    }

    #[test]
    fn tiers_follow_exclusive_upper_bounds() {
        let df = derive(
            df![
                "hotel_id" => &[1i32, 1, 1, 1],
                "display_price" => &[Some(99.99), Some(100.0), Some(300.0), None],
                "was_clicked" => &[false, false, false, true],
            ]
            .expect("Failed to create DF"),
        );

        let tiers = df
            .column(FeatureCol::PriceTier.as_str())
            .expect("tier")
            .str()
            .expect("str")
            .into_iter()
            .map(|t| t.map(str::to_string))
            .collect::<Vec<_>>();
        assert_eq!(
            tiers,
            vec![
                Some("budget".into()),
                Some("mid".into()),
                Some("luxury".into()),
                None,
            ]
        );
        // The only click has no price, so there is no distribution
        assert!(entropy(&df).iter().all(Option::is_none));
    }

    #[test]
    fn entropy_is_bounded_by_observed_tiers() {
        let df = derive(
            df![
                "hotel_id" => &[7i32, 7, 7, 7, 7, 7],
                "display_price" => &[10.0, 20.0, 30.0, 200.0, 350.0, 400.0],
                "was_clicked" => &[true, true, true, true, true, false],
            ]
            .expect("Failed to create DF"),
        );

        let bound = 3.0_f64.log2();
        for value in entropy(&df) {
            assert!(value.is_some_and(|h| h > 0.0 && h <= bound + 1e-12));
        }
    }
}
