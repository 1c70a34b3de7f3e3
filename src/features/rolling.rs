use std::sync::Arc;

use polars::prelude::{
    ClosedWindow, DataType, Duration, Expr, LazyFrame, PlSmallStr, RollingOptionsDynamicWindow,
    RollingOptionsFixedWindow, Selector, SortMultipleOptions, col,
};

use crate::{
    aggregate::GroupJoin,
    config::RollingWindow,
    error::FeatureResult,
    features::{BatchKind, FeatureBatch, FeatureCol, names},
    schema::RecordCol,
};

const ROW_KEY: &str = "__row_nr";

/// Trailing price and click statistics per hotel.
///
/// Rows are ordered by time within each hotel before windowing, and the results are joined
/// back on the original row position, so the output keeps the input order. Rows without a
/// timestamp have no window and get nulls.
#[derive(Debug, Clone)]
pub struct RollingBatch {
    entity_key: PlSmallStr,
    timestamp: PlSmallStr,
    price: PlSmallStr,
    clicked: PlSmallStr,
    window: RollingWindow,
}

impl Default for RollingBatch {
    fn default() -> Self {
        Self::new(RollingWindow::default())
    }
}

impl RollingBatch {
    pub fn new(window: RollingWindow) -> Self {
        Self {
            entity_key: RecordCol::HotelId.name(),
            timestamp: RecordCol::SearchTimestamp.name(),
            price: RecordCol::DisplayPrice.name(),
            clicked: RecordCol::WasClicked.name(),
            window,
        }
    }

    fn window_exprs(&self) -> Vec<Expr> {
        let price = col(self.price.clone()).cast(DataType::Float64);
        let clicked = col(self.clicked.clone()).cast(DataType::Float64);
        let group = [col(self.entity_key.clone())];

        let (mean, std, rate) = match self.window {
            RollingWindow::Days(days) => {
                let options = RollingOptionsDynamicWindow {
                    window_size: Duration::parse(&format!("{days}d")),
                    min_periods: 1,
                    closed_window: ClosedWindow::Right,
                    fn_params: None,
                };
                let by = col(self.timestamp.clone());
                (
                    price.clone().rolling_mean_by(by.clone(), options.clone()),
                    price.rolling_std_by(by.clone(), options.clone()),
                    clicked.rolling_mean_by(by, options),
                )
            }
            RollingWindow::Rows(rows) => {
                let options = RollingOptionsFixedWindow {
                    window_size: rows,
                    min_periods: 1,
                    weights: None,
                    center: false,
                    fn_params: None,
                };
                (
                    price.clone().rolling_mean(options.clone()),
                    price.rolling_std(options.clone()),
                    clicked.rolling_mean(options),
                )
            }
        };

        vec![
            col(ROW_KEY),
            mean.over(group.clone()).alias(FeatureCol::RollingPriceMean),
            std.over(group.clone()).alias(FeatureCol::RollingPriceStd),
            rate.over(group).alias(FeatureCol::RollingClickRate),
        ]
    }
}

impl FeatureBatch for RollingBatch {
    fn kind(&self) -> BatchKind {
        BatchKind::Rolling
    }

    fn inputs(&self) -> Vec<PlSmallStr> {
        vec![
            self.entity_key.clone(),
            self.timestamp.clone(),
            self.price.clone(),
            self.clicked.clone(),
        ]
    }

    fn outputs(&self) -> Vec<PlSmallStr> {
        names([
            FeatureCol::RollingPriceMean,
            FeatureCol::RollingPriceStd,
            FeatureCol::RollingClickRate,
        ])
    }

    fn apply(&self, lf: LazyFrame) -> FeatureResult<LazyFrame> {
        let keyed = lf.with_row_index(ROW_KEY, None);

        let windows = keyed
            .clone()
            .filter(col(self.timestamp.clone()).is_not_null())
            .sort(
                [self.entity_key.clone(), self.timestamp.clone()],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .select(self.window_exprs());

        let joined = GroupJoin::on([ROW_KEY]).attach(keyed, windows)?;
        Ok(joined.drop(Selector::ByName {
            names: Arc::from([PlSmallStr::from(ROW_KEY)]),
            strict: false,
        }))
    }
}
