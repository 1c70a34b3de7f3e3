pub mod loader;

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, FeatureResult},
    schema::{MAX_COMPETITORS, RecordCol},
    stats::Aggregator,
};

/// Default z-threshold of the MAD outlier filter.
pub const DEFAULT_MAD_THRESHOLD: f64 = 3.5;

// ================================================================================================
// Stage Configuration
// ================================================================================================

/// Columns screened by the MAD outlier filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    pub columns: Vec<String>,
    /// Values further than `threshold × MAD` from the median are nulled.
    pub threshold: f64,
    /// Write the filtered values to `<column><suffix>` instead of overwriting.
    pub output_suffix: Option<String>,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            columns: vec![RecordCol::DisplayPrice.as_str().to_string()],
            threshold: DEFAULT_MAD_THRESHOLD,
            output_suffix: None,
        }
    }
}

/// Fill nulls of `column` with a statistic of its `group_by` group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationSpec {
    pub column: String,
    pub group_by: Vec<String>,
    #[serde(default)]
    pub aggregator: Aggregator,
}

impl ImputationSpec {
    pub fn new(column: impl Into<String>, group_by: Vec<String>, aggregator: Aggregator) -> Self {
        Self {
            column: column.into(),
            group_by,
            aggregator,
        }
    }
}

/// Explicit column-wide fallback for values left null by groupwise imputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalImputationSpec {
    pub column: String,
    #[serde(default)]
    pub aggregator: Aggregator,
}

/// Trailing window of the rolling hotel statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollingWindow {
    /// Calendar days ending at the current search timestamp.
    Days(u32),
    /// Number of preceding impressions of the same hotel.
    Rows(usize),
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::Days(7)
    }
}

/// Upper bounds (exclusive) of the budget and mid price tiers, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceTiers {
    pub budget_max: f64,
    pub mid_max: f64,
}

impl Default for PriceTiers {
    fn default() -> Self {
        Self {
            budget_max: 100.0,
            mid_max: 300.0,
        }
    }
}

/// Inclusive range of years covered by the holiday calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayYears {
    pub first: i32,
    pub last: i32,
}

impl Default for HolidayYears {
    fn default() -> Self {
        Self {
            first: 2012,
            last: 2015,
        }
    }
}

// ================================================================================================
// Pipeline Configuration
// ================================================================================================

/// Configuration of a [`crate::pipeline::FeaturePipeline`] run.
///
/// # Example
/// ```
/// use booking_features::config::{PipelineConfig, RollingWindow};
///
/// let cfg = PipelineConfig::default()
///     .with_outlier_filter(true)
///     .with_outlier_threshold(3.0)
///     .with_rolling_window(RollingWindow::Days(14));
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub filter_outliers: bool,
    pub outliers: OutlierConfig,
    pub imputations: Vec<ImputationSpec>,
    pub global_imputations: Vec<GlobalImputationSpec>,
    pub rolling_window: RollingWindow,
    pub price_tiers: PriceTiers,
    pub holiday_years: HolidayYears,
    pub competitor_slots: u8,
    /// Downcast numeric columns of the materialized matrix.
    pub optimize_memory: bool,
    pub show_progress: bool,
    /// Emit per-stage diagnostics that require extra passes over the data.
    pub debug: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let by_hotel = vec![RecordCol::HotelId.as_str().to_string()];
        Self {
            filter_outliers: true,
            outliers: OutlierConfig::default(),
            imputations: vec![
                ImputationSpec::new(
                    RecordCol::HotelReviewScore.as_str(),
                    by_hotel.clone(),
                    Aggregator::Mean,
                ),
                ImputationSpec::new(
                    RecordCol::LocationScoreSecondary.as_str(),
                    by_hotel,
                    Aggregator::Mean,
                ),
            ],
            global_imputations: Vec::new(),
            rolling_window: RollingWindow::default(),
            price_tiers: PriceTiers::default(),
            holiday_years: HolidayYears::default(),
            competitor_slots: MAX_COMPETITORS,
            optimize_memory: true,
            show_progress: false,
            debug: false,
        }
    }
}

impl PipelineConfig {
    pub fn with_outlier_filter(self, enabled: bool) -> Self {
        Self {
            filter_outliers: enabled,
            ..self
        }
    }

    pub fn with_outlier_columns(mut self, columns: Vec<String>) -> Self {
        self.outliers.columns = columns;
        self
    }

    pub fn with_outlier_threshold(mut self, threshold: f64) -> Self {
        self.outliers.threshold = threshold;
        self
    }

    pub fn with_outlier_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.outliers.output_suffix = Some(suffix.into());
        self
    }

    pub fn with_imputations(self, imputations: Vec<ImputationSpec>) -> Self {
        Self {
            imputations,
            ..self
        }
    }

    pub fn add_imputation(mut self, spec: ImputationSpec) -> Self {
        self.imputations.push(spec);
        self
    }

    pub fn add_global_imputation(mut self, column: impl Into<String>, aggregator: Aggregator) -> Self {
        self.global_imputations.push(GlobalImputationSpec {
            column: column.into(),
            aggregator,
        });
        self
    }

    pub fn with_rolling_window(self, rolling_window: RollingWindow) -> Self {
        Self {
            rolling_window,
            ..self
        }
    }

    pub fn with_price_tiers(self, budget_max: f64, mid_max: f64) -> Self {
        Self {
            price_tiers: PriceTiers {
                budget_max,
                mid_max,
            },
            ..self
        }
    }

    pub fn with_holiday_years(self, first: i32, last: i32) -> Self {
        Self {
            holiday_years: HolidayYears { first, last },
            ..self
        }
    }

    pub fn with_competitor_slots(self, competitor_slots: u8) -> Self {
        Self {
            competitor_slots,
            ..self
        }
    }

    pub fn with_memory_optimization(self, optimize_memory: bool) -> Self {
        Self {
            optimize_memory,
            ..self
        }
    }

    pub fn with_progress(self, show_progress: bool) -> Self {
        Self {
            show_progress,
            ..self
        }
    }

    pub fn with_debug(self, debug: bool) -> Self {
        Self { debug, ..self }
    }

    /// Rejects settings that would make a stage ill-defined.
    pub fn validate(&self) -> FeatureResult<()> {
        let t = self.outliers.threshold;
        if !(t.is_finite() && t > 0.0) {
            return Err(invalid(format!("outlier threshold must be positive, got {t}")));
        }

        let tiers = self.price_tiers;
        if !(tiers.budget_max.is_finite() && tiers.mid_max.is_finite())
            || tiers.budget_max >= tiers.mid_max
        {
            return Err(invalid(format!(
                "price tiers must satisfy budget_max < mid_max, got {} and {}",
                tiers.budget_max, tiers.mid_max
            )));
        }

        match self.rolling_window {
            RollingWindow::Days(0) | RollingWindow::Rows(0) => {
                return Err(invalid("rolling window must not be empty".to_string()));
            }
            _ => {}
        }

        if self.holiday_years.first > self.holiday_years.last {
            return Err(invalid(format!(
                "holiday years are reversed: {} > {}",
                self.holiday_years.first, self.holiday_years.last
            )));
        }

        if self.competitor_slots == 0 || self.competitor_slots > MAX_COMPETITORS {
            return Err(invalid(format!(
                "competitor slots must lie in 1..={MAX_COMPETITORS}, got {}",
                self.competitor_slots
            )));
        }

        if let Some(spec) = self.imputations.iter().find(|s| s.group_by.is_empty()) {
            return Err(invalid(format!(
                "imputation of '{}' has no grouping key; use a global imputation instead",
                spec.column
            )));
        }

        Ok(())
    }
}

fn invalid(msg: String) -> crate::error::FeatureError {
    ConfigError::InvalidValue(msg).into()
}

// ================================================================================================
// Dashboard Table Styles
// ================================================================================================

/// Conditional cell style applied by the dashboard's summary table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStyleRule {
    /// Row predicate in the dashboard's filter syntax, e.g. `{null_pct} > 20`.
    pub filter_query: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(alias = "backgroundColor")]
    pub background_color: String,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStyles {
    #[serde(default)]
    pub style_rules: Vec<TableStyleRule>,
}
