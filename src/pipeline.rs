pub mod batch;

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use polars::prelude::{DataFrame, IntoLazy, LazyFrame, Schema};

use crate::{
    config::PipelineConfig,
    error::{DataError, FeatureResult},
    features::FeaturePlan,
    io::{self, FileExtension},
    memory::{self, MemoryReport},
    pipeline::batch::{BatchReport, FileReport, run_files},
    polars_ext::polars_to_feature_error,
    stats::{
        impute::{GlobalImputer, GroupImputer},
        mad::MadFilter,
    },
};

/// Suffix appended to the file stem of a materialized feature matrix.
pub const FEATURES_SUFFIX: &str = "_features";

/// A materialized feature matrix and how it was produced.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub data: DataFrame,
    /// Present when memory optimization ran.
    pub memory: Option<MemoryReport>,
    pub elapsed: Duration,
}

/// Robust statistics followed by the feature plan, in dependency order.
#[derive(Debug)]
pub struct FeaturePipeline {
    config: PipelineConfig,
    plan: FeaturePlan,
}

impl FeaturePipeline {
    /// # Errors
    /// Returns a configuration error if `config` does not validate.
    pub fn new(config: PipelineConfig) -> FeatureResult<Self> {
        config.validate()?;
        let plan = FeaturePlan::from_config(&config);
        Ok(Self { config, plan })
    }

    /// Replaces the standard batch sequence.
    pub fn with_plan(self, plan: FeaturePlan) -> Self {
        Self { plan, ..self }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn plan(&self) -> &FeaturePlan {
        &self.plan
    }

    /// Builds the lazy feature graph for `lf`.
    ///
    /// Outlier filtering and imputation fit their statistics eagerly; everything after them
    /// stays lazy. The plan is checked against the frame schema before any batch is applied.
    #[tracing::instrument(skip_all)]
    pub fn build(&self, mut lf: LazyFrame) -> FeatureResult<LazyFrame> {
        let schema = lf
            .collect_schema()
            .map_err(|e| polars_to_feature_error("pipeline input schema", e))?;
        self.check_robust_stats_inputs(&schema)?;

        if self.config.filter_outliers {
            for filter in MadFilter::from_config(&self.config.outliers) {
                if self.config.debug {
                    let outliers = filter.count_outliers(&lf)?;
                    tracing::debug!(column = filter.column(), outliers, "Outliers to suppress");
                }
                lf = filter.apply(lf)?;
            }
        }

        for spec in &self.config.imputations {
            let imputer = GroupImputer::from_spec(spec);
            let unfilled = imputer.unfilled_groups(&lf)?;
            if unfilled > 0 {
                tracing::warn!(
                    column = imputer.column(),
                    group_by = ?imputer.group_by(),
                    groups = unfilled,
                    "Groups without any value stay null after imputation"
                );
            }
            lf = imputer.apply(lf);
        }

        for spec in &self.config.global_imputations {
            lf = GlobalImputer::from_spec(spec).apply(lf);
        }

        let schema = lf
            .collect_schema()
            .map_err(|e| polars_to_feature_error("feature plan schema", e))?;
        self.plan.validate(&schema)?;
        self.plan.apply(lf)
    }

    /// Builds and materializes the feature matrix.
    #[tracing::instrument(skip_all)]
    pub fn run(&self, lf: LazyFrame) -> FeatureResult<FeatureMatrix> {
        let start = Instant::now();
        let data = io::collect(self.build(lf)?, "feature pipeline")?;

        if self.config.debug {
            for name in self.plan.outputs() {
                if let Ok(column) = data.column(name.as_str()) {
                    tracing::debug!(feature = %name, nulls = column.null_count(), "Derived column");
                }
            }
        }

        let (data, memory) = if self.config.optimize_memory {
            let (data, report) = memory::downcast(data)?;
            (data, Some(report))
        } else {
            (data, None)
        };

        let elapsed = start.elapsed();
        tracing::info!(
            rows = data.height(),
            columns = data.width(),
            elapsed = %humantime::format_duration(elapsed),
            "Feature matrix materialized"
        );
        Ok(FeatureMatrix {
            data,
            memory,
            elapsed,
        })
    }

    /// Derives features for one standardized Parquet file into
    /// `<out_dir>/<stem>_features.parquet`.
    #[tracing::instrument(skip(self), fields(file = %input.display()))]
    pub fn process_file(&self, input: &Path, out_dir: &Path) -> FeatureResult<FileReport> {
        let start = Instant::now();
        let matrix = self.run(io::read_parquet(input)?.lazy())?;

        let output = out_dir.join(format!(
            "{}{FEATURES_SUFFIX}.{}",
            io::file_stem(input)?,
            FileExtension::Parquet
        ));
        io::write_parquet(&matrix.data, &output)?;

        Ok(FileReport::new(input, &output, &matrix.data, start.elapsed()))
    }

    /// Derives features for every file, skipping (and reporting) files that fail.
    pub fn process_files(&self, inputs: &[PathBuf], out_dir: &Path) -> FeatureResult<BatchReport> {
        run_files("features", inputs, self.config.show_progress, |path| {
            self.process_file(path, out_dir)
        })
    }

    fn check_robust_stats_inputs(&self, schema: &Schema) -> FeatureResult<()> {
        let outliers = self
            .config
            .filter_outliers
            .then_some(&self.config.outliers.columns)
            .into_iter()
            .flatten()
            .map(|c| ("outliers", c));
        let grouped = self.config.imputations.iter().flat_map(|spec| {
            std::iter::once(&spec.column)
                .chain(spec.group_by.iter())
                .map(|c| ("imputation", c))
        });
        let global = self
            .config
            .global_imputations
            .iter()
            .map(|spec| ("global_imputation", &spec.column));

        match outliers
            .chain(grouped)
            .chain(global)
            .find(|(_, c)| !schema.contains(c.as_str()))
        {
            Some((stage, column)) => Err(DataError::MissingColumn {
                batch: stage.to_string(),
                column: column.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use polars::{
        df,
        prelude::{AnyValue, DataType},
    };

    use crate::{
        config::ImputationSpec,
        error::FeatureError,
        features::{FeatureCol, booking::BookingBatch},
        stats::Aggregator,
    };

    use super::*;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2013, 4, day)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .expect("valid timestamp")
    }

    fn impressions() -> DataFrame {
        df![
            "search_id" => &[1i32, 1, 2, 2, 3],
            "search_timestamp" => &[ts(1), ts(1), ts(2), ts(2), ts(3)],
            "hotel_id" => &[10i32, 11, 10, 11, 12],
            "display_price" => &[100.0, 110.0, 105.0, 5000.0, 95.0],
            "display_position" => &[Some(1i32), Some(2), Some(1), None, Some(1)],
            "was_clicked" => &[true, false, false, true, false],
            "was_booked" => &[true, false, false, false, false],
            "hotel_review_score" => &[Some(4.0), None, None, Some(3.0), None],
        ]
        .expect("Failed to create DF")
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
            .with_outlier_threshold(3.0)
            .with_imputations(vec![ImputationSpec::new(
                "hotel_review_score",
                vec!["hotel_id".into()],
                Aggregator::Mean,
            )])
            .with_memory_optimization(false)
    }

    #[test]
    fn robust_stats_run_before_features() {
        let pipeline = FeaturePipeline::new(config())
            .expect("valid config")
            .with_plan(FeaturePlan::empty().with_batch(BookingBatch::default()));

        let matrix = pipeline.run(impressions().lazy()).expect("run");
        let df = matrix.data;
        assert_eq!(df.height(), 5);

        let price = df.column("display_price").expect("price");
        assert_eq!(price.get(3).expect("value"), AnyValue::Null, "5000 is an outlier");
        assert_eq!(price.null_count(), 1);

        let score = df
            .column("hotel_review_score")
            .expect("score")
            .f64()
            .expect("f64")
            .into_iter()
            .collect::<Vec<_>>();
        // Hotel 12 has no score at all and stays null
        assert_eq!(score, vec![Some(4.0), Some(3.0), Some(4.0), Some(3.0), None]);

        assert!(df.column(FeatureCol::ClickProb.as_str()).is_ok());
        assert!(matrix.memory.is_none());
    }

    #[test]
    fn memory_optimization_reports_casts() {
        let pipeline = FeaturePipeline::new(config().with_memory_optimization(true))
            .expect("valid config")
            .with_plan(FeaturePlan::empty().with_batch(BookingBatch::default()));

        let matrix = pipeline.run(impressions().lazy()).expect("run");
        let report = matrix.memory.expect("memory report");
        assert!(report.casts.iter().any(|c| c.column == "hotel_id"));
        assert_eq!(
            matrix.data.column("hotel_id").expect("id").dtype(),
            &DataType::Int8
        );
    }

    #[test]
    fn missing_imputation_column_fails_before_collecting() {
        let pipeline = FeaturePipeline::new(config().add_imputation(ImputationSpec::new(
            "hotel_star_rating",
            vec!["hotel_id".into()],
            Aggregator::Median,
        )))
        .expect("valid config");

        let err = pipeline
            .build(impressions().lazy())
            .err()
            .expect("Unknown column must fail");
        assert!(
            matches!(
                err,
                FeatureError::Data(DataError::MissingColumn { ref column, .. }) if column == "hotel_star_rating"
            ),
            "Unexpected error: {err:?}"
        );
    }

    #[test]
    fn default_plan_reports_missing_feature_inputs() {
        let pipeline = FeaturePipeline::new(config()).expect("valid config");
        let err = pipeline
            .build(impressions().lazy())
            .err()
            .expect("Impressions lack most canonical columns");
        assert!(matches!(
            err,
            FeatureError::Data(DataError::MissingColumn { .. })
        ));
    }
}
