use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Instant,
};

use polars::prelude::{DataType, Expr, LazyFrame, PlSmallStr, Schema, col};

use crate::{
    config::loader::FeatureConfig,
    error::{CastError, FeatureError, FeatureResult},
    io::{self, FileExtension},
    pipeline::batch::{BatchReport, FileReport, run_files},
    polars_ext::polars_to_feature_error,
    schema::{RenameMap, SchemaMap, SemanticType},
};

/// Brings raw tables onto the canonical schema: rename, cast, backfill.
#[derive(Debug, Clone)]
pub struct Standardizer {
    rename: RenameMap,
    schema: SchemaMap,
}

impl Standardizer {
    pub fn new(rename: RenameMap, schema: SchemaMap) -> Self {
        Self { rename, schema }
    }

    pub fn from_config(cfg: &FeatureConfig) -> Self {
        Self::new(cfg.rename_map.clone(), cfg.schema.clone())
    }

    pub fn schema(&self) -> &SchemaMap {
        &self.schema
    }

    /// Builds the standardization plan for `lf`.
    ///
    /// Renaming is non-strict: unmapped columns pass through and map entries without a source
    /// column are skipped. Every schema column present afterwards is strictly cast to its
    /// declared type; schema columns still missing are appended, in name order, as typed
    /// placeholders. Cast failures surface when the returned frame is collected.
    pub fn standardize(&self, mut lf: LazyFrame) -> FeatureResult<LazyFrame> {
        let source = lf
            .collect_schema()
            .map_err(|e| polars_to_feature_error("standardization schema", e))?;

        let steps = self.column_steps(&source);
        let produced = steps
            .iter()
            .map(|s| s.target.clone())
            .collect::<HashSet<_>>();
        let mut exprs = steps.into_iter().map(|s| s.expr).collect::<Vec<_>>();

        let missing = self
            .schema
            .iter()
            .filter(|(name, _)| !produced.contains(*name))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            tracing::debug!(
                columns = ?missing.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
                "Backfilling columns absent from input"
            );
        }
        exprs.extend(
            missing
                .into_iter()
                .map(|(name, ty)| ty.placeholder().alias(name)),
        );

        Ok(lf.select(exprs))
    }

    /// Finds the first column of `lf` whose cast to its declared type fails.
    ///
    /// Each cast is evaluated on its own, so this is only worth running once the full
    /// standardization has already failed.
    pub fn failing_cast(&self, mut lf: LazyFrame) -> Option<CastError> {
        let source = lf.collect_schema().ok()?;
        self.column_steps(&source)
            .into_iter()
            .filter_map(|step| step.cast_to.map(|ty| (step, ty)))
            .find_map(|(step, ty)| {
                lf.clone()
                    .select([step.expr])
                    .collect()
                    .err()
                    .map(|e| CastError::Column {
                        column: step.source.to_string(),
                        dtype: ty.to_string(),
                        msg: e.to_string(),
                    })
            })
    }

    /// Standardizes one raw CSV file into `<out_dir>/<stem>.parquet`.
    ///
    /// The table is fully materialized before anything is written, so a cast failure leaves
    /// no output behind.
    #[tracing::instrument(skip(self), fields(file = %input.display()))]
    pub fn standardize_file(&self, input: &Path, out_dir: &Path) -> FeatureResult<FileReport> {
        let start = Instant::now();

        let raw = io::scan_raw_csv(input)?;
        let df = match self.standardize(raw.clone())?.collect() {
            Ok(df) => df,
            Err(e) => {
                let source = match self.failing_cast(raw) {
                    Some(cast) => FeatureError::Cast(cast),
                    None => polars_to_feature_error("standardization", e),
                };
                return Err(CastError::File {
                    file: input.display().to_string(),
                    source: Box::new(source),
                }
                .into());
            }
        };

        let output = out_dir.join(format!(
            "{}.{}",
            io::file_stem(input)?,
            FileExtension::Parquet
        ));
        io::write_parquet(&df, &output)?;

        Ok(FileReport::new(input, &output, &df, start.elapsed()))
    }

    /// Standardizes every file, skipping (and reporting) files that fail.
    pub fn standardize_files(
        &self,
        inputs: &[PathBuf],
        out_dir: &Path,
        show_progress: bool,
    ) -> FeatureResult<BatchReport> {
        run_files("standardize", inputs, show_progress, |path| {
            self.standardize_file(path, out_dir)
        })
    }

    /// Renamed (and, for schema columns, cast) expressions for the columns of `source`.
    fn column_steps(&self, source: &Schema) -> Vec<ColumnStep> {
        let mut produced: HashSet<PlSmallStr> = HashSet::with_capacity(source.len());
        let mut steps = Vec::with_capacity(source.len());

        for (name, dtype) in source.iter() {
            let target = self.target_name(name, source, &produced);
            if !produced.insert(target.clone()) {
                tracing::warn!(column = %name, target = %target, "Duplicate column after renaming; dropping");
                continue;
            }

            let cast_to = self.schema.get(target.as_str());
            let expr = match cast_to {
                Some(ty) => cast_expr(col(name.clone()), dtype, ty),
                None => col(name.clone()),
            };
            steps.push(ColumnStep {
                source: name.clone(),
                target: target.clone(),
                expr: expr.alias(target),
                cast_to,
            });
        }
        steps
    }

    fn target_name(
        &self,
        name: &PlSmallStr,
        source: &Schema,
        produced: &HashSet<PlSmallStr>,
    ) -> PlSmallStr {
        match self.rename.get(name.as_str()) {
            Some(target) if target != name.as_str() => {
                if source.contains(target) || produced.contains(target) {
                    tracing::warn!(
                        column = %name,
                        target,
                        "Rename target already present; keeping original name"
                    );
                    name.clone()
                } else {
                    PlSmallStr::from(target)
                }
            }
            _ => name.clone(),
        }
    }
}

struct ColumnStep {
    source: PlSmallStr,
    target: PlSmallStr,
    expr: Expr,
    cast_to: Option<SemanticType>,
}

fn cast_expr(expr: Expr, current: &DataType, ty: SemanticType) -> Expr {
    let dtype = ty.to_dtype();
    match ty {
        // Categories are built from their string form
        SemanticType::Categorical => expr.cast(DataType::String).strict_cast(dtype),
        _ if *current == dtype => expr,
        _ => expr.strict_cast(dtype),
    }
}
