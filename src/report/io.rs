use std::path::Path;

use polars::{
    frame::DataFrame,
    prelude::{
        CsvWriterOptions, IntoLazy, ParquetWriteOptions, PlPath, Schema, SchemaRef, SinkOptions,
        SinkTarget,
    },
};
use serde_json::Value;

use crate::{
    error::{DataError, FeatureResult, IoError},
    io::{FileExtension, ensure_dir, path_to_uri},
    polars_ext::DataFrameExt,
};

// ================================================================================================
// Traits
// ================================================================================================

/// Common interface of the materialized tables handed to the dashboard.
pub trait Report {
    fn as_df(&self) -> &DataFrame;
}

pub trait ReportName {
    fn base_name(&self) -> String;

    fn filename(&self, ext: FileExtension) -> String {
        format!("{}.{}", self.base_name(), ext)
    }
}

pub trait ToSchema {
    /// Returns the canonical schema for this report type.
    fn to_schema() -> SchemaRef;

    /// Canonical columns absent from `schema`, skipping the ones listed in `optional`.
    fn missing_columns(schema: &Schema, optional: &[&str]) -> Vec<String> {
        Self::to_schema()
            .iter_names()
            .filter(|name| !optional.contains(&name.as_str()) && !schema.contains(name.as_str()))
            .map(|name| name.to_string())
            .collect()
    }
}

pub trait ToJson {
    /// Serializes the report to a `Value::Array` of row objects.
    fn to_json(&self) -> FeatureResult<Value>;
}

pub trait ToCsv {
    /// Writes the report to `<dir>/<base_name>.csv`.
    ///
    /// The directory is created if missing and an existing file is overwritten.
    fn to_csv(
        &self,
        dir: impl AsRef<Path>,
        opts: Option<&CsvWriterOptions>,
        sink_opts: Option<&SinkOptions>,
    ) -> FeatureResult<()>;
}

pub trait ToParquet {
    /// Writes the report to `<dir>/<base_name>.parquet`.
    fn to_parquet(
        &self,
        dir: impl AsRef<Path>,
        opts: Option<&ParquetWriteOptions>,
        sink_opts: Option<&SinkOptions>,
    ) -> FeatureResult<()>;
}

// ================================================================================================
// Blanket Implementations
// ================================================================================================

impl<T> ToJson for T
where
    T: Report,
{
    fn to_json(&self) -> FeatureResult<Value> {
        let rows = self.as_df().to_json_rows()?;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}

impl<T> ToCsv for T
where
    T: Report + ReportName,
{
    fn to_csv(
        &self,
        dir: impl AsRef<Path>,
        opts: Option<&CsvWriterOptions>,
        sink_opts: Option<&SinkOptions>,
    ) -> FeatureResult<()> {
        let dir = dir.as_ref();
        let file_path = dir.join(self.filename(FileExtension::Csv));
        ensure_dir(dir)?;

        let target = SinkTarget::Path(PlPath::new(path_to_uri(&file_path)?));
        let options = opts.cloned().unwrap_or_default();
        let sink_opts = sink_opts.cloned().unwrap_or_default();

        let sink_plan = self
            .as_df()
            .clone()
            .lazy()
            .sink_csv(target, options, None, sink_opts)
            .map_err(|e| DataError::DataFrame(format!("Failed to build CSV sink plan: {e}")))?;

        let _ = sink_plan.collect().map_err(|e| {
            IoError::WriteFailed(format!(
                "Failed to write CSV to '{}': {e}",
                file_path.display()
            ))
        })?;

        Ok(())
    }
}

impl<T> ToParquet for T
where
    T: Report + ReportName,
{
    fn to_parquet(
        &self,
        dir: impl AsRef<Path>,
        opts: Option<&ParquetWriteOptions>,
        sink_opts: Option<&SinkOptions>,
    ) -> FeatureResult<()> {
        let file_path = dir.as_ref().join(self.filename(FileExtension::Parquet));
        crate::io::write_parquet_with(self.as_df(), &file_path, opts, sink_opts)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use polars::{
        df,
        prelude::{DataType, Field},
    };

    use super::*;

    struct Ranking {
        df: DataFrame,
    }

    impl Report for Ranking {
        fn as_df(&self) -> &DataFrame {
            &self.df
        }
    }

    impl ReportName for Ranking {
        fn base_name(&self) -> String {
            "ranking".to_string()
        }
    }

    impl ToSchema for Ranking {
        fn to_schema() -> SchemaRef {
            Arc::new(Schema::from_iter([
                Field::new("feature".into(), DataType::String),
                Field::new("importance".into(), DataType::Float64),
                Field::new("note".into(), DataType::String),
            ]))
        }
    }

    fn ranking() -> Ranking {
        let df = df![
            "feature" => &["click_prob", "display_price"],
            "importance" => &[0.42, 0.17],
        ]
        .expect("Failed to create DF");
        Ranking { df }
    }

    #[test]
    fn json_has_one_object_per_row() {
        let json = ranking().to_json().expect("json");
        let rows = json.as_array().expect("array");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["feature"], "click_prob");
        assert_eq!(rows[1]["importance"], 0.17);
    }

    #[test]
    fn parquet_and_csv_land_under_base_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let report = ranking();

        report.to_parquet(dir.path(), None, None).expect("parquet");
        report.to_csv(dir.path(), None, None).expect("csv");

        let back = crate::io::read_parquet(&dir.path().join("ranking.parquet")).expect("read");
        assert_eq!(back.height(), 2);
        let csv = std::fs::read_to_string(dir.path().join("ranking.csv")).expect("csv file");
        assert!(csv.starts_with("feature,importance"));
    }

    #[test]
    fn missing_columns_honours_optional_ones() {
        let report = ranking();
        let schema = report.as_df().schema();
        assert_eq!(
            Ranking::missing_columns(schema, &[]),
            vec!["note".to_string()]
        );
        assert!(Ranking::missing_columns(schema, &["note"]).is_empty());
    }
}
