use polars::prelude::{DataFrame, DataType, Expr, JsonFormat, JsonWriter, Null, SerWriter, lit, when};
use serde_json::Value;

use crate::error::{DataError, FeatureError, FeatureResult, IoError};

pub(crate) fn polars_to_feature_error(stage: &str, e: polars::error::PolarsError) -> FeatureError {
    FeatureError::Data(DataError::DataFrame(format!(
        "Error while executing {stage}: {e}"
    )))
}

pub trait ExprExt {
    /// Safely divides two expressions, protecting against division-by-zero.
    ///
    /// If the denominator is zero, returns `fallback`. A `None` fallback yields null,
    /// so zero-variance or empty groups surface as missing values instead of infinities.
    fn safe_div(self, other: Expr, fallback: Option<f64>) -> Expr;
}

impl ExprExt for Expr {
    fn safe_div(self, other: Expr, fallback: Option<f64>) -> Expr {
        let fallback_val = match fallback {
            Some(v) => lit(v),
            None => lit(Null {}).cast(DataType::Float64),
        };
        when(other.clone().eq(lit(0.0)))
            .then(fallback_val)
            .otherwise(self.cast(DataType::Float64) / other.cast(DataType::Float64))
    }
}

pub trait DataFrameExt {
    fn to_json_rows(&self) -> FeatureResult<Vec<serde_json::Map<String, Value>>>;

    /// Reads the first value of `name` as `f64`, casting numeric columns as needed.
    fn scalar_f64(&self, name: &str) -> FeatureResult<Option<f64>>;
}

impl DataFrameExt for DataFrame {
    fn to_json_rows(&self) -> FeatureResult<Vec<serde_json::Map<String, Value>>> {
        let height = self.height();
        if height == 0 {
            return Ok(Vec::new());
        }

        // Heuristic: approx 2^6 bytes per cell
        let estimated_row_size = self.width() * (1 << 6);
        let mut buf = Vec::with_capacity(height * estimated_row_size);

        JsonWriter::new(&mut buf)
            .with_json_format(JsonFormat::Json)
            .finish(&mut self.clone())
            .map_err(|e| DataError::DataFrame(e.to_string()))?;

        let json_val: Value = serde_json::from_slice(&buf).map_err(IoError::Json)?;

        match json_val {
            Value::Array(rows) => {
                let mut out_vec = Vec::with_capacity(rows.len());
                for v in rows {
                    if let Value::Object(map) = v {
                        out_vec.push(map);
                    }
                }
                Ok(out_vec)
            }
            _ => {
                Err(DataError::DataFrame("Polars JSON output was not an array".to_string()).into())
            }
        }
    }

    fn scalar_f64(&self, name: &str) -> FeatureResult<Option<f64>> {
        if self.height() == 0 {
            return Ok(None);
        }
        let column = self
            .column(name)
            .and_then(|c| c.cast(&DataType::Float64))
            .map_err(|e| polars_to_feature_error("scalar extraction", e))?;
        let value = column
            .f64()
            .map_err(|e| polars_to_feature_error("scalar extraction", e))?
            .get(0);
        Ok(value.filter(|v| !v.is_nan()))
    }
}
