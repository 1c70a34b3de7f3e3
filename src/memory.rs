use polars::prelude::{Column, DataFrame, DataType};

use crate::{error::FeatureResult, polars_ext::polars_to_feature_error};

const SIGNED_TARGETS: [DataType; 3] = [DataType::Int8, DataType::Int16, DataType::Int32];
const UNSIGNED_TARGETS: [DataType; 3] = [DataType::UInt8, DataType::UInt16, DataType::UInt32];

/// A column that was narrowed.
#[derive(Debug, Clone, PartialEq)]
pub struct DowncastRecord {
    pub column: String,
    pub from: DataType,
    pub to: DataType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryReport {
    pub before_bytes: usize,
    pub after_bytes: usize,
    pub casts: Vec<DowncastRecord>,
}

impl MemoryReport {
    pub fn bytes_saved(&self) -> usize {
        self.before_bytes.saturating_sub(self.after_bytes)
    }
}

/// Narrows numeric columns to the smallest type that holds every observed value.
///
/// Integers are bounds-checked against the observed min and max. `Float64` becomes `Float32`
/// only when the column has no nulls or NaNs, fits the `f32` range, and every value
/// round-trips within `f32::EPSILON` relative error. Other columns are left untouched.
#[tracing::instrument(skip(df), fields(rows = df.height(), columns = df.width()))]
pub fn downcast(df: DataFrame) -> FeatureResult<(DataFrame, MemoryReport)> {
    let before_bytes = df.estimated_size();
    let mut casts = Vec::new();
    let mut columns = Vec::with_capacity(df.width());

    for column in df.get_columns() {
        let target = match column.dtype() {
            dt if dt.is_signed_integer() => narrowest_integer(column, &SIGNED_TARGETS)?,
            dt if dt.is_unsigned_integer() => narrowest_integer(column, &UNSIGNED_TARGETS)?,
            DataType::Float64 if float32_is_lossless(column)? => Some(DataType::Float32),
            _ => None,
        };

        match target {
            Some(to) => {
                let cast = column
                    .strict_cast(&to)
                    .map_err(|e| polars_to_feature_error("memory downcast", e))?;
                casts.push(DowncastRecord {
                    column: column.name().to_string(),
                    from: column.dtype().clone(),
                    to,
                });
                columns.push(cast);
            }
            None => columns.push(column.clone()),
        }
    }

    let out = DataFrame::new(columns).map_err(|e| polars_to_feature_error("memory downcast", e))?;
    let report = MemoryReport {
        before_bytes,
        after_bytes: out.estimated_size(),
        casts,
    };

    tracing::info!(
        casts = report.casts.len(),
        before_mb = format!("{:.2}", mb(report.before_bytes)),
        after_mb = format!("{:.2}", mb(report.after_bytes)),
        saved_mb = format!("{:.2}", mb(report.bytes_saved())),
        "Memory optimized"
    );
    Ok((out, report))
}

fn narrowest_integer(column: &Column, targets: &[DataType]) -> FeatureResult<Option<DataType>> {
    let current = integer_width(column.dtype());
    let series = column.as_materialized_series();
    let (Some(min), Some(max)) = (
        series
            .min::<f64>()
            .map_err(|e| polars_to_feature_error("downcast bounds", e))?,
        series
            .max::<f64>()
            .map_err(|e| polars_to_feature_error("downcast bounds", e))?,
    ) else {
        return Ok(None);
    };

    Ok(targets
        .iter()
        .filter(|t| integer_width(t) < current)
        .find(|t| {
            let (lo, hi) = integer_bounds(t);
            min >= lo && max <= hi
        })
        .cloned())
}

fn float32_is_lossless(column: &Column) -> FeatureResult<bool> {
    if column.null_count() > 0 || column.is_empty() {
        return Ok(false);
    }
    let values = column
        .f64()
        .map_err(|e| polars_to_feature_error("float downcast check", e))?;

    let eps = f32::EPSILON as f64;
    Ok(values.into_no_null_iter().all(|v| {
        if !v.is_finite() || v.abs() > f32::MAX as f64 {
            return false;
        }
        let back = v as f32 as f64;
        (back - v).abs() <= eps * v.abs()
    }))
}

fn integer_width(dtype: &DataType) -> usize {
    match dtype {
        DataType::Int8 | DataType::UInt8 => 1,
        DataType::Int16 | DataType::UInt16 => 2,
        DataType::Int32 | DataType::UInt32 => 4,
        DataType::Int64 | DataType::UInt64 => 8,
        _ => 16,
    }
}

fn integer_bounds(dtype: &DataType) -> (f64, f64) {
    match dtype {
        DataType::Int8 => (i8::MIN as f64, i8::MAX as f64),
        DataType::Int16 => (i16::MIN as f64, i16::MAX as f64),
        DataType::Int32 => (i32::MIN as f64, i32::MAX as f64),
        DataType::UInt8 => (0.0, u8::MAX as f64),
        DataType::UInt16 => (0.0, u16::MAX as f64),
        DataType::UInt32 => (0.0, u32::MAX as f64),
        _ => (f64::MIN, f64::MAX),
    }
}

fn mb(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    fn dtype_of(df: &DataFrame, name: &str) -> DataType {
        df.column(name).expect("column").dtype().clone()
    }

    #[test]
    fn integers_narrow_to_the_smallest_fitting_width() {
        let df = df![
            "small" => &[1i64, -5, 100],
            "medium" => &[1i64, 200, -300],
            "large" => &[0i64, 3_000_000_000],
            "unsigned" => &[0u64, 255],
            "already_small" => &[1i8, 2],
            "all_null" => &[None::<i64>, None],
        ]
        .expect("Failed to create DF");

        let (out, report) = downcast(df).expect("downcast");

        let cases = [
            ("small", DataType::Int8),
            ("medium", DataType::Int16),
            ("large", DataType::Int64),
            ("unsigned", DataType::UInt8),
            ("already_small", DataType::Int8),
            ("all_null", DataType::Int64),
        ];
        for (name, expected) in cases {
            assert_eq!(dtype_of(&out, name), expected, "Column '{name}'");
        }
        assert_eq!(report.casts.len(), 3);
        assert!(report.after_bytes < report.before_bytes);
        assert_eq!(report.bytes_saved(), report.before_bytes - report.after_bytes);
    }

    #[test]
    fn floats_narrow_only_when_values_survive() {
        let df = df![
            "halves" => &[0.5, 1.25, -8.0],
            "with_null" => &[Some(0.5), None],
            "with_nan" => &[0.5, f64::NAN],
            "sub_epsilon" => &[1.0 + 1e-12, 1.0],
            "too_large" => &[1e300, 1.0],
        ]
        .expect("Failed to create DF");

        let (out, _) = downcast(df).expect("downcast");

        assert_eq!(dtype_of(&out, "halves"), DataType::Float32);
        assert_eq!(dtype_of(&out, "with_null"), DataType::Float64);
        assert_eq!(dtype_of(&out, "with_nan"), DataType::Float64);
        assert_eq!(dtype_of(&out, "too_large"), DataType::Float64);
        // 1e-12 is below f32 resolution at 1.0, so the values round-trip within epsilon
        assert_eq!(dtype_of(&out, "sub_epsilon"), DataType::Float32);
    }

    #[test]
    fn downcast_values_reconstruct_the_original() {
        let original = df![
            "ints" => &[-120i64, 0, 127],
            "floats" => &[0.1, 2.5, 1e6],
        ]
        .expect("Failed to create DF");

        let (out, report) = downcast(original.clone()).expect("downcast");
        assert_eq!(report.casts.len(), 2);

        let ints = out
            .column("ints")
            .expect("ints")
            .cast(&DataType::Int64)
            .expect("widen");
        assert!(ints.equals(original.column("ints").expect("ints")));

        let widened = out
            .column("floats")
            .expect("floats")
            .cast(&DataType::Float64)
            .expect("widen");
        let back = widened.f64().expect("f64");
        let orig = original.column("floats").expect("floats").f64().expect("f64");
        for (b, o) in back.into_no_null_iter().zip(orig.into_no_null_iter()) {
            assert!((b - o).abs() <= f32::EPSILON as f64 * o.abs());
        }
    }
}
