#![allow(dead_code)]

use std::path::PathBuf;

use booking_features::prelude::*;
use polars::prelude::{DataFrame, DataType};

pub const GOOD_FIXTURE: &str = "searches_2013.csv";
pub const CORRUPT_FIXTURE: &str = "searches_corrupt.csv";

pub fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn config_dir() -> PathBuf {
    manifest_dir().join("configs")
}

pub fn raw_dir() -> PathBuf {
    manifest_dir().join("tests/fixtures/raw")
}

pub fn raw_fixture(name: &str) -> PathBuf {
    raw_dir().join(name)
}

pub fn setup_config() -> FeatureConfig {
    ConfigLoader::new(config_dir())
        .bundle()
        .expect("Failed to load repository configuration")
}

/// Column values as `f64`, whatever numeric type memory optimization left behind.
pub fn floats(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    df.column(name)
        .unwrap_or_else(|_| panic!("Missing column '{name}'"))
        .cast(&DataType::Float64)
        .expect("Failed to cast to f64")
        .f64()
        .expect("Not a f64 column")
        .into_iter()
        .collect()
}
