//! Feature engineering for hotel search and booking impressions.
//!
//! Raw exports are brought onto a canonical schema ([`schema::standardize`]), cleaned with
//! robust statistics ([`stats`]), extended by dependency-ordered feature batches
//! ([`features`]) and materialized with narrowed column types ([`memory`]). The
//! [`report`] module precomputes the tables a dashboard reads.
//!
//! ```no_run
//! use booking_features::prelude::*;
//!
//! # fn main() -> FeatureResult<()> {
//! let loader = ConfigLoader::new("configs");
//! let cfg = loader.bundle()?;
//!
//! let standardizer = Standardizer::from_config(&cfg);
//! let raw = list_files("data/raw".as_ref(), FileExtension::Csv)?;
//! standardizer.standardize_files(&raw, "data/interim".as_ref(), true)?;
//!
//! let pipeline = FeaturePipeline::new(cfg.pipeline.clone())?;
//! let standardized = list_files("data/interim".as_ref(), FileExtension::Parquet)?;
//! pipeline.process_files(&standardized, "data/processed".as_ref())?;
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod features;
pub mod io;
pub mod memory;
pub mod pipeline;
pub mod polars_ext;
pub mod prelude;
pub mod report;
pub mod schema;
pub mod stats;
