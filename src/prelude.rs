// 1. Traits
pub use crate::features::FeatureBatch;
pub use crate::polars_ext::{DataFrameExt, ExprExt};
pub use crate::report::io::{Report, ReportName, ToCsv, ToJson, ToParquet, ToSchema};

// 2. Pipeline
pub use crate::aggregate::GroupJoin;
pub use crate::features::{BatchKind, FeatureCol, FeaturePlan};
pub use crate::memory::{MemoryReport, downcast};
pub use crate::pipeline::{
    FeatureMatrix, FeaturePipeline,
    batch::{BatchReport, FileFailure, FileReport},
};
pub use crate::schema::standardize::Standardizer;
pub use crate::stats::{
    Aggregator,
    impute::{GlobalImputer, GroupImputer},
    mad::MadFilter,
};

// 3. Schema
pub use crate::schema::{CompetitorCol, RecordCol, RenameMap, SchemaMap, SemanticType};

// 4. Configuration
pub use crate::config::{
    ImputationSpec, OutlierConfig, PipelineConfig, PriceTiers, RollingWindow, TableStyles,
    loader::{ConfigLoader, FeatureConfig},
};

// 5. Reports
pub use crate::report::{
    artifacts::{ArtifactStore, ArtifactWriter, TargetLabel},
    summary::{FeatureSummary, SummaryCol},
};

// 6. Errors
pub use crate::error::{
    CastError, ConfigError, DataError, FeatureError, FeatureResult, IoError, SystemError,
};

// 7. I/O
pub use crate::io::{FileExtension, list_files, read_parquet, scan_raw_csv, write_parquet};
