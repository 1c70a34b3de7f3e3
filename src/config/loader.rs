use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Mutex,
};

use lru::LruCache;
use serde::de::DeserializeOwned;

use crate::{
    config::{PipelineConfig, TableStyles},
    error::{ConfigError, FeatureResult, SystemError},
    schema::{RenameMap, SchemaMap},
};

pub const RENAME_MAP_FILE: &str = "features/rename_map.yaml";
pub const SCHEMA_FILE: &str = "features/schema.yaml";
pub const PIPELINE_FILE: &str = "pipeline.yaml";
pub const TABLE_STYLES_FILE: &str = "dashboard/table_styles.yaml";

/// Maximum number of parsed documents kept by a [`ConfigLoader`].
pub const CONFIG_CACHE_CAPACITY: usize = 10;

/// Everything a run needs from the configuration root, loaded once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    pub rename_map: RenameMap,
    pub schema: SchemaMap,
    pub table_styles: TableStyles,
    pub pipeline: PipelineConfig,
}

/// Reads YAML documents below a configuration root.
///
/// Parsed documents are kept in a small least-recently-used cache that lives as long as the
/// loader. Configuration is read-only for the process, so entries are never invalidated.
#[derive(Debug)]
pub struct ConfigLoader {
    root: PathBuf,
    cache: Mutex<DocumentCache>,
}

impl ConfigLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(document_cache(CONFIG_CACHE_CAPACITY)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads the required rename map, schema and table styles plus the optional pipeline file.
    ///
    /// # Errors
    /// [`ConfigError::MissingFile`] if a required document is absent, and
    /// [`ConfigError::InvalidValue`] if the pipeline configuration does not validate.
    #[tracing::instrument(skip(self), fields(root = %self.root.display()))]
    pub fn bundle(&self) -> FeatureResult<FeatureConfig> {
        let rename_map: RenameMap = self.load(RENAME_MAP_FILE)?;
        let schema: SchemaMap = self.load(SCHEMA_FILE)?;
        let table_styles: TableStyles = self.load(TABLE_STYLES_FILE)?;
        let pipeline: PipelineConfig = self.load_or_default(PIPELINE_FILE)?;
        pipeline.validate()?;

        tracing::info!(
            renames = rename_map.len(),
            schema_columns = schema.len(),
            style_rules = table_styles.style_rules.len(),
            "Loaded feature configuration"
        );

        Ok(FeatureConfig {
            rename_map,
            schema,
            table_styles,
            pipeline,
        })
    }

    /// Deserializes a required document relative to the root.
    pub fn load<T: DeserializeOwned>(&self, relative: &str) -> FeatureResult<T> {
        let doc = self.document(relative)?;
        serde_yaml::from_value(doc).map_err(|source| {
            ConfigError::Yaml {
                file: relative.to_string(),
                source,
            }
            .into()
        })
    }

    /// Like [`ConfigLoader::load`], but an absent file yields `T::default()`.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, relative: &str) -> FeatureResult<T> {
        if !self.root.join(relative).exists() {
            tracing::debug!(file = relative, "Optional configuration absent, using defaults");
            return Ok(T::default());
        }
        self.load(relative)
    }

    /// Number of documents currently cached.
    pub fn cached_documents(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn document(&self, relative: &str) -> FeatureResult<serde_yaml::Value> {
        let path = self.root.join(relative);

        let mut cache = self
            .cache
            .lock()
            .map_err(|e| SystemError::LockPoisoned(format!("config cache: {e}")))?;

        if let Some(doc) = cache.get(path.as_path()) {
            return Ok(doc.clone());
        }

        if !path.is_file() {
            return Err(ConfigError::MissingFile(path.display().to_string()).into());
        }

        let text = fs::read_to_string(&path)
            .map_err(|_| ConfigError::MissingFile(path.display().to_string()))?;
        let doc: serde_yaml::Value =
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
                file: relative.to_string(),
                source,
            })?;

        tracing::debug!(file = %path.display(), "Parsed configuration document");
        cache.put(path, doc.clone());
        Ok(doc)
    }
}

type DocumentCache = LruCache<PathBuf, serde_yaml::Value>;

fn document_cache(capacity: usize) -> DocumentCache {
    LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
}

#[cfg(test)]
mod tests {
    use crate::{error::FeatureError, schema::SemanticType};

    use super::*;

    fn write(root: &Path, relative: &str, body: &str) {
        let path = root.join(relative);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).expect("Failed to create config dir");
        }
        fs::write(path, body).expect("Failed to write config file");
    }

    fn seeded_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        write(dir.path(), RENAME_MAP_FILE, "prop_id: hotel_id\nprice_usd: display_price\n");
        write(dir.path(), SCHEMA_FILE, "hotel_id: Int32\ndisplay_price: Float64\n");
        write(
            dir.path(),
            TABLE_STYLES_FILE,
            "style_rules:\n  - filter_query: \"{zero_pct} > 50\"\n    background_color: \"#fff3cd\"\n    color: \"#856404\"\n",
        );
        dir
    }

    #[test]
    fn bundle_loads_required_files_and_defaults_pipeline() {
        let root = seeded_root();
        let loader = ConfigLoader::new(root.path());

        let cfg = loader.bundle().expect("Failed to load bundle");
        assert_eq!(cfg.rename_map.get("prop_id"), Some("hotel_id"));
        assert_eq!(cfg.schema.get("display_price"), Some(SemanticType::Float64));
        assert_eq!(cfg.table_styles.style_rules.len(), 1);
        assert_eq!(cfg.pipeline, PipelineConfig::default());
    }

    #[test]
    fn bundle_fails_fast_on_missing_schema() {
        let root = seeded_root();
        fs::remove_file(root.path().join(SCHEMA_FILE)).expect("Failed to remove schema");

        let err = ConfigLoader::new(root.path())
            .bundle()
            .expect_err("Missing schema must fail");
        assert!(
            matches!(err, FeatureError::Config(ConfigError::MissingFile(_))),
            "Unexpected error: {err:?}"
        );
    }

    #[test]
    fn documents_are_cached_after_first_load() {
        let root = seeded_root();
        let loader = ConfigLoader::new(root.path());

        let first: RenameMap = loader.load(RENAME_MAP_FILE).expect("first load");
        // Later edits are not observed: the loader serves the cached document
        write(root.path(), RENAME_MAP_FILE, "prop_id: property\n");
        let second: RenameMap = loader.load(RENAME_MAP_FILE).expect("second load");

        assert_eq!(first, second);
        assert_eq!(loader.cached_documents(), 1);
    }

    #[test]
    fn cache_evicts_least_recently_used_beyond_capacity() {
        let mut cache = document_cache(2);
        cache.put(PathBuf::from("a"), serde_yaml::Value::Null);
        cache.put(PathBuf::from("b"), serde_yaml::Value::Null);
        assert!(cache.get(Path::new("a")).is_some());
        cache.put(PathBuf::from("c"), serde_yaml::Value::Null);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(Path::new("a")).is_some());
        assert!(cache.get(Path::new("b")).is_none(), "b was least recently used");
    }

    #[test]
    fn invalid_pipeline_file_is_rejected() {
        let root = seeded_root();
        write(root.path(), PIPELINE_FILE, "outliers:\n  threshold: -1.0\n");

        let err = ConfigLoader::new(root.path())
            .bundle()
            .expect_err("Negative threshold must fail");
        assert!(matches!(err, FeatureError::Config(ConfigError::InvalidValue(_))));
    }
}
