use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::dialect::Dialect;
use crate::lineage::UNKNOWN;
use crate::store::{LineageStore, MemoryStore, SqliteStore, StoreError};

/// `sqlineage.toml`. Every section and field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub parser: ParserConfig,
    pub store: StoreConfig,
    pub traversal: TraversalConfig,
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserConfig {
    pub dialect: Dialect,
    pub namespace: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            namespace: UNKNOWN.to_owned(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite database file, in memory when absent.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn open(&self) -> Result<Box<dyn LineageStore>, StoreError> {
        Ok(match (self.backend, &self.path) {
            (StoreBackend::Memory, _) => Box::new(MemoryStore::new()),
            (StoreBackend::Sqlite, Some(path)) => Box::new(SqliteStore::open(path)?),
            (StoreBackend::Sqlite, None) => Box::new(SqliteStore::open_in_memory()?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraversalConfig {
    pub max_depth: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self { max_depth: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorConfig {
    pub skip_processed: bool,
    pub parallel: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            skip_processed: true,
            parallel: true,
        }
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(|err| anyhow!("Invalid configuration: {}", err))
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|err| anyhow!("Could not read config file {}: {}", path.display(), err))?;
        content.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, StoreBackend};
    use crate::dialect::Dialect;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.parser.dialect, Dialect::Redshift);
        assert_eq!(config.parser.namespace, "unknown");
        assert_eq!(config.traversal.max_depth, 10);
        assert!(config.extractor.skip_processed);
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_partial_config() {
        let config: Config = r#"
            [parser]
            dialect = "presto"

            [store]
            backend = "sqlite"
            path = "lineage.db"

            [extractor]
            parallel = false
        "#
        .parse()
        .unwrap();
        assert_eq!(config.parser.dialect, Dialect::Presto);
        assert_eq!(config.parser.namespace, "unknown");
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert!(!config.extractor.parallel);
        assert!(config.extractor.skip_processed);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!("[parser]\ndialec = \"presto\"".parse::<Config>().is_err());
        assert!("[parser]\ndialect = \"oracle\"".parse::<Config>().is_err());
    }

    #[test]
    fn test_open_memory_store() {
        let store = Config::default().store.open().unwrap();
        assert_eq!(store.node_count().unwrap(), 0);
    }
}
