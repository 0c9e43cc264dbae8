//! Database configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::Database`].
///
/// Deserializes from any serde format; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of transformed documents written per bulk update during a
    /// migration.
    pub migration_batch_size: usize,

    /// Collection holding migration ledger records.
    pub ledger_collection: String,

    /// Whether `find` by identifier may answer from the identity pool.
    ///
    /// Individual calls can still bypass the pool when this is enabled.
    pub pool_lookups: bool,

    /// Whether saves whose content hash did not change skip the write.
    pub skip_unchanged_saves: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            migration_batch_size: 100,
            ledger_collection: "docmap_migrations".to_string(),
            pool_lookups: true,
            skip_unchanged_saves: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the migration bulk-update batch size.
    ///
    /// A size of zero is treated as one.
    #[must_use]
    pub const fn migration_batch_size(mut self, size: usize) -> Self {
        self.migration_batch_size = size;
        self
    }

    /// Sets the ledger collection name.
    #[must_use]
    pub fn ledger_collection(mut self, name: impl Into<String>) -> Self {
        self.ledger_collection = name.into();
        self
    }

    /// Sets whether identifier lookups may answer from the pool.
    #[must_use]
    pub const fn pool_lookups(mut self, value: bool) -> Self {
        self.pool_lookups = value;
        self
    }

    /// Sets whether unchanged saves skip the write.
    #[must_use]
    pub const fn skip_unchanged_saves(mut self, value: bool) -> Self {
        self.skip_unchanged_saves = value;
        self
    }

    pub(crate) fn effective_batch_size(&self) -> usize {
        self.migration_batch_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.migration_batch_size, 100);
        assert_eq!(config.ledger_collection, "docmap_migrations");
        assert!(config.pool_lookups);
        assert!(config.skip_unchanged_saves);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .migration_batch_size(0)
            .ledger_collection("ledger")
            .pool_lookups(false);

        assert_eq!(config.effective_batch_size(), 1);
        assert_eq!(config.ledger_collection, "ledger");
        assert!(!config.pool_lookups);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{ "migration_batch_size": 25 }"#).unwrap();
        assert_eq!(config.migration_batch_size, 25);
        assert_eq!(config.ledger_collection, "docmap_migrations");
    }

    #[test]
    fn json_round_trip() {
        let config = Config::new().skip_unchanged_saves(false);
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
