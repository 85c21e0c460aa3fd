//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration, password excluded.
    pub fn hash(&self) -> String {
        let mut redacted = self.clone();
        redacted.source.password.clear();
        let yaml = serde_yaml::to_string(&redacted).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DbKind;

    const MINIMAL: &str = r#"
source:
  type: mssql
  host: localhost
  database: shop
  user: sa
  password: secret
target:
  type: postgres
"#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.source.port(), 1433);
        assert_eq!(config.source.schema(), "dbo");
        assert!(config.source.encrypt);
        assert_eq!(config.target.r#type, DbKind::Postgres);
        assert_eq!(config.migration.data_batch_size, 100);
        assert_eq!(config.migration.create_table, CreateTable::All(true));
        assert_eq!(config.migration.reload, ReloadScope::All);
        assert!(config.output.path.is_none());
        assert!(config.output.bom);
    }

    #[test]
    fn test_create_table_list_and_reload() {
        let yaml = format!(
            "{}migration:\n  create_table: [orders, customers]\n  reload: subset\n",
            MINIMAL
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(
            config.migration.create_table,
            CreateTable::Only(vec!["orders".into(), "customers".into()])
        );
        assert_eq!(config.migration.reload, ReloadScope::Subset);
    }

    #[test]
    fn test_postgres_source_defaults() {
        let yaml = MINIMAL.replace("type: mssql", "type: postgres");
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.source.port(), 5432);
        assert_eq!(config.source.schema(), "public");
    }

    #[test]
    fn test_password_redacted_in_debug() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_hash_is_stable_and_ignores_password() {
        let a = Config::from_yaml(MINIMAL).unwrap();
        let b = Config::from_yaml(&MINIMAL.replace("secret", "other")).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn test_create_table_cli_parse() {
        assert_eq!(CreateTable::parse("true"), CreateTable::All(true));
        assert_eq!(CreateTable::parse("false"), CreateTable::All(false));
        assert_eq!(
            CreateTable::parse("orders, lines"),
            CreateTable::Only(vec!["orders".into(), "lines".into()])
        );
    }
}
