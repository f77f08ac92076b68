//! Configuration loading and validation.

mod filter;
mod types;
mod validation;

pub use filter::TableFilter;
pub use types::*;

use std::path::Path;

use crate::dialect::SourceDialect;
use crate::error::Result;

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

    /// Source dialect named by `source.type`.
    pub fn dialect(&self) -> Result<SourceDialect> {
        self.source.r#type.parse()
    }

    /// Table filter built from the include/exclude patterns.
    pub fn table_filter(&self) -> Result<TableFilter> {
        TableFilter::new(
            &self.conversion.include_tables,
            &self.conversion.exclude_tables,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::TypeFamily;

    const YAML: &str = r#"
source:
  type: postgres
  host: localhost
  database: shop
  user: app
  password: secret
  schema: sales
conversion:
  workers: 2
  timezone_offset_minutes: -300
  exclude_tables: ["audit_*"]
  type_overrides:
    bigint: STRING
output:
  session_file: session.json
"#;

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.dialect().unwrap(), SourceDialect::Postgres);
        assert_eq!(config.source.effective_port(), 5432);
        assert_eq!(config.source.schema.as_deref(), Some("sales"));
        assert_eq!(config.conversion.workers, Some(2));
        assert_eq!(config.conversion.batch_size, None);
        assert_eq!(config.conversion.timezone_offset_minutes, -300);
        assert!(config.conversion.interleave);
        assert_eq!(config.conversion.bad_row_sample_limit, 100);
        assert_eq!(
            config.conversion.type_overrides.get("bigint"),
            Some(&TypeFamily::String)
        );
        assert_eq!(
            config.output.session_file.as_deref(),
            Some(Path::new("session.json"))
        );

        let filter = config.table_filter().unwrap();
        assert!(filter.matches("orders"));
        assert!(!filter.matches("audit_log"));
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = Config::from_yaml(
            "source: {type: mysql, host: db, database: shop, user: root}\n",
        )
        .unwrap();
        assert_eq!(config.dialect().unwrap(), SourceDialect::Mysql);
        assert_eq!(config.source.effective_port(), 3306);
        assert_eq!(config.source.ssl_mode, "disable");
        assert!(config.output.rows_file.is_none());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(Config::from_yaml("source: [").is_err());
        assert!(Config::from_yaml("").is_err());
    }
}
