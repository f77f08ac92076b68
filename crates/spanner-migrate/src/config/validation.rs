//! Configuration validation.

use super::{Config, TableFilter};
use crate::dialect::SourceDialect;
use crate::drivers::SslMode;
use crate::error::{MigrateError, Result};

/// Offsets beyond ±18h cannot be represented.
const MAX_OFFSET_MINUTES: i32 = 18 * 60;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    config.source.r#type.parse::<SourceDialect>()?;
    SslMode::parse(&config.source.ssl_mode)?;

    // Conversion config validation - only check if explicitly set
    let conversion = &config.conversion;
    if let Some(0) = conversion.workers {
        return Err(MigrateError::Config(
            "conversion.workers must be at least 1".into(),
        ));
    }
    if let Some(0) = conversion.batch_size {
        return Err(MigrateError::Config(
            "conversion.batch_size must be at least 1".into(),
        ));
    }
    if let Some(0) = conversion.max_connections {
        return Err(MigrateError::Config(
            "conversion.max_connections must be at least 1".into(),
        ));
    }
    if conversion.timezone_offset_minutes.abs() >= MAX_OFFSET_MINUTES {
        return Err(MigrateError::Config(format!(
            "conversion.timezone_offset_minutes must be within ±{}, got {}",
            MAX_OFFSET_MINUTES - 1,
            conversion.timezone_offset_minutes
        )));
    }
    TableFilter::new(&conversion.include_tables, &conversion.exclude_tables)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConversionConfig, OutputConfig, SourceConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                r#type: "postgres".to_string(),
                host: "localhost".to_string(),
                port: Some(5432),
                database: "source_db".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: None,
                ssl_mode: "disable".to_string(),
            },
            conversion: ConversionConfig::default(),
            output: OutputConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_fields() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.source.database = "".to_string();
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.source.user = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_source_type() {
        let mut config = valid_config();
        config.source.r#type = "oracle".to_string();
        assert!(matches!(validate(&config), Err(MigrateError::Config(_))));

        config.source.r#type = "mariadb".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_workers_or_batch_size() {
        let mut config = valid_config();
        config.conversion.workers = Some(0);
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.conversion.batch_size = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_ssl_mode_and_offset() {
        let mut config = valid_config();
        config.source.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.conversion.timezone_offset_minutes = 24 * 60;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_table_pattern() {
        let mut config = valid_config();
        config.conversion.include_tables = vec!["[orders".to_string()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
