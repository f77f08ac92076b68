//! Source dialects and their type mappers.
//!
//! Each supported source dialect has one [`TypeMapper`] implementation. The
//! mapper is selected once per run and dispatched through [`TypeMapperImpl`],
//! which keeps the hot path free of trait objects.
//!
//! # Available Mappers
//!
//! - [`MysqlTypeMapper`]: MySQL → Spanner
//! - [`PostgresTypeMapper`]: PostgreSQL → Spanner
//!
//! [`TypeCatalog`] lists, per source type, the target families a mapper will
//! honour and the issues each choice raises.

mod catalog;
mod typemap;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::traits::{TypeMapper, TypeMapping};
use crate::ddl::TypeFamily;
use crate::error::MigrateError;

pub use catalog::{TypeCatalog, TypeOption};
pub use typemap::{MysqlTypeMapper, PostgresTypeMapper};

/// Supported source dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDialect {
    Mysql,
    Postgres,
}

impl SourceDialect {
    pub fn name(&self) -> &'static str {
        match self {
            SourceDialect::Mysql => "mysql",
            SourceDialect::Postgres => "postgres",
        }
    }

    /// Schemas that never hold user tables.
    pub fn system_schemas(&self) -> &'static [&'static str] {
        match self {
            SourceDialect::Mysql => &["mysql", "sys", "information_schema", "performance_schema"],
            SourceDialect::Postgres => &[
                "information_schema",
                "postgres",
                "pg_catalog",
                "pg_temp_1",
                "pg_toast",
                "pg_toast_temp_1",
            ],
        }
    }

    /// Type names as reported by the dialect's catalog, used for hinting.
    pub fn known_types(&self) -> &'static [&'static str] {
        match self {
            SourceDialect::Mysql => &[
                "bool", "tinyint", "smallint", "mediumint", "int", "bigint", "float", "double",
                "decimal", "char", "varchar", "text", "json", "enum", "set", "binary",
                "varbinary", "blob", "bit", "date", "datetime", "timestamp", "time", "year",
            ],
            SourceDialect::Postgres => &[
                "boolean",
                "smallint",
                "integer",
                "bigint",
                "real",
                "double precision",
                "numeric",
                "character",
                "character varying",
                "text",
                "bytea",
                "date",
                "timestamp without time zone",
                "timestamp with time zone",
                "json",
                "jsonb",
                "uuid",
            ],
        }
    }

    /// Type mapper for this dialect.
    pub fn mapper(&self) -> TypeMapperImpl {
        TypeMapperImpl::for_dialect(*self)
    }
}

impl fmt::Display for SourceDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceDialect {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(SourceDialect::Mysql),
            "postgres" | "postgresql" | "pg" => Ok(SourceDialect::Postgres),
            other => Err(MigrateError::Config(format!(
                "Unknown source type '{}'. Supported: mysql, postgres",
                other
            ))),
        }
    }
}

/// Enum dispatch over the built-in mappers.
#[derive(Debug, Clone, Copy)]
pub enum TypeMapperImpl {
    Mysql(MysqlTypeMapper),
    Postgres(PostgresTypeMapper),
}

impl TypeMapperImpl {
    pub fn for_dialect(dialect: SourceDialect) -> Self {
        match dialect {
            SourceDialect::Mysql => TypeMapperImpl::Mysql(MysqlTypeMapper),
            SourceDialect::Postgres => TypeMapperImpl::Postgres(PostgresTypeMapper),
        }
    }
}

impl TypeMapper for TypeMapperImpl {
    fn dialect(&self) -> SourceDialect {
        match self {
            TypeMapperImpl::Mysql(m) => m.dialect(),
            TypeMapperImpl::Postgres(m) => m.dialect(),
        }
    }

    fn map_type(&self, type_name: &str, desired: Option<TypeFamily>, mods: &[i64]) -> TypeMapping {
        match self {
            TypeMapperImpl::Mysql(m) => m.map_type(type_name, desired, mods),
            TypeMapperImpl::Postgres(m) => m.map_type(type_name, desired, mods),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("mysql".parse::<SourceDialect>().unwrap(), SourceDialect::Mysql);
        assert_eq!("PostgreSQL".parse::<SourceDialect>().unwrap(), SourceDialect::Postgres);
        assert!("oracle".parse::<SourceDialect>().is_err());
    }

    #[test]
    fn test_system_schemas() {
        assert!(SourceDialect::Postgres.system_schemas().contains(&"pg_catalog"));
        assert!(SourceDialect::Mysql.system_schemas().contains(&"performance_schema"));
        assert!(!SourceDialect::Postgres.system_schemas().contains(&"public"));
    }

    #[test]
    fn test_mapper_dispatch() {
        let mapper = SourceDialect::Postgres.mapper();
        assert_eq!(mapper.dialect(), SourceDialect::Postgres);
        let mapping = mapper.map_type("bigint", None, &[]);
        assert_eq!(mapping.target.family, TypeFamily::Int64);

        let mapper = SourceDialect::Mysql.mapper();
        assert_eq!(mapper.dialect(), SourceDialect::Mysql);
        let mapping = mapper.map_type("tinyint", None, &[1]);
        assert_eq!(mapping.target.family, TypeFamily::Bool);
    }
}
