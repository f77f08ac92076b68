//! MySQL and PostgreSQL type mappers.
//!
//! Both mappers share one shape: match on the lower-cased source type name,
//! then on the desired family. A desired family a source type cannot produce
//! falls back to the type's default mapping.

use crate::conv::SchemaIssue;
use crate::core::traits::{TypeMapper, TypeMapping};
use crate::ddl::{SpannerType, TypeFamily, NUMERIC_MAX_PRECISION, NUMERIC_MAX_SCALE};

use super::SourceDialect;

/// MySQL → Spanner type mapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlTypeMapper;

impl TypeMapper for MysqlTypeMapper {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Mysql
    }

    fn map_type(&self, type_name: &str, desired: Option<TypeFamily>, mods: &[i64]) -> TypeMapping {
        mysql_to_spanner(&type_name.to_lowercase(), desired, mods)
    }
}

/// PostgreSQL → Spanner type mapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresTypeMapper;

impl TypeMapper for PostgresTypeMapper {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Postgres
    }

    fn map_type(&self, type_name: &str, desired: Option<TypeFamily>, mods: &[i64]) -> TypeMapping {
        postgres_to_spanner(&type_name.to_lowercase(), desired, mods)
    }
}

fn mysql_to_spanner(name: &str, desired: Option<TypeFamily>, mods: &[i64]) -> TypeMapping {
    use TypeFamily::*;

    match name {
        "bool" | "boolean" => match desired {
            Some(String) => widened_to_string(),
            _ => TypeMapping::lossless(SpannerType::new(Bool)),
        },
        // tinyint(1) is MySQL's boolean.
        "tinyint" if mods.first() == Some(&1) => match desired {
            Some(String) => widened_to_string(),
            Some(Int64) => TypeMapping::lossy(SpannerType::new(Int64), SchemaIssue::Widened),
            _ => TypeMapping::lossless(SpannerType::new(Bool)),
        },
        "tinyint" => match desired {
            Some(Bool) => TypeMapping::lossy(SpannerType::new(Bool), SchemaIssue::PrecisionLoss),
            Some(String) => widened_to_string(),
            _ => TypeMapping::lossy(SpannerType::new(Int64), SchemaIssue::Widened),
        },
        "smallint" | "mediumint" | "int" | "integer" => match desired {
            Some(String) => widened_to_string(),
            _ => TypeMapping::lossy(SpannerType::new(Int64), SchemaIssue::Widened),
        },
        "bigint" => match desired {
            Some(String) => widened_to_string(),
            _ => TypeMapping::lossless(SpannerType::new(Int64)),
        },
        "float" => float_mapping(desired, true),
        "double" | "real" => float_mapping(desired, false),
        "decimal" | "numeric" => numeric_mapping(desired, mods, SchemaIssue::Decimal),
        "char" | "varchar" => {
            TypeMapping::lossless(SpannerType::with_length(String, mods.first().copied()))
        }
        "text" | "tinytext" | "mediumtext" | "longtext" | "json" | "enum" | "set" => {
            TypeMapping::lossless(SpannerType::string_max())
        }
        "binary" | "varbinary" => {
            TypeMapping::lossless(SpannerType::with_length(Bytes, mods.first().copied()))
        }
        "blob" | "tinyblob" | "mediumblob" | "longblob" | "bit" => {
            TypeMapping::lossless(SpannerType::new(Bytes))
        }
        "date" => match desired {
            Some(String) => widened_to_string(),
            _ => TypeMapping::lossless(SpannerType::new(Date)),
        },
        "datetime" => match desired {
            Some(String) => widened_to_string(),
            _ => TypeMapping::lossy(SpannerType::new(Timestamp), SchemaIssue::Datetime),
        },
        "timestamp" => match desired {
            Some(String) => widened_to_string(),
            _ => TypeMapping::lossless(SpannerType::new(Timestamp)),
        },
        "time" | "year" => TypeMapping::lossy(SpannerType::string_max(), SchemaIssue::Time),
        _ => TypeMapping::lossy(SpannerType::string_max(), SchemaIssue::NoGoodType),
    }
}

fn postgres_to_spanner(name: &str, desired: Option<TypeFamily>, mods: &[i64]) -> TypeMapping {
    use TypeFamily::*;

    match name {
        "bool" | "boolean" => match desired {
            Some(String) => widened_to_string(),
            _ => TypeMapping::lossless(SpannerType::new(Bool)),
        },
        "bigserial" | "serial8" | "serial" | "serial4" | "smallserial" | "serial2" => {
            match desired {
                Some(String) => widened_to_string().with_issue(SchemaIssue::Serial),
                _ => TypeMapping::lossy(SpannerType::new(Int64), SchemaIssue::Serial),
            }
        }
        "int8" | "bigint" => match desired {
            Some(String) => widened_to_string(),
            _ => TypeMapping::lossless(SpannerType::new(Int64)),
        },
        "int4" | "integer" | "int" | "int2" | "smallint" => match desired {
            Some(String) => widened_to_string(),
            _ => TypeMapping::lossy(SpannerType::new(Int64), SchemaIssue::Widened),
        },
        "float8" | "double precision" => float_mapping(desired, false),
        "float4" | "real" => float_mapping(desired, true),
        "numeric" | "decimal" => numeric_mapping(desired, mods, SchemaIssue::PrecisionLoss),
        "bpchar" | "character" | "char" | "varchar" | "character varying" => {
            TypeMapping::lossless(SpannerType::with_length(String, mods.first().copied()))
        }
        "text" => TypeMapping::lossless(SpannerType::string_max()),
        "bytea" => TypeMapping::lossless(SpannerType::new(Bytes)),
        "date" => match desired {
            Some(String) => widened_to_string(),
            _ => TypeMapping::lossless(SpannerType::new(Date)),
        },
        "timestamptz" | "timestamp with time zone" => match desired {
            Some(String) => widened_to_string(),
            _ => TypeMapping::lossless(SpannerType::new(Timestamp)),
        },
        "timestamp" | "timestamp without time zone" => match desired {
            Some(String) => widened_to_string(),
            _ => TypeMapping::lossy(SpannerType::new(Timestamp), SchemaIssue::Timestamp),
        },
        _ => TypeMapping::lossy(SpannerType::string_max(), SchemaIssue::NoGoodType),
    }
}

fn widened_to_string() -> TypeMapping {
    TypeMapping::lossy(SpannerType::string_max(), SchemaIssue::Widened)
}

/// Floating point sources. `single` marks 32-bit floats, which widen.
fn float_mapping(desired: Option<TypeFamily>, single: bool) -> TypeMapping {
    match desired {
        Some(TypeFamily::String) => widened_to_string(),
        Some(TypeFamily::Int64) => {
            TypeMapping::lossy(SpannerType::new(TypeFamily::Int64), SchemaIssue::PrecisionLoss)
        }
        _ if single => {
            TypeMapping::lossy(SpannerType::new(TypeFamily::Float64), SchemaIssue::Widened)
        }
        _ => TypeMapping::lossless(SpannerType::new(TypeFamily::Float64)),
    }
}

/// Fixed-point sources.
///
/// Precision and scale carry over when Spanner can hold them; an unbounded
/// or out-of-range source maps to plain NUMERIC with a `Numeric` issue.
fn numeric_mapping(desired: Option<TypeFamily>, mods: &[i64], float_issue: SchemaIssue) -> TypeMapping {
    match desired {
        Some(TypeFamily::Float64) => {
            return TypeMapping::lossy(SpannerType::new(TypeFamily::Float64), float_issue)
        }
        Some(TypeFamily::Int64) => {
            return TypeMapping::lossy(SpannerType::new(TypeFamily::Int64), SchemaIssue::PrecisionLoss)
        }
        Some(TypeFamily::String) => return widened_to_string(),
        _ => {}
    }

    let fits = |p: i64, s: i64| {
        p > 0 && p <= NUMERIC_MAX_PRECISION as i64 && (0..=NUMERIC_MAX_SCALE as i64).contains(&s)
    };

    match *mods {
        [p, s] if fits(p, s) => {
            TypeMapping::lossless(SpannerType::numeric(Some(p as u32), Some(s as u32)))
        }
        [p] if fits(p, 0) => TypeMapping::lossless(SpannerType::numeric(Some(p as u32), None)),
        _ => TypeMapping::lossy(SpannerType::numeric(None, None), SchemaIssue::Numeric),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::SourceType;
    use crate::ddl::Length;

    fn pg(name: &str, desired: Option<TypeFamily>, mods: &[i64]) -> TypeMapping {
        PostgresTypeMapper.map_type(name, desired, mods)
    }

    fn my(name: &str, desired: Option<TypeFamily>, mods: &[i64]) -> TypeMapping {
        MysqlTypeMapper.map_type(name, desired, mods)
    }

    #[test]
    fn test_pg_integer_defaults() {
        assert_eq!(pg("bigint", None, &[]), TypeMapping::lossless(SpannerType::new(TypeFamily::Int64)));
        let m = pg("integer", None, &[]);
        assert_eq!(m.target.family, TypeFamily::Int64);
        assert_eq!(m.issues, vec![SchemaIssue::Widened]);
        assert_eq!(pg("serial", None, &[]).issues, vec![SchemaIssue::Serial]);
    }

    #[test]
    fn test_pg_numeric_modifiers() {
        let m = pg("numeric", None, &[10, 2]);
        assert_eq!(m.target.to_string(), "NUMERIC(10,2)");
        assert!(m.issues.is_empty());

        let m = pg("numeric", None, &[12]);
        assert_eq!(m.target.to_string(), "NUMERIC(12)");

        let m = pg("numeric", None, &[]);
        assert_eq!(m.target.to_string(), "NUMERIC");
        assert_eq!(m.issues, vec![SchemaIssue::Numeric]);

        let m = pg("numeric", None, &[50, 20]);
        assert_eq!(m.issues, vec![SchemaIssue::Numeric]);
    }

    #[test]
    fn test_pg_numeric_to_float_loses_precision() {
        let m = pg("numeric", Some(TypeFamily::Float64), &[10, 2]);
        assert_eq!(m.target.family, TypeFamily::Float64);
        assert_eq!(m.issues, vec![SchemaIssue::PrecisionLoss]);
    }

    #[test]
    fn test_pg_character_length() {
        let m = pg("character varying", None, &[40]);
        assert_eq!(m.target.len, Some(Length::Bounded(40)));
        assert!(m.issues.is_empty());
        assert_eq!(pg("varchar", None, &[]).target.to_string(), "STRING(MAX)");
        assert_eq!(pg("text", None, &[]).target.to_string(), "STRING(MAX)");
    }

    #[test]
    fn test_pg_timestamps() {
        assert!(pg("timestamptz", None, &[]).issues.is_empty());
        assert_eq!(
            pg("timestamp without time zone", None, &[]).issues,
            vec![SchemaIssue::Timestamp]
        );
    }

    #[test]
    fn test_pg_unknown_type_falls_back_to_string() {
        let m = pg("uuid", None, &[]);
        assert_eq!(m.target, SpannerType::string_max());
        assert_eq!(m.issues, vec![SchemaIssue::NoGoodType]);
    }

    #[test]
    fn test_unsupported_desired_family_uses_default() {
        let m = pg("bytea", Some(TypeFamily::Int64), &[]);
        assert_eq!(m.target.family, TypeFamily::Bytes);
        let m = pg("date", Some(TypeFamily::Bool), &[]);
        assert_eq!(m.target.family, TypeFamily::Date);
    }

    #[test]
    fn test_desired_string_is_widened() {
        let m = pg("bigint", Some(TypeFamily::String), &[]);
        assert_eq!(m.target, SpannerType::string_max());
        assert_eq!(m.issues, vec![SchemaIssue::Widened]);
    }

    #[test]
    fn test_pg_multi_dimensional_array() {
        let src = SourceType::new("integer").with_array_dims(2);
        let m = PostgresTypeMapper.map_source_type(&src, None);
        assert_eq!(m.target, SpannerType::string_max());
        assert_eq!(m.issues, vec![SchemaIssue::MultiDimensionalArray]);

        let src = SourceType::new("text").with_array_dims(1);
        let m = PostgresTypeMapper.map_source_type(&src, None);
        assert_eq!(m.target.to_string(), "ARRAY<STRING(MAX)>");
        assert!(m.issues.is_empty());
    }

    #[test]
    fn test_mysql_tinyint() {
        assert_eq!(my("tinyint", None, &[1]).target.family, TypeFamily::Bool);
        let m = my("tinyint", None, &[3]);
        assert_eq!(m.target.family, TypeFamily::Int64);
        let m = my("tinyint", Some(TypeFamily::Bool), &[3]);
        assert_eq!(m.target.family, TypeFamily::Bool);
        assert_eq!(m.issues, vec![SchemaIssue::PrecisionLoss]);
    }

    #[test]
    fn test_mysql_strings_and_bytes() {
        assert_eq!(my("VARCHAR", None, &[255]).target.to_string(), "STRING(255)");
        assert_eq!(my("text", None, &[65535]).target.to_string(), "STRING(MAX)");
        assert_eq!(my("varbinary", None, &[16]).target.to_string(), "BYTES(16)");
        assert_eq!(my("longblob", None, &[]).target.to_string(), "BYTES(MAX)");
        assert_eq!(my("enum", None, &[]).target, SpannerType::string_max());
    }

    #[test]
    fn test_mysql_temporal() {
        assert_eq!(my("datetime", None, &[]).issues, vec![SchemaIssue::Datetime]);
        assert!(my("timestamp", None, &[]).issues.is_empty());
        let m = my("time", None, &[]);
        assert_eq!(m.target, SpannerType::string_max());
        assert_eq!(m.issues, vec![SchemaIssue::Time]);
    }

    #[test]
    fn test_mysql_decimal_to_float() {
        let m = my("decimal", Some(TypeFamily::Float64), &[10, 2]);
        assert_eq!(m.issues, vec![SchemaIssue::Decimal]);
        let m = my("decimal", None, &[10, 2]);
        assert_eq!(m.target.to_string(), "NUMERIC(10,2)");
    }

    #[test]
    fn test_mapping_is_deterministic() {
        for name in SourceDialect::Mysql.known_types() {
            for family in TypeFamily::ALL {
                assert_eq!(my(name, Some(family), &[]), my(name, Some(family), &[]));
            }
        }
    }
}
