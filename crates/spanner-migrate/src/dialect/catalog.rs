//! Immutable per-dialect catalog of retype choices.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use serde::Serialize;

use crate::conv::{Conv, SchemaIssue};
use crate::core::traits::TypeMapper;
use crate::ddl::TypeFamily;

use super::{MysqlTypeMapper, PostgresTypeMapper, SourceDialect};

static MYSQL_CATALOG: LazyLock<TypeCatalog> = LazyLock::new(|| TypeCatalog::build(&MysqlTypeMapper));

static POSTGRES_CATALOG: LazyLock<TypeCatalog> =
    LazyLock::new(|| TypeCatalog::build(&PostgresTypeMapper));

/// One family a source type can be retyped to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeOption {
    pub family: TypeFamily,
    /// Rendered target type, e.g. `STRING(MAX)`.
    pub target: String,
    pub issues: Vec<SchemaIssue>,
}

/// Source type name → families the mapper honours for it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeCatalog {
    pub types: BTreeMap<String, Vec<TypeOption>>,
}

impl TypeCatalog {
    /// Shared catalog for a dialect, built on first use.
    pub fn for_dialect(dialect: SourceDialect) -> &'static TypeCatalog {
        match dialect {
            SourceDialect::Mysql => &MYSQL_CATALOG,
            SourceDialect::Postgres => &POSTGRES_CATALOG,
        }
    }

    fn build(mapper: &impl TypeMapper) -> Self {
        let mut types = BTreeMap::new();
        for name in mapper.dialect().known_types() {
            let options: Vec<TypeOption> = TypeFamily::ALL
                .iter()
                .filter_map(|&family| {
                    let mapping = mapper.map_type(name, Some(family), &[]);
                    (mapping.target.family == family).then(|| TypeOption {
                        family,
                        target: mapping.target.to_string(),
                        issues: mapping.issues,
                    })
                })
                .collect();
            types.insert(name.to_string(), options);
        }
        Self { types }
    }

    /// Restrict the catalog to types used by a schema.
    pub fn for_conv(conv: &Conv) -> TypeCatalog {
        let used: BTreeSet<String> = conv
            .src_schema
            .values()
            .flat_map(|t| t.col_defs.values())
            .map(|c| c.source_type.name.to_lowercase())
            .collect();

        let types = Self::for_dialect(conv.dialect)
            .types
            .iter()
            .filter(|(name, _)| used.contains(*name))
            .map(|(name, options)| (name.clone(), options.clone()))
            .collect();
        TypeCatalog { types }
    }

    pub fn options(&self, type_name: &str) -> Option<&[TypeOption]> {
        self.types.get(&type_name.to_lowercase()).map(|v| v.as_slice())
    }
}
