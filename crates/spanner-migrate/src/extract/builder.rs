//! Schema model construction from catalog metadata.

use tracing::{debug, info, warn};

use crate::config::TableFilter;
use crate::conv::{Conv, SampleLimits, SchemaIssue, TableSnapshot};
use crate::core::identifier::{sanitize_spanner_name, unique_name};
use crate::core::schema::{
    ColumnInfo, ConstraintInfo, ConstraintKind, ForeignKeyInfo, Ignored, SourceColumn,
    SourceTable, SourceType, TableRef,
};
use crate::core::traits::{SourceReader, TypeMapper};
use crate::ddl::{ColumnDef, CreateTable, Foreignkey, IndexKey};
use crate::error::Result;

use super::constraints::{extract_constraints, extract_foreign_keys};

/// Options for [`build_schema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaOptions {
    pub filter: TableFilter,
    pub utc_offset_minutes: i32,
    pub sample_limits: SampleLimits,
}

/// Catalog metadata of one table.
#[derive(Debug, Clone, Default)]
pub struct TableMetadata {
    pub columns: Vec<ColumnInfo>,
    pub constraints: Vec<ConstraintInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

/// Build the schema model for every user table of a source.
///
/// A table whose metadata cannot be read is left out and recorded in
/// [`Conv::introspection_errors`]; failing to list tables is an error.
pub async fn build_schema<S>(source: &S, options: &SchemaOptions) -> Result<Conv>
where
    S: SourceReader + ?Sized,
{
    let dialect = source.dialect();
    info!("Phase 1: Building schema from {} source", dialect);

    let mut conv = Conv::new(dialect);
    conv.utc_offset_minutes = options.utc_offset_minutes;
    conv.sample_limits = options.sample_limits;

    let tables = source.list_tables().await?;
    let mapper = dialect.mapper();
    let implicit_schema = source.implicit_schema().to_string();

    for table_ref in tables {
        let src_name = table_ref.source_name(&implicit_schema);
        if !options.filter.matches(&src_name) {
            debug!("Skipping table {} (filtered)", src_name);
            continue;
        }

        match read_metadata(source, &table_ref).await {
            Ok(metadata) => {
                add_source_table(&mut conv, &mapper, &table_ref, &implicit_schema, metadata)?;
            }
            Err(e) => {
                warn!("Skipping table {}: {}", src_name, e);
                conv.introspection_errors.insert(src_name, e.to_string());
            }
        }
    }

    translate_foreign_keys(&mut conv);
    let synthetic = conv.add_primary_keys();
    conv.check_invariants()?;

    info!(
        "Schema built: {} tables, {} with synthetic keys, {} skipped",
        conv.sp_schema.len(),
        synthetic.len(),
        conv.introspection_errors.len()
    );
    Ok(conv)
}

async fn read_metadata<S>(source: &S, table: &TableRef) -> Result<TableMetadata>
where
    S: SourceReader + ?Sized,
{
    Ok(TableMetadata {
        columns: source.list_columns(table).await?,
        constraints: source.list_constraints(table).await?,
        foreign_keys: source.list_foreign_keys(table).await?,
    })
}

/// Add one source table and its derived target table to the model.
pub fn add_source_table(
    conv: &mut Conv,
    mapper: &impl TypeMapper,
    table_ref: &TableRef,
    implicit_schema: &str,
    metadata: TableMetadata,
) -> Result<()> {
    let src_name = table_ref.source_name(implicit_schema);
    let constraints = extract_constraints(conv, &src_name, &metadata.constraints);
    let foreign_keys =
        extract_foreign_keys(conv, &src_name, implicit_schema, &metadata.foreign_keys);

    let sp_name = unique_name(
        &sanitize_spanner_name(&src_name),
        conv.sp_schema.keys().map(String::as_str),
    );
    conv.relation.link_table(&src_name, &sp_name)?;

    let mut src = SourceTable {
        name: src_name.clone(),
        schema: table_ref.schema.clone(),
        col_names: Vec::new(),
        col_defs: Default::default(),
        primary_keys: Vec::new(),
        foreign_keys,
    };
    let mut sp = CreateTable::new(sp_name.clone());
    sp.comment = Some(format!("Spanner schema for source table {}", src_name));

    for info in &metadata.columns {
        if info.name.is_empty() || src.col_defs.contains_key(&info.name) {
            conv.unexpected(format!(
                "Empty or duplicate column name {:?} in table {}",
                info.name, src_name
            ));
            continue;
        }

        let source_type = SourceType::from_info(info);
        let not_null = match info.nullable.as_str() {
            "YES" => false,
            "NO" => true,
            other => {
                conv.unexpected(format!("isNullable column has unknown value: {}", other));
                false
            }
        };
        let column = SourceColumn {
            name: info.name.clone(),
            source_type: source_type.clone(),
            not_null,
            unique: constraints.has(&info.name, ConstraintKind::Unique),
            ignored: Ignored {
                foreign_key: constraints.has(&info.name, ConstraintKind::ForeignKey),
                check: constraints.has(&info.name, ConstraintKind::Check),
                default: info.has_default,
                auto_increment: info.auto_increment,
            },
        };

        let mapping = mapper.map_source_type(&source_type, None);
        for issue in &mapping.issues {
            conv.add_issue(&src_name, &info.name, *issue);
        }
        for issue in constraint_issues(&column) {
            conv.add_issue(&src_name, &info.name, issue);
        }

        let sp_col = unique_name(
            &sanitize_spanner_name(&info.name),
            sp.col_names.iter().map(String::as_str),
        );
        sp.col_names.push(sp_col.clone());
        sp.col_defs.insert(
            sp_col.clone(),
            ColumnDef {
                name: sp_col.clone(),
                t: mapping.target,
                not_null,
                comment: Some(format!("From: {} {}", info.name, source_type)),
            },
        );
        conv.relation.link_column(&src_name, &info.name, &sp_col)?;

        src.col_names.push(info.name.clone());
        src.col_defs.insert(info.name.clone(), column);
    }

    for key in &constraints.primary_keys {
        match conv.relation.spanner_column(&src_name, key) {
            Some(sp_col) => {
                src.primary_keys.push(key.clone());
                sp.pks.push(IndexKey::asc(sp_col));
            }
            None => conv.unexpected(format!(
                "Primary key column {} is not a column of {}",
                key, src_name
            )),
        }
    }

    debug!(
        "Table {} → {}: {} columns, primary key {:?}",
        src_name,
        sp_name,
        sp.col_names.len(),
        src.primary_keys
    );

    conv.tables.push(TableSnapshot {
        table_ref: table_ref.clone(),
        src_name: src_name.clone(),
    });
    conv.src_schema.insert(src_name, src);
    conv.sp_schema.insert(sp_name, sp);
    Ok(())
}

/// Issues that come from column constraints rather than the mapped type.
pub(crate) fn constraint_issues(column: &SourceColumn) -> Vec<SchemaIssue> {
    let mut issues = Vec::new();
    if column.source_type.array_bounds.len() > 1 {
        issues.push(SchemaIssue::MultiDimensionalArray);
    }
    if column.ignored.default {
        issues.push(SchemaIssue::DefaultValue);
    }
    if column.ignored.auto_increment {
        issues.push(SchemaIssue::AutoIncrement);
    }
    if column.unique {
        issues.push(SchemaIssue::Unique);
    }
    if column.ignored.check {
        issues.push(SchemaIssue::Check);
    }
    issues
}

/// Translate source foreign keys into target names.
///
/// Runs once every table exists. A key whose referenced table or columns are
/// not in the model is dropped.
fn translate_foreign_keys(conv: &mut Conv) {
    let mut translated: Vec<(String, Foreignkey)> = Vec::new();
    let mut dropped: Vec<(String, Vec<String>, String)> = Vec::new();

    for (src_name, src) in &conv.src_schema {
        let Some(sp_name) = conv.relation.spanner_table(src_name) else {
            continue;
        };
        for fk in &src.foreign_keys {
            let Some(refer_table) = conv.relation.spanner_table(&fk.ref_table) else {
                dropped.push((
                    src_name.clone(),
                    fk.columns.clone(),
                    format!(
                        "Foreign key {} of {} references unknown table {}",
                        fk.name, src_name, fk.ref_table
                    ),
                ));
                continue;
            };
            let columns: Option<Vec<String>> = fk
                .columns
                .iter()
                .map(|c| conv.relation.spanner_column(src_name, c).map(String::from))
                .collect();
            let refer_columns: Option<Vec<String>> = fk
                .ref_columns
                .iter()
                .map(|c| conv.relation.spanner_column(&fk.ref_table, c).map(String::from))
                .collect();

            match (columns, refer_columns) {
                (Some(columns), Some(refer_columns)) => translated.push((
                    sp_name.to_string(),
                    Foreignkey {
                        name: sanitize_spanner_name(&fk.name),
                        columns,
                        refer_table: refer_table.to_string(),
                        refer_columns,
                    },
                )),
                _ => dropped.push((
                    src_name.clone(),
                    fk.columns.clone(),
                    format!(
                        "Foreign key {} of {} uses columns missing from the model",
                        fk.name, src_name
                    ),
                )),
            }
        }
    }

    for (sp_name, fk) in translated {
        if let Some(table) = conv.sp_schema.get_mut(&sp_name) {
            table.fks.push(fk);
        }
    }
    for (src_name, columns, msg) in dropped {
        conv.unexpected(msg);
        for col in columns {
            conv.add_issue(&src_name, &col, SchemaIssue::ForeignKey);
        }
    }
}
