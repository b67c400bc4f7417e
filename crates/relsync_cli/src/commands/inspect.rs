//! Inspect command implementation.

use super::load_schema;
use crate::Format;
use relsync_core::Schema;
use serde::Serialize;
use std::path::Path;

/// Schema inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Number of tables.
    pub table_count: usize,
    /// Per-table summaries.
    pub tables: Vec<TableSummary>,
}

/// Summary of a single table.
#[derive(Debug, Serialize)]
pub struct TableSummary {
    /// Table name.
    pub name: String,
    /// Primary-key column, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// Columns with their type and roles.
    pub columns: Vec<ColumnSummary>,
    /// Outward references.
    pub references: Vec<ReferenceSummary>,
    /// Collections filled by other tables' references.
    pub collections: Vec<String>,
    /// Registered item types as `discriminator:name`.
    pub item_types: Vec<String>,
}

/// One column.
#[derive(Debug, Serialize)]
pub struct ColumnSummary {
    /// Column name.
    pub name: String,
    /// Semantic type.
    pub data_type: String,
    /// Role names.
    pub roles: Vec<&'static str>,
}

/// One outward reference.
#[derive(Debug, Serialize)]
pub struct ReferenceSummary {
    /// Referencing column.
    pub column: String,
    /// Referenced table.
    pub target: String,
    /// Reference property name.
    pub property: String,
    /// Collection property on the target.
    pub collection: String,
    /// Whether the collection merges.
    pub live: bool,
}

/// Summarizes a schema.
#[must_use]
pub fn inspect(schema: &Schema) -> InspectResult {
    let tables: Vec<TableSummary> = schema
        .tables()
        .iter()
        .map(|table| TableSummary {
            name: table.name().to_string(),
            primary_key: table.primary_key().map(|c| c.name.clone()),
            columns: table
                .columns()
                .iter()
                .map(|c| ColumnSummary {
                    name: c.name.clone(),
                    data_type: c.data_type.to_string(),
                    roles: c.roles.names().collect(),
                })
                .collect(),
            references: table
                .references()
                .map(|r| ReferenceSummary {
                    column: r.column.to_string(),
                    target: r.foreign_key.references.clone(),
                    property: r.property(),
                    collection: r.collection(),
                    live: r.foreign_key.live,
                })
                .collect(),
            collections: schema
                .inward_references(table.name())
                .map(|r| format!("{} <- {}.{}", r.collection(), r.table, r.column))
                .collect(),
            item_types: table
                .item_types()
                .iter()
                .map(|t| format!("{}:{}", t.discriminator, t.name))
                .collect(),
        })
        .collect();

    InspectResult {
        table_count: tables.len(),
        tables,
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let schema = load_schema(path)?;
    let result = inspect(&schema);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(path, &result),
    }
    Ok(())
}

fn print_text_output(path: &Path, result: &InspectResult) {
    println!("Schema: {}", path.display());
    println!("==================");
    println!("Tables: {}", result.table_count);

    for table in &result.tables {
        println!();
        match &table.primary_key {
            Some(pk) => println!("{} (key: {pk})", table.name),
            None => println!("{} (no key)", table.name),
        }
        for column in &table.columns {
            if column.roles.is_empty() {
                println!("  {:<20} {}", column.name, column.data_type);
            } else {
                println!(
                    "  {:<20} {} [{}]",
                    column.name,
                    column.data_type,
                    column.roles.join(", ")
                );
            }
        }
        for r in &table.references {
            let live = if r.live { " (live)" } else { "" };
            println!(
                "  -> {} via {} as {}, collection {}{live}",
                r.target, r.column, r.property, r.collection
            );
        }
        for collection in &table.collections {
            println!("  <- {collection}");
        }
        if !table.item_types.is_empty() {
            println!("  item types: {}", table.item_types.join(", "));
        }
    }
}
