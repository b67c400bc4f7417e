//! Commands command implementation.

use super::load_schema;
use crate::Format;
use relsync_core::{CommandBuilder, CoreResult, DialectKind, TableSchema};
use relsync_storage::DbCommand;
use serde::Serialize;
use std::path::Path;

/// One synthesized command.
#[derive(Debug, Serialize)]
pub struct CommandView {
    /// Command kind.
    pub kind: String,
    /// Command text.
    pub text: String,
    /// Parameters in order.
    pub parameters: Vec<ParameterView>,
}

/// One command parameter.
#[derive(Debug, Serialize)]
pub struct ParameterView {
    /// Parameter name.
    pub name: String,
    /// Source column.
    pub column: String,
    /// Native type.
    pub native_type: String,
    /// Declared size.
    pub size: u32,
}

impl From<&DbCommand> for CommandView {
    fn from(command: &DbCommand) -> Self {
        Self {
            kind: command.kind.to_string(),
            text: command.text.clone(),
            parameters: command
                .parameters
                .iter()
                .map(|p| ParameterView {
                    name: p.name.clone(),
                    column: p.column.clone(),
                    native_type: format!("{:?}", p.native_type),
                    size: p.size,
                })
                .collect(),
        }
    }
}

/// Builds every command the table supports.
///
/// Kinds the table cannot support (no primary key) are left out.
pub fn synthesize(table: &TableSchema, dialect: DialectKind) -> CoreResult<Vec<CommandView>> {
    let builder = CommandBuilder::new(table, dialect.dialect());
    let has_key = table.primary_key().is_some();

    let mut commands = vec![builder.insert(None)?];
    if has_key {
        commands.push(builder.insert_generated(None)?);
        // Key-only tables have nothing to update.
        if let Ok(update) = builder.update(None) {
            commands.push(update);
        }
    }
    commands.extend(builder.delete()?);
    commands.push(builder.select(has_key)?);
    Ok(commands.iter().map(CommandView::from).collect())
}

/// Runs the commands command.
pub fn run(
    schema: &Path,
    table: &str,
    dialect: DialectKind,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = load_schema(schema)?;
    let table = schema.require_table(table)?;
    let commands = synthesize(table, dialect)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&commands)?),
        Format::Text => print_text_output(table.name(), dialect, &commands),
    }
    Ok(())
}

fn print_text_output(table: &str, dialect: DialectKind, commands: &[CommandView]) {
    println!("Commands for {table} ({dialect})");
    println!("==========================");
    for command in commands {
        println!();
        println!("[{}]", command.kind);
        println!("  {}", command.text);
        for (i, p) in command.parameters.iter().enumerate() {
            let size = if p.size > 0 {
                format!("({})", p.size)
            } else {
                String::new()
            };
            println!("  {:>2}. {} <- {} {}{}", i + 1, p.name, p.column, p.native_type, size);
        }
    }
}
