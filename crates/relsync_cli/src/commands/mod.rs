//! CLI command implementations.

pub mod blob;
pub mod inspect;
pub mod synth;

use relsync_core::Schema;
use std::path::Path;

/// Reads and validates a JSON schema file.
pub fn load_schema(path: &Path) -> Result<Schema, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read schema {}: {e}", path.display()))?;
    Ok(Schema::from_json(&json)?)
}
