//! Blob provider backed by a binary column.

use super::{sequence_id, BlobId, BlobProvider, BlobRecord};
use crate::driver::{CommandKind, DbCommand, DbParameter, DbTransaction, NativeType, PlaceholderStyle};
use crate::error::{StorageError, StorageResult};
use relsync_codec::Value;
use sha2::{Digest, Sha256};
use std::io::{Cursor, Read};
use tracing::debug;

/// Stores blobs as rows of a table with `id`, `data`, `size` and `checksum`
/// columns (`file_data` by default).
///
/// Unlike the streaming providers, this one holds the whole payload in
/// memory while writing and reading. Writing an existing id overwrites it.
#[derive(Debug, Clone)]
pub struct TableBlobProvider {
    table: String,
    sequence: String,
    placeholders: PlaceholderStyle,
}

impl Default for TableBlobProvider {
    fn default() -> Self {
        Self::new("file_data")
    }
}

impl TableBlobProvider {
    /// Creates a provider for `table`, drawing ids from `{table}_seq`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            sequence: format!("{table}_seq"),
            table,
            placeholders: PlaceholderStyle::Dollar,
        }
    }

    /// Sets the placeholder syntax of the generated command text.
    #[must_use]
    pub fn with_placeholders(mut self, placeholders: PlaceholderStyle) -> Self {
        self.placeholders = placeholders;
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn command(&self, kind: CommandKind, parameters: Vec<DbParameter>) -> DbCommand {
        let p = |i: usize| self.placeholders.render(i, &parameters[i].name);
        let text = match kind {
            CommandKind::Insert => format!(
                "INSERT INTO {} (id, data, size, checksum) VALUES ({}, {}, {}, {})",
                self.table,
                p(0),
                p(1),
                p(2),
                p(3)
            ),
            CommandKind::Update => format!(
                "UPDATE {} SET data = {}, size = {}, checksum = {} WHERE id = {}",
                self.table,
                p(0),
                p(1),
                p(2),
                p(3)
            ),
            CommandKind::Delete => format!("DELETE FROM {} WHERE id = {}", self.table, p(0)),
            _ => format!("SELECT data FROM {} WHERE id = {}", self.table, p(0)),
        };
        let mut command = DbCommand::new(kind, self.table.clone(), text);
        command.key_column = Some("id".to_string());
        command.parameters = parameters;
        if kind == CommandKind::Select {
            command.columns = vec!["data".to_string()];
        }
        command
    }
}

fn id_param(id: BlobId) -> StorageResult<DbParameter> {
    let id = i64::try_from(id)
        .map_err(|_| StorageError::driver(format!("blob id {id} exceeds the column range")))?;
    Ok(DbParameter::new("id", NativeType::BigInt).with_value(id))
}

impl BlobProvider for TableBlobProvider {
    fn allocate_id(&self, txn: &mut dyn DbTransaction) -> StorageResult<BlobId> {
        sequence_id(txn, &self.sequence)
    }

    fn write(
        &self,
        id: BlobId,
        reader: &mut dyn Read,
        txn: &mut dyn DbTransaction,
    ) -> StorageResult<BlobRecord> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let checksum: [u8; 32] = Sha256::digest(&data).into();
        let size = data.len() as u64;
        let size_value = i64::try_from(size)
            .map_err(|_| StorageError::driver(format!("blob {id} is too large")))?;

        let data_param = DbParameter::new("data", NativeType::Binary).with_value(data);
        let size_param = DbParameter::new("size", NativeType::BigInt).with_value(size_value);
        let checksum_param =
            DbParameter::new("checksum", NativeType::Binary).with_value(checksum.to_vec());

        let update = self.command(
            CommandKind::Update,
            vec![
                data_param.clone(),
                size_param.clone(),
                checksum_param.clone(),
                id_param(id)?,
            ],
        );
        if txn.execute(&update)? == 0 {
            let insert = self.command(
                CommandKind::Insert,
                vec![id_param(id)?, data_param, size_param, checksum_param],
            );
            txn.execute(&insert)?;
        }

        debug!(id, size, table = %self.table, "blob row written");
        Ok(BlobRecord { id, size, checksum })
    }

    fn read(&self, id: BlobId, txn: &mut dyn DbTransaction) -> StorageResult<Box<dyn Read + Send>> {
        let select = self.command(CommandKind::Select, vec![id_param(id)?]);
        let mut cursor = txn.query(&select)?;
        if !cursor.advance()? {
            return Err(StorageError::not_found(format!("blob {id}")));
        }
        let data = match cursor.value(0)? {
            Value::Bytes(data) => data,
            Value::Null => Vec::new(),
            other => {
                return Err(StorageError::corrupted(format!(
                    "blob {id} data column holds {other:?}"
                )))
            }
        };
        cursor.close();
        Ok(Box::new(Cursor::new(data)))
    }

    fn delete(&self, id: BlobId, txn: &mut dyn DbTransaction) -> StorageResult<bool> {
        let delete = self.command(CommandKind::Delete, vec![id_param(id)?]);
        Ok(txn.execute(&delete)? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Driver;
    use crate::memory::MemoryDriver;

    #[test]
    fn overwrite_on_duplicate_id() {
        let provider = TableBlobProvider::default();
        let driver = MemoryDriver::new();
        let mut txn = driver.begin().unwrap();

        let id = provider.allocate_id(txn.as_mut()).unwrap();
        provider.write(id, &mut &b"one"[..], txn.as_mut()).unwrap();
        let record = provider.write(id, &mut &b"three"[..], txn.as_mut()).unwrap();
        txn.commit().unwrap();

        assert_eq!(record.size, 5);
        assert_eq!(driver.row_count("file_data"), 1);

        let mut txn = driver.begin().unwrap();
        let mut back = Vec::new();
        provider
            .read(id, txn.as_mut())
            .unwrap()
            .read_to_end(&mut back)
            .unwrap();
        assert_eq!(back, b"three");
    }

    #[test]
    fn missing_blob_and_delete() {
        let provider = TableBlobProvider::new("attachments");
        let driver = MemoryDriver::new();
        let mut txn = driver.begin().unwrap();

        assert!(matches!(
            provider.read(3, txn.as_mut()),
            Err(StorageError::NotFound(_))
        ));
        provider.write(3, &mut &b"x"[..], txn.as_mut()).unwrap();
        assert!(provider.delete(3, txn.as_mut()).unwrap());
        assert!(!provider.delete(3, txn.as_mut()).unwrap());
    }

    #[test]
    fn command_text_follows_placeholder_style() {
        let provider = TableBlobProvider::default().with_placeholders(PlaceholderStyle::AtName);
        let command = provider.command(CommandKind::Delete, vec![id_param(1).unwrap()]);
        assert_eq!(command.text, "DELETE FROM file_data WHERE id = @id");
    }
}
