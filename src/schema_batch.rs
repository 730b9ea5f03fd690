use std::collections::{BTreeMap, HashMap};

use crate::schema::{ColumnFamilyName, KeyCodec, ValueCodec};
use crate::{Operation, Schema, SchemaKey};

/// [`SchemaBatch`] holds a collection of updates that can be applied to a DB
/// ([`Schema`]) atomically. Within one column family the last operation on a
/// key wins.
#[derive(Debug, Default, Clone)]
pub struct SchemaBatch {
    pub(crate) last_writes: HashMap<ColumnFamilyName, BTreeMap<SchemaKey, Operation>>,
}

impl SchemaBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an insert/update operation to the batch.
    pub fn put<S: Schema>(
        &mut self,
        key: &impl KeyCodec<S>,
        value: &impl ValueCodec<S>,
    ) -> anyhow::Result<()> {
        let key = key.encode_key()?;
        let put_operation = Operation::Put {
            value: value.encode_value()?,
        };
        self.insert_operation::<S>(key, put_operation);

        Ok(())
    }

    /// Adds a delete operation to the batch.
    pub fn delete<S: Schema>(&mut self, key: &impl KeyCodec<S>) -> anyhow::Result<()> {
        let key = key.encode_key()?;
        self.insert_operation::<S>(key, Operation::Delete);

        Ok(())
    }

    fn insert_operation<S: Schema>(&mut self, key: SchemaKey, operation: Operation) {
        let column_writes = self.last_writes.entry(S::COLUMN_FAMILY_NAME).or_default();
        column_writes.insert(key, operation);
    }

    /// Getting the operation from current schema batch if present
    #[cfg(test)]
    pub(crate) fn get_operation<S: Schema>(
        &self,
        key: &impl KeyCodec<S>,
    ) -> anyhow::Result<Option<&Operation>> {
        let key = key.encode_key()?;

        if let Some(column_writes) = self.last_writes.get(&S::COLUMN_FAMILY_NAME) {
            Ok(column_writes.get(&key))
        } else {
            Ok(None)
        }
    }

    /// Number of keys touched across all column families.
    pub fn len(&self) -> usize {
        self.last_writes.values().map(BTreeMap::len).sum()
    }

    /// Whether the batch touches no key.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
