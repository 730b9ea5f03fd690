// SPDX-License-Identifier: Apache-2.0
// The schematized DB layer is adapted from rockbound, itself adapted from aptos-core/schemadb.

//! A users/products/orders REST service with cursor-based pagination.
//!
//! Records live in a schematized DB on top of [RocksDB](https://rocksdb.org/): every table is a
//! column family described by a [`Schema`], and all data passed in and out is typed. Listing
//! endpoints page through a table with [`pagination::paginate`], which walks the column family
//! with a [`SchemaIterator`] from an id cursor in either direction.
//!
//! The crate is layered bottom-up:
//! - [`DB`], [`schema`], [`SchemaBatch`] and [`SchemaIterator`]: typed access to RocksDB.
//! - [`store::Store`]: tables, id sequences and CRUD operations.
//! - [`pagination`]: the cursor paginator over any [`pagination::RecordStore`].
//! - [`cache`]: the optional response cache consumed by the HTTP layer.
//! - [`server`]: the axum router, handlers and error mapping.
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
mod config;
mod iterator;
mod metrics;
pub mod pagination;
pub mod records;
pub mod schema;
mod schema_batch;
pub mod seed;
pub mod server;
pub mod store;

pub use config::{gen_rocksdb_options, RocksdbConfig, ServerConfig};

use std::{path::Path, sync::Arc};

use anyhow::format_err;
pub use iterator::{IteratorOutput, ScanDirection, SchemaIterator, SeekKeyEncoder};
use metrics::{
    SCHEMADB_BATCH_COMMIT_BYTES, SCHEMADB_BATCH_COMMIT_LATENCY_SECONDS, SCHEMADB_DELETES,
    SCHEMADB_GET_BYTES, SCHEMADB_GET_LATENCY_SECONDS, SCHEMADB_PUT_BYTES,
};
pub use records::RecordId;
pub use rocksdb;
pub use rocksdb::DEFAULT_COLUMN_FAMILY_NAME;
use thiserror::Error;
use tracing::info;

pub use crate::schema::Schema;
pub use crate::schema_batch::SchemaBatch;
use crate::schema::{KeyCodec, KeyEncoder, ValueCodec};

/// This DB is a schematized RocksDB wrapper where all data passed in and out are typed according to
/// [`Schema`]s.
#[derive(Debug)]
pub struct DB {
    name: &'static str, // for logging
    db: Arc<rocksdb::DB>,
}

/// Returns the default column family descriptor. Includes LZ4 compression.
pub fn default_cf_descriptor(cf_name: impl Into<String>) -> rocksdb::ColumnFamilyDescriptor {
    let mut cf_opts = rocksdb::Options::default();
    cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    rocksdb::ColumnFamilyDescriptor::new(cf_name, cf_opts)
}

impl DB {
    /// Opens a database backed by RocksDB, using the provided column family names and default
    /// column family options.
    #[tracing::instrument(skip_all, level = "error")]
    pub fn open(
        path: impl AsRef<Path>,
        name: &'static str,
        column_families: impl IntoIterator<Item = impl Into<String>>,
        db_opts: &rocksdb::Options,
    ) -> anyhow::Result<Self> {
        let descriptors = column_families
            .into_iter()
            .map(|cf| default_cf_descriptor(cf.into()));
        let db = DB::open_with_cfds(db_opts, path, name, descriptors)?;
        Ok(db)
    }

    /// Open RocksDB with the provided column family descriptors.
    /// This allows the caller to configure options for each column family.
    #[tracing::instrument(skip_all, level = "error")]
    pub fn open_with_cfds(
        db_opts: &rocksdb::Options,
        path: impl AsRef<Path>,
        name: &'static str,
        cfds: impl IntoIterator<Item = rocksdb::ColumnFamilyDescriptor>,
    ) -> anyhow::Result<DB> {
        let inner = with_error_logging(
            || rocksdb::DB::open_cf_descriptors(db_opts, path, cfds),
            "open_with_cfds",
        )?;
        Ok(Self::log_construct(name, inner))
    }

    fn log_construct(name: &'static str, inner: rocksdb::DB) -> DB {
        info!(rocksdb_name = name, path = %inner.path().display(), "Opened RocksDB");
        DB {
            name,
            db: Arc::new(inner),
        }
    }

    /// Name of the database that can be used for logging or metrics or tracing.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Reads single record by key.
    #[tracing::instrument(skip_all, level = "error")]
    pub fn get<S: Schema>(
        &self,
        schema_key: &impl KeyEncoder<S>,
    ) -> anyhow::Result<Option<S::Value>> {
        let encoded_schema_key = schema_key.encode_key()?;
        with_error_logging::<_, _, anyhow::Error>(
            || {
                let _timer = SCHEMADB_GET_LATENCY_SECONDS
                    .with_label_values(&[S::COLUMN_FAMILY_NAME])
                    .start_timer();

                let cf_handle = self.get_cf_handle(S::COLUMN_FAMILY_NAME)?;
                let result = self.db.get_pinned_cf(cf_handle, &encoded_schema_key)?;
                SCHEMADB_GET_BYTES
                    .with_label_values(&[S::COLUMN_FAMILY_NAME])
                    .observe(result.as_ref().map_or(0.0, |v| v.len() as f64));
                result
                    .map(|raw_value| <S::Value as ValueCodec<S>>::decode_value(&raw_value))
                    .transpose()
                    .map_err(|err| err.into())
            },
            "get",
        )
    }

    /// Writes single record.
    #[tracing::instrument(skip_all, level = "error")]
    pub fn put<S: Schema>(
        &self,
        key: &impl KeyCodec<S>,
        value: &impl ValueCodec<S>,
    ) -> anyhow::Result<()> {
        // Not necessary to use a batch, but we'd like a central place to bump counters.
        with_error_logging(
            || {
                let mut batch = SchemaBatch::new();
                batch.put::<S>(key, value)?;
                self.write_schemas_inner(&batch)
            },
            "put",
        )
    }

    /// Delete a single key from the database.
    #[tracing::instrument(skip_all, level = "error")]
    pub fn delete<S: Schema>(&self, key: &impl KeyCodec<S>) -> anyhow::Result<()> {
        with_error_logging(
            || {
                let mut batch = SchemaBatch::new();
                batch.delete::<S>(key)?;
                self.write_schemas_inner(&batch)
            },
            "delete",
        )
    }

    /// Returns a [`SchemaIterator`] on a certain schema, positioned at the first key for
    /// [`ScanDirection::Forward`] and at the last key for [`ScanDirection::Backward`].
    #[tracing::instrument(skip_all, level = "error")]
    pub fn iter_with_direction<S: Schema>(
        &self,
        direction: ScanDirection,
    ) -> anyhow::Result<SchemaIterator<'_, S>> {
        let cf_handle = self.get_cf_handle(S::COLUMN_FAMILY_NAME)?;
        Ok(SchemaIterator::new(
            self.db
                .raw_iterator_cf_opt(cf_handle, rocksdb::ReadOptions::default()),
            direction,
        ))
    }

    /// Returns a forward [`SchemaIterator`] on a certain schema with the default read options.
    pub fn iter<S: Schema>(&self) -> anyhow::Result<SchemaIterator<'_, S>> {
        self.iter_with_direction::<S>(ScanDirection::Forward)
    }

    fn write_schemas_inner(&self, batch: &SchemaBatch) -> anyhow::Result<()> {
        let _timer = SCHEMADB_BATCH_COMMIT_LATENCY_SECONDS
            .with_label_values(&[self.name])
            .start_timer();

        let mut db_batch = rocksdb::WriteBatch::default();
        let mut columns_written = Vec::with_capacity(batch.last_writes.len());
        for (cf_name, rows) in batch.last_writes.iter() {
            let cf_handle = self.get_cf_handle(cf_name)?;
            let mut write_sizes = Vec::with_capacity(rows.len());
            let mut deletes_for_cf = 0;
            for (key, operation) in rows {
                match operation {
                    Operation::Put { value } => {
                        write_sizes.push(key.len() + value.len());
                        db_batch.put_cf(cf_handle, key, value);
                    }
                    Operation::Delete => {
                        db_batch.delete_cf(cf_handle, key);
                        deletes_for_cf += 1;
                    }
                }
            }
            columns_written.push((*cf_name, write_sizes, deletes_for_cf));
        }

        let serialized_size = db_batch.size_in_bytes();
        with_error_logging(
            || self.db.write_opt(db_batch, &default_write_options()),
            "write_schemas::write_opt",
        )?;

        // Bump counters only after DB write succeeds.
        for (cf_name, bytes, deletes) in columns_written {
            for write_size in bytes {
                SCHEMADB_PUT_BYTES
                    .with_label_values(&[cf_name])
                    .observe(write_size as f64);
            }
            SCHEMADB_DELETES
                .with_label_values(&[cf_name])
                .inc_by(deletes);
        }
        SCHEMADB_BATCH_COMMIT_BYTES
            .with_label_values(&[self.name])
            .observe(serialized_size as f64);

        Ok(())
    }

    /// Writes a group of records wrapped in a [`SchemaBatch`] atomically.
    #[tracing::instrument(skip_all, level = "error")]
    pub fn write_schemas(&self, batch: &SchemaBatch) -> anyhow::Result<()> {
        with_error_logging(|| self.write_schemas_inner(batch), "write_schemas")
    }

    fn get_cf_handle(&self, cf_name: &str) -> anyhow::Result<&rocksdb::ColumnFamily> {
        with_error_logging(
            || {
                self.db.cf_handle(cf_name).ok_or_else(|| {
                    format_err!("DB::cf_handle not found for column family name: {cf_name}",)
                })
            },
            "get_cf_handle",
        )
    }
}

fn with_error_logging<F, T, E: Into<anyhow::Error>>(f: F, name: &str) -> anyhow::Result<T>
where
    F: FnOnce() -> Result<T, E>,
{
    let result = f().map_err(|e| e.into());
    if let Err(e) = &result {
        tracing::error!("[Pagebound] error during {}: {}", name, e);
    }
    result
}

/// Readability alias for a key in the DB.
pub type SchemaKey = Vec<u8>;
/// Readability alias for a value in the DB.
pub type SchemaValue = Vec<u8>;

/// Represents operation written to the database.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Operation<V = SchemaValue> {
    /// Writing a value to the DB.
    Put {
        /// Value to write
        value: V,
    },
    /// Deleting a value
    Delete,
}

impl<V: AsRef<[u8]>> Operation<V> {
    /// Returns [`S::Value`] if the operation is [`Operation::Put`] and `None` if [`Operation::Delete`].
    #[cfg(test)]
    fn decode_value<S: Schema>(&self) -> anyhow::Result<Option<S::Value>> {
        match self {
            Operation::Put { value } => {
                let value = S::Value::decode_value(value.as_ref())?;
                Ok(Some(value))
            }
            Operation::Delete => Ok(None),
        }
    }
}

/// An error that occurred during (de)serialization of a [`Schema`]'s keys or
/// values.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Unable to deserialize a key because it has a different length than
    /// expected.
    #[error("Invalid key length. Expected {expected:}, got {got:}")]
    #[allow(missing_docs)] // The fields' names are self-explanatory.
    InvalidKeyLength { expected: usize, got: usize },
    /// Some other error occurred when (de)serializing a key or value. Inspect
    /// the inner [`anyhow::Error`] for more details.
    #[error(transparent)]
    Wrapped(#[from] anyhow::Error),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// For now, we always use synchronous writes. This makes sure that once the operation returns
/// `Ok(())` the data is persisted even if the machine crashes.
fn default_write_options() -> rocksdb::WriteOptions {
    let mut opts = rocksdb::WriteOptions::default();
    opts.set_sync(true);
    opts
}
