// SPDX-License-Identifier: Apache-2.0
// Adapted from rockbound/schema.rs, itself adapted from Aptos::storage::schemadb.

//! A type-safe interface over [`DB`](crate::DB) column families.
//!
//! Every table of the service is a [`Schema`]: a zero-sized marker type tying a
//! column family name to a key type and a value type. Keys must encode so that
//! the lexicographic order of their bytes matches their logical order, since
//! the paginator relies on RocksDB iteration order.

use std::{fmt::Debug, sync::Arc};

use crate::CodecError;

/// Column family names are known beforehand, so they can have `static` lifetimes.
pub type ColumnFamilyName = &'static str;

/// A [`Schema`] is a type-safe interface over a specific column family in a
/// [`DB`](crate::DB). It is always a key type ([`KeyCodec`]) and a value type ([`ValueCodec`]).
pub trait Schema: Debug + Send + Sync + 'static + Sized + Default {
    /// The column family name associated with this struct.
    /// Note: all schemas within the same DB must have distinct column family names.
    const COLUMN_FAMILY_NAME: ColumnFamilyName;

    /// Type of the key.
    type Key: KeyCodec<Self>;

    /// Type of the value.
    type Value: ValueCodec<Self>;
}

/// A [`core::result::Result`] alias with [`CodecError`] as the error type.
pub type Result<T, E = CodecError> = core::result::Result<T, E>;

/// This trait defines a type that can serve as a [`Schema::Key`].
///
/// [`KeyCodec`] is a marker trait with a blanket implementation for all types
/// that are both [`KeyEncoder`] and [`KeyDecoder`].
pub trait KeyCodec<S: Schema + ?Sized>: KeyEncoder<S> + KeyDecoder<S> {}

impl<T, S: Schema + ?Sized> KeyCodec<S> for T where T: KeyEncoder<S> + KeyDecoder<S> {}

/// Implementors of this trait can be used to encode keys in the given [`Schema`].
pub trait KeyEncoder<S: Schema + ?Sized>: Sized + Debug {
    /// Converts `self` to bytes to be stored in RocksDB.
    fn encode_key(&self) -> Result<Vec<u8>>;
}

impl<S: Schema, T: KeyEncoder<S>> KeyEncoder<S> for &T {
    fn encode_key(&self) -> Result<Vec<u8>> {
        (*self).encode_key()
    }
}

impl<S: Schema, T: KeyEncoder<S>> KeyEncoder<S> for Arc<T> {
    fn encode_key(&self) -> Result<Vec<u8>> {
        self.as_ref().encode_key()
    }
}

/// Implementors of this trait can be used to decode keys in the given [`Schema`].
pub trait KeyDecoder<S: Schema + ?Sized>: Sized + Debug {
    /// Converts bytes fetched from RocksDB to `Self`.
    fn decode_key(data: &[u8]) -> Result<Self>;
}

/// This trait defines a type that can serve as a [`Schema::Value`].
pub trait ValueCodec<S: Schema + ?Sized>: Sized + Debug {
    /// Converts `self` to bytes to be stored in DB.
    fn encode_value(&self) -> Result<Vec<u8>>;
    /// Converts bytes fetched from DB to `Self`.
    fn decode_value(data: &[u8]) -> Result<Self>;
}

/// A utility macro to define [`Schema`] implementors. You must specify the
/// [`Schema`] implementor's name, the key type, the value type, and the column
/// family name.
///
/// # Example
///
/// ```rust
/// use pagebound::define_schema;
/// use pagebound::schema::{Schema, ValueCodec, Result};
/// use pagebound::RecordId;
///
/// define_schema!(NicknameById, RecordId, String, "nickname_by_id");
///
/// impl ValueCodec<NicknameById> for String {
///     fn encode_value(&self) -> Result<Vec<u8>> {
///         Ok(self.as_bytes().to_vec())
///     }
///
///     fn decode_value(data: &[u8]) -> Result<Self> {
///         Ok(String::from_utf8_lossy(data).into_owned())
///     }
/// }
///
/// assert_eq!(NicknameById::COLUMN_FAMILY_NAME, "nickname_by_id");
/// ```
#[macro_export]
macro_rules! define_schema {
    ($schema_type:ident, $key_type:ty, $value_type:ty, $cf_name:expr) => {
        #[derive(Debug, Default)]
        pub struct $schema_type;

        impl $crate::schema::Schema for $schema_type {
            type Key = $key_type;
            type Value = $value_type;

            const COLUMN_FAMILY_NAME: $crate::schema::ColumnFamilyName = $cf_name;
        }
    };
}

/// Implements [`ValueCodec`] for a serde type by storing it as JSON.
#[macro_export]
macro_rules! impl_json_value_codec {
    ($schema_type:ty, $value_type:ty) => {
        impl $crate::schema::ValueCodec<$schema_type> for $value_type {
            fn encode_value(&self) -> $crate::schema::Result<Vec<u8>> {
                ::serde_json::to_vec(self).map_err(|e| $crate::CodecError::Wrapped(e.into()))
            }

            fn decode_value(data: &[u8]) -> $crate::schema::Result<Self> {
                ::serde_json::from_slice(data).map_err(|e| $crate::CodecError::Wrapped(e.into()))
            }
        }
    };
}
