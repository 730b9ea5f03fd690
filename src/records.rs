//! Record types stored by the service and their table schemas.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::{KeyDecoder, KeyEncoder, Schema};
use crate::{define_schema, impl_json_value_codec, CodecError, SeekKeyEncoder};

/// Identifier of a record within its table.
///
/// Ids are assigned by the store at creation time from a per-table sequence,
/// strictly increase, and are never reused. They are encoded big-endian so
/// that RocksDB key order is numeric order.
#[cfg_attr(feature = "arbitrary", derive(proptest_derive::Arbitrary))]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Size of the encoded key.
    pub const ENCODED_LEN: usize = 8;

    fn to_bytes(self) -> Result<Vec<u8>, CodecError> {
        let mut bytes = Vec::with_capacity(Self::ENCODED_LEN);
        bytes.write_u64::<BigEndian>(self.0)?;
        Ok(bytes)
    }

    fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() != Self::ENCODED_LEN {
            return Err(CodecError::InvalidKeyLength {
                expected: Self::ENCODED_LEN,
                got: data.len(),
            });
        }
        let mut reader = std::io::Cursor::new(data);
        Ok(RecordId(reader.read_u64::<BigEndian>()?))
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        RecordId(value)
    }
}

impl<S: Schema> KeyEncoder<S> for RecordId {
    fn encode_key(&self) -> Result<Vec<u8>, CodecError> {
        self.to_bytes()
    }
}

impl<S: Schema> KeyDecoder<S> for RecordId {
    fn decode_key(data: &[u8]) -> Result<Self, CodecError> {
        Self::from_bytes(data)
    }
}

impl<S: Schema> SeekKeyEncoder<S> for RecordId {
    fn encode_seek_key(&self) -> crate::schema::Result<Vec<u8>> {
        self.to_bytes()
    }
}

/// Key of an order line: the owning order followed by the line position.
///
/// All lines of one order are adjacent, so an order prefix seek finds them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderLineKey {
    /// Owning order.
    pub order_id: RecordId,
    /// Position of the line inside the order.
    pub line: u32,
}

impl<S: Schema> KeyEncoder<S> for OrderLineKey {
    fn encode_key(&self) -> Result<Vec<u8>, CodecError> {
        let mut bytes = Vec::with_capacity(RecordId::ENCODED_LEN + 4);
        bytes.write_u64::<BigEndian>(self.order_id.0)?;
        bytes.write_u32::<BigEndian>(self.line)?;
        Ok(bytes)
    }
}

impl<S: Schema> KeyDecoder<S> for OrderLineKey {
    fn decode_key(data: &[u8]) -> Result<Self, CodecError> {
        let expected = RecordId::ENCODED_LEN + 4;
        if data.len() != expected {
            return Err(CodecError::InvalidKeyLength {
                expected,
                got: data.len(),
            });
        }
        let mut reader = std::io::Cursor::new(data);
        Ok(OrderLineKey {
            order_id: RecordId(reader.read_u64::<BigEndian>()?),
            line: reader.read_u32::<BigEndian>()?,
        })
    }
}

impl<S: Schema> SeekKeyEncoder<S> for OrderLineKey {
    fn encode_seek_key(&self) -> crate::schema::Result<Vec<u8>> {
        <Self as KeyEncoder<S>>::encode_key(self)
    }
}

/// Seek prefix covering every line of one order.
#[derive(Debug, Clone, Copy)]
pub struct OrderLinePrefix(pub RecordId);

impl<S: Schema> SeekKeyEncoder<S> for OrderLinePrefix {
    fn encode_seek_key(&self) -> crate::schema::Result<Vec<u8>> {
        self.0.to_bytes()
    }
}

/// Name of the table a sequence belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceName(pub String);

impl SequenceName {
    /// Sequence allocating ids for the given table.
    pub fn of<S: Schema>() -> Self {
        SequenceName(S::COLUMN_FAMILY_NAME.to_string())
    }
}

impl<S: Schema> KeyEncoder<S> for SequenceName {
    fn encode_key(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.0.as_bytes().to_vec())
    }
}

impl<S: Schema> KeyDecoder<S> for SequenceName {
    fn decode_key(data: &[u8]) -> Result<Self, CodecError> {
        String::from_utf8(data.to_vec())
            .map(SequenceName)
            .map_err(|e| CodecError::Wrapped(e.into()))
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Id assigned at creation.
    pub user_id: RecordId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A product that can be ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Id assigned at creation.
    pub product_id: RecordId,
    /// Display name.
    pub product_name: String,
    /// Unit price.
    pub price: f64,
    /// Units in stock.
    pub stock: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Top-level order row, without its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Id assigned at creation.
    pub order_id: RecordId,
    /// User who placed the order.
    pub user_id: RecordId,
    /// Creation time.
    pub order_date: DateTime<Utc>,
    /// Order total, when the client supplied one.
    pub total_amount: Option<f64>,
}

/// One product line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Ordered product.
    pub product_id: RecordId,
    /// Units ordered.
    pub quantity: u32,
    /// Unit price at order time.
    pub price: f64,
}

/// Order line joined with its product, as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderProduct {
    /// Owning order.
    pub order_id: RecordId,
    /// Ordered product.
    pub product_id: RecordId,
    /// Units ordered.
    pub quantity: u32,
    /// Unit price at order time.
    pub price: f64,
    /// Current product row; `None` once the product has been deleted.
    pub product: Option<Product>,
}

/// An order together with its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Id assigned at creation.
    pub order_id: RecordId,
    /// User who placed the order.
    pub user_id: RecordId,
    /// Creation time.
    pub order_date: DateTime<Utc>,
    /// Order total, when the client supplied one.
    pub total_amount: Option<f64>,
    /// Lines in insertion order.
    #[serde(rename = "orderProducts")]
    pub order_products: Vec<OrderProduct>,
}

/// Latest order of a user flattened with the product of its first line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestOrderWithProduct {
    /// Order id.
    pub order_id: RecordId,
    /// Creation time of the order.
    pub order_date: DateTime<Utc>,
    /// Order total, when known.
    pub total_amount: Option<f64>,
    /// Product of the first line.
    pub product_id: RecordId,
    /// Name of that product.
    pub product_name: String,
    /// Current price of that product.
    pub price: f64,
    /// Units of that product in the order.
    pub quantity: u32,
}

define_schema!(UserSchema, RecordId, User, "users");
define_schema!(ProductSchema, RecordId, Product, "products");
define_schema!(OrderSchema, RecordId, OrderRecord, "orders");
define_schema!(OrderLineSchema, OrderLineKey, OrderLine, "order_products");
define_schema!(SequenceSchema, SequenceName, RecordId, "sequences");

impl_json_value_codec!(UserSchema, User);
impl_json_value_codec!(ProductSchema, Product);
impl_json_value_codec!(OrderSchema, OrderRecord);
impl_json_value_codec!(OrderLineSchema, OrderLine);

impl crate::schema::ValueCodec<SequenceSchema> for RecordId {
    fn encode_value(&self) -> Result<Vec<u8>, CodecError> {
        self.to_bytes()
    }

    fn decode_value(data: &[u8]) -> Result<Self, CodecError> {
        Self::from_bytes(data)
    }
}

/// Every column family the store opens.
pub fn column_families() -> Vec<crate::schema::ColumnFamilyName> {
    vec![
        rocksdb::DEFAULT_COLUMN_FAMILY_NAME,
        UserSchema::COLUMN_FAMILY_NAME,
        ProductSchema::COLUMN_FAMILY_NAME,
        OrderSchema::COLUMN_FAMILY_NAME,
        OrderLineSchema::COLUMN_FAMILY_NAME,
        SequenceSchema::COLUMN_FAMILY_NAME,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_keys_sort_numerically() {
        let ids = [0u64, 1, 9, 10, 255, 256, 70_000, u64::MAX];
        let encoded: Vec<Vec<u8>> = ids
            .iter()
            .map(|id| <RecordId as KeyEncoder<UserSchema>>::encode_key(&RecordId(*id)).unwrap())
            .collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn record_id_rejects_wrong_length() {
        let err = <RecordId as KeyDecoder<UserSchema>>::decode_key(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidKeyLength {
                expected: 8,
                got: 3
            }
        ));
    }

    #[test]
    fn order_line_keys_group_by_order() {
        let key = |order, line| {
            <OrderLineKey as KeyEncoder<OrderLineSchema>>::encode_key(&OrderLineKey {
                order_id: RecordId(order),
                line,
            })
            .unwrap()
        };
        let prefix =
            <OrderLinePrefix as SeekKeyEncoder<OrderLineSchema>>::encode_seek_key(&OrderLinePrefix(
                RecordId(2),
            ))
            .unwrap();
        assert!(key(1, u32::MAX) < prefix);
        assert!(key(2, 0).starts_with(&prefix));
        assert!(key(2, 7) < key(3, 0));

        let decoded =
            <OrderLineKey as KeyDecoder<OrderLineSchema>>::decode_key(&key(2, 7)).unwrap();
        assert_eq!(
            OrderLineKey {
                order_id: RecordId(2),
                line: 7
            },
            decoded
        );
    }

    #[test]
    fn order_serializes_lines_as_order_products() {
        let order = Order {
            order_id: RecordId(4),
            user_id: RecordId(1),
            order_date: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            total_amount: None,
            order_products: vec![],
        };
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["order_id"], 4);
        assert!(json["orderProducts"].as_array().unwrap().is_empty());
        assert!(json["total_amount"].is_null());
    }
}
