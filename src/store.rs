//! The record store: users, products and orders on top of the schematized [`DB`].
//!
//! Ids come from one persisted sequence per table. A sequence only moves forward, so an id is
//! never handed out twice even after its record was deleted. Every write takes the store's write
//! lock and commits as a single [`SchemaBatch`], which keeps sequence bumps and record writes
//! atomic with respect to each other.

use std::marker::PhantomData;
use std::ops::RangeInclusive;
use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::pagination::{Direction, Filtered, RecordScan, RecordStore};
use crate::records::{
    column_families, LatestOrderWithProduct, Order, OrderLine, OrderLineKey, OrderLinePrefix,
    OrderLineSchema, OrderProduct, OrderRecord, OrderSchema, Product, ProductSchema, SequenceName,
    SequenceSchema, User, UserSchema,
};
use crate::schema::Schema;
use crate::{gen_rocksdb_options, RecordId, RocksdbConfig, SchemaBatch, DB};

/// Failure of a store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record the operation needs does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record, e.g. `"User"`.
        entity: &'static str,
        /// Id that was looked up.
        id: RecordId,
    },
    /// The underlying DB failed.
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

/// Shorthand for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Fields of a user to create.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
}

/// Fields of a user to change; `None` keeps the current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserChanges {
    /// New display name.
    pub name: Option<String>,
    /// New email.
    pub email: Option<String>,
}

/// Fields of a product to create.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    /// Display name.
    pub product_name: String,
    /// Unit price.
    pub price: f64,
    /// Units in stock, zero when omitted.
    pub stock: Option<u32>,
}

/// Fields of a product to change; `None` keeps the current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductChanges {
    /// New display name.
    pub product_name: Option<String>,
    /// New unit price.
    pub price: Option<f64>,
    /// New stock level.
    pub stock: Option<u32>,
}

/// One line of an order to create.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrderLine {
    /// Ordered product; must exist.
    pub product_id: RecordId,
    /// Units ordered, one when omitted.
    pub quantity: Option<u32>,
    /// Unit price.
    pub price: f64,
}

/// An order to create.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    /// User placing the order; must exist.
    pub user_id: RecordId,
    /// Order total, if the client computed one.
    pub total_amount: Option<f64>,
    /// Lines in the order they should be stored.
    #[serde(rename = "orderProducts", default)]
    pub order_products: Vec<NewOrderLine>,
}

/// Fields of an order to change; `None` keeps the current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderChanges {
    /// New order total.
    pub total_amount: Option<f64>,
}

/// One table keyed by [`RecordId`], exposed to the paginator.
pub struct Table<'a, S> {
    db: &'a DB,
    phantom: PhantomData<S>,
}

impl<'a, S: Schema<Key = RecordId>> Table<'a, S> {
    fn new(db: &'a DB) -> Self {
        Self {
            db,
            phantom: PhantomData,
        }
    }
}

impl<S: Schema<Key = RecordId>> RecordStore for Table<'_, S> {
    type Record = S::Value;

    fn scan(
        &self,
        cursor: Option<RecordId>,
        direction: Direction,
    ) -> anyhow::Result<RecordScan<'_, S::Value>> {
        let mut iter = self
            .db
            .iter_with_direction::<S>(direction.scan_direction())?;
        if let Some(cursor) = cursor {
            // Both seeks land on the cursor itself when it still exists; it is skipped below.
            match direction {
                Direction::Next => iter.seek(&cursor)?,
                Direction::Prev => iter.seek_for_prev(&cursor)?,
            }
        }

        Ok(Box::new(
            iter.map(|item| item.map(|output| output.into_tuple()))
                .skip_while(move |item| {
                    matches!(item, Ok((id, _)) if Some(*id) == cursor)
                }),
        ))
    }
}

/// Handle to every table of the service. Shared behind an `Arc` by the server.
#[derive(Debug)]
pub struct Store {
    db: DB,
    write_lock: Mutex<()>,
}

impl Store {
    /// Opens (or creates) the store at `path`.
    #[tracing::instrument(skip_all, level = "error")]
    pub fn open(path: impl AsRef<Path>, config: &RocksdbConfig) -> anyhow::Result<Self> {
        let db_opts = gen_rocksdb_options(config, false);
        let db = DB::open(path, "pagebound", column_families(), &db_opts)?;
        info!(db = db.name(), "Record store ready");
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Reserves `count` fresh ids of table `S`, recording the new sequence value in `batch`.
    /// The caller must hold the write lock until `batch` is committed.
    fn allocate_ids<S: Schema>(
        &self,
        batch: &mut SchemaBatch,
        count: u64,
    ) -> anyhow::Result<RangeInclusive<RecordId>> {
        let sequence = SequenceName::of::<S>();
        let last = self
            .db
            .get::<SequenceSchema>(&sequence)?
            .unwrap_or_default();
        let first = last
            .0
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("{} id sequence exhausted", S::COLUMN_FAMILY_NAME))?;
        let end = last
            .0
            .checked_add(count)
            .ok_or_else(|| anyhow::anyhow!("{} id sequence exhausted", S::COLUMN_FAMILY_NAME))?;
        batch.put::<SequenceSchema>(&sequence, &RecordId(end))?;
        Ok(RecordId(first)..=RecordId(end))
    }

    fn require<S: Schema<Key = RecordId>>(
        &self,
        entity: &'static str,
        id: RecordId,
    ) -> StoreResult<S::Value> {
        self.db
            .get::<S>(&id)?
            .ok_or(StoreError::NotFound { entity, id })
    }

    /// The users table.
    pub fn users(&self) -> Table<'_, UserSchema> {
        Table::new(&self.db)
    }

    /// The products table.
    pub fn products(&self) -> Table<'_, ProductSchema> {
        Table::new(&self.db)
    }

    /// The orders table, without lines.
    pub fn orders(&self) -> Table<'_, OrderSchema> {
        Table::new(&self.db)
    }

    /// Creates one user.
    pub fn create_user(&self, new: NewUser) -> anyhow::Result<User> {
        let mut created = self.create_users(vec![new])?;
        created
            .pop()
            .ok_or_else(|| anyhow::anyhow!("user batch came back empty"))
    }

    /// Creates users in one batch with consecutive ids.
    #[tracing::instrument(skip_all, level = "error")]
    pub fn create_users(&self, new: Vec<NewUser>) -> anyhow::Result<Vec<User>> {
        if new.is_empty() {
            return Ok(Vec::new());
        }
        let _guard = self.write_lock.lock();
        let mut batch = SchemaBatch::new();
        let ids = self.allocate_ids::<UserSchema>(&mut batch, new.len() as u64)?;
        let created_at = Utc::now();
        let users: Vec<User> = (ids.start().0..=ids.end().0)
            .zip(new)
            .map(|(id, new)| User {
                user_id: RecordId(id),
                name: new.name,
                email: new.email,
                created_at,
            })
            .collect();
        for user in &users {
            batch.put::<UserSchema>(&user.user_id, user)?;
        }
        self.db.write_schemas(&batch)?;
        debug!(count = users.len(), first = %ids.start(), "Created users");
        Ok(users)
    }

    /// Looks a user up by id.
    pub fn get_user(&self, id: RecordId) -> anyhow::Result<Option<User>> {
        self.db.get::<UserSchema>(&id)
    }

    /// Applies `changes` to an existing user.
    pub fn update_user(&self, id: RecordId, changes: UserChanges) -> StoreResult<User> {
        let _guard = self.write_lock.lock();
        let mut user = self.require::<UserSchema>("User", id)?;
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        self.db.put::<UserSchema>(&id, &user)?;
        Ok(user)
    }

    /// Deletes a user, returning the deleted row. Orders placed by the user are kept.
    pub fn delete_user(&self, id: RecordId) -> StoreResult<User> {
        let _guard = self.write_lock.lock();
        let user = self.require::<UserSchema>("User", id)?;
        self.db.delete::<UserSchema>(&id)?;
        Ok(user)
    }

    /// Creates one product.
    pub fn create_product(&self, new: NewProduct) -> anyhow::Result<Product> {
        let mut created = self.create_products(vec![new])?;
        created
            .pop()
            .ok_or_else(|| anyhow::anyhow!("product batch came back empty"))
    }

    /// Creates products in one batch with consecutive ids.
    #[tracing::instrument(skip_all, level = "error")]
    pub fn create_products(&self, new: Vec<NewProduct>) -> anyhow::Result<Vec<Product>> {
        if new.is_empty() {
            return Ok(Vec::new());
        }
        let _guard = self.write_lock.lock();
        let mut batch = SchemaBatch::new();
        let ids = self.allocate_ids::<ProductSchema>(&mut batch, new.len() as u64)?;
        let created_at = Utc::now();
        let products: Vec<Product> = (ids.start().0..=ids.end().0)
            .zip(new)
            .map(|(id, new)| Product {
                product_id: RecordId(id),
                product_name: new.product_name,
                price: new.price,
                stock: new.stock.unwrap_or(0),
                created_at,
            })
            .collect();
        for product in &products {
            batch.put::<ProductSchema>(&product.product_id, product)?;
        }
        self.db.write_schemas(&batch)?;
        debug!(count = products.len(), first = %ids.start(), "Created products");
        Ok(products)
    }

    /// Looks a product up by id.
    pub fn get_product(&self, id: RecordId) -> anyhow::Result<Option<Product>> {
        self.db.get::<ProductSchema>(&id)
    }

    /// Every product in ascending id order.
    pub fn list_products(&self) -> anyhow::Result<Vec<Product>> {
        self.db
            .iter::<ProductSchema>()?
            .map(|item| item.map(|output| output.value))
            .collect()
    }

    /// Applies `changes` to an existing product.
    pub fn update_product(&self, id: RecordId, changes: ProductChanges) -> StoreResult<Product> {
        let _guard = self.write_lock.lock();
        let mut product = self.require::<ProductSchema>("Product", id)?;
        if let Some(product_name) = changes.product_name {
            product.product_name = product_name;
        }
        if let Some(price) = changes.price {
            product.price = price;
        }
        if let Some(stock) = changes.stock {
            product.stock = stock;
        }
        self.db.put::<ProductSchema>(&id, &product)?;
        Ok(product)
    }

    /// Deletes a product, returning the deleted row. Order lines referring to it remain and
    /// hydrate with `product: None`.
    pub fn delete_product(&self, id: RecordId) -> StoreResult<Product> {
        let _guard = self.write_lock.lock();
        let product = self.require::<ProductSchema>("Product", id)?;
        self.db.delete::<ProductSchema>(&id)?;
        Ok(product)
    }

    /// Creates an order and its lines. The user and every product must exist.
    #[tracing::instrument(skip_all, level = "error")]
    pub fn create_order(&self, new: NewOrder) -> StoreResult<Order> {
        let _guard = self.write_lock.lock();
        self.require::<UserSchema>("User", new.user_id)?;
        for line in &new.order_products {
            self.require::<ProductSchema>("Product", line.product_id)?;
        }

        let mut batch = SchemaBatch::new();
        let order_id = *self.allocate_ids::<OrderSchema>(&mut batch, 1)?.start();
        let record = OrderRecord {
            order_id,
            user_id: new.user_id,
            order_date: Utc::now(),
            total_amount: new.total_amount,
        };
        batch.put::<OrderSchema>(&order_id, &record)?;
        for (line, new_line) in (0u32..).zip(&new.order_products) {
            let order_line = OrderLine {
                product_id: new_line.product_id,
                quantity: new_line.quantity.unwrap_or(1),
                price: new_line.price,
            };
            batch.put::<OrderLineSchema>(&OrderLineKey { order_id, line }, &order_line)?;
        }
        self.db.write_schemas(&batch)?;
        debug!(%order_id, lines = new.order_products.len(), "Created order");

        Ok(self.hydrate_order(record)?)
    }

    /// Lines of an order in insertion order.
    pub fn order_lines(&self, order_id: RecordId) -> anyhow::Result<Vec<OrderLine>> {
        let mut iter = self.db.iter::<OrderLineSchema>()?;
        iter.seek(&OrderLinePrefix(order_id))?;
        let mut lines = Vec::new();
        for item in iter {
            let output = item?;
            if output.key.order_id != order_id {
                break;
            }
            lines.push(output.value);
        }
        Ok(lines)
    }

    /// Joins an order row with its lines and their current products.
    pub fn hydrate_order(&self, record: OrderRecord) -> anyhow::Result<Order> {
        let order_products = self
            .order_lines(record.order_id)?
            .into_iter()
            .map(|line| {
                Ok(OrderProduct {
                    order_id: record.order_id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    price: line.price,
                    product: self.get_product(line.product_id)?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Order {
            order_id: record.order_id,
            user_id: record.user_id,
            order_date: record.order_date,
            total_amount: record.total_amount,
            order_products,
        })
    }

    /// Looks an order up by id, with its lines.
    pub fn get_order(&self, id: RecordId) -> anyhow::Result<Option<Order>> {
        self.db
            .get::<OrderSchema>(&id)?
            .map(|record| self.hydrate_order(record))
            .transpose()
    }

    /// Applies `changes` to an existing order.
    pub fn update_order(&self, id: RecordId, changes: OrderChanges) -> StoreResult<Order> {
        let record = {
            let _guard = self.write_lock.lock();
            let mut record = self.require::<OrderSchema>("Order", id)?;
            if let Some(total_amount) = changes.total_amount {
                record.total_amount = Some(total_amount);
            }
            self.db.put::<OrderSchema>(&id, &record)?;
            record
        };
        Ok(self.hydrate_order(record)?)
    }

    /// Deletes an order and its lines, returning the deleted order row.
    pub fn delete_order(&self, id: RecordId) -> StoreResult<OrderRecord> {
        let _guard = self.write_lock.lock();
        let record = self.require::<OrderSchema>("Order", id)?;
        let mut batch = SchemaBatch::new();
        batch.delete::<OrderSchema>(&id)?;
        for line in 0..self.order_lines(id)?.len() as u32 {
            batch.delete::<OrderLineSchema>(&OrderLineKey { order_id: id, line })?;
        }
        self.db.write_schemas(&batch)?;
        Ok(record)
    }

    /// Orders placed by one user, as a pageable table.
    pub fn orders_of_user(
        &self,
        user_id: RecordId,
    ) -> Filtered<Table<'_, OrderSchema>, impl Fn(&OrderRecord) -> bool> {
        Filtered::new(self.orders(), move |order: &OrderRecord| {
            order.user_id == user_id
        })
    }

    /// The user's most recent order that has at least one line whose product still exists,
    /// flattened with that first line.
    pub fn latest_order_for_user(
        &self,
        user_id: RecordId,
    ) -> anyhow::Result<Option<LatestOrderWithProduct>> {
        let orders = self.orders_of_user(user_id);
        for item in orders.scan(None, Direction::Prev)? {
            let (order_id, record) = item?;
            for line in self.order_lines(order_id)? {
                if let Some(product) = self.get_product(line.product_id)? {
                    return Ok(Some(LatestOrderWithProduct {
                        order_id,
                        order_date: record.order_date,
                        total_amount: record.total_amount,
                        product_id: product.product_id,
                        product_name: product.product_name,
                        price: product.price,
                        quantity: line.quantity,
                    }));
                }
            }
        }
        Ok(None)
    }
}
