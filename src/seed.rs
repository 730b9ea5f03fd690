//! Deterministic demo data, loaded at startup when the `SEED_*` variables ask for it.
//!
//! Seeding only runs against an empty store, so restarting a seeded server does not duplicate
//! rows. The generator is seeded with a constant: two seeded stores hold the same data.

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::pagination::{Direction, RecordStore};
use crate::store::{NewOrder, NewOrderLine, NewProduct, NewUser, Store};

const SEED: u64 = 0x7061_6765_626f_756e;
/// Rows per store batch, to bound memory when seeding many users.
const BATCH: u64 = 10_000;

/// Rows created by [`seed`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    /// Users created.
    pub users: u64,
    /// Products created.
    pub products: u64,
    /// Orders created.
    pub orders: u64,
}

fn below(rng: &mut ChaCha8Rng, bound: u64) -> u64 {
    rng.next_u64() % bound
}

/// Creates `users` users, `products` products and `orders` orders of one to three lines each.
///
/// Does nothing if the store already holds a user or a product. Orders need at least one user
/// and one product and are skipped otherwise.
#[tracing::instrument(skip(store), level = "error")]
pub fn seed(store: &Store, users: u64, products: u64, orders: u64) -> anyhow::Result<SeedReport> {
    let has_users = store.users().scan(None, Direction::Next)?.next().is_some();
    let has_products = store.products().scan(None, Direction::Next)?.next().is_some();
    if has_users || has_products {
        info!("Store already holds data, skipping seed");
        return Ok(SeedReport::default());
    }

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut report = SeedReport::default();

    // Ids continue the table's sequence, which deleted rows do not rewind.
    let mut user_ids = Vec::new();
    let mut next = 1;
    while next <= users {
        let end = users.min(next + BATCH - 1);
        let batch = (next..=end)
            .map(|i| NewUser {
                name: format!("User {i}"),
                email: format!("user{i}@example.com"),
            })
            .collect();
        user_ids.extend(store.create_users(batch)?.iter().map(|user| user.user_id));
        next = end + 1;
    }
    report.users = user_ids.len() as u64;
    info!(users = report.users, "Seeded users");

    let catalog = store.create_products(
        (1..=products)
            .map(|i| NewProduct {
                product_name: format!("Product {i}"),
                price: below(&mut rng, 10_000) as f64 / 100.0,
                stock: Some(below(&mut rng, 100) as u32),
            })
            .collect(),
    )?;
    report.products = catalog.len() as u64;
    info!(products = report.products, "Seeded products");

    if user_ids.is_empty() || catalog.is_empty() {
        return Ok(report);
    }
    for _ in 0..orders {
        let user_id = user_ids[below(&mut rng, report.users) as usize];
        let lines = below(&mut rng, 3) + 1;
        let mut total = 0.0;
        let order_products = (0..lines)
            .map(|_| {
                let product = &catalog[below(&mut rng, catalog.len() as u64) as usize];
                let quantity = below(&mut rng, 5) as u32 + 1;
                total += product.price * f64::from(quantity);
                NewOrderLine {
                    product_id: product.product_id,
                    quantity: Some(quantity),
                    price: product.price,
                }
            })
            .collect();
        store.create_order(NewOrder {
            user_id,
            total_amount: Some((total * 100.0).round() / 100.0),
            order_products,
        })?;
        report.orders += 1;
    }
    info!(orders = report.orders, "Seeded orders");

    Ok(report)
}
