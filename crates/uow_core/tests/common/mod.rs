#![allow(dead_code)]

use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use uow_core::{DbContext, Entity, Migration, Store, StoreResult};

pub const ACCOUNT_SCHEMA: &[Migration] = &[
    Migration::new(
        1,
        "CREATE TABLE customers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            city TEXT
        );",
    ),
    Migration::new(
        2,
        "CREATE TABLE orders (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL REFERENCES customers(id),
            total INTEGER NOT NULL CHECK (total >= 0)
        );",
    ),
];

pub const CATALOG_SCHEMA: &[Migration] = &[Migration::new(
    1,
    "CREATE TABLE products (
        sku TEXT PRIMARY KEY,
        title TEXT NOT NULL
    );",
)];

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub city: Option<String>,
    pub orders: Vec<Order>,
}

impl Customer {
    pub fn new(id: &str, name: &str, city: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            city: city.map(str::to_string),
            orders: Vec::new(),
        }
    }
}

impl Entity for Customer {
    const TABLE: &'static str = "customers";
    const KEY: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["id", "name", "city"];

    fn key(&self) -> Value {
        Value::Text(self.id.clone())
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.clone()),
            Value::Text(self.name.clone()),
            self.city.clone().map_or(Value::Null, Value::Text),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            city: row.get("city")?,
            orders: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub total: i64,
}

impl Order {
    pub fn new(id: &str, customer_id: &str, total: i64) -> Self {
        Self {
            id: id.to_string(),
            customer_id: customer_id.to_string(),
            total,
        }
    }
}

impl Entity for Order {
    const TABLE: &'static str = "orders";
    const KEY: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["id", "customer_id", "total"];

    fn key(&self) -> Value {
        Value::Text(self.id.clone())
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.clone()),
            Value::Text(self.customer_id.clone()),
            Value::Integer(self.total),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            customer_id: row.get("customer_id")?,
            total: row.get("total")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub sku: String,
    pub title: String,
}

impl Entity for Product {
    const TABLE: &'static str = "products";
    const KEY: &'static str = "sku";
    const COLUMNS: &'static [&'static str] = &["sku", "title"];

    fn key(&self) -> Value {
        Value::Text(self.sku.clone())
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Text(self.sku.clone()), Value::Text(self.title.clone())]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sku: row.get("sku")?,
            title: row.get("title")?,
        })
    }
}

pub struct AccountContext {
    store: Store,
}

impl AccountContext {
    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self {
            store: Store::open_in_memory(ACCOUNT_SCHEMA)?,
        })
    }

    pub fn with_store(store: Store) -> Self {
        Self { store }
    }
}

impl DbContext for AccountContext {
    fn store(&self) -> &Store {
        &self.store
    }
}

pub struct CatalogContext {
    store: Store,
}

impl CatalogContext {
    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self {
            store: Store::open_in_memory(CATALOG_SCHEMA)?,
        })
    }
}

impl DbContext for CatalogContext {
    fn store(&self) -> &Store {
        &self.store
    }
}

/// Loader filling `Customer::orders` ordered by order id.
pub fn load_orders(conn: &Connection, customer: &mut Customer) -> rusqlite::Result<()> {
    let mut stmt =
        conn.prepare("SELECT id, customer_id, total FROM orders WHERE customer_id = ?1 ORDER BY id;")?;
    let rows = stmt.query_map([&customer.id], Order::from_row)?;
    customer.orders = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(())
}

/// Writes customers directly, bypassing the change tracker.
pub fn seed_customers(store: &Store, customers: &[Customer]) {
    store
        .with_connection(|conn| {
            for customer in customers {
                conn.execute(
                    "INSERT INTO customers (id, name, city) VALUES (?1, ?2, ?3);",
                    rusqlite::params![customer.id, customer.name, customer.city],
                )?;
            }
            Ok(())
        })
        .unwrap();
}

pub fn seed_orders(store: &Store, orders: &[Order]) {
    store
        .with_connection(|conn| {
            for order in orders {
                conn.execute(
                    "INSERT INTO orders (id, customer_id, total) VALUES (?1, ?2, ?3);",
                    rusqlite::params![order.id, order.customer_id, order.total],
                )?;
            }
            Ok(())
        })
        .unwrap();
}

pub fn row_count(store: &Store, table: &str) -> i64 {
    store
        .with_connection(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
        })
        .unwrap()
}

/// Customers `c01..=cNN`, every third one in Lisbon, the rest in Porto.
pub fn numbered_customers(count: usize) -> Vec<Customer> {
    (1..=count)
        .map(|n| {
            let city = if n % 3 == 0 { "Lisbon" } else { "Porto" };
            Customer::new(&format!("c{n:02}"), &format!("Customer {n:02}"), Some(city))
        })
        .collect()
}
