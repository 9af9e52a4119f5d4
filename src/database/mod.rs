pub mod filter;
pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod schema;
pub mod store;

pub use filter::{Condition, Filter};
pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use schema::{Row, SchemaError, Table};
pub use store::{Executor, ReconcileReport, Store, StoreError, StoreResult};
