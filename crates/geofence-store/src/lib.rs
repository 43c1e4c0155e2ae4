pub mod error;
pub mod memory;
pub mod postgres_store;
pub mod redb_store;
pub mod store;

pub use error::StoreError;
pub use memory::{InMemoryStore, InMemoryZoneStateStore};
pub use postgres_store::PostgresStore;
pub use redb_store::RedbZoneStateStore;
pub use store::{GeoStore, ZoneStateStore};
