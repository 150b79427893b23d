//! Infrastructure adapters for the capacity store and the order store.

pub mod orders;
pub mod store;

pub use orders::InMemoryOrderStore;
#[cfg(feature = "postgres")]
pub use orders::PostgresOrderStore;
pub use store::InMemoryStore;
#[cfg(feature = "postgres")]
pub use store::PostgresStore;
