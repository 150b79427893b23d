//! Durable order store collaborators.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryOrderStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresOrderStore;
