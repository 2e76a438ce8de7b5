//! PostgreSQL-backed cache for the drive's OAuth token pair.
//!
//! Layers, leaf first: [`pool`] hands out connections, [`schema`] makes sure
//! the table exists once, [`repository`] reads and writes the pair.

pub mod backend;
pub mod memory;
pub mod pool;
pub mod postgres;
pub mod repository;
pub mod schema;

pub use backend::{TokenBackend, TokenKeys, TokenPair, TokenRecord};
pub use memory::MemoryTokenBackend;
pub use pool::{ConnectionManager, PoolSettings};
pub use postgres::PgTokenBackend;
pub use repository::TokenRepository;
pub use schema::SchemaInitializer;
