pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryShopStore;
pub use postgres::PgShopStore;
pub use store::ShopStore;
