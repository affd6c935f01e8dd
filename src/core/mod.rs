//! Core value types and abstractions

pub mod config;
pub mod date;
pub mod log;
pub mod product;
pub mod transaction;

// Re-export main types for cleaner imports
pub use date::{DateFormatter, DateParser};
pub use product::{Product, ProductsProvider};
pub use transaction::Transaction;
