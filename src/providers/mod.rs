pub mod catalog;
pub mod products_manager;

pub use catalog::CatalogProductsProvider;
pub use products_manager::ProductsManager;
