//! Postgres storage for marketplace listings.

pub mod pool;
pub mod products;
pub mod seed;

use thiserror::Error;

pub use pool::{connect_pool, health_check, ping, run_migrations, PoolConfig};
pub use products::{
    delete_product, get_product, insert_product, list_category_page, list_products_by_brand,
    update_product, ProductRow,
};
pub use seed::seed_catalog;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("product not found")]
    NotFound,
    #[error(transparent)]
    Invalid(#[from] agrobridge_core::CoreError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// A second listing with the same `(brand, name)`: SQLSTATE 23505.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlx(sqlx::Error::Database(db_err)) => {
                db_err.code().is_some_and(|code| code == "23505")
            }
            _ => false,
        }
    }
}
