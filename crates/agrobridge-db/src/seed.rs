use agrobridge_core::CatalogListing;
use sqlx::PgPool;

use crate::DbError;

/// Upsert catalog listings into `products`, keyed on `(brand, name)`.
///
/// Returns the number of listings processed (inserted or updated).
/// All upserts run inside a single transaction; if any operation fails
/// the entire batch is rolled back.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] if a listing fails validation, or
/// [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_catalog(pool: &PgPool, listings: &[CatalogListing]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;

    for listing in listings {
        let product = listing.to_new_product().validated()?;
        let [longitude, latitude] = product.location.coordinates;

        sqlx::query(
            "INSERT INTO products \
                 (brand, name, category, description, price_per_unit, measuring_unit, \
                  minimum_order_quantity, quantity, delivery_radius_km, shelf_life, image_url, \
                  longitude, latitude) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (brand, name) DO UPDATE SET \
                 category = EXCLUDED.category, \
                 description = EXCLUDED.description, \
                 price_per_unit = EXCLUDED.price_per_unit, \
                 measuring_unit = EXCLUDED.measuring_unit, \
                 minimum_order_quantity = EXCLUDED.minimum_order_quantity, \
                 quantity = EXCLUDED.quantity, \
                 delivery_radius_km = EXCLUDED.delivery_radius_km, \
                 shelf_life = EXCLUDED.shelf_life, \
                 image_url = EXCLUDED.image_url, \
                 longitude = EXCLUDED.longitude, \
                 latitude = EXCLUDED.latitude, \
                 updated_at = NOW()",
        )
        .bind(&product.brand)
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.description)
        .bind(product.price_per_unit)
        .bind(&product.measuring_unit)
        .bind(product.minimum_order_quantity)
        .bind(product.quantity)
        .bind(product.delivery_radius)
        .bind(&product.shelf_life)
        .bind(&product.image)
        .bind(longitude)
        .bind(latitude)
        .execute(&mut *tx)
        .await?;

        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}
