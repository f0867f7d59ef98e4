//! Database operations for `products`.

use agrobridge_core::{
    classify_delivery, CategoryPage, CategoryQuery, Coordinates, GeoPoint, NewProduct, Product,
    EARTH_MEAN_RADIUS_KM,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const PRODUCT_COLUMNS: &str = "id, brand, name, category, description, price_per_unit, \
     measuring_unit, minimum_order_quantity, quantity, delivery_radius_km, shelf_life, \
     image_url, longitude, latitude, created_at, updated_at";

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub brand: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub price_per_unit: Decimal,
    pub measuring_unit: String,
    pub minimum_order_quantity: i32,
    pub quantity: i32,
    pub delivery_radius_km: f64,
    pub shelf_life: Option<String>,
    pub image_url: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRow {
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.longitude, self.latitude)
    }
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        let location = GeoPoint::from(row.coordinates());
        Product {
            id: row.id,
            brand: row.brand,
            name: row.name,
            category: row.category,
            description: row.description,
            price_per_unit: row.price_per_unit,
            measuring_unit: row.measuring_unit,
            minimum_order_quantity: row.minimum_order_quantity,
            quantity: row.quantity,
            delivery_radius: row.delivery_radius_km,
            shelf_life: row.shelf_life,
            image: row.image_url,
            location,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Inserts a listing. The input is validated before it is written.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] for bad input, or [`DbError::Sqlx`] if the
/// insert fails (including a duplicate `(brand, name)`).
pub async fn insert_product(pool: &PgPool, product: NewProduct) -> Result<ProductRow, DbError> {
    let product = product.validated()?;
    let [longitude, latitude] = product.location.coordinates;

    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "INSERT INTO products \
             (brand, name, category, description, price_per_unit, measuring_unit, \
              minimum_order_quantity, quantity, delivery_radius_km, shelf_life, image_url, \
              longitude, latitude) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         RETURNING {PRODUCT_COLUMNS}"
    ))
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
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetches one listing by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row matches, or [`DbError::Sqlx`] on
/// query failure.
pub async fn get_product(pool: &PgPool, id: Uuid) -> Result<ProductRow, DbError> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Replaces every seller-editable field of a listing and bumps `updated_at`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row matches, [`DbError::Invalid`] for
/// bad input, or [`DbError::Sqlx`] on query failure.
pub async fn update_product(
    pool: &PgPool,
    id: Uuid,
    product: NewProduct,
) -> Result<ProductRow, DbError> {
    let product = product.validated()?;
    let [longitude, latitude] = product.location.coordinates;

    sqlx::query_as::<_, ProductRow>(&format!(
        "UPDATE products SET \
             brand = $2, name = $3, category = $4, description = $5, price_per_unit = $6, \
             measuring_unit = $7, minimum_order_quantity = $8, quantity = $9, \
             delivery_radius_km = $10, shelf_life = $11, image_url = $12, \
             longitude = $13, latitude = $14, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(id)
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
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Deletes a listing.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row matches, or [`DbError::Sqlx`] on
/// query failure.
pub async fn delete_product(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Lists a seller's listings, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_products_by_brand(
    pool: &PgPool,
    brand: &str,
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE brand = $1 \
         ORDER BY created_at DESC, id"
    ))
    .bind(brand)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns one page of `query.category`, nearest listings first, split by
/// whether each listing's delivery radius reaches `query.location`.
///
/// The category must already be normalized. Ordering is by great-circle
/// distance then id, so pages are stable while the table is unchanged. One
/// extra row is fetched to decide `has_more`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_category_page(
    pool: &PgPool,
    query: &CategoryQuery,
) -> Result<CategoryPage<Product>, DbError> {
    let buyer = query.location;
    let page_size = query.page_size.max(1);
    let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);
    let limit = i64::from(page_size) + 1;

    let mut rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE category = $1 \
         ORDER BY 2 * $4::float8 * ASIN(LEAST(1.0, SQRT( \
                      POWER(SIN(RADIANS(latitude - $3) / 2), 2) \
                    + COS(RADIANS($3)) * COS(RADIANS(latitude)) \
                    * POWER(SIN(RADIANS(longitude - $2) / 2), 2)))), \
                  id \
         LIMIT $5 OFFSET $6"
    ))
    .bind(&query.category)
    .bind(buyer.lng)
    .bind(buyer.lat)
    .bind(EARTH_MEAN_RADIUS_KM)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let page_len = usize::try_from(page_size).unwrap_or(usize::MAX);
    let has_more = rows.len() > page_len;
    rows.truncate(page_len);

    let mut result = CategoryPage {
        deliverable_products: Vec::new(),
        non_deliverable_products: Vec::new(),
        has_more,
    };
    for row in rows {
        let delivery = classify_delivery(buyer, row.coordinates(), row.delivery_radius_km);
        if delivery.is_deliverable() {
            result.deliverable_products.push(Product::from(row));
        } else {
            result.non_deliverable_products.push(Product::from(row));
        }
    }

    Ok(result)
}
