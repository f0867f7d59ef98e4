use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinates;
use crate::CoreError;

/// Page size used when a caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Largest page the category query will serve.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Stable identity of a product listing as seen by feed consumers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for ProductId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl std::borrow::Borrow<str> for ProductId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// GeoJSON point as stored on listings: `{"type": "Point", "coordinates": [lng, lat]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type", default = "point_kind")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

fn point_kind() -> String {
    "Point".to_string()
}

impl From<Coordinates> for GeoPoint {
    fn from(c: Coordinates) -> Self {
        Self {
            kind: point_kind(),
            coordinates: [c.lng, c.lat],
        }
    }
}

impl GeoPoint {
    /// Converts to range-checked coordinates.
    ///
    /// # Errors
    ///
    /// Returns a [`CoreError`] when either component is out of range.
    pub fn to_coordinates(&self) -> Result<Coordinates, CoreError> {
        let [lng, lat] = self.coordinates;
        Coordinates::try_new(lng, lat)
    }
}

/// A product listing as served by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub brand: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub price_per_unit: Decimal,
    /// Unit the price applies to, e.g. `"kg"` or `"dozen"`.
    pub measuring_unit: String,
    pub minimum_order_quantity: i32,
    pub quantity: i32,
    /// Delivery radius in kilometres.
    pub delivery_radius: f64,
    pub shelf_life: Option<String>,
    pub image: Option<String>,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Decimal places stored for a price (`NUMERIC(12, 2)`).
const PRICE_SCALE: u32 = 2;

/// Prices must stay below 10^10 to fit `NUMERIC(12, 2)`.
fn max_price_exclusive() -> Decimal {
    Decimal::new(10_000_000_000, 0)
}

/// Seller input for creating or replacing a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub brand: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price_per_unit: Decimal,
    pub measuring_unit: String,
    pub minimum_order_quantity: i32,
    pub quantity: i32,
    pub delivery_radius: f64,
    #[serde(default)]
    pub shelf_life: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    pub location: GeoPoint,
}

impl NewProduct {
    /// Validates seller input and returns it with the category normalized.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidProduct`] describing the first failing field,
    /// or a coordinate range error for a bad `location`.
    pub fn validated(mut self) -> Result<Self, CoreError> {
        for (field, value) in [
            ("brand", &self.brand),
            ("name", &self.name),
            ("category", &self.category),
            ("measuringUnit", &self.measuring_unit),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::InvalidProduct(format!(
                    "{field} must be non-empty"
                )));
            }
        }
        if self.price_per_unit.is_sign_negative() {
            return Err(CoreError::InvalidProduct(
                "pricePerUnit must not be negative".to_string(),
            ));
        }
        if self.price_per_unit.normalize().scale() > PRICE_SCALE {
            return Err(CoreError::InvalidProduct(format!(
                "pricePerUnit must have at most {PRICE_SCALE} decimal places"
            )));
        }
        if self.price_per_unit >= max_price_exclusive() {
            return Err(CoreError::InvalidProduct(
                "pricePerUnit must be below 10000000000".to_string(),
            ));
        }
        if self.quantity < 0 {
            return Err(CoreError::InvalidProduct(
                "quantity must not be negative".to_string(),
            ));
        }
        if self.minimum_order_quantity < 1 {
            return Err(CoreError::InvalidProduct(
                "minimumOrderQuantity must be at least 1".to_string(),
            ));
        }
        if !self.delivery_radius.is_finite() || self.delivery_radius <= 0.0 {
            return Err(CoreError::InvalidProduct(
                "deliveryRadius must be a positive number of kilometres".to_string(),
            ));
        }
        let coordinates = self.location.to_coordinates()?;
        self.location = GeoPoint::from(coordinates);
        self.category = normalize_category(&self.category);
        self.brand = self.brand.trim().to_string();
        self.name = self.name.trim().to_string();
        Ok(self)
    }
}

/// Categories are matched case-insensitively; storage keeps them lowercase.
#[must_use]
pub fn normalize_category(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// One page of a location-filtered category listing.
///
/// Serialized with the camelCase keys buyers' clients expect:
/// `{"deliverableProducts": [...], "nonDeliverableProducts": [...], "hasMore": bool}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPage<T> {
    pub deliverable_products: Vec<T>,
    pub non_deliverable_products: Vec<T>,
    pub has_more: bool,
}

impl<T> CategoryPage<T> {
    /// The safe default: no products and no further pages.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            deliverable_products: Vec::new(),
            non_deliverable_products: Vec::new(),
            has_more: false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deliverable_products.len() + self.non_deliverable_products.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for CategoryPage<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Parameters of one category page request.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryQuery {
    pub category: String,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    pub location: Coordinates,
}

impl CategoryQuery {
    /// Zero-based row offset of this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}
