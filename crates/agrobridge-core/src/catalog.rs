use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;
use crate::products::{GeoPoint, NewProduct};
use crate::ConfigError;

/// One seed listing in `config/catalog.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogListing {
    pub brand: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub price_per_unit: Decimal,
    pub measuring_unit: String,
    #[serde(default = "default_minimum_order")]
    pub minimum_order_quantity: i32,
    pub quantity: i32,
    pub delivery_radius_km: f64,
    pub shelf_life: Option<String>,
    pub image: Option<String>,
    pub lng: f64,
    pub lat: f64,
}

fn default_minimum_order() -> i32 {
    1
}

impl CatalogListing {
    /// Converts to the seller-input shape used by the products API.
    #[must_use]
    pub fn to_new_product(&self) -> NewProduct {
        NewProduct {
            brand: self.brand.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            price_per_unit: self.price_per_unit,
            measuring_unit: self.measuring_unit.clone(),
            minimum_order_quantity: self.minimum_order_quantity,
            quantity: self.quantity,
            delivery_radius: self.delivery_radius_km,
            shelf_life: self.shelf_life.clone(),
            image: self.image.clone(),
            location: GeoPoint::from(Coordinates::new(self.lng, self.lat)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub listings: Vec<CatalogListing>,
}

/// Load and validate the seed catalog from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_catalog(path: &Path) -> Result<CatalogFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let catalog: CatalogFile = serde_yaml::from_str(&content)?;

    validate_catalog(&catalog)?;

    Ok(catalog)
}

fn validate_catalog(catalog: &CatalogFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for listing in &catalog.listings {
        listing.to_new_product().validated().map_err(|e| {
            ConfigError::Validation(format!("listing '{}': {e}", listing.name))
        })?;

        let key = (
            listing.brand.trim().to_lowercase(),
            listing.name.trim().to_lowercase(),
        );
        if !seen.insert(key) {
            return Err(ConfigError::Validation(format!(
                "duplicate listing '{}' for brand '{}'",
                listing.name, listing.brand
            )));
        }
    }

    Ok(())
}
