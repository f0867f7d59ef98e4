pub mod app_config;
pub mod catalog;
pub mod config;
pub mod geo;
pub mod products;

use thiserror::Error;

pub use app_config::{AppConfig, ClientConfig, Environment};
pub use catalog::{load_catalog, CatalogFile, CatalogListing};
pub use config::{load_app_config, load_app_config_from_env, load_client_config};
pub use geo::{classify_delivery, haversine_km, Coordinates, Delivery, EARTH_MEAN_RADIUS_KM};
pub use products::{
    normalize_category, CategoryPage, CategoryQuery, GeoPoint, NewProduct, Product, ProductId,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read catalog file {path}: {source}")]
    CatalogFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog file: {0}")]
    CatalogFileParse(#[from] serde_yaml::Error),

    #[error("catalog validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("invalid product: {0}")]
    InvalidProduct(String),
}
