//! Coordinates and great-circle delivery classification.
//!
//! All coordinates are WGS84 degrees. Pairs are ordered `(lng, lat)` to match
//! the GeoJSON `coordinates` arrays stored on product listings.

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Mean Earth radius (IUGG) in kilometres.
///
/// The category page SQL uses the same constant so distance ordering and
/// delivery classification agree.
pub const EARTH_MEAN_RADIUS_KM: f64 = 6371.008_8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinates {
    /// Builds a coordinate pair without range checks.
    #[must_use]
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Builds a coordinate pair, rejecting out-of-range or non-finite values.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LongitudeOutOfRange`] or
    /// [`CoreError::LatitudeOutOfRange`].
    pub fn try_new(lng: f64, lat: f64) -> Result<Self, CoreError> {
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(CoreError::LongitudeOutOfRange(lng));
        }
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(CoreError::LatitudeOutOfRange(lat));
        }
        Ok(Self { lng, lat })
    }

    /// Whether the pair can drive a location-filtered query.
    ///
    /// A zero component counts as "not yet known": the browser-side store
    /// starts zeroed, so `0.0` is indistinguishable from "unset".
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite() && self.lng != 0.0 && self.lat != 0.0
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lng, self.lat)
    }
}

/// Great-circle distance between two points in kilometres (haversine).
#[must_use]
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = ((d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2))
    .clamp(0.0, 1.0);
    2.0 * EARTH_MEAN_RADIUS_KM * h.sqrt().asin()
}

/// Whether a listing can deliver to a buyer, with the computed distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delivery {
    Deliverable { distance_km: f64 },
    OutOfRange { distance_km: f64 },
}

impl Delivery {
    #[must_use]
    pub fn is_deliverable(&self) -> bool {
        matches!(self, Delivery::Deliverable { .. })
    }

    #[must_use]
    pub fn distance_km(&self) -> f64 {
        match *self {
            Delivery::Deliverable { distance_km } | Delivery::OutOfRange { distance_km } => {
                distance_km
            }
        }
    }
}

/// Classifies a listing against a buyer location.
///
/// The boundary is inclusive: a buyer exactly `delivery_radius_km` away is
/// deliverable.
#[must_use]
pub fn classify_delivery(
    buyer: Coordinates,
    listing: Coordinates,
    delivery_radius_km: f64,
) -> Delivery {
    let distance_km = haversine_km(buyer, listing);
    if distance_km <= delivery_radius_km {
        Delivery::Deliverable { distance_km }
    } else {
        Delivery::OutOfRange { distance_km }
    }
}
