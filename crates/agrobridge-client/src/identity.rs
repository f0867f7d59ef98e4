//! Canonical product records parsed at the response edge.
//!
//! Upstream payloads carry the product identity in several shapes. Parsing
//! resolves it once, so everything downstream keys on [`ProductId`] only.

use std::str::FromStr;

use agrobridge_core::{Coordinates, ProductId};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::RecordError;

/// Anything that carries a stable product identity.
pub trait Identify {
    fn product_id(&self) -> &ProductId;
}

impl Identify for ProductId {
    fn product_id(&self) -> &ProductId {
        self
    }
}

/// What to do with a record whose identity cannot be derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnidentifiedPolicy {
    /// Drop the record, log a warning and count it.
    #[default]
    Reject,
    /// Keep the record under a fresh `synthetic-<uuid>` identity.
    ///
    /// Such records never deduplicate against each other, so re-fetching the
    /// same page adds them again.
    Synthesize,
}

/// Derives a product identity from a raw record.
///
/// Checked in order: `_id` as a string, `_id.$oid` as a string, `_id` as a
/// number, then `id` as a string or number. Blank strings do not count.
#[must_use]
pub fn derive_identity(record: &Value) -> Option<ProductId> {
    let underscore = record.get("_id");

    underscore
        .and_then(non_blank_str)
        .or_else(|| underscore.and_then(|v| v.get("$oid")).and_then(non_blank_str))
        .or_else(|| underscore.and_then(number_string))
        .or_else(|| {
            let id = record.get("id")?;
            non_blank_str(id).or_else(|| number_string(id))
        })
        .map(ProductId::new)
}

fn non_blank_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

fn number_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A product as the feed sees it: a resolved identity, the fields the feed
/// renders, and the untouched upstream record.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    id: ProductId,
    pub brand: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub price_per_unit: Option<Decimal>,
    pub measuring_unit: Option<String>,
    pub quantity: Option<i64>,
    pub delivery_radius_km: Option<f64>,
    pub location: Option<Coordinates>,
    pub raw: Value,
}

impl Identify for ProductRecord {
    fn product_id(&self) -> &ProductId {
        &self.id
    }
}

impl ProductRecord {
    /// Parses a record, requiring a derivable identity.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MissingIdentity`] tagged with `list` and `index`
    /// when no identity can be derived.
    pub fn parse(raw: Value, list: &'static str, index: usize) -> Result<Self, RecordError> {
        let id = derive_identity(&raw).ok_or(RecordError::MissingIdentity { list, index })?;
        Ok(Self::with_id(id, raw))
    }

    /// Parses a record under a freshly generated synthetic identity.
    #[must_use]
    pub fn synthesized(raw: Value) -> Self {
        let id = ProductId::new(format!("synthetic-{}", uuid::Uuid::new_v4()));
        Self::with_id(id, raw)
    }

    fn with_id(id: ProductId, raw: Value) -> Self {
        Self {
            id,
            brand: string_field(&raw, "brand"),
            name: string_field(&raw, "name"),
            category: string_field(&raw, "category"),
            price_per_unit: raw.get("pricePerUnit").and_then(lenient_decimal),
            measuring_unit: string_field(&raw, "measuringUnit"),
            quantity: raw.get("quantity").and_then(lenient_i64),
            delivery_radius_km: raw.get("deliveryRadius").and_then(lenient_f64),
            location: parse_location(&raw),
            raw,
        }
    }

    /// Whether the identity was generated rather than read from the record.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.id.as_str().starts_with("synthetic-")
    }
}

impl std::fmt::Display for ProductRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.name.as_deref().unwrap_or("(unnamed)");
        write!(f, "{name} [{}]", self.id)?;
        if let Some(price) = self.price_per_unit {
            write!(f, " {price}")?;
            if let Some(unit) = &self.measuring_unit {
                write!(f, "/{unit}")?;
            }
        }
        Ok(())
    }
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(non_blank_str)
}

fn lenient_f64(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Reads a GeoJSON `location.coordinates` pair (`[lng, lat]`).
fn parse_location(raw: &Value) -> Option<Coordinates> {
    let coords = raw.get("location")?.get("coordinates")?.as_array()?;
    let lng = coords.first().and_then(lenient_f64)?;
    let lat = coords.get(1).and_then(lenient_f64)?;
    Coordinates::try_new(lng, lat).ok()
}

/// Turns one raw list into canonical records under `policy`.
///
/// Returns the records and how many were rejected. A value that is not an
/// array yields no records.
pub fn normalize_list(
    value: Option<&Value>,
    list: &'static str,
    policy: UnidentifiedPolicy,
) -> (Vec<ProductRecord>, usize) {
    let Some(items) = value.and_then(Value::as_array) else {
        return (Vec::new(), 0);
    };

    let mut records = Vec::with_capacity(items.len());
    let mut rejected = 0usize;
    for (index, item) in items.iter().enumerate() {
        match ProductRecord::parse(item.clone(), list, index) {
            Ok(record) => records.push(record),
            Err(err) => match policy {
                UnidentifiedPolicy::Reject => {
                    tracing::warn!(error = %err, "dropping product record without identity");
                    rejected += 1;
                }
                UnidentifiedPolicy::Synthesize => {
                    let record = ProductRecord::synthesized(item.clone());
                    tracing::debug!(
                        list,
                        index,
                        synthetic_id = %record.product_id(),
                        "assigned synthetic identity"
                    );
                    records.push(record);
                }
            },
        }
    }
    (records, rejected)
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
