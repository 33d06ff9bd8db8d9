//! Schema of the structured catalog file.

use crate::error::{BusbotError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Districts, dropping points and providers served by the booking desk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub districts: Vec<District>,
    pub bus_providers: Vec<Provider>,
}

/// A district and the dropping points (with fares) inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    pub name: String,
    #[serde(default)]
    pub dropping_points: Vec<DroppingPoint>,
}

/// A stop within a district. `price` is the fare in Taka.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppingPoint {
    pub name: String,
    pub price: u32,
}

/// A bus operator and the districts it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    #[serde(default)]
    pub coverage_districts: Vec<String>,
}

impl Catalog {
    /// Parse a catalog from JSON text, rejecting records with empty names.
    pub fn from_json(text: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Read and parse a catalog file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<()> {
        for district in &self.districts {
            if district.name.trim().is_empty() {
                return Err(BusbotError::InvalidInput("district with empty name".to_string()));
            }
            if let Some(point) = district.dropping_points.iter().find(|p| p.name.trim().is_empty()) {
                return Err(BusbotError::InvalidInput(format!(
                    "dropping point with empty name in {} (price {})",
                    district.name, point.price
                )));
            }
        }
        if self.bus_providers.iter().any(|p| p.name.trim().is_empty()) {
            return Err(BusbotError::InvalidInput("bus provider with empty name".to_string()));
        }
        Ok(())
    }
}
