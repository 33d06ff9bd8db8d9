//! Lookups over the route and fare catalog.
//!
//! All name matching is case-insensitive; provider names additionally ignore
//! spacing so "Green Line" and "greenline" refer to the same operator.

use crate::documents::{same_provider, Catalog, District, DroppingPoint, Provider};

/// Read-only query service over a loaded [`Catalog`].
#[derive(Debug, Clone, Default)]
pub struct CatalogService {
    catalog: Catalog,
}

impl CatalogService {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn districts(&self) -> &[District] {
        &self.catalog.districts
    }

    pub fn providers(&self) -> &[Provider] {
        &self.catalog.bus_providers
    }

    pub fn find_district(&self, name: &str) -> Option<&District> {
        let name = name.trim();
        self.catalog
            .districts
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn find_provider(&self, name: &str) -> Option<&Provider> {
        self.catalog
            .bus_providers
            .iter()
            .find(|p| same_provider(&p.name, name))
    }

    /// Dropping points of a district; empty when the district is unknown.
    pub fn dropping_points(&self, district: &str) -> &[DroppingPoint] {
        self.find_district(district)
            .map(|d| d.dropping_points.as_slice())
            .unwrap_or_default()
    }

    /// Fare in Taka to a dropping point of `district`.
    pub fn fare(&self, district: &str, point: &str) -> Option<u32> {
        let point = point.trim();
        self.dropping_points(district)
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(point))
            .map(|p| p.price)
    }

    /// Whether `provider` covers both `from` and `to`.
    pub fn serves_route(&self, provider: &str, from: &str, to: &str) -> bool {
        self.find_provider(provider)
            .is_some_and(|p| covers(p, from) && covers(p, to))
    }

    /// Names of every provider covering both districts, in catalog order.
    pub fn available_providers(&self, from: &str, to: &str) -> Vec<String> {
        self.catalog
            .bus_providers
            .iter()
            .filter(|p| covers(p, from) && covers(p, to))
            .map(|p| p.name.clone())
            .collect()
    }
}

fn covers(provider: &Provider, district: &str) -> bool {
    let district = district.trim();
    provider
        .coverage_districts
        .iter()
        .any(|d| d.eq_ignore_ascii_case(district))
}
