//! Catalog lookup interface and an in-memory implementation.

use std::path::Path;

use async_trait::async_trait;
use partsbot_core::error::PartsbotError;
use partsbot_core::types::{CatalogItem, Category};
use thiserror::Error;
use tracing::info;

use crate::size;

/// Errors from the catalog backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    #[error("catalog query failed: {0}")]
    Query(String),
}

/// Read-only access to the shop catalog.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Tires whose size matches `size`, ignoring separators and spacing.
    async fn items_by_size(&self, size: &str) -> Result<Vec<CatalogItem>, CatalogError>;

    /// Rings stocked for a width/aspect pair, ascending.
    async fn available_rings(&self, width: u16, aspect: u16) -> Result<Vec<u16>, CatalogError>;

    /// Every item in a category, in catalog order.
    async fn all_items(&self, category: Category) -> Result<Vec<CatalogItem>, CatalogError>;
}

/// Size comparison key: lowercase with `-`, `/` and whitespace removed.
pub fn size_key(spec: &str) -> String {
    spec.chars()
        .filter(|c| !matches!(c, '-' | '/') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Catalog held in memory, typically loaded from a JSON array of items.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    items: Vec<CatalogItem>,
}

impl InMemoryCatalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }

    /// Parse a JSON array of catalog items.
    pub fn from_json_str(json: &str) -> Result<Self, PartsbotError> {
        let items: Vec<CatalogItem> = serde_json::from_str(json)?;
        Ok(Self::new(items))
    }

    /// Load a JSON array of catalog items from disk.
    pub fn load(path: &Path) -> Result<Self, PartsbotError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PartsbotError::Catalog(format!("cannot read {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json_str(&content)?;
        info!(
            path = %path.display(),
            items = catalog.items.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn items_by_size(&self, size: &str) -> Result<Vec<CatalogItem>, CatalogError> {
        let wanted = size_key(size);
        Ok(self
            .items
            .iter()
            .filter(|item| item.category == Category::Tire)
            .filter(|item| {
                item.size_spec
                    .as_deref()
                    .map(|s| size_key(s) == wanted)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn available_rings(&self, width: u16, aspect: u16) -> Result<Vec<u16>, CatalogError> {
        let mut rings: Vec<u16> = self
            .items
            .iter()
            .filter(|item| item.category == Category::Tire)
            .filter_map(|item| item.size_spec.as_deref().and_then(size::recognize_complete))
            .filter(|s| s.width == width && s.aspect == aspect)
            .map(|s| s.ring)
            .collect();
        rings.sort_unstable();
        rings.dedup();
        Ok(rings)
    }

    async fn all_items(&self, category: Category) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(self
            .items
            .iter()
            .filter(|item| item.category == category)
            .cloned()
            .collect())
    }
}
