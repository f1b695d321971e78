//! Product catalog retrieval and summarization
//!
//! Raw storefront records are reduced to a bounded [`CatalogSnapshot`] that
//! can be embedded in the assistant's system instruction.

pub mod shopify;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CatalogSettings;

pub use shopify::ShopifyGateway;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Shopify API request failed: {status}. Response: {body}")]
    Http { status: u16, body: String },

    #[error("Shopify GraphQL error: {0}")]
    GraphQl(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Source of raw product records
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    /// Fetch up to `count` products, ordered by title
    async fn fetch_products(&self, count: usize) -> Result<Vec<Product>, CatalogError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Money {
    pub amount: String,
    #[serde(rename = "currencyCode")]
    pub currency_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRange {
    pub min_variant_price: Money,
    #[serde(default)]
    pub max_variant_price: Option<Money>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Variant {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub price: Money,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Nodes<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
}

/// A product record as returned by the Storefront API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub handle: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
    #[serde(default)]
    pub variants: Option<Nodes<Variant>>,
}

impl Product {
    /// First variant price, then the minimum of the price range
    fn display_price(&self) -> Option<&Money> {
        self.variants
            .as_ref()
            .and_then(|v| v.nodes.first())
            .map(|v| &v.price)
            .or_else(|| self.price_range.as_ref().map(|r| &r.min_variant_price))
    }
}

/// Prompt-sized view of one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSummary {
    pub title: String,
    pub handle: String,
    pub category: String,
    pub short_description: String,
    pub price: String,
    pub currency: String,
    pub vendor: String,
    pub tags: Vec<String>,
}

impl ProductSummary {
    pub fn from_product(product: &Product, settings: &CatalogSettings) -> Self {
        let price = product.display_price();
        Self {
            title: product.title.clone(),
            handle: product.handle.clone(),
            category: if product.product_type.trim().is_empty() {
                "Uncategorized".to_string()
            } else {
                product.product_type.clone()
            },
            short_description: truncate_description(
                &product.description,
                settings.description_chars,
            ),
            price: price
                .map(|m| m.amount.clone())
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| "N/A".to_string()),
            currency: price.map(|m| m.currency_code.clone()).unwrap_or_default(),
            vendor: product.vendor.clone(),
            tags: product.tags.iter().take(settings.tag_limit).cloned().collect(),
        }
    }

    fn overview_line(&self) -> String {
        format!(
            "- {} (Handle: {}, Type: {}): {} Price: {} {}. Vendor: {}. Tags: {}.",
            self.title,
            self.handle,
            self.category,
            self.short_description,
            self.price,
            self.currency,
            self.vendor,
            self.tags.join(", ")
        )
    }
}

/// Truncate to `max_chars` characters, marking the cut with an ellipsis
fn truncate_description(description: &str, max_chars: usize) -> String {
    if description.is_empty() {
        return "No description available.".to_string();
    }
    let mut chars = description.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

pub const EMPTY_CATALOG_OVERVIEW: &str = "No products are currently available in the catalog. I can still offer general advice on Hi-Fi audio.";

/// Bounded, immutable summary of the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogSnapshot {
    products: Vec<ProductSummary>,
    /// Records fetched, including those beyond the bound
    total: usize,
}

impl CatalogSnapshot {
    /// The degraded-mode snapshot
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_products(products: &[Product], settings: &CatalogSettings) -> Self {
        Self {
            products: products
                .iter()
                .take(settings.overview_limit)
                .map(|p| ProductSummary::from_product(p, settings))
                .collect(),
            total: products.len(),
        }
    }

    pub fn products(&self) -> &[ProductSummary] {
        &self.products
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Natural-language overview embedded in the system instruction
    pub fn overview(&self) -> String {
        if self.products.is_empty() {
            return EMPTY_CATALOG_OVERVIEW.to_string();
        }

        let lines = self
            .products
            .iter()
            .map(ProductSummary::overview_line)
            .collect::<Vec<_>>()
            .join("\n");

        let mut overview = format!("Our Hifiisti Product Catalog Overview (highlights):\n{}", lines);

        let remaining = self.total.saturating_sub(self.products.len());
        if remaining > 0 {
            overview.push_str(&format!(
                "\n...and {} more products. Ask me about specific types or brands!",
                remaining
            ));
        }
        overview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(n: usize) -> Product {
        Product {
            id: format!("gid://shopify/Product/{}", n),
            handle: format!("product-{}", n),
            title: format!("Product {}", n),
            description: "A warm-sounding tube amplifier.".into(),
            product_type: "Amplifier".into(),
            vendor: "Acme Audio".into(),
            tags: vec!["tube".into(), "stereo".into(), "class-a".into(), "vintage".into()],
            price_range: Some(PriceRange {
                min_variant_price: Money {
                    amount: "999.00".into(),
                    currency_code: "EUR".into(),
                },
                max_variant_price: None,
            }),
            variants: None,
        }
    }

    #[test]
    fn test_summary_fields() {
        let mut p = product(1);
        p.description = "x".repeat(80);
        p.product_type = String::new();
        p.variants = Some(Nodes {
            nodes: vec![Variant {
                id: "v1".into(),
                title: "Black".into(),
                price: Money {
                    amount: "1099.00".into(),
                    currency_code: "EUR".into(),
                },
            }],
        });

        let summary = ProductSummary::from_product(&p, &CatalogSettings::default());
        assert_eq!(summary.category, "Uncategorized");
        assert_eq!(summary.short_description, format!("{}...", "x".repeat(70)));
        assert_eq!(summary.price, "1099.00");
        assert_eq!(summary.tags, vec!["tube", "stereo", "class-a"]);
    }

    #[test]
    fn test_missing_price_and_description() {
        let mut p = product(2);
        p.price_range = None;
        p.description = String::new();

        let summary = ProductSummary::from_product(&p, &CatalogSettings::default());
        assert_eq!(summary.price, "N/A");
        assert_eq!(summary.currency, "");
        assert_eq!(summary.short_description, "No description available.");
    }

    #[test]
    fn test_truncation_counts_characters() {
        let text = "ä".repeat(70);
        assert_eq!(truncate_description(&text, 70), text);
        let text = "ä".repeat(71);
        assert_eq!(truncate_description(&text, 70), format!("{}...", "ä".repeat(70)));
    }

    #[test]
    fn test_snapshot_is_bounded() {
        let products: Vec<Product> = (0..20).map(product).collect();
        let snapshot = CatalogSnapshot::from_products(&products, &CatalogSettings::default());

        assert_eq!(snapshot.products().len(), 15);
        assert_eq!(snapshot.total(), 20);

        let overview = snapshot.overview();
        assert!(overview.starts_with("Our Hifiisti Product Catalog Overview"));
        assert!(overview.contains(
            "- Product 0 (Handle: product-0, Type: Amplifier): A warm-sounding tube amplifier. Price: 999.00 EUR. Vendor: Acme Audio. Tags: tube, stereo, class-a."
        ));
        assert!(!overview.contains("Product 15 "));
        assert!(overview.ends_with("...and 5 more products. Ask me about specific types or brands!"));
    }

    #[test]
    fn test_empty_overview() {
        assert_eq!(CatalogSnapshot::empty().overview(), EMPTY_CATALOG_OVERVIEW);
    }

    #[test]
    fn test_deserialize_storefront_product() {
        let json = r#"{
            "id": "gid://shopify/Product/1",
            "handle": "turntable-x",
            "title": "Turntable X",
            "description": "Belt drive.",
            "productType": "Turntable",
            "vendor": "Spin",
            "tags": ["vinyl"],
            "priceRange": {
                "minVariantPrice": {"amount": "450.0", "currencyCode": "USD"},
                "maxVariantPrice": {"amount": "500.0", "currencyCode": "USD"}
            },
            "variants": {"nodes": []}
        }"#;
        let p: Product = serde_json::from_str(json).unwrap();
        let summary = ProductSummary::from_product(&p, &CatalogSettings::default());
        assert_eq!(summary.price, "450.0");
        assert_eq!(summary.currency, "USD");
    }
}
