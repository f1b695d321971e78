//! Shopify Storefront API gateway
//!
//! Products are fetched with one GraphQL query, sorted by title.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{CatalogAccess, CatalogSettings, StorefrontAccess};

use super::{CatalogError, CatalogGateway, Product};

const PRODUCTS_QUERY: &str = r#"
query GetProducts($first: Int!) {
  products(first: $first, sortKey: TITLE, reverse: false) {
    edges {
      node {
        id
        handle
        title
        description
        productType
        vendor
        tags
        priceRange {
          minVariantPrice { amount currencyCode }
          maxVariantPrice { amount currencyCode }
        }
        variants(first: 5) {
          nodes {
            id
            title
            price { amount currencyCode }
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<ProductsData>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ProductsData {
    products: ProductConnection,
}

#[derive(Debug, Deserialize)]
struct ProductConnection {
    #[serde(default)]
    edges: Vec<ProductEdge>,
}

#[derive(Debug, Deserialize)]
struct ProductEdge {
    node: Product,
}

pub struct ShopifyGateway {
    client: Client,
    access: Option<StorefrontAccess>,
    api_version: String,
}

impl ShopifyGateway {
    pub fn new(access: CatalogAccess, settings: &CatalogSettings) -> Self {
        Self {
            client: Client::new(),
            access: match access {
                CatalogAccess::Configured(access) => Some(access),
                CatalogAccess::NotConfigured => None,
            },
            api_version: settings.api_version.clone(),
        }
    }

    fn endpoint(&self, domain: &str) -> String {
        format!("https://{}/api/{}/graphql.json", domain, self.api_version)
    }
}

#[async_trait]
impl CatalogGateway for ShopifyGateway {
    async fn fetch_products(&self, count: usize) -> Result<Vec<Product>, CatalogError> {
        let access = self.access.as_ref().ok_or_else(|| {
            CatalogError::NotConfigured(
                "Shopify store domain or access token is not configured or is using placeholder values"
                    .to_string(),
            )
        })?;

        let request = GraphQlRequest {
            query: PRODUCTS_QUERY,
            variables: json!({ "first": count }),
        };

        tracing::debug!("POST {} (first: {})", self.endpoint(&access.domain), count);

        let response = self
            .client
            .post(self.endpoint(&access.domain))
            .header("X-Shopify-Storefront-Access-Token", &access.access_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!("Shopify API error: {} {}", status, body);
            return Err(CatalogError::Http {
                status: status.as_u16(),
                body,
            });
        }

        parse_products(&body)
    }
}

fn parse_products(body: &str) -> Result<Vec<Product>, CatalogError> {
    let response: GraphQlResponse = serde_json::from_str(body)
        .map_err(|e| CatalogError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

    if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
        let messages = errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join(", ");
        return Err(CatalogError::GraphQl(messages));
    }

    Ok(response
        .data
        .map(|d| d.products.edges.into_iter().map(|e| e.node).collect())
        .unwrap_or_default())
}
