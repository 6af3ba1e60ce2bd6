use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::CatalogSource;
use crate::domain::{DEFAULT_CURRENCY, ProductSnapshot};
use crate::governor::RequestIdentity;
use crate::utils::http_client::build_catalog_client;
use crate::{Error, Result};

/// Envelope code signalling success.
const SUCCESS_CODE: i64 = 200;

/// Maximum number of body bytes quoted in upstream error messages.
const ERROR_BODY_SNIPPET: usize = 200;

/// Configuration for the HTTP catalog client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub region: String,
    pub language: String,
    pub currency: String,
    pub request_timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://prod-intl-api.popmart.com".to_string(),
            region: "hk".to_string(),
            language: "zh-HK".to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| Error::config(format!("invalid catalog base URL {}: {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "catalog base URL must be http(s), got {}",
                url.scheme()
            )));
        }
        if self.region.trim().is_empty() {
            return Err(Error::config("catalog region must not be empty"));
        }
        Ok(())
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Product record as returned by the catalog API.
#[derive(Debug, Deserialize)]
struct CatalogItem {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    discount_price: Option<f64>,
    #[serde(default = "default_in_stock")]
    in_stock: bool,
    #[serde(default)]
    stock_quantity: Option<i64>,
    #[serde(default)]
    is_new: bool,
    #[serde(default)]
    is_limited: bool,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    product_url: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default, alias = "brand_name")]
    brand: Option<String>,
    #[serde(default)]
    series: Option<String>,
}

fn default_in_stock() -> bool {
    true
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl From<CatalogItem> for ProductSnapshot {
    fn from(item: CatalogItem) -> Self {
        Self {
            id: item.id,
            name: item.name,
            price: item.price.unwrap_or_default(),
            discount_price: item.discount_price,
            in_stock: item.in_stock,
            stock_quantity: item.stock_quantity.unwrap_or_default(),
            is_new: item.is_new,
            is_limited: item.is_limited,
            currency: non_empty(item.currency).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            product_url: non_empty(item.product_url),
            image_url: non_empty(item.image_url),
            brand_name: non_empty(item.brand),
            series: non_empty(item.series),
        }
    }
}

fn parse_item(item: &Value) -> Result<ProductSnapshot> {
    let item = CatalogItem::deserialize(item)?;
    if item.id.is_empty() {
        return Err(Error::validation("catalog item without id"));
    }
    Ok(item.into())
}

/// Extract `data.products` from a listing envelope, skipping malformed items.
fn parse_products(body: &Value) -> Vec<ProductSnapshot> {
    let Some(items) = body
        .get("data")
        .and_then(|data| data.get("products"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match parse_item(item) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "Skipping malformed catalog item");
                None
            }
        })
        .collect()
}

/// Extract `data` from a detail envelope. A malformed item is skipped.
fn parse_detail(body: &Value, id: &str) -> Option<ProductSnapshot> {
    let data = body.get("data").filter(|data| data.is_object())?;
    match parse_item(data) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(id, error = %e, "Skipping malformed catalog item detail");
            None
        }
    }
}

/// Catalog client speaking the shop's JSON API.
///
/// One `reqwest::Client` is kept per proxy so connection pools are reused
/// across requests that share an identity.
pub struct HttpCatalogSource {
    config: CatalogConfig,
    clients: DashMap<String, reqwest::Client>,
}

impl HttpCatalogSource {
    pub fn new(config: CatalogConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clients: DashMap::new(),
        })
    }

    fn client(&self, proxy: Option<&str>) -> Result<reqwest::Client> {
        let key = proxy.unwrap_or_default();
        if let Some(client) = self.clients.get(key) {
            return Ok(client.clone());
        }
        let client = build_catalog_client(proxy, self.config.request_timeout())?;
        self.clients.insert(key.to_string(), client.clone());
        Ok(client)
    }

    /// Append percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.config.base_url)
            .map_err(|e| Error::config(format!("invalid catalog base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::config("catalog base URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET the endpoint at `segments` and return the decoded envelope, or
    /// `None` on 404.
    async fn get_json(
        &self,
        identity: &RequestIdentity,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Option<Value>> {
        let client = self.client(identity.proxy.as_deref())?;
        let url = self.url(segments)?;

        let mut request = client
            .get(url.clone())
            .query(query)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(ACCEPT_LANGUAGE, format!("{},en;q=0.8", self.config.language))
            .header("X-Requested-With", "XMLHttpRequest")
            .header("X-Region", &self.config.region)
            .header("X-Language", &self.config.language)
            .header("X-Currency", &self.config.currency);
        if let Some(user_agent) = identity.user_agent.as_deref() {
            request = request.header(USER_AGENT, user_agent);
        }

        debug!(url = %url, proxy = ?identity.proxy, "Requesting catalog");
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!(url = %url, "Catalog resource not found");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(ERROR_BODY_SNIPPET).collect();
            return Err(Error::upstream(status.as_u16(), snippet));
        }

        let body: Value = response.json().await?;
        let code = body.get("code").and_then(Value::as_i64);
        if code != Some(SUCCESS_CODE) {
            return Err(Error::upstream(
                status.as_u16(),
                format!("unexpected envelope code {:?}", code),
            ));
        }
        Ok(Some(body))
    }

    async fn listing(
        &self,
        identity: &RequestIdentity,
        sort: &str,
        limit: usize,
        limited_only: bool,
    ) -> Result<Vec<ProductSnapshot>> {
        let mut query = vec![
            ("page", "1".to_string()),
            ("limit", limit.to_string()),
            ("region", self.config.region.clone()),
            ("sort", sort.to_string()),
        ];
        if limited_only {
            query.push(("is_limited", "true".to_string()));
        }

        let products = self
            .get_json(identity, &["shop", "v1", "products"], &query)
            .await?
            .map(|body| parse_products(&body))
            .unwrap_or_default();
        debug!(sort, count = products.len(), "Fetched catalog listing");
        Ok(products)
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn list_new(
        &self,
        identity: &RequestIdentity,
        limit: usize,
    ) -> Result<Vec<ProductSnapshot>> {
        self.listing(identity, "newest", limit, false).await
    }

    async fn list_popular(
        &self,
        identity: &RequestIdentity,
        limit: usize,
    ) -> Result<Vec<ProductSnapshot>> {
        self.listing(identity, "popular", limit, false).await
    }

    async fn list_limited(
        &self,
        identity: &RequestIdentity,
        limit: usize,
    ) -> Result<Vec<ProductSnapshot>> {
        let mut products = self.listing(identity, "newest", limit, true).await?;
        for product in &mut products {
            product.is_limited = true;
        }
        Ok(products)
    }

    async fn search(
        &self,
        identity: &RequestIdentity,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<ProductSnapshot>> {
        let query = [
            ("q", keyword.to_string()),
            ("page", "1".to_string()),
            ("limit", limit.to_string()),
            ("region", self.config.region.clone()),
        ];
        let products = self
            .get_json(identity, &["search", "v1", "products"], &query)
            .await?
            .map(|body| parse_products(&body))
            .unwrap_or_default();
        debug!(keyword, count = products.len(), "Catalog search finished");
        Ok(products)
    }

    async fn get_by_id(
        &self,
        identity: &RequestIdentity,
        id: &str,
    ) -> Result<Option<ProductSnapshot>> {
        let Some(body) = self
            .get_json(identity, &["shop", "v1", "products", id], &[])
            .await?
        else {
            return Ok(None);
        };
        Ok(parse_detail(&body, id))
    }
}
