//! Low-level shop API client.
//!
//! Every request is a `POST` to the single API endpoint carrying a one
//! element JSON array `[{"<command>": <params>}]`; the response mirrors it
//! as `[{"<command>": <payload>}]`. [`ApiClient::call`] does the envelope
//! handling, the command methods add per-command parameter validation and
//! payload extraction.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;
use wavecart_core::{CategoryId, FacetGroupId, OrderId, ProductId, VariantId};

use crate::config::{Config, Credentials};
use crate::error::{Error, Result};

/// Well-known product field names accepted by `products` and
/// `product_search` result shaping.
pub mod product_fields {
    pub const VARIANTS: &str = "variants";
    pub const DESCRIPTION_SHORT: &str = "description_short";
    pub const DESCRIPTION_LONG: &str = "description_long";
    pub const MIN_PRICE: &str = "min_price";
    pub const MAX_PRICE: &str = "max_price";
    pub const SALE: &str = "sale";
    pub const DEFAULT_VARIANT: &str = "default_variant";
    pub const DEFAULT_IMAGE: &str = "default_image";
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const ACTIVE: &str = "active";
    pub const STYLES: &str = "styles";
    pub const CATEGORIES: &str = "categories";
}

/// What an autocomplete query should complete to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionType {
    Products,
    Categories,
}

impl CompletionType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Categories => "categories",
        }
    }
}

/// One order line for `basket_set`. The `id` identifies a single unit of
/// the variant and must be unique within the basket.
#[derive(Debug, Clone)]
pub struct BasketLine {
    pub id: String,
    pub variant_id: VariantId,
    pub additional_data: Option<Value>,
}

impl BasketLine {
    #[must_use]
    pub fn new(id: impl Into<String>, variant_id: VariantId) -> Self {
        Self {
            id: id.into(),
            variant_id,
            additional_data: None,
        }
    }

    #[must_use]
    pub fn with_additional_data(mut self, data: Value) -> Self {
        self.additional_data = Some(data);
        self
    }

    fn to_value(&self) -> Value {
        let mut line = Map::new();
        line.insert("id".to_string(), json!(self.id));
        line.insert("variant_id".to_string(), json!(self.variant_id));
        if let Some(data) = &self.additional_data {
            line.insert("additional_data".to_string(), data.clone());
        }
        Value::Object(line)
    }
}

struct ApiClientInner {
    http: reqwest::Client,
    endpoint: String,
    authorization: String,
    config: Config,
    credentials: Credentials,
}

/// Cheaply cloneable handle to the shop API.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("endpoint", &self.inner.endpoint)
            .field("app_id", &self.inner.credentials.app_id)
            .finish()
    }
}

impl ApiClient {
    /// Create a client for the endpoint named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` when the underlying HTTP client cannot
    /// be constructed.
    pub fn new(credentials: Credentials, config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(Error::from)?;

        let authorization = credentials.authorization_header();
        Ok(Self {
            inner: Arc::new(ApiClientInner {
                http,
                endpoint: config.entry_point_url.clone(),
                authorization,
                config,
                credentials,
            }),
        })
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The credentials this client was built with.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    /// Send `command` with `params` and return the inner payload.
    ///
    /// # Errors
    ///
    /// - `Error::Transport` for connection failures, timeouts and non-2xx
    ///   status codes
    /// - `Error::Malformed` when the response does not follow the envelope
    /// - `Error::Remote` when the payload carries `error_message` /
    ///   `error_code`
    #[instrument(skip(self, params), fields(command = command))]
    pub async fn call(&self, command: &str, params: Value) -> Result<Value> {
        let envelope = build_envelope(command, params);
        debug!("sending shop API request");

        let response = self
            .inner
            .http
            .post(&self.inner.endpoint)
            .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
            .header(USER_AGENT, &self.inner.config.agent)
            .header(AUTHORIZATION, &self.inner.authorization)
            .body(envelope.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Transport {
                status: Some(status.as_u16()),
                message: truncate_body(&body),
            });
        }

        let parsed: Value = serde_json::from_str(&body)?;
        let payload = extract_payload(command, parsed)?;
        if let Some(error) = remote_error(&payload) {
            return Err(error);
        }
        debug!("shop API request succeeded");
        Ok(payload)
    }

    // -------------------------------------------------------------------------
    // Catalog commands
    // -------------------------------------------------------------------------

    /// Fetch the category tree down to `max_depth` levels; `None` or `-1`
    /// means unlimited. Valid range is `-1..=10`.
    pub async fn category_tree(&self, max_depth: Option<i64>) -> Result<Value> {
        let mut params = Map::new();
        if let Some(depth) = max_depth {
            if !(-1..=10).contains(&depth) {
                return Err(Error::InvalidArgument(format!(
                    "max_depth must be between -1 and 10, got {depth}"
                )));
            }
            params.insert("max_depth".to_string(), json!(depth));
        }
        self.call("category_tree", Value::Object(params)).await
    }

    /// Fetch flat category data for up to 200 ids.
    pub async fn category(&self, ids: &[CategoryId]) -> Result<Value> {
        check_ids("category ids", ids.len())?;
        self.call("category", json!({ "ids": ids })).await
    }

    /// Fetch the ids of all known facet groups.
    pub async fn facet_types(&self) -> Result<Vec<u64>> {
        let payload = self.call("facet_types", json!({})).await?;
        serde_json::from_value(payload)
            .map_err(|e| Error::Malformed(format!("facet_types payload: {e}")))
    }

    /// Fetch facet values, optionally restricted to `group_ids`, paged by
    /// `limit` and `offset`.
    pub async fn facets(
        &self,
        group_ids: Option<&[FacetGroupId]>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Value> {
        let mut params = Map::new();
        if let Some(ids) = group_ids {
            params.insert("group_ids".to_string(), json!(ids));
        }
        if let Some(limit) = limit {
            if limit < 1 {
                return Err(Error::InvalidArgument(
                    "facets limit must be at least 1".to_string(),
                ));
            }
            params.insert("limit".to_string(), json!(limit));
        }
        if let Some(offset) = offset {
            params.insert("offset".to_string(), json!(offset));
        }
        self.call("facets", Value::Object(params)).await
    }

    // -------------------------------------------------------------------------
    // Product commands
    // -------------------------------------------------------------------------

    /// Fetch up to 200 products by id, restricted to `fields` when given.
    pub async fn products(&self, ids: &[ProductId], fields: Option<&[&str]>) -> Result<Value> {
        check_ids("product ids", ids.len())?;
        let mut params = Map::new();
        params.insert("ids".to_string(), json!(ids));
        if let Some(fields) = fields {
            params.insert("fields".to_string(), json!(fields));
        }
        self.call("products", Value::Object(params)).await
    }

    /// Fetch up to 200 products by EAN, restricted to `fields` when given.
    pub async fn products_by_eans(&self, eans: &[&str], fields: Option<&[&str]>) -> Result<Value> {
        check_ids("eans", eans.len())?;
        let mut params = Map::new();
        params.insert("eans".to_string(), json!(eans));
        if let Some(fields) = fields {
            params.insert("fields".to_string(), json!(fields));
        }
        let payload = self.call("products_eans", Value::Object(params)).await?;
        payload
            .get("eans")
            .cloned()
            .ok_or_else(|| Error::Malformed("products_eans payload missing \"eans\"".to_string()))
    }

    /// Fetch live availability data for a set of variants.
    pub async fn live_variant(&self, ids: &[VariantId]) -> Result<Value> {
        check_ids("variant ids", ids.len())?;
        self.call("live_variant", json!({ "ids": ids })).await
    }

    /// Run a product search for `session_id`. `filter` and `result` pass
    /// through to the API unchanged.
    pub async fn product_search(
        &self,
        session_id: &str,
        filter: Option<Value>,
        result: Option<Value>,
    ) -> Result<Value> {
        check_session_id(session_id)?;
        let mut params = Map::new();
        params.insert("session_id".to_string(), json!(session_id));
        if let Some(filter) = filter {
            params.insert("filter".to_string(), filter);
        }
        if let Some(result) = result {
            params.insert("result".to_string(), result);
        }
        self.call("product_search", Value::Object(params)).await
    }

    /// Complete `searchword` to products and/or categories.
    pub async fn autocomplete(
        &self,
        searchword: &str,
        limit: Option<u64>,
        types: Option<&[CompletionType]>,
    ) -> Result<Value> {
        let mut params = Map::new();
        params.insert("searchword".to_string(), json!(searchword));
        if let Some(limit) = limit {
            check_limit(limit)?;
            params.insert("limit".to_string(), json!(limit));
        }
        if let Some(types) = types {
            let types: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
            params.insert("types".to_string(), json!(types));
        }
        self.call("autocompletion", Value::Object(params)).await
    }

    /// Fetch search word suggestions for `searchword`.
    pub async fn suggest(
        &self,
        searchword: &str,
        categories: Option<&[CategoryId]>,
        limit: Option<u64>,
    ) -> Result<Vec<String>> {
        let mut params = Map::new();
        params.insert("searchword".to_string(), json!(searchword));
        if let Some(categories) = categories {
            params.insert("categories".to_string(), json!(categories));
        }
        if let Some(limit) = limit {
            check_limit(limit)?;
            params.insert("limit".to_string(), json!(limit));
        }
        let payload = self.call("suggest", Value::Object(params)).await?;
        serde_json::from_value(payload)
            .map_err(|e| Error::Malformed(format!("suggest payload: {e}")))
    }

    // -------------------------------------------------------------------------
    // Basket and order commands
    // -------------------------------------------------------------------------

    /// Fetch the current basket state for `session_id`.
    pub async fn basket_get(&self, session_id: &str) -> Result<Value> {
        check_session_id(session_id)?;
        self.call("basket", json!({ "session_id": session_id }))
            .await
    }

    /// Add order lines to the basket of `session_id`.
    pub async fn basket_set(&self, session_id: &str, lines: &[BasketLine]) -> Result<Value> {
        check_session_id(session_id)?;
        let order_lines: Vec<Value> = lines.iter().map(BasketLine::to_value).collect();
        self.call(
            "basket",
            json!({ "session_id": session_id, "order_lines": order_lines }),
        )
        .await
    }

    /// Remove order lines by id from the basket of `session_id`.
    pub async fn basket_remove(&self, session_id: &str, line_ids: &[String]) -> Result<Value> {
        check_session_id(session_id)?;
        if line_ids.is_empty() {
            return Err(Error::InvalidArgument(
                "basket_remove needs at least one order line id".to_string(),
            ));
        }
        let order_lines: Vec<Value> = line_ids.iter().map(|id| json!({ "delete": id })).collect();
        self.call(
            "basket",
            json!({ "session_id": session_id, "order_lines": order_lines }),
        )
        .await
    }

    /// Begin the order process for the basket of `session_id` and return
    /// the checkout URL to redirect the customer to. The customer lands on
    /// `success_url` after payment; `cancel_url` and `error_url` cover the
    /// other checkout outcomes.
    pub async fn order(
        &self,
        session_id: &str,
        success_url: &str,
        cancel_url: Option<&str>,
        error_url: Option<&str>,
    ) -> Result<String> {
        check_session_id(session_id)?;
        let mut params = Map::new();
        params.insert("session_id".to_string(), json!(session_id));
        params.insert("success_url".to_string(), json!(success_url));
        if let Some(url) = cancel_url {
            params.insert("cancel_url".to_string(), json!(url));
        }
        if let Some(url) = error_url {
            params.insert("error_url".to_string(), json!(url));
        }
        let payload = self.call("initiate_order", Value::Object(params)).await?;
        let user_token = payload
            .get("user_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Malformed("initiate_order payload missing \"user_token\"".to_string())
            })?;
        let app_token = payload
            .get("app_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Malformed("initiate_order payload missing \"app_token\"".to_string())
            })?;

        let url = Url::parse_with_params(
            &self.inner.config.shop_url,
            &[
                ("user_token", user_token),
                ("app_token", app_token),
                ("basketId", session_id),
                ("appId", self.inner.credentials.app_id.as_str()),
            ],
        )
        .map_err(|e| Error::Malformed(format!("checkout URL: {e}")))?;
        Ok(url.into())
    }

    /// Fetch a finished order by id.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Value> {
        self.call("get_order", json!({ "order_id": order_id })).await
    }

    /// Fetch the child apps of this app, for multi-tenant setups.
    pub async fn child_apps(&self) -> Result<Value> {
        let payload = self.call("child_apps", json!({})).await?;
        payload.get("child_apps").cloned().ok_or_else(|| {
            Error::Malformed("child_apps payload missing \"child_apps\"".to_string())
        })
    }
}

/// Mint a fresh order line id.
#[must_use]
pub fn new_line_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// =============================================================================
// Envelope handling
// =============================================================================

fn build_envelope(command: &str, params: Value) -> Value {
    let mut request = Map::new();
    request.insert(command.to_string(), params);
    Value::Array(vec![Value::Object(request)])
}

fn extract_payload(command: &str, response: Value) -> Result<Value> {
    let Value::Array(mut items) = response else {
        return Err(Error::Malformed(
            "response is not a JSON array".to_string(),
        ));
    };
    if items.len() != 1 {
        return Err(Error::Malformed(format!(
            "expected a single response item, got {}",
            items.len()
        )));
    }
    let Value::Object(mut item) = items.remove(0) else {
        return Err(Error::Malformed(
            "response item is not a JSON object".to_string(),
        ));
    };
    item.remove(command).ok_or_else(|| {
        Error::Malformed(format!("response item missing result for \"{command}\""))
    })
}

fn remote_error(payload: &Value) -> Option<Error> {
    let object = payload.as_object()?;
    let message = object.get("error_message");
    let code = object.get("error_code");
    if message.is_none() && code.is_none() {
        return None;
    }
    Some(Error::Remote {
        code: code.and_then(Value::as_i64),
        message: message
            .map(|m| match m {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "unknown remote error".to_string()),
    })
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}

// =============================================================================
// Parameter validation
// =============================================================================

fn check_ids(what: &str, count: usize) -> Result<()> {
    if (1..=200).contains(&count) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "{what}: between 1 and 200 required, got {count}"
        )))
    }
}

pub(crate) fn check_session_id(session_id: &str) -> Result<()> {
    if session_id.len() >= 5 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "session id must be at least 5 characters, got {session_id:?}"
        )))
    }
}

fn check_limit(limit: u64) -> Result<()> {
    if (1..=200).contains(&limit) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "limit must be between 1 and 200, got {limit}"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_client() -> ApiClient {
        ApiClient::new(Credentials::new("110", "token"), Config::default()).unwrap()
    }

    #[test]
    fn test_build_envelope() {
        let envelope = build_envelope("category_tree", json!({ "max_depth": 2 }));
        assert_eq!(envelope, json!([{ "category_tree": { "max_depth": 2 } }]));
    }

    #[test]
    fn test_extract_payload() {
        let response = json!([{ "facet_types": [0, 1, 2] }]);
        let payload = extract_payload("facet_types", response).unwrap();
        assert_eq!(payload, json!([0, 1, 2]));
    }

    #[test]
    fn test_extract_payload_rejects_wrong_shape() {
        assert!(matches!(
            extract_payload("facets", json!({ "facets": [] })),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(
            extract_payload("facets", json!([])),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(
            extract_payload("facets", json!([{ "other": [] }])),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_remote_error_detection() {
        let payload = json!({ "error_message": "nope", "error_code": 400 });
        let error = remote_error(&payload).unwrap();
        assert!(matches!(error, Error::Remote { code: Some(400), .. }));

        assert!(remote_error(&json!({ "product_count": 3 })).is_none());
        assert!(remote_error(&json!([1, 2])).is_none());
    }

    #[tokio::test]
    async fn test_products_rejects_bad_id_counts() {
        let client = test_client();
        assert!(matches!(
            client.products(&[], None).await,
            Err(Error::InvalidArgument(_))
        ));

        let too_many: Vec<ProductId> = (1..=201u64).map(ProductId::from).collect();
        assert!(matches!(
            client.products(&too_many, None).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_category_tree_rejects_bad_depth() {
        let client = test_client();
        assert!(matches!(
            client.category_tree(Some(11)).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            client.category_tree(Some(-2)).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_session_id_validation() {
        let client = test_client();
        assert!(matches!(
            client.basket_get("abc").await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            client.basket_remove("session", &[]).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_limit_validation() {
        let client = test_client();
        assert!(matches!(
            client.suggest("shirt", None, Some(0)).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            client.autocomplete("shirt", Some(201), None).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_line_ids_are_unique() {
        assert_ne!(new_line_id(), new_line_id());
        assert_eq!(new_line_id().len(), 32);
    }
}
