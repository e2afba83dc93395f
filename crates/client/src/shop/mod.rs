//! High-level shop client.
//!
//! [`ShopApi`] wraps the raw [`ApiClient`](crate::api::ApiClient) with
//! lazily built catalog caches (category tree, facet index), lazy
//! [`Product`] handles, paginated [`Search`] and session [`Basket`]s.
//! Handles are cheap to clone and share all caches.

pub mod basket;
pub mod node;
pub mod product;
pub mod search;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};
use wavecart_core::{CategoryId, FacetGroupId, ProductId};

pub use basket::{Basket, BasketItem, BasketItemKey};
pub use node::{Category, Facet, FacetGroup, Image, Node};
pub use product::{CustomizedVariant, Product, Variant, VariantAttributes};
pub use search::{PriceRange, Search, SearchFilter, SearchIter, SearchShaping};

use crate::api::{ApiClient, CompletionType, check_session_id};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{Error, Result};
use basket::BasketState;

/// The facet group holding product colors.
pub const FACET_GROUP_COLOR: FacetGroupId = FacetGroupId::new(1);

/// Facet ids of the coarse color palette most shops filter by.
pub const SIMPLE_COLOR_FACETS: [u64; 19] = [
    570, 168, 67, 247, 48, 14, 18, 204, 30, 1, 579, 15, 12, 11, 55, 580, 9, 333, 646,
];

/// Product fields fetched for search results and id lookups by default.
pub const DEFAULT_PRODUCT_FIELDS: [&str; 3] = ["sale", "active", "default_variant"];

const CACHE_KEY_CATEGORY_TREE: &str = "categorytree";
const CACHE_KEY_FACETS: &str = "facets";

/// How to look up a facet group.
#[derive(Debug, Clone)]
pub enum FacetGroupKey {
    Id(FacetGroupId),
    Name(String),
}

impl From<FacetGroupId> for FacetGroupKey {
    fn from(id: FacetGroupId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for FacetGroupKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

struct CategoryIndex {
    roots: Vec<Arc<Category>>,
    by_id: HashMap<CategoryId, Arc<Category>>,
    by_name: HashMap<String, Arc<Category>>,
}

struct FacetIndex {
    groups: HashMap<u64, FacetGroup>,
    names: HashMap<String, u64>,
}

struct ShopInner {
    api: ApiClient,
    cache: Option<Arc<dyn CacheStore>>,
    categories: OnceCell<CategoryIndex>,
    facets: OnceCell<FacetIndex>,
    simple_colors: OnceCell<Vec<Facet>>,
    baskets: Mutex<HashMap<String, Arc<Mutex<BasketState>>>>,
}

/// Cheaply cloneable handle to a shop.
#[derive(Clone)]
pub struct ShopApi {
    inner: Arc<ShopInner>,
}

impl std::fmt::Debug for ShopApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopApi")
            .field("api", &self.inner.api)
            .finish()
    }
}

impl ShopApi {
    /// Create a shop client without an external cache.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self::build(api, None)
    }

    /// Create a shop client backed by an external cache for catalog and
    /// product payloads.
    #[must_use]
    pub fn with_cache(api: ApiClient, cache: Arc<dyn CacheStore>) -> Self {
        Self::build(api, Some(cache))
    }

    fn build(api: ApiClient, cache: Option<Arc<dyn CacheStore>>) -> Self {
        Self {
            inner: Arc::new(ShopInner {
                api,
                cache,
                categories: OnceCell::new(),
                facets: OnceCell::new(),
                simple_colors: OnceCell::new(),
                baskets: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The raw API client underneath.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// The configuration this client runs with.
    #[must_use]
    pub fn config(&self) -> &Config {
        self.inner.api.config()
    }

    // -------------------------------------------------------------------------
    // Categories
    // -------------------------------------------------------------------------

    /// The root categories of the shop, fetched and indexed on first use.
    pub async fn categories(&self) -> Result<&[Arc<Category>]> {
        Ok(&self.category_index().await?.roots)
    }

    /// Look up a category anywhere in the tree by id.
    pub async fn category_by_id(&self, id: CategoryId) -> Result<Arc<Category>> {
        self.category_index()
            .await?
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("category {id}")))
    }

    /// Look up a category anywhere in the tree by name. When several
    /// categories share a name, the last one in tree order wins.
    pub async fn category_by_name(&self, name: &str) -> Result<Arc<Category>> {
        self.category_index()
            .await?
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("category {name:?}")))
    }

    async fn category_index(&self) -> Result<&CategoryIndex> {
        self.inner
            .categories
            .get_or_try_init(|| async {
                let payload = match self.cache_get_json(CACHE_KEY_CATEGORY_TREE).await {
                    Some(cached) => cached,
                    None => {
                        let fresh = self.inner.api.category_tree(None).await?;
                        self.cache_put_json(CACHE_KEY_CATEGORY_TREE, &fresh).await;
                        fresh
                    }
                };
                let index = build_category_index(&payload)?;
                info!(
                    roots = index.roots.len(),
                    total = index.by_id.len(),
                    "category tree indexed"
                );
                Ok(index)
            })
            .await
    }

    // -------------------------------------------------------------------------
    // Facets
    // -------------------------------------------------------------------------

    /// All facet groups, fetched and indexed on first use, ordered by id.
    pub async fn facet_groups(&self) -> Result<Vec<&FacetGroup>> {
        let index = self.facet_index().await?;
        let mut groups: Vec<&FacetGroup> = index.groups.values().collect();
        groups.sort_by_key(|group| group.id);
        Ok(groups)
    }

    /// Look up a facet group by id or name.
    pub async fn facet_group_by_key(&self, key: impl Into<FacetGroupKey>) -> Result<&FacetGroup> {
        let key = key.into();
        let index = self.facet_index().await?;
        let group = match &key {
            FacetGroupKey::Id(id) => index.groups.get(&u64::from(*id)),
            FacetGroupKey::Name(name) => index
                .names
                .get(name)
                .and_then(|id| index.groups.get(id)),
        };
        group.ok_or_else(|| Error::NotFound(format!("facet group {key:?}")))
    }

    /// Look up a facet group by id, `None` when the shop has no such group.
    pub(crate) async fn facet_group(&self, id: FacetGroupId) -> Result<Option<FacetGroup>> {
        Ok(self.facet_index().await?.groups.get(&u64::from(id)).cloned())
    }

    /// The coarse color palette: one facet per well-known simple color.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when the shop lacks the color group or
    /// any of the listed color facets.
    pub async fn simple_colors(&self) -> Result<&[Facet]> {
        let colors = self
            .inner
            .simple_colors
            .get_or_try_init(|| async {
                let group = self
                    .facet_group(FACET_GROUP_COLOR)
                    .await?
                    .ok_or_else(|| Error::NotFound("facet group color".to_string()))?;
                SIMPLE_COLOR_FACETS
                    .iter()
                    .map(|facet_id| {
                        group.facet(*facet_id).cloned().ok_or_else(|| {
                            Error::NotFound(format!("color facet {facet_id}"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .await?;
        Ok(colors.as_slice())
    }

    async fn facet_index(&self) -> Result<&FacetIndex> {
        self.inner
            .facets
            .get_or_try_init(|| async {
                let payload = match self.cache_get_json(CACHE_KEY_FACETS).await {
                    Some(cached) => cached,
                    None => {
                        let group_ids: Vec<FacetGroupId> = self
                            .inner
                            .api
                            .facet_types()
                            .await?
                            .into_iter()
                            .map(FacetGroupId::from)
                            .collect();
                        let fresh = self
                            .inner
                            .api
                            .facets(Some(&group_ids), None, None)
                            .await?;
                        self.cache_put_json(CACHE_KEY_FACETS, &fresh).await;
                        fresh
                    }
                };
                let index = build_facet_index(&payload)?;
                info!(groups = index.groups.len(), "facet index built");
                Ok(index)
            })
            .await
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    /// Fetch products by id. Cached products are reused and only topped up
    /// with the freshly requested fields.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProductsPartialFailure` when the server rejects
    /// individual ids; the successfully fetched products ride along in the
    /// error.
    #[instrument(skip(self, fields))]
    pub async fn products_by_id(
        &self,
        ids: &[ProductId],
        fields: Option<&[&str]>,
    ) -> Result<Vec<Product>> {
        let fields = fields.unwrap_or(&DEFAULT_PRODUCT_FIELDS);
        let payload = self.inner.api.products(ids, Some(fields)).await?;
        let by_id = payload
            .get("ids")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::Malformed("products payload missing \"ids\"".to_string()))?;

        let mut found = Vec::new();
        let mut failed = Vec::new();
        for id in ids {
            let Some(entry) = by_id.get(&id.to_string()).and_then(Value::as_object) else {
                failed.push((*id, "missing from response".to_string()));
                continue;
            };
            if entry.contains_key("error_message") || entry.contains_key("error_code") {
                let message = entry
                    .get("error_message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown remote error");
                failed.push((*id, message.to_string()));
                continue;
            }
            found.push(self.adopt_product(entry.clone()).await?);
        }

        if failed.is_empty() {
            Ok(found)
        } else {
            warn!(failed = failed.len(), "some products could not be fetched");
            Err(Error::ProductsPartialFailure { found, failed })
        }
    }

    /// Fetch products by EAN.
    pub async fn products_by_ean(
        &self,
        eans: &[&str],
        fields: Option<&[&str]>,
    ) -> Result<Vec<Product>> {
        let fields = fields.unwrap_or(&DEFAULT_PRODUCT_FIELDS);
        let payload = self.inner.api.products_by_eans(eans, Some(fields)).await?;
        let items = payload
            .as_array()
            .ok_or_else(|| Error::Malformed("products_eans payload is not an array".to_string()))?;
        let mut products = Vec::with_capacity(items.len());
        for item in items {
            let fields = item.as_object().ok_or_else(|| {
                Error::Malformed("products_eans entry is not an object".to_string())
            })?;
            products.push(self.adopt_product(fields.clone()).await?);
        }
        Ok(products)
    }

    /// Build a product handle from a payload fragment, folding in any
    /// externally cached fields. The fresh fragment wins on conflicts.
    pub(crate) async fn adopt_product(&self, fresh: Map<String, Value>) -> Result<Product> {
        let Some(id) = fresh.get("id").and_then(Value::as_u64) else {
            return Err(Error::Malformed("product entry missing \"id\"".to_string()));
        };
        let id = ProductId::from(id);

        let mut fields = self.cache_get_product(id).await.unwrap_or_default();
        for (key, value) in fresh {
            fields.insert(key, value);
        }
        self.cache_put_product(id, &fields).await;
        Product::new(self.clone(), fields)
    }

    // -------------------------------------------------------------------------
    // Search and suggestions
    // -------------------------------------------------------------------------

    /// Start a product search for `session_id`.
    pub async fn search(
        &self,
        session_id: impl Into<String>,
        filter: SearchFilter,
        shaping: SearchShaping,
    ) -> Result<Search> {
        let session_id = session_id.into();
        check_session_id(&session_id)?;
        Search::new(self.clone(), session_id, filter.into_value(), shaping).await
    }

    /// Complete `searchword` to matching products and categories.
    pub async fn autocomplete(
        &self,
        searchword: &str,
        limit: Option<u64>,
    ) -> Result<(Vec<Product>, Vec<Arc<Category>>)> {
        let payload = self
            .inner
            .api
            .autocomplete(
                searchword,
                limit,
                Some(&[CompletionType::Products, CompletionType::Categories]),
            )
            .await?;

        let mut products = Vec::new();
        if let Some(items) = payload.get("products").and_then(Value::as_array) {
            for item in items {
                let fields = item.as_object().ok_or_else(|| {
                    Error::Malformed("autocompletion product entry is not an object".to_string())
                })?;
                products.push(self.adopt_product(fields.clone()).await?);
            }
        }

        let mut categories = Vec::new();
        if let Some(items) = payload.get("categories").and_then(Value::as_array) {
            for item in items {
                let id = item.get("id").and_then(Value::as_u64).ok_or_else(|| {
                    Error::Malformed("autocompletion category entry missing \"id\"".to_string())
                })?;
                categories.push(self.category_by_id(CategoryId::from(id)).await?);
            }
        }
        Ok((products, categories))
    }

    /// Fetch search word suggestions.
    pub async fn suggest(&self, searchword: &str, limit: Option<u64>) -> Result<Vec<String>> {
        self.inner.api.suggest(searchword, None, limit).await
    }

    // -------------------------------------------------------------------------
    // Baskets
    // -------------------------------------------------------------------------

    /// The basket for `session_id`. All handles for one session share
    /// their local order line tracking.
    pub async fn basket(&self, session_id: impl Into<String>) -> Result<Basket> {
        let session_id = session_id.into();
        check_session_id(&session_id)?;
        let state = {
            let mut baskets = self.inner.baskets.lock().await;
            Arc::clone(baskets.entry(session_id.clone()).or_default())
        };
        Ok(Basket::new(self.clone(), session_id, state))
    }

    pub(crate) async fn forget_basket(&self, session_id: &str) {
        self.inner.baskets.lock().await.remove(session_id);
    }

    // -------------------------------------------------------------------------
    // External cache plumbing
    // -------------------------------------------------------------------------

    pub(crate) async fn cache_get_product(&self, id: ProductId) -> Option<Map<String, Value>> {
        let raw = self.inner.cache.as_ref()?.get(&product_cache_key(id)).await?;
        match serde_json::from_slice(&raw) {
            Ok(fields) => Some(fields),
            Err(e) => {
                warn!(product_id = %id, error = %e, "dropping undecodable cached product");
                None
            }
        }
    }

    pub(crate) async fn cache_put_product(&self, id: ProductId, fields: &Map<String, Value>) {
        let Some(cache) = self.inner.cache.as_ref() else {
            return;
        };
        match serde_json::to_vec(fields) {
            Ok(raw) => {
                cache
                    .set(&product_cache_key(id), raw, self.config().cache_ttl())
                    .await;
            }
            Err(e) => warn!(product_id = %id, error = %e, "cannot encode product for cache"),
        }
    }

    async fn cache_get_json(&self, key: &str) -> Option<Value> {
        let raw = self.inner.cache.as_ref()?.get(key).await?;
        match serde_json::from_slice(&raw) {
            Ok(value) => {
                debug!(key, "catalog cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "dropping undecodable cache entry");
                None
            }
        }
    }

    async fn cache_put_json(&self, key: &str, value: &Value) {
        let Some(cache) = self.inner.cache.as_ref() else {
            return;
        };
        match serde_json::to_vec(value) {
            Ok(raw) => cache.set(key, raw, self.config().cache_ttl()).await,
            Err(e) => warn!(key, error = %e, "cannot encode cache entry"),
        }
    }
}

fn product_cache_key(id: ProductId) -> String {
    format!("product:{id}")
}

// =============================================================================
// Index construction
// =============================================================================

fn build_category_index(payload: &Value) -> Result<CategoryIndex> {
    let items = payload
        .as_array()
        .ok_or_else(|| Error::Malformed("category_tree payload is not an array".to_string()))?;

    let mut roots = Vec::with_capacity(items.len());
    for item in items {
        roots.push(build_category(item, None)?);
    }
    roots.sort_by_key(|category| category.position);

    let mut by_id = HashMap::new();
    let mut by_name = HashMap::new();
    for root in &roots {
        for (_, category) in root.tree_iter() {
            by_id.insert(category.id, Arc::clone(&category));
            // later categories win, matching tree order
            by_name.insert(category.name.clone(), category);
        }
    }
    Ok(CategoryIndex {
        roots,
        by_id,
        by_name,
    })
}

fn build_category(item: &Value, parent: Option<CategoryId>) -> Result<Arc<Category>> {
    let fields = item
        .as_object()
        .ok_or_else(|| Error::Malformed("category entry is not an object".to_string()))?;
    let node = Node::new(fields.clone())?;
    let id = CategoryId::from(node.u64_field("id")?);

    let mut sub = Vec::new();
    if let Some(children) = fields.get("sub_categories").and_then(Value::as_array) {
        for child in children {
            sub.push(build_category(child, Some(id))?);
        }
        sub.sort_by_key(|category| category.position);
    }
    Ok(Arc::new(Category::new(node, parent, sub)?))
}

fn build_facet_index(payload: &Value) -> Result<FacetIndex> {
    let items = payload
        .get("facet")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Malformed("facets payload missing \"facet\"".to_string()))?;

    let mut groups: HashMap<u64, FacetGroup> = HashMap::new();
    let mut names = HashMap::new();
    for item in items {
        let fields = item
            .as_object()
            .ok_or_else(|| Error::Malformed("facet entry is not an object".to_string()))?;
        let node = Node::new(fields.clone())?;
        let facet = Facet::new(node);
        let facet_id = u64::from(facet.id()?);
        let group_id = facet.group_id()?;

        let group = groups.entry(u64::from(group_id)).or_insert_with(|| {
            let name = fields
                .get("group_name")
                .and_then(Value::as_str)
                .map_or_else(|| format!("group_{group_id}"), str::to_string);
            FacetGroup::new(group_id, name)
        });
        group.insert(facet_id, facet);
    }
    for group in groups.values() {
        names.insert(group.name.clone(), u64::from(group.id));
    }
    Ok(FacetIndex { groups, names })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> Value {
        json!([
            {
                "id": 16077, "name": "Damen", "active": true, "position": 2,
                "sub_categories": [
                    { "id": 16078, "name": "Shirts", "active": true, "position": 2,
                      "sub_categories": [] },
                    { "id": 16079, "name": "Hosen", "active": true, "position": 1,
                      "sub_categories": [] }
                ]
            },
            {
                "id": 16080, "name": "Herren", "active": true, "position": 1,
                "sub_categories": [
                    { "id": 16081, "name": "Shirts", "active": false, "position": 1,
                      "sub_categories": [] }
                ]
            }
        ])
    }

    #[test]
    fn test_category_index_orders_by_position() {
        let index = build_category_index(&sample_tree()).unwrap();
        let root_names: Vec<&str> =
            index.roots.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(root_names, vec!["Herren", "Damen"]);

        let damen = index.by_id.get(&CategoryId::from(16077)).unwrap();
        let sub_names: Vec<&str> = damen.sub().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(sub_names, vec!["Hosen", "Shirts"]);
    }

    #[test]
    fn test_category_index_lookup() {
        let index = build_category_index(&sample_tree()).unwrap();
        assert_eq!(index.by_id.len(), 5);
        assert_eq!(
            index.by_id[&CategoryId::from(16079)].parent,
            Some(CategoryId::from(16077))
        );
        // two categories are named "Shirts"; the later one in tree order wins
        assert_eq!(
            index.by_name["Shirts"].id,
            CategoryId::from(16078)
        );
    }

    #[test]
    fn test_facet_index() {
        let payload = json!({
            "facet": [
                { "id": 570, "group_id": 1, "group_name": "color", "name": "rot", "value": "rot" },
                { "id": 168, "group_id": 1, "group_name": "color", "name": "blau", "value": "blau" },
                { "id": 22, "group_id": 2, "name": "XS", "value": "XS" }
            ]
        });
        let index = build_facet_index(&payload).unwrap();
        assert_eq!(index.groups.len(), 2);

        let color = &index.groups[&1];
        assert_eq!(color.name, "color");
        assert_eq!(color.len(), 2);
        assert_eq!(color.facet(570).unwrap().name().unwrap(), "rot");

        // groups without an explicit name get a synthetic one
        assert_eq!(index.groups[&2].name, "group_2");
        assert_eq!(index.names["color"], 1);
    }
}
