//! Products and variants with lazy field hydration.
//!
//! A [`Product`] can start life with only a handful of fields, e.g. from a
//! search result. Accessing a missing field fetches it on demand when
//! `auto_fetch` is enabled; the fetch piggybacks the commonly needed
//! fields (`description_short`, `description_long`, `sale`) so a detail
//! page costs one round trip.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;
use uuid::Uuid;
use wavecart_core::{CategoryId, FacetGroupId, Price, ProductId, VariantId};

use crate::api::product_fields;
use crate::error::{Error, Result};
use crate::shop::ShopApi;
use crate::shop::node::{Category, Facet, Image, Node};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fields fetched alongside any on-demand field access.
const HYDRATION_BUNDLE: &[&str] = &[
    product_fields::DESCRIPTION_SHORT,
    product_fields::DESCRIPTION_LONG,
    product_fields::SALE,
];

fn parse_datetime(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| Error::Malformed(format!("datetime {raw:?}: {e}")))
}

// =============================================================================
// Variant
// =============================================================================

/// Facet attributes of a variant, resolved against the facet index.
#[derive(Debug, Clone)]
pub struct VariantAttributes {
    by_group: BTreeMap<u64, Vec<Facet>>,
    names: BTreeMap<String, Vec<Facet>>,
}

impl VariantAttributes {
    /// Facets of a group by group id.
    #[must_use]
    pub fn by_group_id(&self, group_id: FacetGroupId) -> Option<&[Facet]> {
        self.by_group.get(&u64::from(group_id)).map(Vec::as_slice)
    }

    /// Facets of a group by group name, e.g. `"color"`.
    #[must_use]
    pub fn by_group_name(&self, name: &str) -> Option<&[Facet]> {
        self.names.get(name).map(Vec::as_slice)
    }

    /// All groups with their facets, ordered by group id.
    pub fn groups(&self) -> impl Iterator<Item = (FacetGroupId, &[Facet])> {
        self.by_group
            .iter()
            .map(|(id, facets)| (FacetGroupId::from(*id), facets.as_slice()))
    }
}

struct VariantInner {
    shop: ShopApi,
    id: VariantId,
    node: Node,
    images: Vec<Image>,
    attributes: OnceCell<VariantAttributes>,
}

/// A concrete buyable unit of a product.
#[derive(Clone)]
pub struct Variant {
    inner: Arc<VariantInner>,
}

impl std::fmt::Debug for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variant").field("id", &self.inner.id).finish()
    }
}

impl Variant {
    pub(crate) fn new(shop: ShopApi, node: Node) -> Result<Self> {
        let id = VariantId::from(node.u64_field("id")?);
        let image_template = shop.config().image_url.clone();
        let images = match node.get("images") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_object)
                .map(|fields| {
                    Image::new(Node::from_fields(fields.clone()), image_template.clone())
                })
                .collect(),
            _ => Vec::new(),
        };
        Ok(Self {
            inner: Arc::new(VariantInner {
                shop,
                id,
                node,
                images,
                attributes: OnceCell::new(),
            }),
        })
    }

    #[must_use]
    pub fn id(&self) -> VariantId {
        self.inner.id
    }

    #[must_use]
    pub fn node(&self) -> &Node {
        &self.inner.node
    }

    #[must_use]
    pub fn images(&self) -> &[Image] {
        &self.inner.images
    }

    pub fn ean(&self) -> Result<&str> {
        self.inner.node.str_field("ean")
    }

    pub fn price(&self) -> Result<Price> {
        Ok(Price::from_cents(self.inner.node.i64_field("price")?))
    }

    /// The pre-discount price; zero when the variant was never discounted.
    pub fn old_price(&self) -> Result<Price> {
        Ok(Price::from_cents(self.inner.node.i64_field("old_price")?))
    }

    pub fn retail_price(&self) -> Result<Price> {
        Ok(Price::from_cents(self.inner.node.i64_field("retail_price")?))
    }

    pub fn quantity(&self) -> Result<u64> {
        self.inner.node.u64_field("quantity")
    }

    pub fn default(&self) -> Result<bool> {
        self.inner.node.bool_field("default")
    }

    fn datetime_field(&self, name: &str) -> Result<Option<NaiveDateTime>> {
        match self.inner.node.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) => Ok(Some(parse_datetime(raw)?)),
            Some(_) => Err(Error::Malformed(format!(
                "field {name:?} is not a string"
            ))),
        }
    }

    pub fn created_date(&self) -> Result<Option<NaiveDateTime>> {
        self.datetime_field("created_date")
    }

    pub fn updated_date(&self) -> Result<Option<NaiveDateTime>> {
        self.datetime_field("updated_date")
    }

    /// When this variant first became active.
    pub fn first_active_date(&self) -> Result<Option<NaiveDateTime>> {
        self.datetime_field("first_active_date")
    }

    /// When this variant goes on sale; `None` means immediately.
    pub fn first_sale_date(&self) -> Result<Option<NaiveDateTime>> {
        self.datetime_field("first_sale_date")
    }

    /// Facet attributes, resolved lazily against the client's facet index.
    /// Unknown facet ids resolve to placeholder facets.
    pub async fn attributes(&self) -> Result<&VariantAttributes> {
        self.inner
            .attributes
            .get_or_try_init(|| self.resolve_attributes())
            .await
    }

    async fn resolve_attributes(&self) -> Result<VariantAttributes> {
        let mut by_group = BTreeMap::new();
        let mut names = BTreeMap::new();
        for (key, value) in self.inner.node.fields() {
            let Some(raw_group_id) = key
                .strip_prefix("attributes_")
                .and_then(|suffix| suffix.parse::<u64>().ok())
            else {
                continue;
            };
            let group_id = FacetGroupId::from(raw_group_id);
            let facet_ids = value
                .as_array()
                .ok_or_else(|| Error::Malformed(format!("field {key:?} is not an array")))?;

            let group = self.inner.shop.facet_group(group_id).await?;
            let mut facets = Vec::with_capacity(facet_ids.len());
            for raw_id in facet_ids {
                let facet_id = raw_id.as_u64().ok_or_else(|| {
                    Error::Malformed(format!("field {key:?} holds a non-integer facet id"))
                })?;
                let facet = match &group {
                    Some(group) => group
                        .facet(facet_id)
                        .cloned()
                        .unwrap_or_else(|| Facet::placeholder(group_id, facet_id)),
                    None => Facet::placeholder(group_id, facet_id),
                };
                facets.push(facet);
            }
            if let Some(group) = &group {
                names.insert(group.name.clone(), facets.clone());
            }
            by_group.insert(raw_group_id, facets);
        }
        Ok(VariantAttributes { by_group, names })
    }

    /// Fetch live availability data for this variant.
    pub async fn live(&self) -> Result<Node> {
        let payload = self.inner.shop.api().live_variant(&[self.inner.id]).await?;
        let fields = payload
            .get(self.inner.id.to_string().as_str())
            .and_then(Value::as_object)
            .ok_or_else(|| {
                Error::Malformed(format!("live_variant payload missing {}", self.inner.id))
            })?;
        Node::new(fields.clone())
    }

    /// Derive a customized variant, e.g. for an engraving.
    #[must_use]
    pub fn customize(&self) -> CustomizedVariant {
        CustomizedVariant {
            variant: self.clone(),
            key: Uuid::new_v4(),
            additional_data: json!({ "description": "customized" }),
        }
    }
}

/// A variant plus per-customer data. Two customizations of the same
/// variant are distinct basket items, keyed by a fresh UUID.
#[derive(Debug, Clone)]
pub struct CustomizedVariant {
    variant: Variant,
    key: Uuid,
    additional_data: Value,
}

impl CustomizedVariant {
    #[must_use]
    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    #[must_use]
    pub fn key(&self) -> Uuid {
        self.key
    }

    #[must_use]
    pub fn additional_data(&self) -> &Value {
        &self.additional_data
    }

    /// Replace the additional data. The API requires a `description` key.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` when `data` lacks `description`.
    pub fn with_data(mut self, data: Value) -> Result<Self> {
        if data.get("description").is_none() {
            return Err(Error::InvalidArgument(
                "additional data needs a \"description\" entry".to_string(),
            ));
        }
        self.additional_data = data;
        Ok(self)
    }
}

// =============================================================================
// Product
// =============================================================================

struct ProductInner {
    shop: ShopApi,
    id: ProductId,
    fields: Mutex<Map<String, Value>>,
    variants: OnceCell<Vec<Variant>>,
    categories: OnceCell<Vec<Vec<Arc<Category>>>>,
    styles: OnceCell<Vec<Product>>,
    default_image: OnceCell<Option<Image>>,
    default_variant: OnceCell<Option<Variant>>,
}

/// A product of the shop. Cloning shares the underlying state, so a field
/// hydrated through one handle is visible through all.
#[derive(Clone)]
pub struct Product {
    inner: Arc<ProductInner>,
}

impl std::fmt::Debug for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Product").field("id", &self.inner.id).finish()
    }
}

impl Product {
    pub(crate) fn new(shop: ShopApi, fields: Map<String, Value>) -> Result<Self> {
        let node = Node::new(fields)?;
        let id = ProductId::from(node.u64_field("id")?);
        Ok(Self {
            inner: Arc::new(ProductInner {
                shop,
                id,
                fields: Mutex::new(node.fields().clone()),
                variants: OnceCell::new(),
                categories: OnceCell::new(),
                styles: OnceCell::new(),
                default_image: OnceCell::new(),
                default_variant: OnceCell::new(),
            }),
        })
    }

    #[must_use]
    pub fn id(&self) -> ProductId {
        self.inner.id
    }

    /// A snapshot of the currently loaded fields.
    pub async fn loaded_fields(&self) -> Map<String, Value> {
        self.inner.fields.lock().await.clone()
    }

    /// Read `name`, fetching it on demand when absent and `auto_fetch` is
    /// enabled. The fetch also pulls in the common detail fields.
    ///
    /// # Errors
    ///
    /// Returns `Error::FieldNotLoaded` when the field is absent and
    /// `auto_fetch` is disabled, or absent even after the fetch.
    pub async fn field(&self, name: &str) -> Result<Value> {
        self.field_with(name, true).await
    }

    /// Read `name` like [`Self::field`], but an on-demand fetch asks for
    /// `name` alone. Used by the derived accessors whose payloads are
    /// large (variants, styles, categories).
    async fn field_alone(&self, name: &str) -> Result<Value> {
        self.field_with(name, false).await
    }

    async fn field_with(&self, name: &str, bundled: bool) -> Result<Value> {
        if let Some(value) = self.inner.fields.lock().await.get(name) {
            return Ok(value.clone());
        }
        if !self.inner.shop.config().auto_fetch {
            return Err(Error::FieldNotLoaded(name.to_string()));
        }
        if bundled {
            self.hydrate(name).await?;
        } else {
            self.hydrate_fields(&[name]).await?;
        }
        self.inner
            .fields
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::FieldNotLoaded(name.to_string()))
    }

    /// Read `name` without triggering a fetch.
    pub async fn field_only(&self, name: &str) -> Result<Value> {
        self.inner
            .fields
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::FieldNotLoaded(name.to_string()))
    }

    /// Fetch `name` plus the common detail fields and merge them in.
    /// Remote data wins over previously loaded fields.
    async fn hydrate(&self, name: &str) -> Result<()> {
        let mut wanted: Vec<&str> = vec![name];
        for extra in HYDRATION_BUNDLE {
            if *extra != name {
                wanted.push(extra);
            }
        }
        self.hydrate_fields(&wanted).await
    }

    async fn hydrate_fields(&self, wanted: &[&str]) -> Result<()> {
        debug!(product_id = %self.inner.id, fields = ?wanted, "hydrating product");
        let payload = self
            .inner
            .shop
            .api()
            .products(&[self.inner.id], Some(wanted))
            .await?;
        let fresh = payload
            .get("ids")
            .and_then(|ids| ids.get(self.inner.id.to_string()))
            .and_then(Value::as_object)
            .ok_or_else(|| {
                Error::Malformed(format!("products payload missing {}", self.inner.id))
            })?;
        if fresh.contains_key("error_message") || fresh.contains_key("error_code") {
            // surfaces the remote error for this product id
            Node::new(fresh.clone())?;
        }

        let snapshot = {
            let mut fields = self.inner.fields.lock().await;
            for (key, value) in fresh {
                fields.insert(key.clone(), value.clone());
            }
            fields.clone()
        };
        self.inner
            .shop
            .cache_put_product(self.inner.id, &snapshot)
            .await;
        Ok(())
    }

    /// Merge externally fetched fields in, keeping the fresher remote data
    /// on conflicts.
    pub(crate) async fn merge_fields(&self, fresh: &Map<String, Value>) {
        let mut fields = self.inner.fields.lock().await;
        for (key, value) in fresh {
            fields.insert(key.clone(), value.clone());
        }
    }

    // ---------------------------------------------------------------------
    // Typed accessors
    // ---------------------------------------------------------------------

    pub async fn name(&self) -> Result<String> {
        let value = self.field(product_fields::NAME).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Malformed("field \"name\" is not a string".to_string()))
    }

    pub async fn active(&self) -> Result<bool> {
        let value = self.field(product_fields::ACTIVE).await?;
        value
            .as_bool()
            .ok_or_else(|| Error::Malformed("field \"active\" is not a boolean".to_string()))
    }

    pub async fn sale(&self) -> Result<bool> {
        let value = self.field(product_fields::SALE).await?;
        value
            .as_bool()
            .ok_or_else(|| Error::Malformed("field \"sale\" is not a boolean".to_string()))
    }

    pub async fn description_short(&self) -> Result<String> {
        let value = self.field(product_fields::DESCRIPTION_SHORT).await?;
        value.as_str().map(str::to_string).ok_or_else(|| {
            Error::Malformed("field \"description_short\" is not a string".to_string())
        })
    }

    pub async fn description_long(&self) -> Result<String> {
        let value = self.field(product_fields::DESCRIPTION_LONG).await?;
        value.as_str().map(str::to_string).ok_or_else(|| {
            Error::Malformed("field \"description_long\" is not a string".to_string())
        })
    }

    pub async fn min_price(&self) -> Result<Price> {
        let value = self.field(product_fields::MIN_PRICE).await?;
        value
            .as_i64()
            .map(Price::from_cents)
            .ok_or_else(|| Error::Malformed("field \"min_price\" is not an integer".to_string()))
    }

    pub async fn max_price(&self) -> Result<Price> {
        let value = self.field(product_fields::MAX_PRICE).await?;
        value
            .as_i64()
            .map(Price::from_cents)
            .ok_or_else(|| Error::Malformed("field \"max_price\" is not an integer".to_string()))
    }

    /// The shop URL of this product, built from the configured template
    /// and a slug of the product name.
    pub async fn url(&self) -> Result<String> {
        let name = self.name().await?;
        let slug: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        let slug = format!("{}-{}", slug.trim_matches('-'), self.inner.id);
        Ok(self.inner.shop.config().product_url.replace("{}", &slug))
    }

    /// All variants of this product.
    pub async fn variants(&self) -> Result<&[Variant]> {
        let variants = self
            .inner
            .variants
            .get_or_try_init(|| async {
                let value = self.field_alone(product_fields::VARIANTS).await?;
                let items = value.as_array().ok_or_else(|| {
                    Error::Malformed("field \"variants\" is not an array".to_string())
                })?;
                items
                    .iter()
                    .map(|item| {
                        let fields = item.as_object().ok_or_else(|| {
                            Error::Malformed("variant entry is not an object".to_string())
                        })?;
                        Variant::new(self.inner.shop.clone(), Node::new(fields.clone())?)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .await?;
        Ok(variants)
    }

    /// The default variant, when the API marks one.
    pub async fn default_variant(&self) -> Result<Option<&Variant>> {
        let variant = self
            .inner
            .default_variant
            .get_or_try_init(|| async {
                match self.field_alone(product_fields::DEFAULT_VARIANT).await {
                    Ok(Value::Object(fields)) => Ok(Some(Variant::new(
                        self.inner.shop.clone(),
                        Node::new(fields)?,
                    )?)),
                    Ok(Value::Null) | Err(Error::FieldNotLoaded(_)) => Ok(None),
                    Ok(_) => Err(Error::Malformed(
                        "field \"default_variant\" is not an object".to_string(),
                    )),
                    Err(e) => Err(e),
                }
            })
            .await?;
        Ok(variant.as_ref())
    }

    /// The default image, when the API provides one.
    pub async fn default_image(&self) -> Result<Option<&Image>> {
        let image = self
            .inner
            .default_image
            .get_or_try_init(|| async {
                match self.field_alone(product_fields::DEFAULT_IMAGE).await {
                    Ok(Value::Object(fields)) => Ok(Some(Image::new(
                        Node::new(fields)?,
                        self.inner.shop.config().image_url.clone(),
                    ))),
                    Ok(Value::Null) | Err(Error::FieldNotLoaded(_)) => Ok(None),
                    Ok(_) => Err(Error::Malformed(
                        "field \"default_image\" is not an object".to_string(),
                    )),
                    Err(e) => Err(e),
                }
            })
            .await?;
        Ok(image.as_ref())
    }

    /// The category paths this product belongs to, one path per category
    /// membership from root to leaf, resolved against the category tree.
    /// Prefers the app-scoped `categories.<app_id>` field. Ids the tree
    /// does not know are skipped.
    pub async fn categories(&self) -> Result<&[Vec<Arc<Category>>]> {
        let categories = self
            .inner
            .categories
            .get_or_try_init(|| async {
                let app_scoped = format!(
                    "{}.{}",
                    product_fields::CATEGORIES,
                    self.inner.shop.api().credentials().app_id
                );
                let value = match self.field_alone(&app_scoped).await {
                    Ok(value) => value,
                    Err(Error::FieldNotLoaded(_)) => {
                        self.field_alone(product_fields::CATEGORIES).await?
                    }
                    Err(e) => return Err(e),
                };
                let paths = value.as_array().ok_or_else(|| {
                    Error::Malformed("field \"categories\" is not an array".to_string())
                })?;

                let mut resolved = Vec::with_capacity(paths.len());
                for path in paths {
                    let ids = path.as_array().ok_or_else(|| {
                        Error::Malformed("category path is not an array".to_string())
                    })?;
                    let mut nodes = Vec::with_capacity(ids.len());
                    for raw in ids {
                        let id = raw.as_u64().ok_or_else(|| {
                            Error::Malformed("category path holds a non-integer id".to_string())
                        })?;
                        match self.inner.shop.category_by_id(CategoryId::from(id)).await {
                            Ok(category) => nodes.push(category),
                            Err(Error::NotFound(_)) => {
                                debug!(category_id = id, "product references unknown category");
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    if !nodes.is_empty() {
                        resolved.push(nodes);
                    }
                }
                Ok(resolved)
            })
            .await?;
        Ok(categories)
    }

    /// Sibling style products, e.g. the same shirt in other colors.
    pub async fn styles(&self) -> Result<&[Product]> {
        let styles = self
            .inner
            .styles
            .get_or_try_init(|| async {
                let value = self.field_alone(product_fields::STYLES).await?;
                let items = value.as_array().ok_or_else(|| {
                    Error::Malformed("field \"styles\" is not an array".to_string())
                })?;
                let mut styles = Vec::with_capacity(items.len());
                for item in items {
                    let fields = item.as_object().ok_or_else(|| {
                        Error::Malformed("style entry is not an object".to_string())
                    })?;
                    styles.push(Product::new(self.inner.shop.clone(), fields.clone())?);
                }
                Ok::<_, Error>(styles)
            })
            .await?;
        Ok(styles)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime() {
        let parsed = parse_datetime("2013-05-17 10:44:59").unwrap();
        assert_eq!(parsed.format(DATE_FORMAT).to_string(), "2013-05-17 10:44:59");
        assert!(parse_datetime("17.05.2013").is_err());
    }
}
