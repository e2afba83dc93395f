//! Typed views over raw API payloads.
//!
//! The API returns loosely shaped JSON objects. [`Node`] wraps one and
//! offers typed field access; the catalog types ([`Image`], [`Category`],
//! [`Facet`], [`FacetGroup`]) layer domain accessors on top.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use wavecart_core::{CategoryId, FacetGroupId, FacetValueId};

use crate::error::{Error, Result};

/// A raw API object with typed field accessors.
///
/// Absent fields surface as `Error::FieldNotLoaded`, present fields of the
/// wrong type as `Error::Malformed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    fields: Map<String, Value>,
}

impl Node {
    /// Wrap a payload object, rejecting embedded error payloads.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` when the object carries `error_message` or
    /// `error_code`.
    pub fn new(fields: Map<String, Value>) -> Result<Self> {
        if fields.contains_key("error_message") || fields.contains_key("error_code") {
            return Err(Error::Remote {
                code: fields.get("error_code").and_then(Value::as_i64),
                message: fields
                    .get("error_message")
                    .map(|m| match m {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| "unknown remote error".to_string()),
            });
        }
        Ok(Self { fields })
    }

    /// Wrap an object known to be error free.
    #[must_use]
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Raw access to a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The underlying object.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn required(&self, name: &str) -> Result<&Value> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::FieldNotLoaded(name.to_string()))
    }

    pub fn str_field(&self, name: &str) -> Result<&str> {
        self.required(name)?
            .as_str()
            .ok_or_else(|| Error::Malformed(format!("field \"{name}\" is not a string")))
    }

    pub fn u64_field(&self, name: &str) -> Result<u64> {
        self.required(name)?
            .as_u64()
            .ok_or_else(|| Error::Malformed(format!("field \"{name}\" is not an unsigned integer")))
    }

    pub fn i64_field(&self, name: &str) -> Result<i64> {
        self.required(name)?
            .as_i64()
            .ok_or_else(|| Error::Malformed(format!("field \"{name}\" is not an integer")))
    }

    pub fn bool_field(&self, name: &str) -> Result<bool> {
        self.required(name)?
            .as_bool()
            .ok_or_else(|| Error::Malformed(format!("field \"{name}\" is not a boolean")))
    }

    pub fn array_field(&self, name: &str) -> Result<&Vec<Value>> {
        self.required(name)?
            .as_array()
            .ok_or_else(|| Error::Malformed(format!("field \"{name}\" is not an array")))
    }

    pub fn map_field(&self, name: &str) -> Result<&Map<String, Value>> {
        self.required(name)?
            .as_object()
            .ok_or_else(|| Error::Malformed(format!("field \"{name}\" is not an object")))
    }
}

// =============================================================================
// Image
// =============================================================================

/// A product or variant image.
#[derive(Debug, Clone)]
pub struct Image {
    node: Node,
    url_template: String,
}

impl Image {
    pub(crate) fn new(node: Node, url_template: String) -> Self {
        Self { node, url_template }
    }

    pub fn hash(&self) -> Result<&str> {
        self.node.str_field("hash")
    }

    pub fn mime(&self) -> Result<&str> {
        self.node.str_field("mime")
    }

    /// Build the CDN URL for this image, optionally scaled. The template's
    /// `{}` is replaced with the image hash.
    pub fn url(&self, width: Option<u32>, height: Option<u32>) -> Result<String> {
        let mut url = self.url_template.replace("{}", self.hash()?);
        let mut separator = '?';
        if let Some(width) = width {
            url.push(separator);
            url.push_str(&format!("width={width}"));
            separator = '&';
        }
        if let Some(height) = height {
            url.push(separator);
            url.push_str(&format!("height={height}"));
        }
        Ok(url)
    }

    #[must_use]
    pub fn node(&self) -> &Node {
        &self.node
    }
}

// =============================================================================
// Category
// =============================================================================

/// A node of the category tree. Categories are built once per client and
/// shared via `Arc`.
#[derive(Debug)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub active: bool,
    pub parent: Option<CategoryId>,
    pub position: u64,
    node: Node,
    sub: Vec<Arc<Category>>,
}

impl Category {
    pub(crate) fn new(
        node: Node,
        parent: Option<CategoryId>,
        sub: Vec<Arc<Category>>,
    ) -> Result<Self> {
        Ok(Self {
            id: CategoryId::from(node.u64_field("id")?),
            name: node.str_field("name")?.to_string(),
            active: node.bool_field("active").unwrap_or(false),
            position: node.u64_field("position").unwrap_or(0),
            parent,
            node,
            sub,
        })
    }

    /// Direct subcategories, in API order.
    #[must_use]
    pub fn sub(&self) -> &[Arc<Category>] {
        &self.sub
    }

    #[must_use]
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Iterate over this category and all descendants, depth first,
    /// yielding `(level, category)` with this category at level 0.
    #[must_use]
    pub fn tree_iter(self: &Arc<Self>) -> CategoryTreeIter {
        CategoryTreeIter {
            stack: vec![(0, Arc::clone(self))],
        }
    }
}

/// Depth-first iterator over a category subtree.
pub struct CategoryTreeIter {
    stack: Vec<(usize, Arc<Category>)>,
}

impl Iterator for CategoryTreeIter {
    type Item = (usize, Arc<Category>);

    fn next(&mut self) -> Option<Self::Item> {
        let (level, category) = self.stack.pop()?;
        for child in category.sub().iter().rev() {
            self.stack.push((level + 1, Arc::clone(child)));
        }
        Some((level, category))
    }
}

// =============================================================================
// Facets
// =============================================================================

/// One facet value, e.g. the color "rot" within the color group.
#[derive(Debug, Clone)]
pub struct Facet {
    node: Node,
}

impl Facet {
    pub(crate) fn new(node: Node) -> Self {
        Self { node }
    }

    /// A stand-in for a facet id the index does not know. Carries
    /// `unknown_<id>` as name and value so callers can still render it.
    #[must_use]
    pub(crate) fn placeholder(group_id: FacetGroupId, facet_id: u64) -> Self {
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::from(facet_id));
        fields.insert("group_id".to_string(), Value::from(u64::from(group_id)));
        fields.insert("name".to_string(), Value::from(format!("unknown_{facet_id}")));
        fields.insert("value".to_string(), Value::from(format!("unknown_{facet_id}")));
        Self {
            node: Node::from_fields(fields),
        }
    }

    pub fn id(&self) -> Result<FacetValueId> {
        Ok(FacetValueId::from(self.node.u64_field("id")?))
    }

    pub fn group_id(&self) -> Result<FacetGroupId> {
        Ok(FacetGroupId::from(self.node.u64_field("group_id")?))
    }

    pub fn name(&self) -> Result<&str> {
        self.node.str_field("name")
    }

    /// Display value; falls back to the name when the API sends none.
    pub fn value(&self) -> Result<&str> {
        match self.node.str_field("value") {
            Err(Error::FieldNotLoaded(_)) => self.name(),
            other => other,
        }
    }

    #[must_use]
    pub fn node(&self) -> &Node {
        &self.node
    }
}

/// A facet group such as "color" or "brand", holding its values by facet id.
#[derive(Debug, Clone)]
pub struct FacetGroup {
    pub id: FacetGroupId,
    pub name: String,
    facets: BTreeMap<u64, Facet>,
}

impl FacetGroup {
    pub(crate) fn new(id: FacetGroupId, name: String) -> Self {
        Self {
            id,
            name,
            facets: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, facet_id: u64, facet: Facet) {
        self.facets.insert(facet_id, facet);
    }

    /// Look up a facet by id within this group.
    #[must_use]
    pub fn facet(&self, facet_id: u64) -> Option<&Facet> {
        self.facets.get(&facet_id)
    }

    /// All facets of this group in id order.
    pub fn facets(&self) -> impl Iterator<Item = &Facet> {
        self.facets.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.facets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }
}
