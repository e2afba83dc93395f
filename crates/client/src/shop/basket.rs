//! Session baskets with client-side order line tracking.
//!
//! The API models a basket as a flat set of order lines, one line per unit.
//! [`Basket`] keeps the quantity view: it tracks which line ids belong to
//! which item and turns quantity changes into minimal set/remove calls.
//! Quantity reductions drop the most recently added lines first.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;
use wavecart_core::VariantId;

use crate::api::{BasketLine, new_line_id};
use crate::error::{Error, Result};
use crate::shop::ShopApi;
use crate::shop::product::{CustomizedVariant, Variant};

/// Identity of a basket item. Plain variants collapse into one entry per
/// variant id; customized variants stay distinct via their key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasketItemKey {
    Variant(VariantId),
    Custom(Uuid),
}

/// Something that can be put into a basket.
#[derive(Debug, Clone)]
pub enum BasketItem {
    Plain(Variant),
    Customized(CustomizedVariant),
}

impl BasketItem {
    #[must_use]
    pub fn key(&self) -> BasketItemKey {
        match self {
            Self::Plain(variant) => BasketItemKey::Variant(variant.id()),
            Self::Customized(custom) => BasketItemKey::Custom(custom.key()),
        }
    }

    #[must_use]
    pub fn variant_id(&self) -> VariantId {
        match self {
            Self::Plain(variant) => variant.id(),
            Self::Customized(custom) => custom.variant().id(),
        }
    }

    fn additional_data(&self) -> Option<Value> {
        match self {
            Self::Plain(_) => None,
            Self::Customized(custom) => Some(custom.additional_data().clone()),
        }
    }
}

impl From<Variant> for BasketItem {
    fn from(variant: Variant) -> Self {
        Self::Plain(variant)
    }
}

impl From<CustomizedVariant> for BasketItem {
    fn from(custom: CustomizedVariant) -> Self {
        Self::Customized(custom)
    }
}

/// Client-side view of a basket, shared by all handles for one session.
#[derive(Debug, Default)]
pub(crate) struct BasketState {
    /// Order line ids per item, in insertion order.
    line_ids: HashMap<BasketItemKey, Vec<String>>,
}

impl BasketState {
    fn quantity(&self, key: BasketItemKey) -> u64 {
        self.line_ids.get(&key).map_or(0, |ids| ids.len() as u64)
    }
}

/// Handle to the basket of one session id.
#[derive(Clone)]
pub struct Basket {
    shop: ShopApi,
    session_id: String,
    state: Arc<Mutex<BasketState>>,
}

impl std::fmt::Debug for Basket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Basket")
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl Basket {
    pub(crate) fn new(shop: ShopApi, session_id: String, state: Arc<Mutex<BasketState>>) -> Self {
        Self {
            shop,
            session_id,
            state,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The locally tracked quantity of an item.
    pub async fn quantity(&self, key: BasketItemKey) -> u64 {
        self.state.lock().await.quantity(key)
    }

    /// The locally tracked order line ids of an item, oldest first.
    pub async fn line_ids(&self, key: BasketItemKey) -> Vec<String> {
        self.state
            .lock()
            .await
            .line_ids
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// All locally tracked items with their quantities.
    pub async fn items(&self) -> Vec<(BasketItemKey, u64)> {
        self.state
            .lock()
            .await
            .line_ids
            .iter()
            .map(|(key, ids)| (*key, ids.len() as u64))
            .collect()
    }

    /// Fetch the raw server-side basket state.
    pub async fn fetch(&self) -> Result<Value> {
        let mut state = self.state.lock().await;
        let payload = self.shop.api().basket_get(&self.session_id).await?;
        reconcile(&mut state, &payload)?;
        Ok(payload)
    }

    /// Set the quantity of `item`, issuing the minimal API calls to get
    /// there. Returns the raw basket payload of the final call.
    ///
    /// # Errors
    ///
    /// Besides transport and remote errors, returns
    /// `Error::BasketPartialFailure` when the server rejected individual
    /// order lines; the rejected lines are dropped from local tracking.
    pub async fn set(&self, item: impl Into<BasketItem>, quantity: u64) -> Result<Value> {
        let item = item.into();
        let mut state = self.state.lock().await;
        self.apply(&mut state, item, quantity).await
    }

    /// Add `quantity` units of `item` on top of the current quantity.
    pub async fn add(&self, item: impl Into<BasketItem>, quantity: u64) -> Result<Value> {
        let item = item.into();
        let mut state = self.state.lock().await;
        let current = state.quantity(item.key());
        self.apply(&mut state, item, current + quantity).await
    }

    /// The read-diff-call-update sequence behind [`Self::set`] and
    /// [`Self::add`]. Runs under the per-basket lock; concurrent
    /// mutations of one session serialize here.
    #[instrument(skip(self, state, item), fields(session_id = %self.session_id))]
    async fn apply(
        &self,
        state: &mut BasketState,
        item: BasketItem,
        quantity: u64,
    ) -> Result<Value> {
        let key = item.key();
        let current = state.quantity(key);
        debug!(current, target = quantity, "adjusting basket quantity");

        let payload = if quantity == 0 {
            if current == 0 {
                self.shop.api().basket_get(&self.session_id).await?
            } else {
                let removed = state.line_ids.remove(&key).unwrap_or_default();
                match self.shop.api().basket_remove(&self.session_id, &removed).await {
                    Ok(payload) => payload,
                    Err(e) => {
                        // the server may still hold the lines; restore them
                        state.line_ids.insert(key, removed);
                        return Err(e);
                    }
                }
            }
        } else if quantity > current {
            let added = quantity - current;
            let fresh: Vec<String> = (0..added).map(|_| new_line_id()).collect();
            let lines: Vec<BasketLine> = fresh
                .iter()
                .map(|id| {
                    let mut line = BasketLine::new(id.clone(), item.variant_id());
                    if let Some(data) = item.additional_data() {
                        line = line.with_additional_data(data);
                    }
                    line
                })
                .collect();
            let payload = self.shop.api().basket_set(&self.session_id, &lines).await?;
            state.line_ids.entry(key).or_default().extend(fresh);
            payload
        } else if quantity < current {
            let removed: Vec<String> = {
                let ids = state.line_ids.entry(key).or_default();
                // drop the newest lines first
                let keep = ids.len() - (current - quantity) as usize;
                ids.split_off(keep)
            };
            match self.shop.api().basket_remove(&self.session_id, &removed).await {
                Ok(payload) => payload,
                Err(e) => {
                    state.line_ids.entry(key).or_default().extend(removed);
                    return Err(e);
                }
            }
        } else {
            self.shop.api().basket_get(&self.session_id).await?
        };

        reconcile(state, &payload)?;
        Ok(payload)
    }

    /// Remove the item entirely.
    pub async fn remove(&self, key: BasketItemKey) -> Result<Value> {
        let mut state = self.state.lock().await;
        let removed = state.line_ids.remove(&key).unwrap_or_default();
        if removed.is_empty() {
            return self.shop.api().basket_get(&self.session_id).await;
        }
        let payload = match self.shop.api().basket_remove(&self.session_id, &removed).await {
            Ok(payload) => payload,
            Err(e) => {
                state.line_ids.insert(key, removed);
                return Err(e);
            }
        };
        reconcile(&mut state, &payload)?;
        Ok(payload)
    }

    /// Begin the order process and return the checkout URL to redirect
    /// the customer to.
    pub async fn checkout(
        &self,
        success_url: &str,
        cancel_url: Option<&str>,
        error_url: Option<&str>,
    ) -> Result<String> {
        self.shop
            .api()
            .order(&self.session_id, success_url, cancel_url, error_url)
            .await
    }

    /// Drop the basket: remove every order line the server still holds,
    /// then forget the session locally. The API has no dispose command, so
    /// this is a get followed by a remove of all reported line ids.
    pub async fn dispose(self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            let payload = self.shop.api().basket_get(&self.session_id).await?;
            let ids: Vec<String> = payload
                .get("order_lines")
                .and_then(Value::as_array)
                .map(|lines| {
                    lines
                        .iter()
                        .filter_map(|line| line.get("id").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if !ids.is_empty() {
                self.shop.api().basket_remove(&self.session_id, &ids).await?;
            }
            state.line_ids.clear();
        }
        self.shop.forget_basket(&self.session_id).await;
        Ok(())
    }
}

/// Fold a basket payload back into local tracking: drop line ids the
/// server rejected and surface the failures.
fn reconcile(state: &mut BasketState, payload: &Value) -> Result<()> {
    let Some(order_lines) = payload.get("order_lines").and_then(Value::as_array) else {
        return Ok(());
    };
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    let mut failed_ids = Vec::new();
    for line in order_lines {
        let has_error = line
            .as_object()
            .is_some_and(|l| l.contains_key("error_message") || l.contains_key("error_code"));
        if has_error {
            if let Some(id) = line.get("id").and_then(Value::as_str) {
                failed_ids.push(id.to_string());
            }
            failed.push(line.clone());
        } else {
            succeeded.push(line.clone());
        }
    }
    if failed.is_empty() {
        return Ok(());
    }

    debug!(failed = failed.len(), "basket order lines rejected");
    for ids in state.line_ids.values_mut() {
        ids.retain(|id| !failed_ids.contains(id));
    }
    state.line_ids.retain(|_, ids| !ids.is_empty());
    Err(Error::BasketPartialFailure { succeeded, failed })
}

/// Extract the total basket price from a raw basket payload.
pub fn total_price(payload: &Value) -> Option<wavecart_core::Price> {
    payload
        .get("total_price")
        .and_then(Value::as_i64)
        .map(wavecart_core::Price::from_cents)
}

/// Extract the order lines from a raw basket payload.
#[must_use]
pub fn order_lines(payload: &Value) -> Vec<Map<String, Value>> {
    payload
        .get("order_lines")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(Value::as_object)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_state_quantity_tracks_line_ids() {
        let mut state = BasketState::default();
        let key = BasketItemKey::Variant(VariantId::from(7));
        assert_eq!(state.quantity(key), 0);

        state
            .line_ids
            .insert(key, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(state.quantity(key), 2);
    }

    #[test]
    fn test_custom_keys_do_not_collide() {
        let a = BasketItemKey::Custom(Uuid::new_v4());
        let b = BasketItemKey::Custom(Uuid::new_v4());
        assert_ne!(a, b);
    }

    #[test]
    fn test_payload_helpers() {
        let payload = serde_json::json!({
            "total_price": 4470,
            "order_lines": [{ "id": "a", "variant_id": 7 }]
        });
        assert_eq!(
            total_price(&payload),
            Some(wavecart_core::Price::from_cents(4470))
        );
        assert_eq!(order_lines(&payload).len(), 1);
    }
}
