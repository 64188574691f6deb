//! Client-held cart, the server cart, and checkout.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiError;
use crate::http::HttpClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    pub name: String,
    /// Unit price in the shop currency.
    pub price: f64,
    pub quantity: u32,
}

impl CartItem {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

/// Sum of `price * quantity`; zero for an empty list.
pub fn subtotal(items: &[CartItem]) -> f64 {
    items.iter().map(CartItem::line_total).sum()
}

pub fn format_price(amount: f64) -> String {
    format!("${amount:.2}")
}

/// Which list the cart page shows. The local cart wins whenever it has
/// anything in it; the two are never merged.
pub fn display_items<'a>(local: &'a [CartItem], server: &'a [CartItem]) -> &'a [CartItem] {
    if local.is_empty() { server } else { local }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalCart {
    items: Vec<CartItem>,
}

impl LocalCart {
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Adds an item, merging quantities with an existing line of the same id.
    pub fn add(&mut self, item: CartItem) {
        if item.quantity == 0 {
            return;
        }
        match self.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(item.quantity);
                existing.price = item.price;
            }
            None => self.items.push(item),
        }
    }

    /// Zero removes the line.
    pub fn set_quantity(&mut self, id: &str, quantity: u32) {
        if quantity == 0 {
            self.remove(id);
        } else if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            item.quantity = quantity;
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.items.retain(|i| i.id != id);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn subtotal(&self) -> f64 {
        subtotal(&self.items)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CartResponse {
    Wrapped { items: Vec<CartItem> },
    Bare(Vec<CartItem>),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    #[serde(alias = "checkout_url")]
    pub url: String,
    #[serde(default, alias = "session_id")]
    pub id: Option<String>,
}

pub async fn fetch_server_cart(client: &HttpClient) -> Result<Vec<CartItem>, ApiError> {
    let response: Option<CartResponse> = client.get_json("/cart").await?;
    Ok(match response {
        Some(CartResponse::Wrapped { items } | CartResponse::Bare(items)) => items,
        None => Vec::new(),
    })
}

pub async fn push_item(client: &HttpClient, item: &CartItem) -> Result<(), ApiError> {
    client.post_json::<_, serde_json::Value>("/cart", item).await?;
    Ok(())
}

pub async fn create_checkout_session(
    client: &HttpClient,
    items: &[CartItem],
) -> Result<CheckoutSession, ApiError> {
    let body = json!({
        "items": items
            .iter()
            .map(|i| json!({ "id": i.id, "quantity": i.quantity }))
            .collect::<Vec<_>>(),
    });
    client.post_json("/checkout/session", &body).await
}
