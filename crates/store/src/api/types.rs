//! Domain types for the storefront backend API.
//!
//! These types provide a clean, ergonomic API separate from the raw wire
//! payloads. Prices travel as decimal strings and are parsed into
//! [`Decimal`] once, at this boundary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use orchard_core::{
    CartId, CartLineId, CategoryId, Credential, OrderId, ProductId, ReviewId, UserId,
    WishlistEntryId,
};

// =============================================================================
// User Types
// =============================================================================

/// An authenticated user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID.
    pub id: UserId,
    /// Login name.
    pub username: String,
    /// Email address.
    pub email: String,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Last name.
    #[serde(default)]
    pub last_name: String,
}

/// Payload for registering a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterData {
    /// Desired login name.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Password (plain; verified server-side).
    pub password: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
}

/// Partial profile update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    /// New first name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// New last name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// New email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// =============================================================================
// Catalog Types
// =============================================================================

/// A product in the store. Read-only; sourced from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Plain text description.
    pub description: String,
    /// Unit price. Decimal string on the wire.
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// Units available.
    pub stock_quantity: u32,
    /// Owning category.
    pub category_id: CategoryId,
    /// Image URL, if any.
    #[serde(default)]
    pub image: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A product category. Categories with a `parent_id` are subcategories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Category ID.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// Parent category, if this is a subcategory.
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Cart Types
// =============================================================================

/// A line item in the user's cart.
///
/// The product is a denormalized snapshot taken when the line was fetched;
/// quantity is always at least 1 (a zero-quantity line is deleted, never
/// stored).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Server-assigned line ID. Negative IDs are provisional (optimistic
    /// lines awaiting reconciliation).
    pub id: CartLineId,
    /// Product snapshot.
    pub product: Product,
    /// Quantity, >= 1.
    pub quantity: u32,
    /// Line subtotal as reported by the backend.
    #[serde(default)]
    pub subtotal: Decimal,
}

/// The caller's cart as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartPayload {
    /// Cart ID.
    pub id: CartId,
    /// Line items.
    #[serde(default)]
    pub cart_items: Vec<CartLine>,
    /// Total quantity across lines.
    #[serde(default)]
    pub total_items: u32,
    /// Cart total as reported by the backend.
    #[serde(default)]
    pub total_price: Decimal,
}

// =============================================================================
// Wishlist Types
// =============================================================================

/// An entry in the user's wishlist. At most one per distinct product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistEntry {
    /// Server-assigned entry ID.
    pub id: WishlistEntryId,
    /// Product snapshot.
    pub product: Product,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

/// Raw wishlist payload.
///
/// The backend has been observed returning either a bare array of entries or
/// an object wrapping them; both shapes normalize to `Vec<WishlistEntry>`
/// here so the ambiguity never leaks past this boundary.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WishlistWire {
    Entries(Vec<WishlistEntry>),
    Object {
        #[serde(default)]
        wishlist_items: Vec<WishlistEntry>,
    },
}

impl WishlistWire {
    pub(crate) fn into_entries(self) -> Vec<WishlistEntry> {
        match self {
            Self::Entries(entries) => entries,
            Self::Object { wishlist_items } => wishlist_items,
        }
    }
}

// =============================================================================
// Order Types
// =============================================================================

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    /// Any status this client does not know about.
    #[serde(other)]
    Other,
}

/// A line item within an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Order item ID.
    pub id: CartLineId,
    /// Product snapshot.
    pub product: Product,
    /// Quantity ordered.
    pub quantity: u32,
    /// Line subtotal.
    #[serde(default)]
    pub subtotal: Decimal,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order ID.
    pub id: OrderId,
    /// Owning user.
    pub user: UserId,
    /// Lifecycle status.
    #[serde(rename = "order_status")]
    pub status: OrderStatus,
    /// Order total. Decimal string on the wire.
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amount: Decimal,
    /// Items in the order.
    #[serde(default)]
    pub items: Vec<OrderItem>,
    /// Total quantity across items.
    #[serde(default)]
    pub total_items: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Result of creating an order from the cart: the order itself plus the
/// external payment URL to hand the user off to, if payment is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutHandoff {
    /// The created order.
    pub order: Order,
    /// External payment URL, if payment is required.
    #[serde(default)]
    pub payment_url: Option<String>,
}

// =============================================================================
// Review Types
// =============================================================================

/// A product review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Review ID.
    pub id: ReviewId,
    /// Reviewed product.
    pub product: ProductId,
    /// Authoring user.
    pub user: UserId,
    /// Rating value.
    pub rating: u8,
    /// Free-form comment.
    pub comment: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp, if the review was edited.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Payload for creating or updating a review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewInput {
    /// Rating value.
    pub rating: u8,
    /// Free-form comment.
    pub comment: String,
}

// =============================================================================
// Wire-only payloads
// =============================================================================

/// Raw login response.
///
/// Some backend revisions return the token under `token`, others under
/// `access`; the user object may be absent entirely.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LoginWire {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

impl LoginWire {
    /// The bearer credential, whichever field carried it.
    pub(crate) fn credential(self) -> (Option<Credential>, Option<Credential>, Option<User>) {
        let token = self.token.or(self.access).map(Credential::new);
        let refresh = self.refresh.map(Credential::new);
        (token, refresh, self.user)
    }
}

/// Confirmation message returned by several mutation endpoints.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Message {
    #[allow(dead_code)]
    #[serde(default)]
    pub message: String,
}

/// Error body shape returned by the backend on failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        self.message.or(self.detail)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product_json() -> &'static str {
        r#"{
            "id": 1,
            "name": "Premium Headphones",
            "description": "High-quality wireless headphones.",
            "price": "129.99",
            "stock_quantity": 50,
            "category_id": 1,
            "created_at": "2023-01-15T10:30:00Z",
            "updated_at": "2023-01-15T10:30:00Z"
        }"#
    }

    #[test]
    fn test_product_price_parses_as_decimal() {
        let product: Product = serde_json::from_str(product_json()).unwrap();
        assert_eq!(product.price, Decimal::new(12999, 2));
        assert_eq!(product.stock_quantity, 50);
        assert_eq!(product.image, None);
    }

    #[test]
    fn test_wishlist_wire_accepts_bare_array() {
        let json = format!(
            r#"[{{"id": 1, "product": {}, "created_at": "2023-02-01T00:00:00Z"}}]"#,
            product_json()
        );
        let wire: WishlistWire = serde_json::from_str(&json).unwrap();
        let entries = wire.into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.first().unwrap().id, WishlistEntryId::new(1));
    }

    #[test]
    fn test_wishlist_wire_accepts_object_shape() {
        let json = format!(
            r#"{{"id": 9, "wishlist_items": [{{"id": 2, "product": {}, "created_at": "2023-02-01T00:00:00Z"}}]}}"#,
            product_json()
        );
        let wire: WishlistWire = serde_json::from_str(&json).unwrap();
        let entries = wire.into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.first().unwrap().id, WishlistEntryId::new(2));
    }

    #[test]
    fn test_login_wire_prefers_token_over_access() {
        let wire: LoginWire =
            serde_json::from_str(r#"{"token": "t1", "access": "t2"}"#).unwrap();
        let (token, refresh, user) = wire.credential();
        assert_eq!(token.unwrap().expose(), "t1");
        assert!(refresh.is_none());
        assert!(user.is_none());
    }

    #[test]
    fn test_login_wire_falls_back_to_access() {
        let wire: LoginWire =
            serde_json::from_str(r#"{"access": "jwt", "refresh": "r"}"#).unwrap();
        let (token, refresh, _) = wire.credential();
        assert_eq!(token.unwrap().expose(), "jwt");
        assert_eq!(refresh.unwrap().expose(), "r");
    }

    #[test]
    fn test_order_status_unknown_value() {
        let status: OrderStatus = serde_json::from_str(r#""backordered""#).unwrap();
        assert_eq!(status, OrderStatus::Other);
    }

    #[test]
    fn test_cart_payload_defaults() {
        let payload: CartPayload = serde_json::from_str(r#"{"id": 1}"#).unwrap();
        assert!(payload.cart_items.is_empty());
        assert_eq!(payload.total_items, 0);
        assert_eq!(payload.total_price, Decimal::ZERO);
    }
}
