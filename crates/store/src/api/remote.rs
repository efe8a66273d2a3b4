//! The remote store seam.
//!
//! [`RemoteStore`] covers every backend operation the session gate, mirror
//! store, and mutation engine depend on. Keeping it a trait means those
//! components receive the remote as an explicit capability rather than
//! reaching for a global client, and tests can substitute a scripted mock.
//!
//! Catalog reads (products, categories, orders, reviews) are inherent
//! methods on [`ApiClient`](crate::api::ApiClient): they have no rollback
//! semantics and nothing else in the crate needs to intercept them.

use orchard_core::{CartLineId, Email, ProductId};

use crate::api::ApiError;
use crate::api::types::{CartLine, ProfileUpdate, RegisterData, User, WishlistEntry};
use crate::session::Session;

/// Backend operations required by the session gate and mutation engine.
///
/// Every method attaches the current session credential if one exists and
/// performs no side effects beyond the network call itself.
#[allow(async_fn_in_trait)]
pub trait RemoteStore: Send + Sync {
    // =========================================================================
    // Auth
    // =========================================================================

    /// Exchange credentials for a session.
    async fn login(&self, email: &Email, password: &str) -> Result<Session, ApiError>;

    /// Invalidate the current session server-side.
    async fn logout(&self) -> Result<(), ApiError>;

    /// Register a new account.
    async fn register(&self, data: &RegisterData) -> Result<(), ApiError>;

    /// Fetch the current user's profile.
    async fn fetch_me(&self) -> Result<User, ApiError>;

    /// Apply a partial profile update, returning the updated profile.
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError>;

    /// Request a password-reset email.
    async fn forgot_password(&self, email: &Email) -> Result<(), ApiError>;

    /// Complete a password reset.
    async fn reset_password(&self, uid: &str, token: &str, password: &str)
    -> Result<(), ApiError>;

    // =========================================================================
    // Cart
    // =========================================================================

    /// Fetch the caller's cart lines, creating the cart if none exists.
    async fn fetch_cart(&self) -> Result<Vec<CartLine>, ApiError>;

    /// Add a product to the cart, returning the authoritative line.
    async fn add_cart_item(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine, ApiError>;

    /// Set a cart line's quantity, returning the authoritative line.
    async fn update_cart_item(
        &self,
        line_id: CartLineId,
        quantity: u32,
    ) -> Result<CartLine, ApiError>;

    /// Remove a cart line.
    async fn remove_cart_item(&self, line_id: CartLineId) -> Result<(), ApiError>;

    // =========================================================================
    // Wishlist
    // =========================================================================

    /// Fetch the caller's wishlist entries.
    async fn fetch_wishlist(&self) -> Result<Vec<WishlistEntry>, ApiError>;

    /// Add a product to the wishlist.
    async fn add_wishlist_item(&self, product_id: ProductId) -> Result<(), ApiError>;

    /// Remove a product from the wishlist.
    async fn remove_wishlist_item(&self, product_id: ProductId) -> Result<(), ApiError>;
}
