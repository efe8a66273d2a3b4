//! The assembled storefront client.
//!
//! [`Storefront`] wires the API client, session gate, mirror, and sync
//! engine into one handle an application embeds. Cheaply cloneable; all
//! clones share the same session and local state.

use std::sync::Arc;

use tracing::instrument;

use orchard_core::{CartLineId, CategoryId, OrderId, ProductId, ReviewId};

use crate::api::types::{
    CartLine, Category, CheckoutHandoff, Order, Product, ProfileUpdate, RegisterData, Review,
    ReviewInput, User, WishlistEntry,
};
use crate::api::ApiClient;
use crate::catalog::{self, CategoryNode, FilterCriteria};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::mirror::{Mirror, MirrorDelta, MirrorStore};
use crate::session::{SessionGate, SessionHandle};
use crate::storage::{DeviceStorage, JsonFileStorage};
use crate::sync::SyncEngine;
use crate::views::{self, CartTotals};

/// A complete storefront client over one backend.
#[derive(Clone)]
pub struct Storefront {
    api: ApiClient,
    session: SessionHandle,
    mirror: MirrorStore,
    engine: SyncEngine<ApiClient>,
    gate: SessionGate<ApiClient>,
}

impl Storefront {
    /// Build a storefront with file-backed storage under the configured
    /// data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory or HTTP client cannot be set
    /// up.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let storage: Arc<dyn DeviceStorage> = Arc::new(JsonFileStorage::new(&config.data_dir)?);
        Self::with_storage(config, storage)
    }

    /// Build a storefront over explicit device storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_storage(config: &StoreConfig, storage: Arc<dyn DeviceStorage>) -> Result<Self> {
        let session = SessionHandle::new();
        let api = ApiClient::new(config, session.clone())?;
        let mirror = MirrorStore::new(Arc::clone(&storage), session.clone());
        let engine = SyncEngine::new(api.clone(), mirror.clone(), session.clone());
        let gate = SessionGate::new(api.clone(), session.clone(), storage, mirror.clone());

        Ok(Self {
            api,
            session,
            mirror,
            engine,
            gate,
        })
    }

    /// Build a storefront from `ORCHARD_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment holds invalid values or setup
    /// fails.
    pub fn from_env() -> Result<Self> {
        let config = StoreConfig::from_env()?;
        Self::new(&config)
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Log in and load the user's cart and wishlist.
    ///
    /// # Errors
    ///
    /// See [`SessionGate::login`].
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        Ok(self.gate.login(email, password).await?)
    }

    /// Log out, destroying the session and local mirror.
    ///
    /// # Errors
    ///
    /// See [`SessionGate::logout`].
    pub async fn logout(&self) -> Result<()> {
        Ok(self.gate.logout().await?)
    }

    /// Restore a persisted session, if one exists.
    ///
    /// # Errors
    ///
    /// See [`SessionGate::restore`].
    pub async fn restore_session(&self) -> Result<Option<User>> {
        Ok(self.gate.restore().await?)
    }

    /// Re-validate the session against the backend.
    ///
    /// # Errors
    ///
    /// See [`SessionGate::refresh`].
    pub async fn refresh_session(&self) -> Result<User> {
        Ok(self.gate.refresh().await?)
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// See [`SessionGate::register`].
    pub async fn register(&self, data: &RegisterData) -> Result<()> {
        Ok(self.gate.register(data).await?)
    }

    /// Update the authenticated user's profile.
    ///
    /// # Errors
    ///
    /// See [`SessionGate::update_profile`].
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        Ok(self.gate.update_profile(update).await?)
    }

    /// Request a password reset email.
    ///
    /// # Errors
    ///
    /// See [`SessionGate::forgot_password`].
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        Ok(self.gate.forgot_password(email).await?)
    }

    /// Complete a password reset.
    ///
    /// # Errors
    ///
    /// See [`SessionGate::reset_password`].
    pub async fn reset_password(&self, uid: &str, token: &str, password: &str) -> Result<()> {
        Ok(self.gate.reset_password(uid, token, password).await?)
    }

    /// The authenticated user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.session.user()
    }

    /// Whether a session is present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// All products, unfiltered.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn products(&self) -> Result<Vec<Product>> {
        Ok(self.api.products().await?)
    }

    /// Products narrowed and ordered by the given criteria.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn filtered_products(&self, criteria: &FilterCriteria) -> Result<Vec<Product>> {
        let products = self.api.products().await?;
        Ok(criteria.apply(products))
    }

    /// A single product.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found or the request fails.
    pub async fn product(&self, id: ProductId) -> Result<Product> {
        Ok(self.api.product(id).await?)
    }

    /// Free-text product search.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn search_products(&self, query: &str) -> Result<Vec<Product>> {
        Ok(self.api.search_products(query).await?)
    }

    /// All categories, flat.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.api.categories().await?)
    }

    /// All categories as a parent/child tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn category_tree(&self) -> Result<Vec<CategoryNode>> {
        let categories = self.api.categories().await?;
        Ok(catalog::build_category_tree(categories))
    }

    /// Direct subcategories of a category.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn subcategories(&self, id: CategoryId) -> Result<Vec<Category>> {
        Ok(self.api.subcategories(id).await?)
    }

    /// Products belonging to a category.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn category_products(&self, id: CategoryId) -> Result<Vec<Product>> {
        Ok(self.api.category_products(id).await?)
    }

    // =========================================================================
    // Cart and wishlist
    // =========================================================================

    /// Snapshot of the local cart.
    pub async fn cart(&self) -> Vec<CartLine> {
        self.mirror.cart().await
    }

    /// Totals over the local cart.
    pub async fn cart_totals(&self) -> CartTotals {
        views::cart_totals(&self.mirror.cart().await)
    }

    /// Snapshot of the local wishlist.
    pub async fn wishlist(&self) -> Vec<WishlistEntry> {
        self.mirror.wishlist().await
    }

    /// Whether a product is on the local wishlist. Always `false` when
    /// unauthenticated.
    pub async fn is_in_wishlist(&self, product_id: ProductId) -> bool {
        self.session.is_authenticated() && self.mirror.snapshot().await.wishlist_contains(product_id)
    }

    /// Add a product to the cart.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::add_to_cart`].
    pub async fn add_to_cart(&self, product: &Product, quantity: u32) -> Result<Mirror> {
        Ok(self.engine.add_to_cart(product, quantity).await?)
    }

    /// Set a cart line's quantity; zero removes it.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::set_quantity`].
    pub async fn set_quantity(&self, line_id: CartLineId, quantity: u32) -> Result<Mirror> {
        Ok(self.engine.set_quantity(line_id, quantity).await?)
    }

    /// Remove a cart line.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::remove_line`].
    pub async fn remove_line(&self, line_id: CartLineId) -> Result<Mirror> {
        Ok(self.engine.remove_line(line_id).await?)
    }

    /// Add a product to the wishlist.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::add_to_wishlist`].
    pub async fn add_to_wishlist(&self, product: &Product) -> Result<Mirror> {
        Ok(self.engine.add_to_wishlist(product).await?)
    }

    /// Remove a product from the wishlist.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::remove_from_wishlist`].
    pub async fn remove_from_wishlist(&self, product_id: ProductId) -> Result<Mirror> {
        Ok(self.engine.remove_from_wishlist(product_id).await?)
    }

    /// Move a wishlisted product into the cart.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::move_to_cart`].
    pub async fn move_to_cart(&self, product_id: ProductId) -> Result<Mirror> {
        Ok(self.engine.move_to_cart(product_id).await?)
    }

    /// Reload cart and wishlist from the backend.
    pub async fn refresh_mirror(&self) {
        self.engine.refresh().await;
    }

    // =========================================================================
    // Orders and reviews
    // =========================================================================

    /// The authenticated user's orders.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn orders(&self) -> Result<Vec<Order>> {
        Ok(self.api.orders().await?)
    }

    /// A single order.
    ///
    /// # Errors
    ///
    /// Returns an error if the order is not found or the request fails.
    pub async fn order(&self, id: OrderId) -> Result<Order> {
        Ok(self.api.order(id).await?)
    }

    /// Create an order from the cart. The cart is consumed on success, so
    /// the local cart is emptied.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart is empty or the request fails.
    #[instrument(skip(self))]
    pub async fn checkout(&self) -> Result<CheckoutHandoff> {
        let handoff = self.api.create_order_from_cart().await?;
        self.mirror.apply(MirrorDelta::CartReplaced(Vec::new())).await;
        Ok(handoff)
    }

    /// Cancel an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the order cannot be cancelled.
    pub async fn cancel_order(&self, id: OrderId) -> Result<()> {
        Ok(self.api.cancel_order(id).await?)
    }

    /// Reviews for a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn reviews(&self, product_id: ProductId) -> Result<Vec<Review>> {
        Ok(self.api.reviews(product_id).await?)
    }

    /// Create a review.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn create_review(
        &self,
        product_id: ProductId,
        input: &ReviewInput,
    ) -> Result<Review> {
        Ok(self.api.create_review(product_id, input).await?)
    }

    /// Update a review.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn update_review(
        &self,
        product_id: ProductId,
        review_id: ReviewId,
        input: &ReviewInput,
    ) -> Result<Review> {
        Ok(self.api.update_review(product_id, review_id, input).await?)
    }

    /// Delete a review.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn delete_review(&self, product_id: ProductId, review_id: ReviewId) -> Result<()> {
        Ok(self.api.delete_review(product_id, review_id).await?)
    }
}
