//! Backend REST API client.
//!
//! # Architecture
//!
//! - The backend is the source of truth for all catalog and per-user state;
//!   this client issues direct JSON calls and normalizes responses into the
//!   typed shapes in [`types`]
//! - Bearer credential is read from the shared [`SessionHandle`] per request
//!   and attached when present
//! - Read-only catalog responses are cached in-memory via `moka` (5-minute
//!   TTL by default); per-user state is never cached
//! - Every request is bounded by the configured timeout; transport failures
//!   and timeouts surface as [`ApiError::NetworkUnavailable`]

mod cache;
pub mod remote;
pub mod types;

pub use remote::RemoteStore;

use std::sync::Arc;

use moka::future::Cache;
use reqwest::RequestBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use orchard_core::{CartLineId, CategoryId, Credential, Email, OrderId, ProductId, ReviewId, UserId};

use crate::config::{ConfigError, StoreConfig};
use crate::session::{Session, SessionHandle};
use cache::CacheValue;
use types::{
    CartLine, CartPayload, Category, CheckoutHandoff, ErrorBody, LoginWire, Message, Order,
    Product, ProfileUpdate, RegisterData, Review, ReviewInput, User, WishlistEntry, WishlistWire,
};

/// Errors returned by backend API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Referenced resource absent server-side.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing, invalid, or insufficient credential.
    #[error("unauthorized")]
    Unauthorized,

    /// The server rejected the payload shape or values.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Transport failure or timeout.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// 5xx or otherwise unexpected status.
    #[error("server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Response body failed to parse.
    #[error("malformed response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Response parsed but is missing required data.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::NetworkUnavailable(err.to_string())
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the storefront backend REST API.
///
/// Cheaply cloneable; all clones share one HTTP connection pool, one catalog
/// cache, and one session handle.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    base_url: String,
    session: SessionHandle,
    cache: Cache<String, CacheValue>,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::HttpClient` if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(config: &StoreConfig, session: SessionHandle) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(config.cache_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                http,
                base_url: config.api_base_url.as_str().trim_end_matches('/').to_string(),
                session,
                cache,
            }),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.inner.base_url)
    }

    /// Attach the current session credential, if any.
    fn apply_auth(&self, req: RequestBuilder) -> RequestBuilder {
        match self.inner.session.credential() {
            Some(cred) => req.bearer_auth(cred.expose()),
            None => req,
        }
    }

    /// Send a request and decode a JSON body.
    async fn send<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        path: &str,
    ) -> Result<T, ApiError> {
        let text = self.send_raw(req, path).await?;
        serde_json::from_str(&text).map_err(|e| {
            warn!(
                path,
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "failed to parse backend response"
            );
            ApiError::Parse(e)
        })
    }

    /// Send a request, discarding any success body.
    async fn send_unit(&self, req: RequestBuilder, path: &str) -> Result<(), ApiError> {
        self.send_raw(req, path).await.map(|_| ())
    }

    /// Send a request and return the success body as text.
    async fn send_raw(&self, req: RequestBuilder, path: &str) -> Result<String, ApiError> {
        let response = req.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        if (200..300).contains(&status) {
            Ok(text)
        } else {
            Err(status_error(status, path, &text))
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let req = self.apply_auth(self.inner.http.get(self.endpoint(path)));
        self.send(req, path).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let req = self.apply_auth(self.inner.http.post(self.endpoint(path)).json(body));
        self.send(req, path).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let req = self.apply_auth(self.inner.http.post(self.endpoint(path)));
        self.send(req, path).await
    }

    async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let req = self.apply_auth(self.inner.http.patch(self.endpoint(path)).json(body));
        self.send(req, path).await
    }

    async fn delete_with<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let req = self.apply_auth(self.inner.http.delete(self.endpoint(path)).json(body));
        self.send_unit(req, path).await
    }

    // =========================================================================
    // Product Methods
    // =========================================================================

    /// List all products.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn products(&self) -> Result<Vec<Product>, ApiError> {
        let cache_key = "products".to_string();

        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let products: Vec<Product> = self.get("/api/products/").await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(products.clone()))
            .await;

        Ok(products)
    }

    /// Get a single product.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found or the API request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: ProductId) -> Result<Product, ApiError> {
        let cache_key = format!("product:{id}");

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product: Product = self.get(&format!("/api/products/{id}/")).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    /// Search products by free-text query. Search results are not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn search_products(&self, query: &str) -> Result<Vec<Product>, ApiError> {
        let req = self.apply_auth(
            self.inner
                .http
                .get(self.endpoint("/api/products/"))
                .query(&[("search", query)]),
        );
        self.send(req, "/api/products/").await
    }

    // =========================================================================
    // Category Methods
    // =========================================================================

    /// List all categories (top-level and subcategories alike).
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        let cache_key = "categories".to_string();

        if let Some(CacheValue::Categories(categories)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories: Vec<Category> = self.get("/api/categories/").await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Categories(categories.clone()))
            .await;

        Ok(categories)
    }

    /// Get a single category.
    ///
    /// # Errors
    ///
    /// Returns an error if the category is not found or the API request fails.
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn category(&self, id: CategoryId) -> Result<Category, ApiError> {
        let cache_key = format!("category:{id}");

        if let Some(CacheValue::Category(category)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for category");
            return Ok(*category);
        }

        let category: Category = self.get(&format!("/api/categories/{id}/")).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Category(Box::new(category.clone())))
            .await;

        Ok(category)
    }

    /// List a category's direct subcategories.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn subcategories(&self, id: CategoryId) -> Result<Vec<Category>, ApiError> {
        let cache_key = format!("subcategories:{id}");

        if let Some(CacheValue::Categories(categories)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for subcategories");
            return Ok(categories);
        }

        let categories: Vec<Category> =
            self.get(&format!("/api/categories/{id}/subcategories/")).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Categories(categories.clone()))
            .await;

        Ok(categories)
    }

    /// List the products belonging to a category.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn category_products(&self, id: CategoryId) -> Result<Vec<Product>, ApiError> {
        let cache_key = format!("category-products:{id}");

        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for category products");
            return Ok(products);
        }

        let products: Vec<Product> = self.get(&format!("/api/categories/{id}/products/")).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(products.clone()))
            .await;

        Ok(products)
    }

    // =========================================================================
    // Order Methods (not cached - per-user state)
    // =========================================================================

    /// List the caller's orders.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn orders(&self) -> Result<Vec<Order>, ApiError> {
        self.get("/api/orders/").await
    }

    /// Get a single order.
    ///
    /// # Errors
    ///
    /// Returns an error if the order is not found or the API request fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn order(&self, id: OrderId) -> Result<Order, ApiError> {
        self.get(&format!("/api/orders/{id}/")).await
    }

    /// Create an order from the caller's cart. The cart is consumed
    /// server-side on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart is empty or the API request fails.
    #[instrument(skip(self))]
    pub async fn create_order_from_cart(&self) -> Result<CheckoutHandoff, ApiError> {
        self.post_empty("/api/orders/create_from_cart/").await
    }

    /// Cancel an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the order cannot be cancelled or the API request
    /// fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn cancel_order(&self, id: OrderId) -> Result<(), ApiError> {
        let path = format!("/api/orders/{id}/cancel_order/");
        let req = self.apply_auth(self.inner.http.post(self.endpoint(&path)));
        self.send_unit(req, &path).await
    }

    // =========================================================================
    // Review Methods
    // =========================================================================

    /// List reviews for a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn reviews(&self, product_id: ProductId) -> Result<Vec<Review>, ApiError> {
        self.get(&format!("/api/products/{product_id}/reviews/")).await
    }

    /// Create a review for a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, input), fields(product_id = %product_id))]
    pub async fn create_review(
        &self,
        product_id: ProductId,
        input: &ReviewInput,
    ) -> Result<Review, ApiError> {
        self.post(&format!("/api/products/{product_id}/reviews/"), input)
            .await
    }

    /// Update an existing review.
    ///
    /// # Errors
    ///
    /// Returns an error if the review is not found or the API request fails.
    #[instrument(skip(self, input), fields(product_id = %product_id, review_id = %review_id))]
    pub async fn update_review(
        &self,
        product_id: ProductId,
        review_id: ReviewId,
        input: &ReviewInput,
    ) -> Result<Review, ApiError> {
        let path = format!("/api/products/{product_id}/reviews/{review_id}/");
        let req = self.apply_auth(self.inner.http.put(self.endpoint(&path)).json(input));
        self.send(req, &path).await
    }

    /// Delete a review.
    ///
    /// # Errors
    ///
    /// Returns an error if the review is not found or the API request fails.
    #[instrument(skip(self), fields(product_id = %product_id, review_id = %review_id))]
    pub async fn delete_review(
        &self,
        product_id: ProductId,
        review_id: ReviewId,
    ) -> Result<(), ApiError> {
        let path = format!("/api/products/{product_id}/reviews/{review_id}/");
        let req = self.apply_auth(self.inner.http.delete(self.endpoint(&path)));
        self.send_unit(req, &path).await
    }

    // =========================================================================
    // Cache Management
    // =========================================================================

    /// Invalidate all cached catalog data.
    pub async fn invalidate_catalog(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }

    /// Fetch the profile for an explicit credential, bypassing the session
    /// handle. Used during login before the session is stored.
    async fn me_with(&self, credential: &Credential) -> Result<User, ApiError> {
        let req = self
            .inner
            .http
            .get(self.endpoint("/auth/me"))
            .bearer_auth(credential.expose());
        self.send(req, "/auth/me").await
    }
}

// =============================================================================
// RemoteStore implementation
// =============================================================================

impl RemoteStore for ApiClient {
    #[instrument(skip(self, password), fields(email = %email))]
    async fn login(&self, email: &Email, password: &str) -> Result<Session, ApiError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let wire: LoginWire = self.post("/auth/login", &body).await?;

        let (credential, refresh, user) = wire.credential();
        let credential = credential.ok_or_else(|| {
            ApiError::UnexpectedResponse("login response carried no token".to_string())
        })?;

        // The login endpoint does not reliably return the user; fall back to
        // /auth/me, then to a minimal profile derived from the email.
        let user = match user {
            Some(user) => user,
            None => match self.me_with(&credential).await {
                Ok(user) => user,
                Err(err) => {
                    debug!(error = %err, "profile fetch after login failed, deriving from email");
                    User {
                        id: UserId::new(0),
                        username: email.local_part().to_string(),
                        email: email.as_str().to_string(),
                        first_name: String::new(),
                        last_name: String::new(),
                    }
                }
            },
        };

        Ok(Session {
            credential,
            refresh,
            user,
        })
    }

    #[instrument(skip(self))]
    async fn logout(&self) -> Result<(), ApiError> {
        let req = self.apply_auth(self.inner.http.post(self.endpoint("/auth/logout/")));
        self.send_unit(req, "/auth/logout/").await
    }

    #[instrument(skip(self, data))]
    async fn register(&self, data: &RegisterData) -> Result<(), ApiError> {
        let _: Message = self.post("/auth/register", data).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_me(&self) -> Result<User, ApiError> {
        self.get("/auth/me").await
    }

    #[instrument(skip(self, update))]
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.patch("/auth/update_profile", update).await
    }

    #[instrument(skip(self), fields(email = %email))]
    async fn forgot_password(&self, email: &Email) -> Result<(), ApiError> {
        let body = serde_json::json!({ "email": email });
        let _: Message = self.post("/auth/forgot_password/", &body).await?;
        Ok(())
    }

    #[instrument(skip(self, token, password))]
    async fn reset_password(
        &self,
        uid: &str,
        token: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({ "password": password });
        let _: Message = self
            .post(&format!("/auth/reset_password/{uid}/{token}/"), &body)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_cart(&self) -> Result<Vec<CartLine>, ApiError> {
        // A user without a cart gets one created on first access.
        let payload: CartPayload = match self.get("/api/carts/").await {
            Ok(payload) => payload,
            Err(ApiError::NotFound(_)) => self.post_empty("/api/carts/").await?,
            Err(err) => return Err(err),
        };
        Ok(payload.cart_items)
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn add_cart_item(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine, ApiError> {
        let body = serde_json::json!({ "product_id": product_id, "quantity": quantity });
        self.post("/api/carts/add_item/", &body).await
    }

    #[instrument(skip(self), fields(line_id = %line_id))]
    async fn update_cart_item(
        &self,
        line_id: CartLineId,
        quantity: u32,
    ) -> Result<CartLine, ApiError> {
        let body = serde_json::json!({ "cart_item_id": line_id, "quantity": quantity });
        self.post("/api/carts/update_item/", &body).await
    }

    #[instrument(skip(self), fields(line_id = %line_id))]
    async fn remove_cart_item(&self, line_id: CartLineId) -> Result<(), ApiError> {
        let body = serde_json::json!({ "cart_item_id": line_id });
        self.delete_with("/api/carts/remove_item/", &body).await
    }

    #[instrument(skip(self))]
    async fn fetch_wishlist(&self) -> Result<Vec<WishlistEntry>, ApiError> {
        let wire: WishlistWire = self.get("/api/wishlist/").await?;
        Ok(wire.into_entries())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn add_wishlist_item(&self, product_id: ProductId) -> Result<(), ApiError> {
        let body = serde_json::json!({ "product_id": product_id });
        let _: Message = self.post("/api/wishlist/add_item/", &body).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn remove_wishlist_item(&self, product_id: ProductId) -> Result<(), ApiError> {
        let body = serde_json::json!({ "product_id": product_id });
        self.delete_with("/api/wishlist/remove_item/", &body).await
    }
}

// =============================================================================
// Status mapping
// =============================================================================

/// Map a non-success HTTP status to a typed [`ApiError`].
fn status_error(status: u16, path: &str, body: &str) -> ApiError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .unwrap_or_default()
        .into_message();

    match status {
        401 | 403 => ApiError::Unauthorized,
        404 => ApiError::NotFound(path.to_string()),
        400 | 422 => {
            ApiError::ValidationFailed(message.unwrap_or_else(|| "invalid request".to_string()))
        }
        other => ApiError::ServerError { status: other },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_unauthorized() {
        assert!(matches!(status_error(401, "/auth/me", ""), ApiError::Unauthorized));
        assert!(matches!(status_error(403, "/auth/me", ""), ApiError::Unauthorized));
    }

    #[test]
    fn test_status_error_not_found_carries_path() {
        let err = status_error(404, "/api/products/9/", "");
        match err {
            ApiError::NotFound(path) => assert_eq!(path, "/api/products/9/"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_status_error_validation_extracts_message() {
        let err = status_error(400, "/api/carts/add_item/", r#"{"message": "quantity too large"}"#);
        match err {
            ApiError::ValidationFailed(msg) => assert_eq!(msg, "quantity too large"),
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_status_error_validation_detail_fallback() {
        let err = status_error(422, "/api/carts/add_item/", r#"{"detail": "bad payload"}"#);
        match err {
            ApiError::ValidationFailed(msg) => assert_eq!(msg, "bad payload"),
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_status_error_server_error() {
        let err = status_error(503, "/api/products/", "");
        match err {
            ApiError::ServerError { status } => assert_eq!(status, 503),
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::NotFound("/api/products/1/".to_string());
        assert_eq!(err.to_string(), "not found: /api/products/1/");

        let err = ApiError::ValidationFailed("quantity too large".to_string());
        assert_eq!(err.to_string(), "validation failed: quantity too large");
    }
}
