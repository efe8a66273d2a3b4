//! Shared fixtures for unit tests: an in-memory [`RemoteStore`] with fault
//! injection and call scripting, plus sample-data constructors.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use rust_decimal::Decimal;
use tokio::sync::Semaphore;

use orchard_core::{
    CartLineId, CategoryId, Credential, Email, ProductId, UserId, WishlistEntryId,
};

use crate::api::types::{
    CartLine, Product, ProfileUpdate, RegisterData, User, WishlistEntry,
};
use crate::api::{ApiError, RemoteStore};
use crate::session::{Session, SessionHandle};

pub fn sample_user(id: i64) -> User {
    User {
        id: UserId::new(id),
        username: "alice".to_string(),
        email: "alice@example.com".to_string(),
        first_name: "Alice".to_string(),
        last_name: "Example".to_string(),
    }
}

pub fn sample_product(id: i64, price: &str, stock: u32) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        description: String::new(),
        price: price.parse().unwrap(),
        stock_quantity: stock,
        category_id: CategoryId::new(1),
        image: None,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    }
}

pub fn sample_line(product_id: i64, line_id: i64, quantity: u32) -> CartLine {
    let product = sample_product(product_id, "1.00", 99);
    CartLine {
        id: CartLineId::new(line_id),
        subtotal: product.price * Decimal::from(quantity),
        product,
        quantity,
    }
}

pub fn sample_wishlist_entry(entry_id: i64, product_id: i64) -> WishlistEntry {
    WishlistEntry {
        id: WishlistEntryId::new(entry_id),
        product: sample_product(product_id, "1.00", 99),
        created_at: chrono::Utc::now(),
    }
}

/// Session handle pre-authenticated as the given user.
pub fn authed_handle(user_id: i64) -> SessionHandle {
    let handle = SessionHandle::new();
    handle.set(Session {
        credential: Credential::new("mock-token"),
        refresh: None,
        user: sample_user(user_id),
    });
    handle
}

// =============================================================================
// MockRemote
// =============================================================================

#[derive(Default)]
struct MockState {
    calls: Vec<String>,
    fail_next: HashSet<String>,
    not_found_next: HashSet<String>,
    reject_credential: bool,
    holds: HashMap<String, Arc<Semaphore>>,
    cart: Vec<CartLine>,
    wishlist: Vec<WishlistEntry>,
    user: Option<User>,
    next_line_id: i64,
}

/// Keeps one backend call paused until released, to script interleavings.
pub struct HoldGuard {
    sem: Arc<Semaphore>,
}

impl HoldGuard {
    /// Let the held call proceed.
    pub fn release(&self) {
        self.sem.add_permits(1);
    }
}

/// In-memory backend with call recording, one-shot fault injection, and
/// call pausing.
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<MockState>>,
}

impl MockRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.lock().next_line_id = 1000;
        remote
    }

    /// All backend calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Make the next call to `op` fail with a network error.
    pub fn fail_next(&self, op: &str) {
        self.lock().fail_next.insert(op.to_string());
    }

    /// Make the next call to `op` fail with a not-found error.
    pub fn not_found_next(&self, op: &str) {
        self.lock().not_found_next.insert(op.to_string());
    }

    /// Make every authenticated call fail with `Unauthorized` from now on.
    pub fn reject_credential(&self) {
        self.lock().reject_credential = true;
    }

    /// Pause the next call to `op` after it is recorded, until the returned
    /// guard is released. Fault flags are checked after the pause, so a
    /// held call can also be scripted to fail.
    pub fn hold(&self, op: &str) -> HoldGuard {
        let sem = Arc::new(Semaphore::new(0));
        self.lock().holds.insert(op.to_string(), Arc::clone(&sem));
        HoldGuard { sem }
    }

    pub fn seed_cart(&self, cart: Vec<CartLine>) {
        self.lock().cart = cart;
    }

    pub fn seed_wishlist(&self, wishlist: Vec<WishlistEntry>) {
        self.lock().wishlist = wishlist;
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the call, park on any hold, then apply fault flags.
    async fn begin(&self, op: &str) -> Result<(), ApiError> {
        let held = {
            let mut state = self.lock();
            state.calls.push(op.to_string());
            state.holds.remove(op)
        };
        if let Some(sem) = held {
            let _permit = sem.acquire().await;
        }

        let mut state = self.lock();
        if state.fail_next.remove(op) {
            return Err(ApiError::NetworkUnavailable("injected failure".to_string()));
        }
        if state.not_found_next.remove(op) {
            return Err(ApiError::NotFound(format!("/{op}")));
        }
        if state.reject_credential {
            return Err(ApiError::Unauthorized);
        }
        Ok(())
    }
}

impl RemoteStore for MockRemote {
    async fn login(&self, email: &Email, _password: &str) -> Result<Session, ApiError> {
        self.begin("login").await?;
        let user = User {
            id: UserId::new(1),
            username: email.local_part().to_string(),
            email: email.as_str().to_string(),
            first_name: String::new(),
            last_name: String::new(),
        };
        self.lock().user = Some(user.clone());
        Ok(Session {
            credential: Credential::new("mock-token"),
            refresh: None,
            user,
        })
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.begin("logout").await
    }

    async fn register(&self, _data: &RegisterData) -> Result<(), ApiError> {
        self.begin("register").await
    }

    async fn fetch_me(&self) -> Result<User, ApiError> {
        self.begin("fetch_me").await?;
        let state = self.lock();
        Ok(state.user.clone().unwrap_or_else(|| sample_user(1)))
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.begin("update_profile").await?;
        let mut state = self.lock();
        let mut user = state.user.clone().unwrap_or_else(|| sample_user(1));
        if let Some(first_name) = &update.first_name {
            user.first_name.clone_from(first_name);
        }
        if let Some(last_name) = &update.last_name {
            user.last_name.clone_from(last_name);
        }
        state.user = Some(user.clone());
        Ok(user)
    }

    async fn forgot_password(&self, _email: &Email) -> Result<(), ApiError> {
        self.begin("forgot_password").await
    }

    async fn reset_password(
        &self,
        _uid: &str,
        _token: &str,
        _password: &str,
    ) -> Result<(), ApiError> {
        self.begin("reset_password").await
    }

    async fn fetch_cart(&self) -> Result<Vec<CartLine>, ApiError> {
        self.begin("fetch_cart").await?;
        Ok(self.lock().cart.clone())
    }

    async fn add_cart_item(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine, ApiError> {
        self.begin("add_cart_item").await?;
        let mut state = self.lock();

        if let Some(line) = state.cart.iter_mut().find(|l| l.product.id == product_id) {
            line.quantity += quantity;
            line.subtotal = line.product.price * Decimal::from(line.quantity);
            return Ok(line.clone());
        }

        state.next_line_id += 1;
        let line = sample_line(product_id.as_i64(), state.next_line_id, quantity);
        state.cart.push(line.clone());
        Ok(line)
    }

    async fn update_cart_item(
        &self,
        line_id: CartLineId,
        quantity: u32,
    ) -> Result<CartLine, ApiError> {
        self.begin("update_cart_item").await?;
        let mut state = self.lock();

        match state.cart.iter_mut().find(|l| l.id == line_id) {
            Some(line) => {
                line.quantity = quantity;
                line.subtotal = line.product.price * Decimal::from(quantity);
                Ok(line.clone())
            }
            None => Ok(sample_line(line_id.as_i64(), line_id.as_i64(), quantity)),
        }
    }

    async fn remove_cart_item(&self, line_id: CartLineId) -> Result<(), ApiError> {
        self.begin("remove_cart_item").await?;
        self.lock().cart.retain(|l| l.id != line_id);
        Ok(())
    }

    async fn fetch_wishlist(&self) -> Result<Vec<WishlistEntry>, ApiError> {
        self.begin("fetch_wishlist").await?;
        Ok(self.lock().wishlist.clone())
    }

    async fn add_wishlist_item(&self, product_id: ProductId) -> Result<(), ApiError> {
        self.begin("add_wishlist_item").await?;
        let mut state = self.lock();
        if !state.wishlist.iter().any(|e| e.product.id == product_id) {
            let entry = sample_wishlist_entry(100 + product_id.as_i64(), product_id.as_i64());
            state.wishlist.push(entry);
        }
        Ok(())
    }

    async fn remove_wishlist_item(&self, product_id: ProductId) -> Result<(), ApiError> {
        self.begin("remove_wishlist_item").await?;
        self.lock().wishlist.retain(|e| e.product.id != product_id);
        Ok(())
    }
}
