//! Local mirror of the authenticated user's cart and wishlist.
//!
//! The backend owns the truth; the mirror is the client's working copy.
//! Reads are instant snapshots, mutations arrive as [`MirrorDelta`]s from
//! the sync engine, and every change is persisted to device storage under a
//! key namespaced by user id so one account's state never leaks into
//! another's.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use orchard_core::{CartLineId, ProductId, UserId};

use crate::api::RemoteStore;
use crate::api::types::{CartLine, WishlistEntry};
use crate::session::SessionHandle;
use crate::storage::{self, DeviceStorage};

pub(crate) fn mirror_key(user_id: UserId) -> String {
    format!("mirror.{user_id}")
}

/// Snapshot of the user's cart and wishlist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mirror {
    /// Cart lines in server order.
    pub cart: Vec<CartLine>,
    /// Wishlist entries in server order.
    pub wishlist: Vec<WishlistEntry>,
}

impl Mirror {
    /// Find a cart line by id.
    #[must_use]
    pub fn cart_line(&self, line_id: CartLineId) -> Option<&CartLine> {
        self.cart.iter().find(|line| line.id == line_id)
    }

    /// Find the cart line holding a product, if any.
    #[must_use]
    pub fn cart_line_for_product(&self, product_id: ProductId) -> Option<&CartLine> {
        self.cart.iter().find(|line| line.product.id == product_id)
    }

    /// Whether the wishlist contains a product.
    #[must_use]
    pub fn wishlist_contains(&self, product_id: ProductId) -> bool {
        self.wishlist.iter().any(|e| e.product.id == product_id)
    }
}

/// A single change to the mirror.
#[derive(Debug, Clone)]
pub enum MirrorDelta {
    /// Replace the whole cart.
    CartReplaced(Vec<CartLine>),
    /// Insert a cart line, or replace the existing line for the same
    /// product. Server-confirmed lines replace provisional ones this way.
    CartLineUpserted(CartLine),
    /// Set the quantity of an existing cart line.
    CartQuantitySet {
        line_id: CartLineId,
        quantity: u32,
    },
    /// Remove a cart line.
    CartLineRemoved(CartLineId),
    /// Replace the whole wishlist.
    WishlistReplaced(Vec<WishlistEntry>),
    /// Add a wishlist entry.
    WishlistEntryAdded(WishlistEntry),
    /// Remove the wishlist entry for a product.
    WishlistEntryRemoved(ProductId),
    /// Drop all local state.
    Cleared,
}

// =============================================================================
// MirrorStore
// =============================================================================

/// Shared, persistent mirror of the current user's cart and wishlist.
///
/// Cheaply cloneable; all clones observe the same state.
#[derive(Clone)]
pub struct MirrorStore {
    inner: Arc<MirrorStoreInner>,
}

struct MirrorStoreInner {
    state: RwLock<Mirror>,
    storage: Arc<dyn DeviceStorage>,
    session: SessionHandle,
}

impl MirrorStore {
    pub(crate) fn new(storage: Arc<dyn DeviceStorage>, session: SessionHandle) -> Self {
        Self {
            inner: Arc::new(MirrorStoreInner {
                state: RwLock::new(Mirror::default()),
                storage,
                session,
            }),
        }
    }

    /// Snapshot of the current mirror.
    pub async fn snapshot(&self) -> Mirror {
        self.inner.state.read().await.clone()
    }

    /// Snapshot of the cart lines.
    pub async fn cart(&self) -> Vec<CartLine> {
        self.inner.state.read().await.cart.clone()
    }

    /// Snapshot of the wishlist entries.
    pub async fn wishlist(&self) -> Vec<WishlistEntry> {
        self.inner.state.read().await.wishlist.clone()
    }

    /// Load the current user's cart and wishlist from the backend.
    ///
    /// Without a session this clears the mirror and performs no network
    /// calls. When the backend is unreachable the last persisted copy for
    /// this user is restored instead, or the mirror stays empty if none
    /// exists.
    #[instrument(skip_all)]
    pub async fn load<R: RemoteStore>(&self, remote: &R) {
        let Some(user_id) = self.inner.session.user_id() else {
            *self.inner.state.write().await = Mirror::default();
            return;
        };

        let (cart, wishlist) = tokio::join!(remote.fetch_cart(), remote.fetch_wishlist());
        let fresh = match (cart, wishlist) {
            (Ok(cart), Ok(wishlist)) => Mirror { cart, wishlist },
            (cart, wishlist) => {
                let err = cart.err().map_or_else(
                    || wishlist.err().map(|e| e.to_string()).unwrap_or_default(),
                    |e| e.to_string(),
                );
                warn!(error = %err, "mirror load failed, falling back to persisted copy");
                self.persisted_fallback(user_id)
            }
        };

        let mut state = self.inner.state.write().await;
        *state = fresh;
        self.persist(user_id, &state);
        debug!(
            cart_lines = state.cart.len(),
            wishlist_entries = state.wishlist.len(),
            "mirror loaded"
        );
    }

    /// Apply a delta and return the resulting snapshot.
    ///
    /// The change is persisted best-effort; a storage failure is logged and
    /// the in-memory state stays authoritative until the next write.
    pub async fn apply(&self, delta: MirrorDelta) -> Mirror {
        let mut state = self.inner.state.write().await;

        match delta {
            MirrorDelta::CartReplaced(cart) => state.cart = cart,
            MirrorDelta::CartLineUpserted(line) => {
                match state.cart.iter_mut().find(|l| l.product.id == line.product.id) {
                    Some(existing) => *existing = line,
                    None => state.cart.push(line),
                }
            }
            MirrorDelta::CartQuantitySet { line_id, quantity } => {
                if let Some(line) = state.cart.iter_mut().find(|l| l.id == line_id) {
                    line.quantity = quantity;
                }
            }
            MirrorDelta::CartLineRemoved(line_id) => {
                state.cart.retain(|l| l.id != line_id);
            }
            MirrorDelta::WishlistReplaced(wishlist) => state.wishlist = wishlist,
            MirrorDelta::WishlistEntryAdded(entry) => {
                if !state.wishlist.iter().any(|e| e.product.id == entry.product.id) {
                    state.wishlist.push(entry);
                }
            }
            MirrorDelta::WishlistEntryRemoved(product_id) => {
                state.wishlist.retain(|e| e.product.id != product_id);
            }
            MirrorDelta::Cleared => *state = Mirror::default(),
        }

        if let Some(user_id) = self.inner.session.user_id() {
            self.persist(user_id, &state);
        }

        state.clone()
    }

    /// Discard in-memory state without touching the persisted copy.
    pub(crate) async fn reset(&self) {
        *self.inner.state.write().await = Mirror::default();
    }

    /// Discard in-memory state and the current user's persisted copy.
    pub(crate) async fn clear_local(&self) {
        if let Some(user_id) = self.inner.session.user_id() {
            if let Err(err) = self.inner.storage.remove(&mirror_key(user_id)) {
                warn!(error = %err, "failed to remove persisted mirror");
            }
        }
        self.reset().await;
    }

    fn persisted_fallback(&self, user_id: UserId) -> Mirror {
        match storage::read_json(self.inner.storage.as_ref(), &mirror_key(user_id)) {
            Ok(Some(mirror)) => mirror,
            Ok(None) => Mirror::default(),
            Err(err) => {
                warn!(error = %err, "persisted mirror unreadable, starting empty");
                Mirror::default()
            }
        }
    }

    fn persist(&self, user_id: UserId, state: &Mirror) {
        if let Err(err) = storage::write_json(self.inner.storage.as_ref(), &mirror_key(user_id), state)
        {
            warn!(error = %err, "failed to persist mirror");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{authed_handle, sample_line, sample_wishlist_entry, MockRemote};
    use crate::storage::MemoryStorage;

    fn store_with(session: SessionHandle) -> MirrorStore {
        MirrorStore::new(Arc::new(MemoryStorage::new()), session)
    }

    #[tokio::test]
    async fn test_load_unauthenticated_makes_no_network_calls() {
        let remote = MockRemote::new();
        let store = store_with(SessionHandle::new());

        store.load(&remote).await;

        assert!(store.cart().await.is_empty());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_load_fetches_cart_and_wishlist() {
        let remote = MockRemote::new();
        remote.seed_cart(vec![sample_line(10, 1, 2)]);
        remote.seed_wishlist(vec![sample_wishlist_entry(100, 3)]);

        let store = store_with(authed_handle(7));
        store.load(&remote).await;

        assert_eq!(store.cart().await.len(), 1);
        assert_eq!(store.wishlist().await.len(), 1);
    }

    #[tokio::test]
    async fn test_load_falls_back_to_persisted_copy() {
        let session = authed_handle(7);
        let storage: Arc<dyn DeviceStorage> = Arc::new(MemoryStorage::new());
        storage::write_json(
            storage.as_ref(),
            &mirror_key(UserId::new(7)),
            &Mirror {
                cart: vec![sample_line(10, 1, 4)],
                wishlist: vec![],
            },
        )
        .unwrap();

        let remote = MockRemote::new();
        remote.fail_next("fetch_cart");

        let store = MirrorStore::new(storage, session);
        store.load(&remote).await;

        let cart = store.cart().await;
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, 4);
    }

    #[tokio::test]
    async fn test_persisted_copies_are_namespaced_by_user() {
        let storage: Arc<dyn DeviceStorage> = Arc::new(MemoryStorage::new());

        let store_a = MirrorStore::new(Arc::clone(&storage), authed_handle(1));
        store_a
            .apply(MirrorDelta::CartLineUpserted(sample_line(10, 1, 2)))
            .await;

        let store_b = MirrorStore::new(Arc::clone(&storage), authed_handle(2));
        remote_free_load(&store_b).await;

        assert!(store_b.cart().await.is_empty());
        assert!(storage.get(&mirror_key(UserId::new(1))).unwrap().is_some());
    }

    async fn remote_free_load(store: &MirrorStore) {
        let remote = MockRemote::new();
        store.load(&remote).await;
    }

    #[tokio::test]
    async fn test_upsert_replaces_line_for_same_product() {
        let store = store_with(authed_handle(7));

        // Provisional line with a negative id.
        let mut provisional = sample_line(10, 1, 2);
        provisional.id = CartLineId::new(-1);
        store
            .apply(MirrorDelta::CartLineUpserted(provisional))
            .await;

        // Server confirmation for the same product.
        let confirmed = sample_line(10, 55, 2);
        let after = store.apply(MirrorDelta::CartLineUpserted(confirmed)).await;

        assert_eq!(after.cart.len(), 1);
        assert_eq!(after.cart[0].id, CartLineId::new(55));
    }

    #[tokio::test]
    async fn test_quantity_set_and_remove() {
        let store = store_with(authed_handle(7));
        store
            .apply(MirrorDelta::CartLineUpserted(sample_line(10, 1, 2)))
            .await;

        let after = store
            .apply(MirrorDelta::CartQuantitySet {
                line_id: CartLineId::new(1),
                quantity: 5,
            })
            .await;
        assert_eq!(after.cart[0].quantity, 5);

        let after = store
            .apply(MirrorDelta::CartLineRemoved(CartLineId::new(1)))
            .await;
        assert!(after.cart.is_empty());
    }

    #[tokio::test]
    async fn test_wishlist_add_is_idempotent_locally() {
        let store = store_with(authed_handle(7));
        store
            .apply(MirrorDelta::WishlistEntryAdded(sample_wishlist_entry(100, 3)))
            .await;
        let after = store
            .apply(MirrorDelta::WishlistEntryAdded(sample_wishlist_entry(101, 3)))
            .await;

        assert_eq!(after.wishlist.len(), 1);
    }

    #[tokio::test]
    async fn test_cleared_drops_everything() {
        let store = store_with(authed_handle(7));
        store
            .apply(MirrorDelta::CartLineUpserted(sample_line(10, 1, 2)))
            .await;
        store
            .apply(MirrorDelta::WishlistEntryAdded(sample_wishlist_entry(100, 3)))
            .await;

        let after = store.apply(MirrorDelta::Cleared).await;
        assert!(after.cart.is_empty());
        assert!(after.wishlist.is_empty());
    }
}
