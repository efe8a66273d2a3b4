//! Optimistic synchronization of cart and wishlist mutations.
//!
//! Every mutation follows the same four-step protocol:
//!
//! 1. apply the change to the local mirror immediately,
//! 2. issue the backend call,
//! 3. on success, reconcile the mirror with the server's confirmed state,
//! 4. on failure, roll back the mutated resource to its pre-mutation state.
//!
//! At most one mutation per resource (cart line or product) runs at a time;
//! a conflicting mutation is rejected with [`MutationError::Busy`] instead
//! of queued. Mutations on distinct resources may run concurrently, so a
//! rollback touches only its own resource and never disturbs another
//! mutation's confirmed state.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, instrument, warn};

use orchard_core::{CartLineId, ProductId};

use crate::api::types::{CartLine, Product, WishlistEntry};
use crate::api::{ApiError, RemoteStore};
use crate::mirror::{Mirror, MirrorDelta, MirrorStore};
use crate::session::SessionHandle;

/// The mutation being attempted, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    AddToCart,
    SetQuantity,
    RemoveLine,
    AddToWishlist,
    RemoveFromWishlist,
    MoveToCart,
}

impl std::fmt::Display for MutationOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AddToCart => "add to cart",
            Self::SetQuantity => "set quantity",
            Self::RemoveLine => "remove cart line",
            Self::AddToWishlist => "add to wishlist",
            Self::RemoveFromWishlist => "remove from wishlist",
            Self::MoveToCart => "move to cart",
        };
        f.write_str(name)
    }
}

/// Errors from cart and wishlist mutations.
#[derive(Debug, Error)]
pub enum MutationError {
    /// Mutations require an authenticated session.
    #[error("not authenticated")]
    Unauthenticated,

    /// Another mutation on the same resource is still in flight.
    #[error("{operation} rejected: resource is busy")]
    Busy { operation: MutationOp },

    /// The backend rejected the mutation; the mirror has been rolled back.
    #[error("{operation} failed: {cause}")]
    Failed {
        operation: MutationOp,
        #[source]
        cause: ApiError,
    },

    /// No cart line with this id exists locally.
    #[error("unknown cart line {0}")]
    UnknownCartLine(CartLineId),

    /// The product has no stock to add.
    #[error("product {0} is out of stock")]
    OutOfStock(ProductId),

    /// The product is not on the wishlist.
    #[error("product {0} is not on the wishlist")]
    NotOnWishlist(ProductId),
}

/// Resource a mutation holds exclusively while in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ResourceKey {
    CartLine(CartLineId),
    Product(ProductId),
}

// =============================================================================
// SyncEngine
// =============================================================================

/// Applies cart and wishlist mutations optimistically against the mirror
/// and reconciles them with the backend.
#[derive(Clone)]
pub struct SyncEngine<R> {
    remote: R,
    mirror: MirrorStore,
    session: SessionHandle,
    in_flight: Arc<Mutex<HashSet<ResourceKey>>>,
}

impl<R: RemoteStore> SyncEngine<R> {
    pub(crate) fn new(remote: R, mirror: MirrorStore, session: SessionHandle) -> Self {
        Self {
            remote,
            mirror,
            session,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Add a product to the cart.
    ///
    /// If the product already has a cart line its quantity is increased;
    /// otherwise a provisional line (negative id) appears locally until the
    /// server confirms. The requested quantity is clamped to the available
    /// stock.
    ///
    /// # Errors
    ///
    /// Returns an error if unauthenticated, the product has no stock, the
    /// product or its existing cart line is busy with another mutation, or
    /// the backend rejects the add (after rollback).
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add_to_cart(
        &self,
        product: &Product,
        quantity: u32,
    ) -> Result<Mirror, MutationError> {
        let op = MutationOp::AddToCart;
        self.require_auth()?;

        if product.stock_quantity == 0 {
            return Err(MutationError::OutOfStock(product.id));
        }
        let quantity = quantity.clamp(1, product.stock_quantity);

        let _guard = self.acquire(ResourceKey::Product(product.id), op)?;
        let existing = self
            .mirror
            .snapshot()
            .await
            .cart_line_for_product(product.id)
            .cloned();

        // An add that bumps an existing line mutates that line, so it must
        // also hold the line key against concurrent quantity updates.
        let _line_guard = match &existing {
            Some(line) => Some(self.acquire(ResourceKey::CartLine(line.id), op)?),
            None => None,
        };

        // Optimistic step: bump the existing line or show a provisional one.
        let (delta, rollback) = match &existing {
            Some(line) => (
                MirrorDelta::CartQuantitySet {
                    line_id: line.id,
                    quantity: (line.quantity + quantity).min(product.stock_quantity),
                },
                MirrorDelta::CartQuantitySet {
                    line_id: line.id,
                    quantity: line.quantity,
                },
            ),
            None => {
                let provisional = provisional_line(product, quantity);
                let rollback = MirrorDelta::CartLineRemoved(provisional.id);
                (MirrorDelta::CartLineUpserted(provisional), rollback)
            }
        };
        self.mirror.apply(delta).await;

        match self.remote.add_cart_item(product.id, quantity).await {
            Ok(confirmed) => {
                debug!(line_id = %confirmed.id, "cart add confirmed");
                Ok(self.mirror.apply(MirrorDelta::CartLineUpserted(confirmed)).await)
            }
            Err(err) => {
                self.mirror.apply(rollback).await;
                Err(failed(op, err))
            }
        }
    }

    /// Set the quantity of a cart line. Quantity zero removes the line.
    ///
    /// The quantity is clamped to the line's product stock.
    ///
    /// # Errors
    ///
    /// Returns an error if unauthenticated, the line is unknown or still
    /// provisional, the line is busy, or the backend rejects the update
    /// (after rollback).
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn set_quantity(
        &self,
        line_id: CartLineId,
        quantity: u32,
    ) -> Result<Mirror, MutationError> {
        let op = MutationOp::SetQuantity;
        self.require_auth()?;

        if quantity == 0 {
            return self.remove_line(line_id).await;
        }

        let snapshot = self.mirror.snapshot().await;
        let line = snapshot
            .cart_line(line_id)
            .ok_or(MutationError::UnknownCartLine(line_id))?;

        // Provisional lines have no server id yet; the pending add holds
        // their product key, so report the contention.
        if line_id.as_i64() < 0 {
            return Err(MutationError::Busy { operation: op });
        }
        let quantity = quantity.clamp(1, line.product.stock_quantity.max(1));
        let previous = line.quantity;

        let _guard = self.acquire(ResourceKey::CartLine(line_id), op)?;

        self.mirror
            .apply(MirrorDelta::CartQuantitySet { line_id, quantity })
            .await;

        match self.remote.update_cart_item(line_id, quantity).await {
            Ok(confirmed) => {
                Ok(self.mirror.apply(MirrorDelta::CartLineUpserted(confirmed)).await)
            }
            Err(err) => {
                self.mirror
                    .apply(MirrorDelta::CartQuantitySet {
                        line_id,
                        quantity: previous,
                    })
                    .await;
                Err(failed(op, err))
            }
        }
    }

    /// Remove a cart line.
    ///
    /// A line the server has already forgotten counts as removed.
    ///
    /// # Errors
    ///
    /// Returns an error if unauthenticated, the line is unknown or still
    /// provisional, the line is busy, or the backend rejects the removal
    /// (after rollback).
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove_line(&self, line_id: CartLineId) -> Result<Mirror, MutationError> {
        let op = MutationOp::RemoveLine;
        self.require_auth()?;

        let removed = self
            .mirror
            .snapshot()
            .await
            .cart_line(line_id)
            .cloned()
            .ok_or(MutationError::UnknownCartLine(line_id))?;
        if line_id.as_i64() < 0 {
            return Err(MutationError::Busy { operation: op });
        }

        let _guard = self.acquire(ResourceKey::CartLine(line_id), op)?;

        self.mirror.apply(MirrorDelta::CartLineRemoved(line_id)).await;

        match self.remote.remove_cart_item(line_id).await {
            Ok(()) => Ok(self.mirror.snapshot().await),
            Err(ApiError::NotFound(_)) => {
                debug!("line already absent server-side");
                Ok(self.mirror.snapshot().await)
            }
            Err(err) => {
                // Restore only this line; other lines may have been
                // confirmed by concurrent mutations in the meantime.
                self.mirror
                    .apply(MirrorDelta::CartLineUpserted(removed))
                    .await;
                Err(failed(op, err))
            }
        }
    }

    /// Add a product to the wishlist.
    ///
    /// Idempotent: adding a product already on the wishlist returns the
    /// current state without a network call.
    ///
    /// # Errors
    ///
    /// Returns an error if unauthenticated, the product is busy, or the
    /// backend rejects the add (after rollback).
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add_to_wishlist(&self, product: &Product) -> Result<Mirror, MutationError> {
        let op = MutationOp::AddToWishlist;
        self.require_auth()?;

        let snapshot = self.mirror.snapshot().await;
        if snapshot.wishlist_contains(product.id) {
            return Ok(snapshot);
        }

        let _guard = self.acquire(ResourceKey::Product(product.id), op)?;

        self.mirror
            .apply(MirrorDelta::WishlistEntryAdded(provisional_entry(product)))
            .await;

        match self.remote.add_wishlist_item(product.id).await {
            Ok(()) => {
                // The add endpoint returns no entry; refetch for server ids.
                match self.remote.fetch_wishlist().await {
                    Ok(entries) => {
                        Ok(self.mirror.apply(MirrorDelta::WishlistReplaced(entries)).await)
                    }
                    Err(err) => {
                        warn!(error = %err, "wishlist refetch failed, keeping provisional entry");
                        Ok(self.mirror.snapshot().await)
                    }
                }
            }
            Err(err) => {
                self.mirror
                    .apply(MirrorDelta::WishlistEntryRemoved(product.id))
                    .await;
                Err(failed(op, err))
            }
        }
    }

    /// Remove a product from the wishlist.
    ///
    /// Idempotent: removing a product that is not on the wishlist returns
    /// the current state without a network call. A product the server has
    /// already forgotten counts as removed.
    ///
    /// # Errors
    ///
    /// Returns an error if unauthenticated, the product is busy, or the
    /// backend rejects the removal (after rollback).
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_from_wishlist(
        &self,
        product_id: ProductId,
    ) -> Result<Mirror, MutationError> {
        let op = MutationOp::RemoveFromWishlist;
        self.require_auth()?;

        let snapshot = self.mirror.snapshot().await;
        let Some(removed) = snapshot
            .wishlist
            .iter()
            .find(|e| e.product.id == product_id)
            .cloned()
        else {
            return Ok(snapshot);
        };

        let _guard = self.acquire(ResourceKey::Product(product_id), op)?;

        self.mirror
            .apply(MirrorDelta::WishlistEntryRemoved(product_id))
            .await;

        match self.remote.remove_wishlist_item(product_id).await {
            Ok(()) | Err(ApiError::NotFound(_)) => Ok(self.mirror.snapshot().await),
            Err(err) => {
                // Restore only this entry; other entries may have been
                // confirmed by concurrent mutations in the meantime.
                self.mirror
                    .apply(MirrorDelta::WishlistEntryAdded(removed))
                    .await;
                Err(failed(op, err))
            }
        }
    }

    /// Move a wishlisted product into the cart.
    ///
    /// Composed of an add-to-cart followed by a wishlist removal. If the
    /// removal fails the product stays on the wishlist and the error is
    /// surfaced, but the cart add is not undone.
    ///
    /// # Errors
    ///
    /// Returns an error if unauthenticated, the product is not wishlisted,
    /// or either step fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn move_to_cart(&self, product_id: ProductId) -> Result<Mirror, MutationError> {
        self.require_auth()?;

        let snapshot = self.mirror.snapshot().await;
        let product = snapshot
            .wishlist
            .iter()
            .find(|e| e.product.id == product_id)
            .map(|e| e.product.clone())
            .ok_or(MutationError::NotOnWishlist(product_id))?;

        self.add_to_cart(&product, 1).await?;
        self.remove_from_wishlist(product_id).await
    }

    /// Reload the mirror from the backend.
    pub async fn refresh(&self) {
        self.mirror.load(&self.remote).await;
    }

    fn require_auth(&self) -> Result<(), MutationError> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(MutationError::Unauthenticated)
        }
    }

    fn acquire(&self, key: ResourceKey, op: MutationOp) -> Result<FlightGuard, MutationError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(key) {
            return Err(MutationError::Busy { operation: op });
        }
        Ok(FlightGuard {
            set: Arc::clone(&self.in_flight),
            key,
        })
    }
}

/// Releases the resource key when the mutation finishes, on every path.
struct FlightGuard {
    set: Arc<Mutex<HashSet<ResourceKey>>>,
    key: ResourceKey,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.set.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.key);
    }
}

/// Locally fabricated cart line shown until the server confirms the add.
/// The negative id marks it provisional.
fn provisional_line(product: &Product, quantity: u32) -> CartLine {
    CartLine {
        id: CartLineId::new(-product.id.as_i64()),
        subtotal: product.price * rust_decimal::Decimal::from(quantity),
        product: product.clone(),
        quantity,
    }
}

fn provisional_entry(product: &Product) -> WishlistEntry {
    WishlistEntry {
        id: orchard_core::WishlistEntryId::new(-product.id.as_i64()),
        product: product.clone(),
        created_at: chrono::Utc::now(),
    }
}

fn failed(operation: MutationOp, cause: ApiError) -> MutationError {
    match cause {
        ApiError::Unauthorized => MutationError::Unauthenticated,
        cause => MutationError::Failed { operation, cause },
    }
}
