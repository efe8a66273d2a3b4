//! Client library for the Orchard storefront backend.
//!
//! The backend owns all state; this crate gives applications a typed,
//! session-aware handle over it:
//!
//! - [`Storefront`] — the assembled client: session lifecycle, cached
//!   catalog reads, and optimistically synchronized cart and wishlist
//! - [`api`] — the REST client and wire types
//! - [`mirror`] — the local working copy of the user's cart and wishlist,
//!   persisted per user across restarts
//! - [`sync`] — the optimistic mutation protocol (apply locally, confirm
//!   remotely, roll back on failure)
//! - [`catalog`] — client-side filtering, sorting, and category trees
//!
//! # Example
//!
//! ```no_run
//! use orchard_store::{StoreConfig, Storefront};
//!
//! # async fn run() -> Result<(), orchard_store::StoreError> {
//! let config = StoreConfig::from_env()?;
//! let store = Storefront::new(&config)?;
//!
//! store.login("alice@example.com", "hunter2").await?;
//! let products = store.products().await?;
//! if let Some(first) = products.first() {
//!     store.add_to_cart(first, 1).await?;
//! }
//! println!("{:?}", store.cart_totals().await);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod mirror;
pub mod session;
pub mod storage;
pub mod storefront;
pub mod sync;
pub mod views;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, ApiError, RemoteStore};
pub use catalog::{FilterCriteria, SortKey};
pub use config::{ConfigError, StoreConfig};
pub use error::{Result, StoreError};
pub use mirror::{Mirror, MirrorDelta, MirrorStore};
pub use session::{AuthError, Session, SessionGate, SessionHandle};
pub use storage::{DeviceStorage, JsonFileStorage, MemoryStorage, StorageError};
pub use storefront::Storefront;
pub use sync::{MutationError, MutationOp, SyncEngine};
pub use views::{cart_totals, format_price, line_subtotal, CartTotals};
