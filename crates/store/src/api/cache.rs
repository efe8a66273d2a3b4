//! Cache types for backend API responses.

use crate::api::types::{Category, Product};

/// Cached value types for read-only catalog data.
///
/// Per-user state (cart, wishlist, orders) is never cached.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<Product>),
    Products(Vec<Product>),
    Category(Box<Category>),
    Categories(Vec<Category>),
}
