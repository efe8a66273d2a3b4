//! Client-side catalog filtering, sorting, and category trees.
//!
//! The backend returns flat product and category lists; narrowing them for
//! display happens locally so filter changes never need a round trip.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::types::{Category, Product};

/// Sort order for product listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Cheapest first. The default ordering.
    #[default]
    PriceAsc,
    /// Most expensive first.
    PriceDesc,
    /// Alphabetical by name.
    NameAsc,
    /// Most recently created first.
    Newest,
}

impl SortKey {
    /// Parse the query-string form (`price_asc`, `price_desc`, `name_asc`,
    /// `newest`).
    #[must_use]
    pub fn from_param(param: &str) -> Option<Self> {
        match param {
            "price_asc" => Some(Self::PriceAsc),
            "price_desc" => Some(Self::PriceDesc),
            "name_asc" => Some(Self::NameAsc),
            "newest" => Some(Self::Newest),
            _ => None,
        }
    }

    /// Query-string form of this sort key.
    #[must_use]
    pub const fn as_param(self) -> &'static str {
        match self {
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
            Self::NameAsc => "name_asc",
            Self::Newest => "newest",
        }
    }
}

/// Criteria narrowing a product listing.
///
/// Category and subcategory selections combine with OR semantics: when
/// either set is non-empty, a product matches if its category is in the
/// union of the two. Both empty means all categories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    /// Selected top-level categories.
    pub categories: HashSet<orchard_core::CategoryId>,
    /// Selected subcategories.
    pub subcategories: HashSet<orchard_core::CategoryId>,
    /// Inclusive lower price bound.
    pub min_price: Option<Decimal>,
    /// Inclusive upper price bound.
    pub max_price: Option<Decimal>,
    /// Case-insensitive substring over name and description.
    pub search: Option<String>,
    /// Ordering of the surviving products.
    pub sort: SortKey,
}

impl FilterCriteria {
    /// Parse criteria from a URL query string.
    ///
    /// Recognized keys: `category` and `subcategory` (repeatable),
    /// `minPrice`/`min_price`, `maxPrice`/`max_price`, `search`, and
    /// `sortBy`/`sort`. Unknown keys and unparseable values are ignored;
    /// an unknown sort value keeps the default.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let mut criteria = Self::default();

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "category" => {
                    if let Ok(id) = value.parse::<i64>() {
                        criteria.categories.insert(orchard_core::CategoryId::new(id));
                    }
                }
                "subcategory" => {
                    if let Ok(id) = value.parse::<i64>() {
                        criteria
                            .subcategories
                            .insert(orchard_core::CategoryId::new(id));
                    }
                }
                "minPrice" | "min_price" => criteria.min_price = value.parse().ok(),
                "maxPrice" | "max_price" => criteria.max_price = value.parse().ok(),
                "search" if !value.is_empty() => criteria.search = Some(value.into_owned()),
                "sortBy" | "sort" => {
                    if let Some(sort) = SortKey::from_param(&value) {
                        criteria.sort = sort;
                    }
                }
                _ => {}
            }
        }

        criteria
    }

    /// Whether a single product satisfies the criteria.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        let any_selected = !self.categories.is_empty() || !self.subcategories.is_empty();
        if any_selected
            && !self.categories.contains(&product.category_id)
            && !self.subcategories.contains(&product.category_id)
        {
            return false;
        }
        if self.min_price.is_some_and(|min| product.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price > max) {
            return false;
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let haystack = format!(
                "{} {}",
                product.name.to_lowercase(),
                product.description.to_lowercase()
            );
            if !haystack.contains(&needle) {
                return false;
            }
        }
        true
    }

    /// Filter and sort a product list.
    #[must_use]
    pub fn apply(&self, products: Vec<Product>) -> Vec<Product> {
        let mut filtered: Vec<Product> =
            products.into_iter().filter(|p| self.matches(p)).collect();
        sort_products(&mut filtered, self.sort);
        filtered
    }
}

/// Sort products in place. Stable: products comparing equal keep their
/// incoming relative order.
pub fn sort_products(products: &mut [Product], sort: SortKey) {
    match sort {
        SortKey::PriceAsc => products.sort_by(|a, b| a.price.cmp(&b.price)),
        SortKey::PriceDesc => products.sort_by(|a, b| b.price.cmp(&a.price)),
        SortKey::NameAsc => products.sort_by(|a, b| a.name.cmp(&b.name)),
        SortKey::Newest => products.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
}

// =============================================================================
// Category tree
// =============================================================================

/// A category with its direct children attached.
#[derive(Debug, Clone)]
pub struct CategoryNode {
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Build a tree from a flat category list.
///
/// Roots are categories without a parent; input order is preserved at every
/// level. A category whose parent is missing from the list is treated as a
/// root rather than dropped.
#[must_use]
pub fn build_category_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let known: HashSet<_> = categories.iter().map(|c| c.id).collect();
    let mut roots = Vec::new();
    let mut children_of: HashMap<_, Vec<Category>> = HashMap::new();

    for category in categories {
        match category.parent_id {
            Some(parent) if known.contains(&parent) => {
                children_of.entry(parent).or_default().push(category);
            }
            _ => roots.push(category),
        }
    }

    fn attach(
        category: Category,
        children_of: &mut HashMap<orchard_core::CategoryId, Vec<Category>>,
    ) -> CategoryNode {
        let children = children_of
            .remove(&category.id)
            .unwrap_or_default()
            .into_iter()
            .map(|child| attach(child, children_of))
            .collect();
        CategoryNode { category, children }
    }

    roots
        .into_iter()
        .map(|root| attach(root, &mut children_of))
        .collect()
}
