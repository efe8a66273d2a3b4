//! Orchard Core - Shared types library.
//!
//! This crate provides common types used across all Orchard components:
//! - `store` - Typed client for the storefront backend API
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. This keeps
//! it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, email addresses, and
//!   bearer credentials

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
