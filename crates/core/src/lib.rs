//! Wavecart Core - Shared types library.
//!
//! This crate provides the common types used across the Wavecart workspace:
//! - `wavecart` - The shop API client (raw and convenience layers)
//! - `wavecart-integration-tests` - End-to-end tests against a stubbed
//!   shop endpoint
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. This keeps
//! it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs and prices

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
