//! Async client SDK for the Wavecart shop API.
//!
//! The API speaks a command envelope over a single HTTP endpoint; this
//! crate layers three levels on top of it:
//!
//! - [`api::ApiClient`] - the raw commands, one method per API command
//! - [`shop::ShopApi`] - lazily cached catalog (categories, facets),
//!   lazy [`shop::Product`] handles, paginated [`shop::Search`]
//! - [`shop::Basket`] - session baskets with quantity semantics over the
//!   API's per-unit order lines
//!
//! # Example
//!
//! ```rust,no_run
//! use wavecart::api::ApiClient;
//! use wavecart::config::{Config, Credentials};
//! use wavecart::shop::{SearchFilter, SearchShaping, ShopApi};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let api = ApiClient::new(Credentials::new("110", "app-token"), Config::default())?;
//! let shop = ShopApi::new(api);
//!
//! let search = shop
//!     .search(
//!         "session-1234",
//!         SearchFilter::new().searchword("shirt"),
//!         SearchShaping::default(),
//!     )
//!     .await?;
//! println!("{} products match", search.count().await);
//!
//! let mut results = search.iter();
//! while let Some(product) = results.next().await? {
//!     println!("{} {}", product.id(), product.name().await?);
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod shop;

pub use api::ApiClient;
pub use cache::{CacheStore, MemoryCache};
pub use config::{Config, Credentials};
pub use error::{Error, Result};
pub use shop::ShopApi;
