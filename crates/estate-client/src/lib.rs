//! Typed client for the estate API.
//!
//! Reads go through a [`QueryCache`] keyed by resource and canonical query
//! string. Mutations invalidate the resources they touch. Favorites are held
//! in a [`FavoritesStore`] that applies toggles optimistically.

pub mod cache;
pub mod client;
pub mod error;
pub mod favorites;
pub mod realtime;

pub use cache::{QueryCache, QueryKey};
pub use client::{ClientConfig, EstateClient};
pub use error::ClientError;
pub use favorites::{FavoritesBackend, FavoritesStore};
pub use realtime::RealtimeStream;
