//! Persistent caches for library metadata.
//!
//! Both caches are ephemeral: the documents themselves are the source of
//! truth, and deleting either file only costs the next run extra work.
//!
//! - [`MetadataCache`]: absolute file path → [`Fingerprint`] + extracted
//!   [`Record`](shelf_extract::Record).
//! - [`PublisherCache`]: raw publisher name → canonical publisher name.
//!
//! Each is a flat, pretty-printed JSON object. Loading tolerates missing,
//! empty and corrupt files (they load as empty caches); saving is atomic.

pub mod error;
mod fingerprint;
mod metadata;
mod publisher;
mod store;

pub use crate::fingerprint::{Fingerprint, FingerprintStrategy};
pub use crate::metadata::{Entry, MetadataCache};
pub use crate::publisher::PublisherCache;

/// Default file name of the metadata cache inside the cache directory.
pub const METADATA_CACHE_FILE: &str = "metadata_cache.json";
/// Default file name of the publisher cache inside the cache directory.
pub const PUBLISHER_CACHE_FILE: &str = "publisher_cache.json";
