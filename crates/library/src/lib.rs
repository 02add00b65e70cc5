//! Everything that happens to a library directory in one run.
//!
//! [`Pipeline::run`] finds the documents ([`discover`]), reuses cached
//! records for the ones that haven't changed ([`detect`]), extracts the
//! rest concurrently ([`extract_all`]), resolves publisher names and
//! assembles the [`Catalog`]. [`LinkPlanner`] then turns a catalog into
//! browsable views of symlinks.

pub mod error;
mod catalog;
mod detect;
mod discover;
mod links;
mod pipeline;
mod pool;

pub use crate::catalog::{Catalog, CatalogEntry, is_plausible_title};
pub use crate::detect::{Detection, HASH_CHUNK_SIZE, Partition, detect, fingerprint};
pub use crate::discover::discover;
pub use crate::links::{LinkPlacement, LinkPlanner, PathGenerator, materialize};
pub use crate::pipeline::{Options, Pipeline, Report, RunStats, Stores};
pub use crate::pool::{ExtractionEvent, Progress, extract_all};
