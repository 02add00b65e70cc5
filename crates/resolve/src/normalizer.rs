use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// An external service that maps raw publisher spellings to canonical names.
///
/// Each call covers one chunk of distinct names. The returned map may omit
/// names the service could not place; those stay unresolved. Implementations
/// must not retry on their own: a failed call leaves the whole chunk
/// unresolved for this run.
#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(&self, names: &[String]) -> Result<HashMap<String, String>>;
}
