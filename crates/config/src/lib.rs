//! Layered configuration for shelf.
//!
//! Later layers win:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A TOML file: either the one passed explicitly, or `shelf.toml` in the
//!    platform configuration directory when it exists.
//! 3. `SHELF_`-prefixed environment variables, with `__` separating nested
//!    keys (`SHELF_NORMALIZER__MODEL=gpt-4o-mini`).
//! 4. Command-line [`Overrides`].

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use shelf_cache::FingerprintStrategy;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Name of the configuration file looked up in the configuration directory.
pub const CONFIG_FILE: &str = "shelf.toml";
/// Name of the publisher rule table looked up in the configuration directory.
pub const RULES_FILE: &str = "publisher_rules.json";
/// Directory, relative to the library, that holds caches and the catalog by
/// default.
pub const CACHE_DIR: &str = ".shelf";
pub const CATALOG_FILE: &str = "catalog.json";
pub const ENV_PREFIX: &str = "SHELF_";

pub const DEFAULT_VIEW_BY_TITLE: &str = "{{ title|slug }}";
pub const DEFAULT_VIEW_BY_PUBLISHER: &str = "{{ publisher|slug }}/{{ title|slug }}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory containing the documents.
    pub library: PathBuf,
    /// Descend into subdirectories of the library.
    pub recursive: bool,
    /// Maximum number of documents extracted at once. Defaults to the number
    /// of available CPUs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    pub fingerprint: FingerprintStrategy,
    /// Re-extract every document, ignoring the metadata cache.
    pub force_reload: bool,
    /// Forget every cached publisher resolution before resolving.
    pub reset_publishers: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<PathBuf>,
    pub normalizer: NormalizerConfig,
    /// Link views, keyed by directory name, each a path template rendered per
    /// catalog entry.
    pub views: BTreeMap<String, String>,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            library: PathBuf::from("."),
            recursive: false,
            concurrency: None,
            fingerprint: FingerprintStrategy::default(),
            force_reload: false,
            reset_publishers: false,
            cache_dir: None,
            catalog: None,
            rules: None,
            normalizer: NormalizerConfig::default(),
            views: BTreeMap::from([
                ("by-title".to_string(), DEFAULT_VIEW_BY_TITLE.to_string()),
                ("by-publisher".to_string(), DEFAULT_VIEW_BY_PUBLISHER.to_string()),
            ]),
        }
    }
}

/// Settings for the external publisher-name normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// The external fallback is opt-in.
    pub enabled: bool,
    /// Base URL of an OpenAI-compatible API.
    pub endpoint: String,
    pub model: String,
    /// Inline credential. Prefer `api_key_env`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the credential.
    pub api_key_env: String,
    /// Number of names sent per request.
    pub chunk_size: usize,
    pub timeout_secs: u64,
    /// Number of requests allowed in flight at once.
    pub max_in_flight: usize,
    /// Prompt template file replacing the built-in prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PathBuf>,
}
impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            chunk_size: 50,
            timeout_secs: 60,
            max_in_flight: 1,
            prompt: None,
        }
    }
}
impl NormalizerConfig {
    /// The inline key if set, otherwise the contents of `api_key_env`.
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Values set on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recursive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<FingerprintStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_reload: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_publishers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<PathBuf>,
    pub normalizer: NormalizerOverrides,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizerOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PathBuf>,
}

impl Config {
    /// Loads every layer. An explicitly named `file` must exist.
    #[instrument(skip_all, fields(file = ?file))]
    pub fn load(file: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let file = match file {
            Some(file) if !file.is_file() => exn::bail!(ErrorKind::NotFound(file.to_path_buf())),
            Some(file) => Some(file.to_path_buf()),
            None => config_dir().map(|dir| dir.join(CONFIG_FILE)).filter(|file| file.is_file()),
        };
        if let Some(file) = &file {
            tracing::debug!(path = %file.display(), "Reading configuration file");
        }
        Self::figment(file.as_deref(), overrides).extract::<Self>().or_raise(|| ErrorKind::Parse)?.validate()
    }

    fn figment(file: Option<&Path>, overrides: Overrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file_exact(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).merge(Serialized::defaults(overrides))
    }

    /// Rejects values that cannot work and clamps values that are merely
    /// unreasonable.
    pub fn validate(mut self) -> Result<Self> {
        if self.concurrency == Some(0) {
            tracing::warn!("Concurrency of zero requested; using one worker");
            self.concurrency = Some(1);
        }
        if self.normalizer.chunk_size == 0 {
            tracing::warn!("Normalizer chunk size of zero requested; sending one name per request");
            self.normalizer.chunk_size = 1;
        }
        if self.normalizer.max_in_flight == 0 {
            self.normalizer.max_in_flight = 1;
        }
        if self.normalizer.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("normalizer.timeout_secs"));
        }
        if self.normalizer.enabled && self.normalizer.endpoint.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("normalizer.endpoint"));
        }
        if self.views.iter().any(|(name, template)| name.trim().is_empty() || template.trim().is_empty()) {
            exn::bail!(ErrorKind::Invalid("views"));
        }
        Ok(self)
    }

    pub fn concurrency(&self) -> NonZeroUsize {
        self.concurrency
            .and_then(NonZeroUsize::new)
            .or_else(|| std::thread::available_parallelism().ok())
            .unwrap_or(NonZeroUsize::MIN)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| self.library.join(CACHE_DIR))
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog.clone().unwrap_or_else(|| self.cache_dir().join(CATALOG_FILE))
    }

    /// The rule table to load, if one is configured or the platform has a
    /// configuration directory to look in.
    pub fn rules_path(&self) -> Option<PathBuf> {
        self.rules.clone().or_else(|| config_dir().map(|dir| dir.join(RULES_FILE)))
    }
}

/// The platform configuration directory for shelf, e.g. `~/.config/shelf`.
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "shelf").map(|dirs| dirs.config_dir().to_path_buf())
}
