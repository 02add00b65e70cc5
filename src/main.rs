//! `shelf`: catalog a directory of ebooks, normalize publisher names, and
//! optionally lay out browsable views of the library as symlinks.

use clap::{ArgAction, Parser};
use derive_more::{Display, Error};
use exn::ResultExt;
use shelf_cache::FingerprintStrategy;
use shelf_config::{Config, NormalizerConfig, NormalizerOverrides, Overrides};
use shelf_extract::Registry;
use shelf_library::{LinkPlanner, Options, Pipeline, Stores, materialize};
use shelf_resolve::{Normalizer, OpenAiNormalizer, Resolver, RuleTable};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, exn::Exn<ErrorKind>>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
enum ErrorKind {
    #[display("unable to load configuration")]
    Config,
    #[display("unable to set up the publisher normalizer")]
    Normalizer,
    #[display("unable to catalog the library")]
    Run,
    #[display("unable to write the catalog")]
    Catalog,
    #[display("unable to create links")]
    Links,
}

#[derive(Debug, Parser)]
#[command(name = "shelf", version, about)]
struct Args {
    /// Library directory to catalog [default: current directory]
    library: Option<PathBuf>,
    /// Configuration file [default: shelf.toml in the platform config directory]
    #[arg(short, long, env = "SHELF_CONFIG")]
    config: Option<PathBuf>,
    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,
    /// Maximum number of documents extracted at once
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,
    /// How changed documents are detected: `modified` or `hash`
    #[arg(long)]
    fingerprint: Option<FingerprintStrategy>,
    /// Extract every document again, ignoring cached metadata
    #[arg(long)]
    force_reload: bool,
    /// Forget every remembered publisher resolution
    #[arg(long)]
    reset_publishers: bool,
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Where to write the catalog
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Publisher rule table (JSON)
    #[arg(long)]
    rules: Option<PathBuf>,
    /// Send publishers no rule matches to the external normalizer
    #[arg(long)]
    normalize: bool,
    #[arg(long, requires = "normalize")]
    model: Option<String>,
    #[arg(long, requires = "normalize")]
    endpoint: Option<String>,
    /// Prompt template file for the external normalizer
    #[arg(long, requires = "normalize")]
    prompt: Option<PathBuf>,
    /// Create each configured view as a tree of symlinks under this directory
    #[arg(long, value_name = "DIR")]
    links: Option<PathBuf>,
    /// More logging; repeat for more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}
impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            library: self.library.clone(),
            recursive: self.recursive.then_some(true),
            concurrency: self.concurrency,
            fingerprint: self.fingerprint,
            force_reload: self.force_reload.then_some(true),
            reset_publishers: self.reset_publishers.then_some(true),
            cache_dir: self.cache_dir.clone(),
            catalog: self.catalog.clone(),
            rules: self.rules.clone(),
            normalizer: NormalizerOverrides {
                enabled: self.normalize.then_some(true),
                endpoint: self.endpoint.clone(),
                model: self.model.clone(),
                prompt: self.prompt.clone(),
            },
        }
    }

    fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref(), args.overrides()).or_raise(|| ErrorKind::Config)?;
    // Compile views before the run so a bad template costs nothing.
    let planner = match &args.links {
        Some(_) => Some(LinkPlanner::new(&config.views).or_raise(|| ErrorKind::Config)?),
        None => None,
    };

    let resolver = Resolver::new(RuleTable::load(config.rules_path().as_deref()))
        .with_normalizer(normalizer(&config.normalizer)?)
        .with_chunk_size(config.normalizer.chunk_size)
        .with_max_in_flight(config.normalizer.max_in_flight);
    let options = Options {
        library: config.library.clone(),
        recursive: config.recursive,
        concurrency: config.concurrency(),
        fingerprint: config.fingerprint,
        force_reload: config.force_reload,
    };
    let pipeline = Pipeline::new(Arc::new(Registry::with_defaults()), resolver, options);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; saving progress");
                cancel.cancel();
            }
        }
    });

    let stores = Stores::open(config.cache_dir(), config.reset_publishers);
    let report = pipeline.run(stores, &cancel).await.or_raise(|| ErrorKind::Run)?;
    let catalog_path = config.catalog_path();
    report.catalog.write(&catalog_path).or_raise(|| ErrorKind::Catalog)?;
    tracing::info!(path = %catalog_path.display(), entries = report.catalog.len(), "Catalog written");
    tracing::info!("Publishers: {}", report.stats.publishers);

    if let (Some(planner), Some(links)) = (planner, &args.links) {
        let placements = planner.plan(&report.catalog);
        let created = materialize(&placements, &report.library, links).or_raise(|| ErrorKind::Links)?;
        tracing::info!(path = %links.display(), created, "Links created");
    }
    Ok(())
}

/// The external normalizer, if it is enabled, has credentials and its prompt
/// template loads. Anything missing disables it with a warning; the run goes
/// on with cache and rules only.
fn normalizer(config: &NormalizerConfig) -> Result<Option<Arc<dyn Normalizer>>> {
    if !config.enabled {
        return Ok(None);
    }
    let Some(api_key) = config.api_key() else {
        tracing::warn!(env = config.api_key_env.as_str(), "No API key for the external normalizer; it won't be used");
        return Ok(None);
    };
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut normalizer = OpenAiNormalizer::new(&config.endpoint, &api_key, &config.model, timeout)
        .or_raise(|| ErrorKind::Normalizer)?;
    if let Some(prompt) = &config.prompt {
        normalizer = match normalizer.with_prompt_file(prompt) {
            Ok(normalizer) => normalizer,
            Err(error) => {
                tracing::warn!(
                    path = %prompt.display(),
                    "Unusable prompt template; the external normalizer won't be used: {error:?}"
                );
                return Ok(None);
            },
        };
    }
    tracing::debug!(model = config.model.as_str(), endpoint = config.endpoint.as_str(), "External normalizer ready");
    let normalizer: Arc<dyn Normalizer> = Arc::new(normalizer);
    Ok(Some(normalizer))
}
