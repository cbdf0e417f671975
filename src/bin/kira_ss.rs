use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_sigsearch::app::{App, PrepareOptions, ProgressSink, ProgressSinkKind};
use kira_sigsearch::config::{Config, ConfigLoader, ResolvedConfig, SourceEntry, SourcesEntry};
use kira_sigsearch::domain::RunId;
use kira_sigsearch::error::KiraError;
use kira_sigsearch::output::{HumanOutput, JsonOutput, LogSink, OutputMode};
use kira_sigsearch::search::{SearchRequest, SearchTool, SystemSearcher};
use kira_sigsearch::store::SigStore;
use kira_sigsearch::wort::{WortClient, WortHttpClient};

#[derive(Parser)]
#[command(name = "kira-ss")]
#[command(about = "Build verified wort signature catalogs and dispatch containment searches")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Config file (defaults to kira-ss.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve identifiers, fetch missing signatures and write the catalog")]
    Prepare(PrepareArgs),
    #[command(about = "Rewrite a catalog to point at precomputed cache artifacts")]
    CacheCatalog(CacheArgs),
    #[command(about = "Run the external searcher against a catalog")]
    Search(SearchArgs),
    #[command(about = "Prepare the catalog, then search it")]
    Run(RunArgs),
    #[command(about = "Report the total size of the signatures in a catalog")]
    CatalogSize(CatalogSizeArgs),
    #[command(about = "Remove partial downloads left in the signature store")]
    Sweep(StoreArgs),
}

#[derive(Args, Clone, Default)]
struct StoreArgs {
    /// Local signature store directory
    #[arg(long)]
    wort_sigs: Option<String>,
}

#[derive(Args, Clone, Default)]
struct PrepareArgs {
    /// Identifier source (repeatable); replaces configured sources
    #[arg(long = "source")]
    sources: Vec<String>,

    #[command(flatten)]
    store: StoreArgs,

    #[arg(long)]
    catalog: Option<String>,

    #[arg(long)]
    cache_dir: Option<String>,

    #[arg(long)]
    cache_catalog: Option<String>,

    #[arg(long)]
    max_downloaders: Option<usize>,

    /// Download missing signatures from wort
    #[arg(long, conflicts_with = "skip_download")]
    download: bool,

    /// Catalog from the local store only
    #[arg(long)]
    skip_download: bool,

    #[arg(long)]
    wort_url: Option<String>,
}

#[derive(Args, Clone)]
struct CacheArgs {
    #[arg(long)]
    catalog: Option<String>,

    #[arg(long)]
    cache_dir: Option<String>,

    #[arg(long)]
    output: Option<String>,
}

#[derive(Args, Clone, Default)]
struct SearchParamArgs {
    #[arg(short, long)]
    ksize: Option<u32>,

    #[arg(short, long)]
    threshold: Option<f64>,

    #[arg(short, long)]
    scaled: Option<u64>,

    #[arg(long)]
    threads: Option<usize>,

    /// Query list passed to the searcher
    #[arg(long)]
    queries: Option<String>,

    #[arg(short, long)]
    output: Option<String>,

    /// Searcher executable
    #[arg(long)]
    searcher: Option<String>,
}

#[derive(Args, Clone)]
struct SearchArgs {
    #[arg(long)]
    catalog: Option<String>,

    #[arg(long)]
    cache_catalog: Option<String>,

    #[command(flatten)]
    params: SearchParamArgs,
}

#[derive(Args, Clone)]
struct RunArgs {
    #[command(flatten)]
    prepare: PrepareArgs,

    #[command(flatten)]
    params: SearchParamArgs,
}

#[derive(Args, Clone)]
struct CatalogSizeArgs {
    catalog: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::ConfigRead(_)
        | KiraError::ConfigParse(_)
        | KiraError::NoSources
        | KiraError::SourceRead { .. }
        | KiraError::SourceColumnMissing { .. }
        | KiraError::InvalidRunId(_)
        | KiraError::InvalidParameter(_)
        | KiraError::CatalogUnwritable(_)
        | KiraError::CatalogRead { .. }
        | KiraError::CacheDirRead { .. }
        | KiraError::CacheUnmapped { .. }
        | KiraError::CacheAmbiguous { .. } => 2,
        KiraError::WortHttp(_)
        | KiraError::WortStatus { .. }
        | KiraError::IncompleteDownload { .. }
        | KiraError::MissingTool(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let default_level = match output_mode {
        OutputMode::Interactive => "info",
        OutputMode::NonInteractive => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = ConfigLoader::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Prepare(args) => {
            apply_prepare_args(&mut config, &args);
            let resolved = ConfigLoader::resolve_config(config)?;
            let options = PrepareOptions::from_config(&resolved);
            with_app(&resolved, options.skip_download, |app| {
                run_prepare(app, &resolved, options, output_mode)
            })
        }
        Commands::CacheCatalog(args) => {
            if let Some(catalog) = args.catalog {
                config.catalog = Some(catalog);
            }
            if let Some(cache_dir) = args.cache_dir {
                config.cache_dir = Some(cache_dir);
            }
            if let Some(output) = args.output {
                config.cache_catalog = Some(output);
            }
            let resolved = ConfigLoader::resolve_config(config)?;
            let cache_dir = resolved.cache_dir.clone().ok_or_else(|| {
                KiraError::InvalidParameter("cache_dir is required".to_string())
            })?;
            with_app(&resolved, true, |app| {
                let sink = sink_for(output_mode, ProgressSinkKind::Catalog);
                let result = app.rewrite_cache(
                    &resolved.catalog,
                    &cache_dir,
                    &resolved.cache_catalog,
                    sink.as_ref(),
                )?;
                match output_mode {
                    OutputMode::NonInteractive => JsonOutput::print(&result).into_diagnostic(),
                    OutputMode::Interactive => {
                        HumanOutput::print_cache(&result);
                        Ok(())
                    }
                }
            })
        }
        Commands::Search(args) => {
            if let Some(catalog) = args.catalog {
                config.catalog = Some(catalog);
            }
            apply_search_args(&mut config, &args.params);
            let resolved = ConfigLoader::resolve_config(config)?;
            let queries = resolved.query_sigs.clone().ok_or_else(|| {
                KiraError::InvalidParameter("query_sigs is required to run a search".to_string())
            })?;
            let request = SearchRequest {
                queries,
                catalog: resolved.catalog.clone(),
                cache_catalog: args.cache_catalog.map(Utf8PathBuf::from),
                params: resolved.search,
                output: resolved.output.clone(),
            };
            with_app(&resolved, true, |app| {
                let sink = sink_for(output_mode, ProgressSinkKind::Search);
                let report = app.search(&request, sink.as_ref())?;
                match output_mode {
                    OutputMode::NonInteractive => JsonOutput::print(&report).into_diagnostic(),
                    OutputMode::Interactive => {
                        HumanOutput::print_search(&report);
                        Ok(())
                    }
                }
            })
        }
        Commands::Run(args) => {
            apply_prepare_args(&mut config, &args.prepare);
            apply_search_args(&mut config, &args.params);
            let resolved = ConfigLoader::resolve_config(config)?;
            let options = PrepareOptions::from_config(&resolved);
            with_app(&resolved, options.skip_download, |app| {
                let sink = sink_for(output_mode, ProgressSinkKind::Prepare);
                let result = app.run(&resolved, options, sink.as_ref())?;
                match output_mode {
                    OutputMode::NonInteractive => JsonOutput::print(&result).into_diagnostic(),
                    OutputMode::Interactive => {
                        HumanOutput::print_run(&result);
                        Ok(())
                    }
                }
            })
        }
        Commands::CatalogSize(args) => {
            if let Some(catalog) = args.catalog {
                config.catalog = Some(catalog);
            }
            let resolved = ConfigLoader::resolve_config(config)?;
            with_app(&resolved, true, |app| {
                let sink = sink_for(output_mode, ProgressSinkKind::Catalog);
                let stats = app.catalog_stats(&resolved.catalog, sink.as_ref())?;
                match output_mode {
                    OutputMode::NonInteractive => JsonOutput::print(&stats).into_diagnostic(),
                    OutputMode::Interactive => {
                        HumanOutput::print_stats(&stats);
                        Ok(())
                    }
                }
            })
        }
        Commands::Sweep(args) => {
            if let Some(root) = args.wort_sigs {
                config.wort_sigs = Some(root);
            }
            let resolved = ConfigLoader::resolve_config(config)?;
            with_app(&resolved, true, |app| {
                let sink = sink_for(output_mode, ProgressSinkKind::Catalog);
                let result = app.sweep(sink.as_ref())?;
                match output_mode {
                    OutputMode::NonInteractive => JsonOutput::print(&result).into_diagnostic(),
                    OutputMode::Interactive => {
                        HumanOutput::print_sweep(&result);
                        Ok(())
                    }
                }
            })
        }
    }
}

fn apply_prepare_args(config: &mut Config, args: &PrepareArgs) {
    if !args.sources.is_empty() {
        config.sources = Some(SourcesEntry::Many(
            args.sources
                .iter()
                .cloned()
                .map(SourceEntry::Shorthand)
                .collect(),
        ));
    }
    if let Some(root) = &args.store.wort_sigs {
        config.wort_sigs = Some(root.clone());
    }
    if let Some(catalog) = &args.catalog {
        config.catalog = Some(catalog.clone());
    }
    if let Some(cache_dir) = &args.cache_dir {
        config.cache_dir = Some(cache_dir.clone());
    }
    if let Some(cache_catalog) = &args.cache_catalog {
        config.cache_catalog = Some(cache_catalog.clone());
    }
    if let Some(max) = args.max_downloaders {
        config.max_downloaders = Some(max);
    }
    if args.download {
        config.skip_download = Some(false);
    }
    if args.skip_download {
        config.skip_download = Some(true);
    }
    if let Some(url) = &args.wort_url {
        config.wort_url = Some(url.clone());
    }
}

fn apply_search_args(config: &mut Config, args: &SearchParamArgs) {
    if let Some(ksize) = args.ksize {
        config.ksize = Some(ksize);
    }
    if let Some(threshold) = args.threshold {
        config.threshold = Some(threshold);
    }
    if let Some(scaled) = args.scaled {
        config.scaled = Some(scaled);
    }
    if let Some(threads) = args.threads {
        config.threads = Some(threads);
    }
    if let Some(queries) = &args.queries {
        config.query_sigs = Some(queries.clone());
    }
    if let Some(output) = &args.output {
        config.output = Some(output.clone());
    }
    if let Some(searcher) = &args.searcher {
        config.searcher = Some(searcher.clone());
    }
}

/// Builds the app with the real wort client, or with one that refuses every
/// request when the command must stay offline.
fn with_app<F>(resolved: &ResolvedConfig, offline: bool, body: F) -> miette::Result<()>
where
    F: FnOnce(&dyn DynApp) -> miette::Result<()>,
{
    let store = SigStore::new(&resolved.wort_sigs)?;
    let searcher = SystemSearcher::new(&resolved.searcher);
    if offline {
        body(&App::new(store, OfflineWort, searcher))
    } else {
        let wort = WortHttpClient::new(
            &resolved.wort_url,
            Duration::from_secs(resolved.timeout_secs),
        )?;
        body(&App::new(store, wort, searcher))
    }
}

fn run_prepare(
    app: &dyn DynApp,
    resolved: &ResolvedConfig,
    options: PrepareOptions,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let sink = sink_for(output_mode, ProgressSinkKind::Prepare);
    let result = app.prepare(resolved, options, sink.as_ref())?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print(&result).into_diagnostic(),
        OutputMode::Interactive => {
            HumanOutput::print_prepare(&result);
            std::io::stdout().flush().into_diagnostic()
        }
    }
}

fn sink_for(output_mode: OutputMode, kind: ProgressSinkKind) -> Box<dyn ProgressSink> {
    match output_mode {
        OutputMode::NonInteractive => Box::new(JsonOutput),
        OutputMode::Interactive => Box::new(LogSink::new(kind)),
    }
}

/// Object-safe view of `App` so commands need not be generic over clients.
trait DynApp {
    fn prepare(
        &self,
        config: &ResolvedConfig,
        options: PrepareOptions,
        sink: &dyn ProgressSink,
    ) -> Result<kira_sigsearch::app::PrepareResult, KiraError>;
    fn rewrite_cache(
        &self,
        catalog: &camino::Utf8Path,
        cache_dir: &camino::Utf8Path,
        output: &camino::Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<kira_sigsearch::cache::CacheCatalogWrite, KiraError>;
    fn search(
        &self,
        request: &SearchRequest,
        sink: &dyn ProgressSink,
    ) -> Result<kira_sigsearch::search::SearchReport, KiraError>;
    fn run(
        &self,
        config: &ResolvedConfig,
        options: PrepareOptions,
        sink: &dyn ProgressSink,
    ) -> Result<kira_sigsearch::app::RunResult, KiraError>;
    fn catalog_stats(
        &self,
        catalog: &camino::Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<kira_sigsearch::catalog::CatalogStats, KiraError>;
    fn sweep(&self, sink: &dyn ProgressSink)
    -> Result<kira_sigsearch::app::SweepResult, KiraError>;
}

impl<W: WortClient, S: SearchTool> DynApp for App<W, S> {
    fn prepare(
        &self,
        config: &ResolvedConfig,
        options: PrepareOptions,
        sink: &dyn ProgressSink,
    ) -> Result<kira_sigsearch::app::PrepareResult, KiraError> {
        App::prepare(self, config, options, sink)
    }

    fn rewrite_cache(
        &self,
        catalog: &camino::Utf8Path,
        cache_dir: &camino::Utf8Path,
        output: &camino::Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<kira_sigsearch::cache::CacheCatalogWrite, KiraError> {
        App::rewrite_cache(self, catalog, cache_dir, output, sink)
    }

    fn search(
        &self,
        request: &SearchRequest,
        sink: &dyn ProgressSink,
    ) -> Result<kira_sigsearch::search::SearchReport, KiraError> {
        App::search(self, request, sink)
    }

    fn run(
        &self,
        config: &ResolvedConfig,
        options: PrepareOptions,
        sink: &dyn ProgressSink,
    ) -> Result<kira_sigsearch::app::RunResult, KiraError> {
        App::run(self, config, options, sink)
    }

    fn catalog_stats(
        &self,
        catalog: &camino::Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<kira_sigsearch::catalog::CatalogStats, KiraError> {
        App::catalog_stats(self, catalog, sink)
    }

    fn sweep(
        &self,
        sink: &dyn ProgressSink,
    ) -> Result<kira_sigsearch::app::SweepResult, KiraError> {
        App::sweep(self, sink)
    }
}

#[derive(Clone, Copy)]
struct OfflineWort;

impl WortClient for OfflineWort {
    fn locate(&self, id: &RunId) -> Result<Option<String>, KiraError> {
        Err(KiraError::WortHttp(format!(
            "downloads disabled; not looking up {id}"
        )))
    }

    fn download(
        &self,
        location: &str,
        _destination: &mut dyn Write,
    ) -> Result<u64, KiraError> {
        Err(KiraError::WortHttp(format!(
            "downloads disabled; not fetching {location}"
        )))
    }
}
