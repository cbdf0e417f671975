use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{Level, debug, info};

use crate::cache::{self, CacheCatalogWrite};
use crate::catalog::{self, Catalog, CatalogStats, CatalogWrite};
use crate::config::ResolvedConfig;
use crate::domain::RunId;
use crate::error::KiraError;
use crate::fetch::{FetchOutcome, FetchReport, Fetcher};
use crate::fs_util;
use crate::search::{SearchReport, SearchRequest, SearchTool};
use crate::sources;
use crate::store::SigStore;
use crate::wort::WortClient;

#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub skip_download: bool,
    pub max_downloaders: usize,
}

impl PrepareOptions {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            skip_download: config.skip_download,
            max_downloaders: config.max_downloaders,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFetch {
    pub id: RunId,
    pub cause: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrepareResult {
    pub identifiers: usize,
    pub present: usize,
    pub missing: usize,
    pub download_skipped: bool,
    pub fetched: Vec<RunId>,
    pub not_found: Vec<RunId>,
    pub failed: Vec<FailedFetch>,
    pub swept_partials: usize,
    pub catalog: CatalogWrite,
    pub cache_catalog: Option<CacheCatalogWrite>,
    pub generated_at: String,
}

impl PrepareResult {
    /// True when every identifier is either cataloged or confirmed absent
    /// from wort. Incomplete catalogs are still valid search inputs.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && (!self.download_skipped || self.missing == 0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub prepare: PrepareResult,
    pub search: SearchReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub root: Utf8PathBuf,
    pub removed: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressSinkKind {
    Prepare,
    Search,
    Catalog,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<W: WortClient, S: SearchTool> {
    store: SigStore,
    wort: W,
    searcher: S,
}

impl<W: WortClient, S: SearchTool> App<W, S> {
    pub fn new(store: SigStore, wort: W, searcher: S) -> Self {
        Self {
            store,
            wort,
            searcher,
        }
    }

    pub fn store(&self) -> &SigStore {
        &self.store
    }

    /// Identifier sources -> presence check -> downloads -> catalog, plus
    /// the cache catalog when a cache directory is configured.
    pub fn prepare(
        &self,
        config: &ResolvedConfig,
        options: PrepareOptions,
        sink: &dyn ProgressSink,
    ) -> Result<PrepareResult, KiraError> {
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; reading {} source(s)", config.sources.len()),
            elapsed: None,
        });
        let ids = sources::resolve(&config.sources)?;
        fs_util::ensure_writable(&config.catalog)?;
        self.store.ensure_root()?;
        info!(identifiers = ids.len(), "identifier set resolved");

        sink.event(ProgressEvent {
            message: format!("phase=Check; {} identifiers against {}", ids.len(), self.store.root()),
            elapsed: Some(start.elapsed()),
        });
        let presence = self.store.partition(&ids);
        info!(
            present = presence.present.len(),
            missing = presence.missing.len(),
            "local presence checked"
        );

        let mut swept_partials = 0;
        let mut reports = Vec::new();
        if options.skip_download {
            sink.event(ProgressEvent {
                message: "phase=Fetch; skipped".to_string(),
                elapsed: Some(start.elapsed()),
            });
        } else if !presence.missing.is_empty() {
            swept_partials = self.store.sweep_partials()?.len();
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Fetch; {} missing, {} downloaders",
                    presence.missing.len(),
                    options.max_downloaders
                ),
                elapsed: Some(start.elapsed()),
            });
            let fetcher = Fetcher::new(&self.wort, &self.store, options.max_downloaders);
            reports = fetcher.fetch_all(&presence.missing, sink);
        }
        let (fetched_paths, fetched, not_found, failed) = split_reports(reports);

        sink.event(ProgressEvent {
            message: "phase=Catalog; writing catalog".to_string(),
            elapsed: Some(start.elapsed()),
        });
        let catalog = Catalog::build(&presence.present, &fetched_paths).write(&config.catalog)?;

        let cache_catalog = match &config.cache_dir {
            Some(cache_dir) => Some(self.rewrite_cache(
                &config.catalog,
                cache_dir,
                &config.cache_catalog,
                sink,
            )?),
            None => None,
        };

        Ok(PrepareResult {
            identifiers: ids.len(),
            present: presence.present.len(),
            missing: presence.missing.len(),
            download_skipped: options.skip_download,
            fetched,
            not_found,
            failed,
            swept_partials,
            catalog,
            cache_catalog,
            generated_at: iso_timestamp(),
        })
    }

    pub fn rewrite_cache(
        &self,
        catalog: &Utf8Path,
        cache_dir: &Utf8Path,
        output: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<CacheCatalogWrite, KiraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Cache; mapping {catalog} onto {cache_dir}"),
            elapsed: None,
        });
        cache::rewrite(catalog, cache_dir, output)
    }

    /// Never fails because of the searcher itself; its exit status is
    /// returned for the caller to judge.
    pub fn search(
        &self,
        request: &SearchRequest,
        sink: &dyn ProgressSink,
    ) -> Result<SearchReport, KiraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Search; {} against {}", request.queries, request.catalog),
            elapsed: None,
        });
        if tracing::enabled!(Level::DEBUG) {
            if let Some(version) = self.searcher.version() {
                debug!(%version, "searcher detected");
            }
        }
        let start = Instant::now();
        let report = self.searcher.run(request)?;
        sink.event(ProgressEvent {
            message: format!("phase=Search; exit_code={:?}", report.exit_code),
            elapsed: Some(start.elapsed()),
        });
        Ok(report)
    }

    pub fn run(
        &self,
        config: &ResolvedConfig,
        options: PrepareOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, KiraError> {
        let queries = config.query_sigs.clone().ok_or_else(|| {
            KiraError::InvalidParameter("query_sigs is required to run a search".to_string())
        })?;
        let prepare = self.prepare(config, options, sink)?;
        let request = SearchRequest {
            queries,
            catalog: prepare.catalog.path.clone(),
            cache_catalog: prepare.cache_catalog.as_ref().map(|cache| cache.path.clone()),
            params: config.search,
            output: config.output.clone(),
        };
        let search = self.search(&request, sink)?;
        Ok(RunResult { prepare, search })
    }

    pub fn catalog_stats(
        &self,
        catalog: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<CatalogStats, KiraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Catalog; measuring {catalog}"),
            elapsed: None,
        });
        catalog::stats(catalog)
    }

    pub fn sweep(&self, sink: &dyn ProgressSink) -> Result<SweepResult, KiraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Store; sweeping partial downloads in {}", self.store.root()),
            elapsed: None,
        });
        Ok(SweepResult {
            root: self.store.root().to_path_buf(),
            removed: self.store.sweep_partials()?,
        })
    }
}

type SplitReports = (Vec<Utf8PathBuf>, Vec<RunId>, Vec<RunId>, Vec<FailedFetch>);

fn split_reports(reports: Vec<FetchReport>) -> SplitReports {
    let mut paths = Vec::new();
    let mut fetched = Vec::new();
    let mut not_found = Vec::new();
    let mut failed = Vec::new();
    for report in reports {
        match report.outcome {
            FetchOutcome::Fetched(path) => {
                paths.push(path);
                fetched.push(report.id);
            }
            FetchOutcome::NotFound => not_found.push(report.id),
            FetchOutcome::TransientFailure(cause) => failed.push(FailedFetch {
                id: report.id,
                cause,
            }),
        }
    }
    fetched.sort();
    not_found.sort();
    failed.sort_by(|a, b| a.id.cmp(&b.id));
    (paths, fetched, not_found, failed)
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
