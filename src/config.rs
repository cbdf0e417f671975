use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::{
    DEFAULT_KSIZE, DEFAULT_SCALED, DEFAULT_THRESHOLD, SearchParams, SourceFormat,
};
use crate::error::KiraError;
use crate::fetch::DEFAULT_MAX_DOWNLOADERS;
use crate::search::DEFAULT_SEARCHER;
use crate::sources::{DEFAULT_ID_COLUMN, IdentifierSource};
use crate::store::SigStore;
use crate::wort::{DEFAULT_TIMEOUT_SECS, DEFAULT_WORT_URL};

pub const DEFAULT_CONFIG_FILE: &str = "kira-ss.json";
pub const DEFAULT_CATALOG: &str = "catalog.txt";
pub const DEFAULT_OUTPUT: &str = "results.csv";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub sources: Option<SourcesEntry>,
    #[serde(default)]
    pub wort_sigs: Option<String>,
    #[serde(default)]
    pub query_sigs: Option<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub ksize: Option<u32>,
    #[serde(default)]
    pub scaled: Option<u64>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub max_downloaders: Option<usize>,
    #[serde(default)]
    pub skip_download: Option<bool>,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub cache_catalog: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub wort_url: Option<String>,
    #[serde(default)]
    pub searcher: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourcesEntry {
    One(SourceEntry),
    Many(Vec<SourceEntry>),
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourceEntry {
    Shorthand(String),
    Detailed(SourceEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SourceEntryObject {
    pub path: String,
    #[serde(default)]
    pub format: Option<SourceFormat>,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub delimiter: Option<char>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub sources: Vec<IdentifierSource>,
    pub wort_sigs: Utf8PathBuf,
    pub query_sigs: Option<Utf8PathBuf>,
    pub search: SearchParams,
    pub max_downloaders: usize,
    pub skip_download: bool,
    pub catalog: Utf8PathBuf,
    pub cache_dir: Option<Utf8PathBuf>,
    pub cache_catalog: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub wort_url: String,
    pub searcher: String,
    pub timeout_secs: u64,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file; a missing default file yields an empty config
    /// so commands driven purely by flags still work.
    pub fn load(path: Option<&str>) -> Result<Config, KiraError> {
        let config_path = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| KiraError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let sources = match config.sources {
            None => Vec::new(),
            Some(SourcesEntry::One(entry)) => vec![resolve_source(entry)],
            Some(SourcesEntry::Many(entries)) => entries.into_iter().map(resolve_source).collect(),
        };

        let search = SearchParams {
            ksize: config.ksize.unwrap_or(DEFAULT_KSIZE),
            threshold: config.threshold.unwrap_or(DEFAULT_THRESHOLD),
            scaled: config.scaled.unwrap_or(DEFAULT_SCALED),
            threads: config.threads,
        };
        search.validate()?;

        let max_downloaders = config.max_downloaders.unwrap_or(DEFAULT_MAX_DOWNLOADERS);
        if max_downloaders == 0 {
            return Err(KiraError::InvalidParameter(
                "max_downloaders must be a positive integer".to_string(),
            ));
        }

        let wort_sigs = match config.wort_sigs {
            Some(path) => Utf8PathBuf::from(path),
            None => SigStore::default_root()?,
        };
        let catalog = Utf8PathBuf::from(config.catalog.unwrap_or_else(|| DEFAULT_CATALOG.to_string()));
        let cache_catalog = config
            .cache_catalog
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| default_cache_catalog(&catalog));

        Ok(ResolvedConfig {
            sources,
            wort_sigs,
            query_sigs: config.query_sigs.map(Utf8PathBuf::from),
            search,
            max_downloaders,
            // the upstream workflow only downloads when explicitly asked to
            skip_download: config.skip_download.unwrap_or(true),
            catalog,
            cache_dir: config.cache_dir.map(Utf8PathBuf::from),
            cache_catalog,
            output: Utf8PathBuf::from(config.output.unwrap_or_else(|| DEFAULT_OUTPUT.to_string())),
            wort_url: config.wort_url.unwrap_or_else(|| DEFAULT_WORT_URL.to_string()),
            searcher: config.searcher.unwrap_or_else(|| DEFAULT_SEARCHER.to_string()),
            timeout_secs: config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }
}

fn resolve_source(entry: SourceEntry) -> IdentifierSource {
    match entry {
        SourceEntry::Shorthand(path) => IdentifierSource::infer(path),
        SourceEntry::Detailed(obj) => {
            let inferred = IdentifierSource::infer(obj.path);
            IdentifierSource {
                format: obj.format.unwrap_or(inferred.format),
                column: obj.column.unwrap_or_else(|| DEFAULT_ID_COLUMN.to_string()),
                delimiter: obj.delimiter.unwrap_or(inferred.delimiter),
                path: inferred.path,
            }
        }
    }
}

/// `catalog.txt` -> `catalog.cache.txt`, next to the catalog.
pub fn default_cache_catalog(catalog: &Utf8Path) -> Utf8PathBuf {
    let stem = catalog.file_stem().unwrap_or("catalog");
    let name = match catalog.extension() {
        Some(ext) => format!("{stem}.cache.{ext}"),
        None => format!("{stem}.cache"),
    };
    catalog.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_shorthand() {
        let config: Config = serde_json::from_str(
            r#"{"sources": "inputs/runinfo.csv", "wort_sigs": "/data/wort/sigs"}"#,
        )
        .unwrap();

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.sources.len(), 1);
        assert_eq!(resolved.sources[0].format, SourceFormat::Table);
        assert_eq!(resolved.sources[0].column, "Run");
        assert_eq!(resolved.search, SearchParams::default());
        assert_eq!(resolved.max_downloaders, DEFAULT_MAX_DOWNLOADERS);
        assert!(resolved.skip_download);
        assert_eq!(resolved.catalog, Utf8PathBuf::from("catalog.txt"));
        assert_eq!(resolved.cache_catalog, Utf8PathBuf::from("catalog.cache.txt"));
    }

    #[test]
    fn default_cache_catalog_keeps_directory() {
        assert_eq!(
            default_cache_catalog(Utf8Path::new("outputs/mags.txt")),
            Utf8PathBuf::from("outputs/mags.cache.txt")
        );
        assert_eq!(
            default_cache_catalog(Utf8Path::new("catalog")),
            Utf8PathBuf::from("catalog.cache")
        );
    }
}
