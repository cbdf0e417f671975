use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const DEFAULT_KSIZE: u32 = 31;
pub const DEFAULT_THRESHOLD: f64 = 0.01;
pub const DEFAULT_SCALED: u64 = 1000;

/// Sequencing run accession, used verbatim as the signature file stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn sig_file_name(&self) -> String {
        format!("{}.sig", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && !normalized.starts_with('.')
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'));
        if !is_valid {
            return Err(KiraError::InvalidRunId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Delimited table with a header row and an identifier column.
    Table,
    /// One identifier per line.
    List,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Table => write!(f, "table"),
            SourceFormat::List => write!(f, "list"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchParams {
    pub ksize: u32,
    pub threshold: f64,
    pub scaled: u64,
    pub threads: Option<usize>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            ksize: DEFAULT_KSIZE,
            threshold: DEFAULT_THRESHOLD,
            scaled: DEFAULT_SCALED,
            threads: None,
        }
    }
}

impl SearchParams {
    pub fn validate(&self) -> Result<(), KiraError> {
        if self.ksize == 0 {
            return Err(KiraError::InvalidParameter(
                "ksize must be a positive integer".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(KiraError::InvalidParameter(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.scaled == 0 {
            return Err(KiraError::InvalidParameter(
                "scaled must be a positive integer".to_string(),
            ));
        }
        if self.threads == Some(0) {
            return Err(KiraError::InvalidParameter(
                "threads must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}
