use std::collections::BTreeSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;

use crate::domain::{RunId, SourceFormat};
use crate::error::KiraError;

pub const DEFAULT_ID_COLUMN: &str = "Run";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierSource {
    pub path: Utf8PathBuf,
    pub format: SourceFormat,
    pub column: String,
    pub delimiter: char,
}

impl IdentifierSource {
    /// Source settings guessed from the file extension: `.csv`/`.tsv` are
    /// SRA RunInfo-style tables keyed by `Run`, anything else is a list.
    pub fn infer(path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        let ext = path.extension().map(|ext| ext.to_ascii_lowercase());
        let (format, delimiter) = match ext.as_deref() {
            Some("csv") => (SourceFormat::Table, ','),
            Some("tsv") => (SourceFormat::Table, '\t'),
            _ => (SourceFormat::List, ','),
        };
        Self {
            path,
            format,
            column: DEFAULT_ID_COLUMN.to_string(),
            delimiter,
        }
    }

    pub fn list(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            format: SourceFormat::List,
            ..Self::infer(path)
        }
    }

    fn read_ids(&self, out: &mut BTreeSet<RunId>) -> Result<(), KiraError> {
        let content =
            fs::read_to_string(self.path.as_std_path()).map_err(|err| KiraError::SourceRead {
                path: self.path.to_string(),
                message: err.to_string(),
            })?;
        match self.format {
            SourceFormat::List => read_list(&content, out),
            SourceFormat::Table => read_table(&self.path, &content, &self.column, self.delimiter, out),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentifierSet(BTreeSet<RunId>);

impl IdentifierSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &RunId) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunId> {
        self.0.iter()
    }
}

impl FromIterator<RunId> for IdentifierSet {
    fn from_iter<T: IntoIterator<Item = RunId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub fn resolve(sources: &[IdentifierSource]) -> Result<IdentifierSet, KiraError> {
    if sources.is_empty() {
        return Err(KiraError::NoSources);
    }
    let mut ids = BTreeSet::new();
    for source in sources {
        let before = ids.len();
        source.read_ids(&mut ids)?;
        debug!(
            source = %source.path,
            format = %source.format,
            added = ids.len() - before,
            "read identifier source"
        );
    }
    Ok(IdentifierSet(ids))
}

fn read_list(content: &str, out: &mut BTreeSet<RunId>) -> Result<(), KiraError> {
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        out.insert(line.parse()?);
    }
    Ok(())
}

fn read_table(
    path: &Utf8Path,
    content: &str,
    column: &str,
    delimiter: char,
    out: &mut BTreeSet<RunId>,
) -> Result<(), KiraError> {
    let mut records = split_records(content, delimiter).into_iter();
    let header = records.next();
    let index = header
        .as_ref()
        .and_then(|fields| fields.iter().position(|field| field.trim() == column))
        .ok_or_else(|| KiraError::SourceColumnMissing {
            path: path.to_string(),
            column: column.to_string(),
        })?;

    for fields in records {
        let Some(value) = fields.get(index) else {
            continue;
        };
        if value.trim().is_empty() {
            continue;
        }
        out.insert(value.parse()?);
    }
    Ok(())
}

/// Delimited records with double-quoted fields, `""` escapes and quoted
/// line breaks. Blank records are dropped.
fn split_records(content: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
                records.push(std::mem::take(&mut fields));
            }
            ch if ch == delimiter && !in_quotes => fields.push(std::mem::take(&mut current)),
            ch => current.push(ch),
        }
    }
    if !current.is_empty() || !fields.is_empty() {
        fields.push(current);
        records.push(fields);
    }
    records.retain(|fields| fields.iter().any(|field| !field.trim().is_empty()));
    records
}
