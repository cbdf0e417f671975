use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::MultiGzDecoder;

use crate::error::KiraError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Writes one entry per line through a temp file in the destination
/// directory, then renames it over `path`.
pub fn write_lines_atomic<I, S>(path: &Utf8Path, lines: I) -> Result<usize, KiraError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parent = parent_dir(path);
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| KiraError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".kira-ss-list")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;

    let mut written = 0usize;
    {
        let mut writer = io::BufWriter::new(temp.as_file_mut());
        for line in lines {
            writer
                .write_all(line.as_ref().as_bytes())
                .and_then(|_| writer.write_all(b"\n"))
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            written += 1;
        }
        writer
            .flush()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| KiraError::Filesystem(format!("persist {path}: {}", err.error)))?;
    Ok(written)
}

/// Fails unless a file can be created next to `path`.
pub fn ensure_writable(path: &Utf8Path) -> Result<(), KiraError> {
    let parent = parent_dir(path);
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| KiraError::CatalogUnwritable(format!("{path}: {err}")))?;
    tempfile::Builder::new()
        .prefix(".kira-ss-write-check")
        .tempfile_in(parent.as_std_path())
        .map(drop)
        .map_err(|err| KiraError::CatalogUnwritable(format!("{path}: {err}")))
}

/// Checks that a downloaded signature is non-empty and, when gzipped,
/// decompresses cleanly to the end.
pub fn validate_signature(path: &Path) -> Result<(), KiraError> {
    let mut file = fs::File::open(path)
        .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut magic = [0u8; 2];
    let read = file
        .read(&mut magic)
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    if read == 0 {
        return Err(KiraError::InvalidSignature("empty payload".to_string()));
    }
    if read < 2 || magic != GZIP_MAGIC {
        return Ok(());
    }

    let file = fs::File::open(path)
        .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut decoder = MultiGzDecoder::new(file);
    let inflated = io::copy(&mut decoder, &mut io::sink())
        .map_err(|err| KiraError::InvalidSignature(format!("corrupt gzip stream: {err}")))?;
    if inflated == 0 {
        return Err(KiraError::InvalidSignature("empty gzip stream".to_string()));
    }
    Ok(())
}

pub fn absolute_utf8(path: &Utf8Path) -> Result<Utf8PathBuf, KiraError> {
    let absolute = std::path::absolute(path.as_std_path())
        .map_err(|err| KiraError::Filesystem(format!("resolve {path}: {err}")))?;
    Utf8PathBuf::from_path_buf(absolute)
        .map_err(|_| KiraError::Filesystem(format!("non-utf8 path: {path}")))
}

fn parent_dir(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn write_lines_overwrites() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested/list.txt")).unwrap();
        write_lines_atomic(&path, ["a", "b", "c"]).unwrap();
        let count = write_lines_atomic(&path, ["d"]).unwrap();
        assert_eq!(count, 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "d\n");
        let leftovers = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .map(|e| e.file_name().to_string_lossy().starts_with(".kira-ss"))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn truncated_gzip_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(br#"[{"signatures":[]}]"#.repeat(64).as_slice()).unwrap();
        let bytes = encoder.finish().unwrap();

        let good = temp.path().join("good.sig");
        fs::write(&good, &bytes).unwrap();
        validate_signature(&good).unwrap();

        let bad = temp.path().join("bad.sig");
        fs::write(&bad, &bytes[..bytes.len() / 2]).unwrap();
        assert_matches!(validate_signature(&bad), Err(KiraError::InvalidSignature(_)));
    }

    #[test]
    fn empty_payload_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let empty = temp.path().join("empty.sig");
        fs::write(&empty, b"").unwrap();
        assert_matches!(validate_signature(&empty), Err(KiraError::InvalidSignature(_)));
    }
}
