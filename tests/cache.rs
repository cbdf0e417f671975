use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_sigsearch::cache;
use kira_sigsearch::catalog;
use kira_sigsearch::error::KiraError;

struct Layout {
    _temp: tempfile::TempDir,
    sigs: Utf8PathBuf,
    cache_dir: Utf8PathBuf,
    catalog: Utf8PathBuf,
    output: Utf8PathBuf,
}

fn layout(entries: &[&str], artifacts: &[&str]) -> Layout {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let sigs = root.join("sigs");
    let cache_dir = root.join("cache");
    fs::create_dir_all(sigs.as_std_path()).unwrap();
    fs::create_dir_all(cache_dir.as_std_path()).unwrap();
    for artifact in artifacts {
        fs::write(cache_dir.join(artifact).as_std_path(), b"cache").unwrap();
    }
    let lines = entries
        .iter()
        .map(|entry| format!("{}\n", sigs.join(entry)))
        .collect::<String>();
    let catalog = root.join("catalog.txt");
    fs::write(catalog.as_std_path(), lines).unwrap();
    Layout {
        _temp: temp,
        sigs,
        cache_dir,
        catalog,
        output: root.join("catalog.cache.txt"),
    }
}

#[test]
fn rewrite_keeps_catalog_order() {
    let layout = layout(&["SRR2.sig", "SRR1.sig"], &["SRR1.sig.bin", "SRR2.sig"]);

    let written = cache::rewrite(&layout.catalog, &layout.cache_dir, &layout.output).unwrap();
    assert_eq!(written.entries, 2);

    let lines = catalog::read_entries(&layout.output).unwrap();
    assert_eq!(
        lines,
        vec![
            layout.cache_dir.join("SRR2.sig"),
            layout.cache_dir.join("SRR1.sig.bin"),
        ]
    );
    assert!(lines.iter().all(|line| !line.starts_with(&layout.sigs)));
}

#[test]
fn unmapped_entries_are_reported_together() {
    let layout = layout(&["SRR1.sig", "SRR2.sig", "SRR3.sig"], &["SRR2.sig"]);

    let err = cache::rewrite(&layout.catalog, &layout.cache_dir, &layout.output).unwrap_err();
    assert_matches!(err, KiraError::CacheUnmapped { ref entries } if entries.len() == 2);
    assert!(!layout.output.as_std_path().exists());
}

#[test]
fn failed_rewrite_removes_stale_output() {
    let layout = layout(&["SRR1.sig"], &[]);
    fs::write(layout.output.as_std_path(), "/old/SRR1.sig\n").unwrap();

    let err = cache::rewrite(&layout.catalog, &layout.cache_dir, &layout.output).unwrap_err();
    assert_matches!(err, KiraError::CacheUnmapped { .. });
    assert!(!layout.output.as_std_path().exists());
}

#[test]
fn ambiguous_artifacts_are_rejected() {
    let layout = layout(&["SRR1.sig"], &["SRR1.sig.bin", "SRR1.sig.zip"]);

    assert_matches!(
        cache::rewrite(&layout.catalog, &layout.cache_dir, &layout.output),
        Err(KiraError::CacheAmbiguous { .. })
    );
    assert!(!layout.output.as_std_path().exists());
}

#[test]
fn missing_cache_dir_is_an_error() {
    let layout = layout(&["SRR1.sig"], &[]);
    let absent = layout.cache_dir.join("nope");
    assert_matches!(
        cache::rewrite(&layout.catalog, &absent, &layout.output),
        Err(KiraError::CacheDirRead { .. })
    );
}
