use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_sigsearch::domain::RunId;
use kira_sigsearch::error::KiraError;
use kira_sigsearch::sources::{self, IdentifierSource};

fn write(temp: &tempfile::TempDir, name: &str, content: &str) -> Utf8PathBuf {
    let path = Utf8PathBuf::from_path_buf(temp.path().join(name)).unwrap();
    fs::write(path.as_std_path(), content).unwrap();
    path
}

#[test]
fn union_of_table_and_list_is_deduplicated() {
    let temp = tempfile::tempdir().unwrap();
    let runinfo = write(
        &temp,
        "runinfo.csv",
        "Run,LibraryStrategy\nSRR1,WGS\nSRR2,WGS\nSRR2,WGS\n",
    );
    let picked = write(&temp, "picked.txt", "SRR2\nSRR3\n\n");

    let ids = sources::resolve(&[
        IdentifierSource::infer(runinfo),
        IdentifierSource::infer(picked),
    ])
    .unwrap();

    let values = ids.iter().map(RunId::as_str).collect::<Vec<_>>();
    assert_eq!(values, vec!["SRR1", "SRR2", "SRR3"]);
}

#[test]
fn line_order_does_not_matter() {
    let temp = tempfile::tempdir().unwrap();
    let forward = write(&temp, "a.txt", "SRR1\nSRR2\nSRR3\n");
    let reversed = write(&temp, "b.txt", "SRR3\nSRR1\nSRR2\nSRR1\n");

    let first = sources::resolve(&[IdentifierSource::list(forward)]).unwrap();
    let second = sources::resolve(&[IdentifierSource::list(reversed)]).unwrap();
    assert_eq!(first, second);
}

#[test]
fn tsv_table_uses_tab_delimiter() {
    let temp = tempfile::tempdir().unwrap();
    let runinfo = write(&temp, "runinfo.tsv", "Sample\tRun\nS1\tERR10\nS2\tERR11\n");
    let ids = sources::resolve(&[IdentifierSource::infer(runinfo)]).unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"ERR11".parse().unwrap()));
}

#[test]
fn missing_source_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let present = write(&temp, "ids.txt", "SRR1\n");
    let absent = Utf8PathBuf::from_path_buf(temp.path().join("absent.txt")).unwrap();

    let result = sources::resolve(&[
        IdentifierSource::list(present),
        IdentifierSource::list(absent),
    ]);
    assert_matches!(result, Err(KiraError::SourceRead { .. }));
}

#[test]
fn table_without_column_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let runinfo = write(&temp, "runinfo.csv", "Accession,Model\nSRR1,x\n");
    assert_matches!(
        sources::resolve(&[IdentifierSource::infer(runinfo)]),
        Err(KiraError::SourceColumnMissing { .. })
    );
}

#[test]
fn no_sources_is_an_error() {
    assert_matches!(sources::resolve(&[]), Err(KiraError::NoSources));
}
