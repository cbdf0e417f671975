#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};

use kira_sigsearch::domain::SearchParams;
use kira_sigsearch::search::{SearchRequest, SearchTool, SystemSearcher};

const FAKE_SEARCHER: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf 'query,Run,containment\n' > "$out"
echo "threads=$RAYON_NUM_THREADS" >&2
exit 3
"#;

const CRASHING_SEARCHER: &str = "#!/bin/sh\necho boom >&2\nexit 101\n";

fn install(root: &Utf8Path, name: &str, body: &str) -> Utf8PathBuf {
    let script = root.join(name);
    fs::write(script.as_std_path(), body).unwrap();
    fs::set_permissions(script.as_std_path(), fs::Permissions::from_mode(0o755)).unwrap();
    script
}

fn request(root: &Utf8Path, output: Utf8PathBuf) -> SearchRequest {
    SearchRequest {
        queries: root.join("queries.txt"),
        catalog: root.join("catalog.txt"),
        cache_catalog: None,
        params: SearchParams {
            threads: Some(2),
            ..SearchParams::default()
        },
        output,
    }
}

#[test]
fn nonzero_exit_is_reported_with_output() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let script = install(&root, "fake-searcher", FAKE_SEARCHER);

    let request = request(&root, root.join("out/results.csv"));
    let report = SystemSearcher::new(script.as_str()).run(&request).unwrap();

    assert!(report.launched);
    assert!(!report.success);
    assert_eq!(report.exit_code, Some(3));
    assert_eq!(report.output, Some(request.output.clone()));
    assert_eq!(report.stderr, "threads=2");
    assert_eq!(
        fs::read_to_string(request.output.as_std_path()).unwrap(),
        "query,Run,containment\n"
    );
}

#[test]
fn crash_does_not_report_earlier_results() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let script = install(&root, "crashing-searcher", CRASHING_SEARCHER);
    let request = request(&root, root.join("results.csv"));
    fs::write(request.output.as_std_path(), "query,Run,containment\nq,SRR1,0.5\n").unwrap();

    let report = SystemSearcher::new(script.as_str()).run(&request).unwrap();

    assert!(report.launched);
    assert_eq!(report.exit_code, Some(101));
    assert_eq!(report.stderr, "boom");
    assert!(report.output.is_none());
    assert!(!request.output.as_std_path().exists());
}

#[test]
fn unusable_output_directory_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let script = install(&root, "fake-searcher", FAKE_SEARCHER);
    fs::write(root.join("out").as_std_path(), b"not a directory").unwrap();
    let request = request(&root, root.join("out/results.csv"));

    let report = SystemSearcher::new(script.as_str()).run(&request).unwrap();

    assert!(!report.launched);
    assert!(!report.success);
    assert!(report.output.is_none());
    assert!(report.stderr.contains("out"));
}
