use assert_matches::assert_matches;

use kira_sigsearch::domain::{RunId, SearchParams, SourceFormat};
use kira_sigsearch::error::KiraError;

#[test]
fn parse_run_id_valid() {
    let id: RunId = "  SRR5650070 ".parse().unwrap();
    assert_eq!(id.as_str(), "SRR5650070");
    assert_eq!(id.sig_file_name(), "SRR5650070.sig");
}

#[test]
fn parse_run_id_rejects_path_like_values() {
    assert_matches!("".parse::<RunId>(), Err(KiraError::InvalidRunId(_)));
    assert_matches!("../SRR1".parse::<RunId>(), Err(KiraError::InvalidRunId(_)));
    assert_matches!(".hidden".parse::<RunId>(), Err(KiraError::InvalidRunId(_)));
    assert_matches!("SRR 1".parse::<RunId>(), Err(KiraError::InvalidRunId(_)));
}

#[test]
fn search_params_defaults() {
    let params = SearchParams::default();
    assert_eq!(params.ksize, 31);
    assert_eq!(params.threshold, 0.01);
    assert_eq!(params.scaled, 1000);
    assert!(params.validate().is_ok());
}

#[test]
fn search_params_bounds() {
    let params = SearchParams {
        threshold: 1.5,
        ..SearchParams::default()
    };
    assert_matches!(params.validate(), Err(KiraError::InvalidParameter(_)));

    let params = SearchParams {
        ksize: 0,
        ..SearchParams::default()
    };
    assert_matches!(params.validate(), Err(KiraError::InvalidParameter(_)));
}

#[test]
fn source_format_display() {
    assert_eq!(SourceFormat::Table.to_string(), "table");
    assert_eq!(SourceFormat::List.to_string(), "list");
}
