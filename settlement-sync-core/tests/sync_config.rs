use regex::Regex;
use settlement_sync_core::config::{SyncConfig, TableTargets, DEFAULT_FILE_PATTERN};

fn config_matching(pattern: &str) -> SyncConfig {
    SyncConfig::new("./staging", Regex::new(pattern).unwrap(), TableTargets::default())
}

#[test]
fn accepts_statement_names_matching_the_pattern() {
    let config = config_matching(DEFAULT_FILE_PATTERN);
    assert!(config.accepts("EXTRATO_UNICA_51309_20241102_00027"));
    assert!(!config.accepts("README.txt"));
}

#[test]
fn rejects_names_that_would_escape_the_staging_directory() {
    // Matches everything, so only the name check can reject.
    let config = config_matching(".*");
    for name in ["EXTRATO/../x", "../EXTRATO", "EXTRATO\\a", "..", ".", "", "EXTRATO\0"] {
        assert!(!config.accepts(name), "{name:?} should be rejected");
    }
    assert!(config.accepts("EXTRATO..1"));
}

#[test]
fn default_pattern_also_rejects_path_like_names() {
    let config = config_matching(DEFAULT_FILE_PATTERN);
    assert!(!config.accepts("EXTRATO/../x"));
    assert!(!config.accepts("../EXTRATO"));
    assert!(!config.accepts("EXTRATO\\a"));
}
