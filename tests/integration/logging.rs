//! Integration tests for logging and tracing

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[test]
fn test_tracing_subscriber_initialization() {
    // Either succeeds or fails because another test initialized first
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("match_harvester=debug")),
        )
        .with_test_writer()
        .try_init();
}

#[test]
fn test_tracing_json_format() {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new("match_harvester=info"))
        .with_test_writer()
        .try_init();
}

#[test]
fn test_env_filter_directives_parse() {
    for directive in [
        "info",
        "match_harvester=debug",
        "warn,match_harvester::harvester=trace",
        "match_harvester::fetcher=debug,match_harvester=info",
    ] {
        assert!(
            EnvFilter::try_new(directive).is_ok(),
            "directive {directive} rejected"
        );
    }
}

#[test]
fn test_structured_fields_inside_spans() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("match_harvester=debug"))
        .with_test_writer()
        .try_init();

    let span = tracing::info_span!("unit", unit = "puuid-a", tier = "CHALLENGER");
    let _enter = span.enter();
    info!(new = 3, filtered = 1, skipped = 0, "Unit processed");
    warn!(class = "match", wait_ms = 2000u64, "Rate limited");
}
