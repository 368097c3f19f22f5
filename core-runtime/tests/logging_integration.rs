//! Integration tests for the logging system

use bridge_traits::time::{ConsoleLogger, LogLevel};
use core_runtime::logging::{init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig};
use core_runtime::Error;
use std::sync::Arc;

#[test]
fn test_init_logging_only_once_per_process() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(Arc::new(ConsoleLogger {
            min_level: LogLevel::Error,
        }));

    init_logging(config.clone()).expect("first initialization succeeds");
    tracing::debug!(target: "core_upload", file = "cat.png", "logging ready");

    let second = init_logging(config);
    assert!(matches!(second, Err(Error::LoggingAlreadyInitialized)));
}

#[test]
fn test_object_keys_are_reduced_to_file_names() {
    assert_eq!(strip_path("uploads/uid-1/report.pdf"), "report.pdf");
    assert_eq!(strip_path("uploads/uid-1/cat_updated_1700000000000.png"), "cat_updated_1700000000000.png");
}

#[test]
fn test_credentials_never_pass_through() {
    for field in ["id_token", "downloadTokens", "AUTHORIZATION", "client_secret"] {
        assert_eq!(redact_if_sensitive(field, "value"), "[REDACTED]", "{field}");
    }
}

#[test]
fn test_emails_are_masked() {
    let redacted = redact_if_sensitive("display_name", "grace@example.org");
    assert!(redacted.starts_with('g'));
    assert!(!redacted.contains("example.org"));
}

#[test]
fn test_plain_values_pass_through() {
    assert_eq!(redact_if_sensitive("file", "notes.pdf"), "notes.pdf");
    assert_eq!(redact_if_sensitive("batch_id", "b-42"), "b-42");
}
