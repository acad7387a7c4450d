// Error handling tests
// Author: kelexine (https://github.com/kelexine)

use filechat::error::FileChatError;
use std::time::Duration;

#[test]
fn test_error_display_messages() {
    let errors = vec![
        FileChatError::Config("missing url".to_string()),
        FileChatError::RemoteStore {
            status: 503,
            message: "unavailable".to_string(),
        },
        FileChatError::Timeout(Duration::from_secs(10)),
        FileChatError::InvalidMetadata("key must be a string".to_string()),
        FileChatError::InvalidRecord("no key column".to_string()),
    ];

    for error in errors {
        let display = format!("{}", error);
        assert!(!display.is_empty(), "Error should have display message");
    }
}

#[test]
fn test_remote_store_error_carries_status() {
    let error = FileChatError::RemoteStore {
        status: 401,
        message: "Invalid API key".to_string(),
    };
    let display = error.to_string();
    assert!(display.contains("401"));
    assert!(display.contains("Invalid API key"));
}

#[test]
fn test_transient_classification() {
    assert!(FileChatError::Timeout(Duration::from_secs(5)).is_transient());
    for status in [408, 429, 500, 502, 503, 504] {
        let error = FileChatError::RemoteStore {
            status,
            message: String::new(),
        };
        assert!(error.is_transient(), "status {} should be transient", status);
    }
    for status in [400, 401, 403, 404, 409] {
        let error = FileChatError::RemoteStore {
            status,
            message: String::new(),
        };
        assert!(!error.is_transient(), "status {} should not be transient", status);
    }
    assert!(!FileChatError::InvalidMetadata("x".into()).is_transient());
    assert!(!FileChatError::Config("x".into()).is_transient());
}

#[test]
fn test_conversions() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: FileChatError = json_err.into();
    assert!(matches!(error, FileChatError::Json(_)));

    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "config.toml");
    let error: FileChatError = io_err.into();
    assert!(error.to_string().contains("config.toml"));
}

#[test]
fn test_error_into_anyhow() {
    let error = FileChatError::Timeout(Duration::from_millis(1500));
    let wrapped: anyhow::Error = error.into();
    assert!(wrapped.to_string().contains("timed out"));
}
