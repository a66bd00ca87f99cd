use stow_logger::{LogSettings, Logger, LoggerError};

#[test]
fn init_twice_returns_subscriber_error() {
    let logger = Logger::from_settings("stow-init-twice", &LogSettings::default())
        .expect("first init should succeed");
    assert!(!logger.writes_files(), "console-only logger holds no file guard");

    let err = Logger::from_settings("stow-init-twice-second", &LogSettings::default())
        .expect_err("second init should fail");

    assert!(
        matches!(err, LoggerError::Subscriber { .. }),
        "expected subscriber error for second init"
    );
}
