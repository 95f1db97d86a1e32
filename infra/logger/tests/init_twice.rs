use tempfile::tempdir;
use wiston_logger::{LogTarget, Logger, LoggerError};

#[test]
fn second_logger_is_rejected_and_named_in_the_error() -> Result<(), Box<dyn std::error::Error>> {
    let first = Logger::builder().name("bus-primary").init()?;

    let tmp_dir = tempdir()?;
    let err = Logger::builder()
        .name("bus-secondary")
        .target(LogTarget::File(tmp_dir.path().join("secondary.log")))
        .init()
        .expect_err("only one global subscriber may be installed");

    assert!(matches!(err, LoggerError::Subscriber { context: Some(_), .. }));
    assert!(err.to_string().contains("logger 'bus-secondary'"), "unexpected error: {err}");
    assert_eq!(first.target(), &LogTarget::Stdout);
    Ok(())
}
