use std::fs;
use std::time::Duration;
use tempfile::tempdir;
use wiston_logger::{LevelFilter, LogTarget, Logger};

#[test]
fn file_target_appends_to_the_named_file() -> Result<(), Box<dyn std::error::Error>> {
    let tmp_dir = tempdir()?;
    let log_file = tmp_dir.path().join("logs").join("bus.log");

    let logger = Logger::builder()
        .name("integration-file-logging")
        .target(LogTarget::File(log_file.clone()))
        .level(LevelFilter::INFO)
        .init()?;

    assert!(logger.guard().is_some(), "file logger should hold a writer guard");
    tracing::info!(event = "order.created", "hello from integration test");

    std::thread::sleep(Duration::from_millis(30));
    drop(logger);

    let contents = fs::read_to_string(&log_file)?;
    assert!(contents.contains("hello from integration test"), "log line should be flushed");
    assert!(contents.contains("order.created"));

    Ok(())
}
