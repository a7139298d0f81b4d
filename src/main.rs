//! Scans one banknote capture and prints the recognized denomination as JSON.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use rupiahscan::module::define;
use rupiahscan::module::error::ScanError;
use rupiahscan::module::util::init::resource::init;
use rupiahscan::module::{scan, vision};

// How long a scan waits for the on-device model to finish loading.
const MODEL_WAIT: Duration = Duration::from_secs(60);

// The main function of rupiahscan
pub fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), ScanError> {
    // Prepare the resources: data directory tree and configuration
    let property = init()?;

    // Initialize the logging system with the data directory and the system name
    init_log(
        &property.path.dir.data,
        define::system::NAME,
        property.conf.system.level_filter(),
    )?;
    log::info!("Starting rupiahscan...");

    // The capture to scan: first argument, or the camera's last capture
    let image_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&property.path.img.last));

    let recognizer = vision::build(&property)?;
    recognizer.wait_ready(MODEL_WAIT)?;

    let result = scan::run(recognizer.as_ref(), &image_path)?;
    let json = serde_json::to_string_pretty(&result)
        .map_err(|e| ScanError::Config(format!("failed to serialize result: {e}")))?;
    println!("{json}");
    Ok(())
}

/// This function initializes the logger system using the log4rs crate.
///
/// # Arguments
/// * `dir` - A string slice that holds the directory where the log file will be stored
/// * `name` - A string slice that holds the name of the logger and the log file
/// * `level` - Lowest level written to the file
///
/// # Log Example
/// ```
/// log::debug!("Debug Message"); // Log a debug message
/// log::info!("Info Message"); // Log an info message
/// log::warn!("Warning Message"); // Log a warning message
/// log::error!("Error Message"); // Log an error message
/// ```
fn init_log(dir: &str, name: &str, level: log::LevelFilter) -> Result<(), ScanError> {
    use log4rs::append::file::FileAppender;
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;
    use rupiahscan::module::util::path::join;

    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d} - {l}: {m}{n}")))
        .build(join(&[dir, define::path::LOG_DIR, &format!("{}.log", name)]))?;

    let config = Config::builder()
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(Root::builder().appender("logfile").build(level))
        .map_err(|e| ScanError::Config(format!("logger: {e}")))?;
    log4rs::init_config(config).map_err(|e| ScanError::Config(format!("logger: {e}")))?;
    Ok(())
}
