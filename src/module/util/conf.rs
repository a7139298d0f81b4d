//! Config Handler.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::module::define;
use crate::module::vision::preprocess::ResizeFilter;

/// Provides TOML config file handling.
pub mod toml {

    use super::DEFAULT_CONFIG;
    use crate::module::define;
    use crate::module::error::ScanError;
    use std::fs::{self, File};
    use std::io::prelude::*;
    use std::path::Path;

    /// Loads a configuration file from the given directory.
    /// If not found, generates a default config file.
    ///
    /// # Arguments
    ///
    /// * `dir` - The directory where the configuration file is located or should be created.
    ///
    pub fn load(dir: &str) -> Result<super::Config, ScanError> {
        // Check if the config file exists
        let path = Path::new(dir).join(define::path::CONF_FILE);

        if !path.is_file() {
            // Create the default config if it doesn't exist
            log::info!("No config at {}, writing defaults", path.display());
            fs::create_dir_all(dir)?;
            let config = parse(DEFAULT_CONFIG)?;
            write(&path, &config)?;
        }

        // Load the config
        let conf_str = fs::read_to_string(&path)?;
        parse(&conf_str)
    }

    /// Saves a configuration file to the given directory.
    ///
    /// # Arguments
    ///
    /// * `dir` - The directory where the configuration file should be saved.
    /// * `conf` - The configuration data to be saved.
    ///
    pub fn save(dir: &str, conf: &super::Config) -> Result<(), ScanError> {
        let path = Path::new(dir).join(define::path::CONF_FILE);
        write(&path, conf)
    }

    /// Parses TOML text into a config.
    pub fn parse(text: &str) -> Result<super::Config, ScanError> {
        ::toml::from_str(text).map_err(|e| ScanError::Config(format!("failed to parse TOML: {e}")))
    }

    fn write(path: &Path, conf: &super::Config) -> Result<(), ScanError> {
        let toml_str = ::toml::to_string(conf)
            .map_err(|e| ScanError::Config(format!("failed to serialize TOML: {e}")))?;
        let mut file = File::create(path)?;
        file.write_all(toml_str.as_bytes())?;
        Ok(())
    }
}

/// Represents the configuration data structure.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub system: System,
    pub inference: Inference,
    pub model: Model,
    pub preprocess: Preprocess,
    pub backend: Backend,
}

/// Represents system-related configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct System {
    pub log_level: String,
}

impl System {
    /// Log level for the file logger; unknown names fall back to INFO.
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.log_level.to_ascii_uppercase().as_str() {
            "TRACE" => log::LevelFilter::Trace,
            "DEBUG" => log::LevelFilter::Debug,
            "WARN" | "WARNING" => log::LevelFilter::Warn,
            "ERROR" => log::LevelFilter::Error,
            "OFF" => log::LevelFilter::Off,
            _ => log::LevelFilter::Info,
        }
    }
}

/// Which recognizer serves scans.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InferenceBackend {
    Local,
    Remote,
}

/// Represents inference-related configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Inference {
    pub backend: InferenceBackend,
}

/// Represents on-device model configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Model {
    pub path: String,
    pub intra_threads: i16,
    pub optimization_level: u8,
}

/// Represents preprocessing configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Preprocess {
    pub resize_filter: ResizeFilter,
}

/// Represents remote backend configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Backend {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Backend {
    /// Endpoint to use, `RUPIAHSCAN_ENDPOINT` taking precedence over the file.
    pub fn resolved_endpoint(&self) -> String {
        endpoint_override(&self.endpoint, std::env::var(define::backend::ENDPOINT_ENV).ok())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn endpoint_override(configured: &str, env: Option<String>) -> String {
    match env {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => configured.to_string(),
    }
}

// Default configuration data in TOML format
const DEFAULT_CONFIG: &str = r#"
[system]
  log_level = 'INFO' # Log level ('DEBUG', 'INFO', 'WARN', 'ERROR')

[inference]
  backend = 'local' # 'local' runs the ONNX model on device, 'remote' uploads to the backend

[model]
  path = 'asset/model/rupiah_model.onnx' # MobileNetV2 classifier, input [1,3,224,224], output [1,7]
  intra_threads = 4 # Threads per operator
  optimization_level = 1 # Graph optimization (0 = off, 3 = all)

[preprocess]
  resize_filter = 'bilinear' # 'bilinear', 'nearest', 'triangle', 'catmullrom', 'lanczos3'

[backend]
  endpoint = 'http://192.168.1.3:8000' # Replace with the backend address of the deployment
  timeout_secs = 10 # Request timeout
"#;
