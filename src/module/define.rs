//! Module for Constants and Paths Definitions
//!
//! This module defines various constants and paths used throughout the application.

/// System Constants
pub mod system {
    /// Name of the system
    pub const NAME: &str = "rupiahscan";

    /// Environment variable overriding the data directory
    pub const HOME_ENV: &str = "RUPIAHSCAN_HOME";
}

/// File Paths
pub mod path {

    // Persistent Data Directory
    pub const PERSISTENT_DIR: &str = "/data/";

    // Ephemeral Data Directory
    pub const EPHEMERAL_DIR: &str = "/run/user/1000/";

    // Image Directory
    pub const IMG_DIR: &str = "img";

    // Log Directory
    pub const LOG_DIR: &str = "log";

    // Configuration File
    pub const CONF_FILE: &str = "conf.toml";

    // Last Captured Image
    pub const LAST_IMAGE: &str = "capture.jpg";

    // Banknote Classifier (MobileNetV2, 224x224, 7 classes)
    pub const RUPIAH_MODEL: &str = "asset/model/rupiah_model.onnx";
}

/// Model input geometry and normalization statistics
pub mod tensor {
    /// Side length of the square model input
    pub const INPUT_SIZE: u32 = 224;

    /// Colour channels (R, G, B)
    pub const CHANNELS: usize = 3;

    /// Element count of one input tensor
    pub const LEN: usize = CHANNELS * (INPUT_SIZE as usize) * (INPUT_SIZE as usize);

    /// Batch, channel, height, width
    pub const SHAPE: [usize; 4] = [1, CHANNELS, INPUT_SIZE as usize, INPUT_SIZE as usize];

    /// ImageNet per-channel mean (R, G, B)
    pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];

    /// ImageNet per-channel standard deviation (R, G, B)
    pub const STD: [f32; 3] = [0.229, 0.224, 0.225];
}

/// Classifier output
pub mod model {
    /// Number of banknote classes the model scores
    pub const NUM_CLASSES: usize = 7;
}

/// Remote inference backend
pub mod backend {
    // Placeholder, set per deployment in conf.toml or via ENDPOINT_ENV
    pub const DEFAULT_ENDPOINT: &str = "http://192.168.1.3:8000";

    // Environment variable overriding the configured endpoint
    pub const ENDPOINT_ENV: &str = "RUPIAHSCAN_ENDPOINT";

    // Prediction route appended to the endpoint
    pub const PREDICT_PATH: &str = "predict";

    // Multipart field carrying the image
    pub const FILE_FIELD: &str = "file";

    // Request timeout in seconds
    pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

    // JPEG quality used for the resized upload
    pub const UPLOAD_JPEG_QUALITY: u8 = 90;
}
