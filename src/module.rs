//! This module contains all the sub-modules of the project.

pub mod com; // Communication module: Uploads captures to the remote prediction backend.
pub mod define; // Definition module: Contains definitions and constants used throughout the project.
pub mod error; // Error module: Failures a scan can end in.
pub mod scan; // Scan module: Runs one capture through the recognizer.
pub mod util; // Utility module: Provides configuration, initialization and paths.
pub mod vision; // Vision module: Preprocessing, classification and result decoding.
