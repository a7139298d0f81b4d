//! Path Operations Module
//!
//! This module handles path operations for directories and files.

use std::path::PathBuf;

/// Join Paths
///
/// This function takes a slice of strings as input and joins them into a single path string.
/// It uses the PathBuf type to handle platform-specific separators and conversions.
/// Non UTF-8 components are replaced lossily.
pub fn join(paths: &[&str]) -> String {
    let mut path: PathBuf = PathBuf::new();
    for p in paths {
        path.push(p);
    }
    path.to_string_lossy().into_owned()
}

pub mod dir {
    //! Directory Operations Submodule
    //!
    //! This submodule provides functions for directory operations.

    use std::fs;
    use std::path::Path;

    use super::{RupiahDir, RupiahImg, RupiahPath};
    use crate::module::define;
    use crate::module::error::ScanError;

    /// Create Directory from Path List
    ///
    /// This function takes a slice of strings as input and creates a directory with the joined path.
    /// It returns the created path.
    pub fn create_dir_from_path_list(paths: &[&str]) -> Result<String, ScanError> {
        let path = super::join(paths);
        fs::create_dir_all(Path::new(&path))?;
        Ok(path)
    }

    /// Create Subdirectory in Either Directory
    ///
    /// Creates `name` under `dir1` if `dir1` exists, otherwise under `dir2`.
    pub fn create_subdir_in_either_dir(
        dir1: &str,
        dir2: &str,
        name: &str,
    ) -> Result<String, ScanError> {
        let parent: &str = if Path::new(dir1).is_dir() { dir1 } else { dir2 };
        create_dir_from_path_list(&[parent, name])
    }

    /// Create Data Directory
    ///
    /// Uses `RUPIAHSCAN_HOME` when set, otherwise `define::path::PERSISTENT_DIR`
    /// or `define::path::EPHEMERAL_DIR`, whichever exists, with `define::system::NAME`
    /// as the subdirectory name.
    pub fn create_data_dir() -> Result<String, ScanError> {
        match std::env::var(define::system::HOME_ENV) {
            Ok(home) if !home.is_empty() => create_dir_from_path_list(&[&home]),
            _ => create_subdir_in_either_dir(
                define::path::PERSISTENT_DIR,
                define::path::EPHEMERAL_DIR,
                define::system::NAME,
            ),
        }
    }

    /// Create Application Subdirectory and Paths
    ///
    /// Resolves the data directory and lays out the application tree in it.
    pub fn create_app_sub_dir() -> Result<RupiahPath, ScanError> {
        let data_dir = create_data_dir()?;
        create_app_sub_dir_in(&data_dir)
    }

    /// Creates `img/` and `log/` under `data_dir` and returns the resulting paths.
    pub fn create_app_sub_dir_in(data_dir: &str) -> Result<RupiahPath, ScanError> {
        let data_dir = create_dir_from_path_list(&[data_dir])?;
        let img_dir = create_dir_from_path_list(&[&data_dir, define::path::IMG_DIR])?;
        let log_dir = create_dir_from_path_list(&[&data_dir, define::path::LOG_DIR])?;
        let last_img = super::join(&[&img_dir, define::path::LAST_IMAGE]);
        Ok(RupiahPath {
            dir: RupiahDir {
                data: data_dir,
                img: img_dir,
                log: log_dir,
            },
            img: RupiahImg { last: last_img },
        })
    }
}

/// Paths of Resources
///
/// This struct represents the paths of the resources used by the application.
#[derive(Debug, Clone)]
pub struct RupiahPath {
    /// Directories Paths
    pub dir: RupiahDir,
    /// Images Paths
    pub img: RupiahImg,
}

/// Paths of Directories
#[derive(Debug, Clone)]
pub struct RupiahDir {
    /// Data Directory Path
    pub data: String,
    /// Image Directory Path
    pub img: String,
    /// Log Directory Path
    pub log: String,
}

/// Paths of Images
#[derive(Debug, Clone)]
pub struct RupiahImg {
    /// Last Captured Image Path
    pub last: String,
}
