//! This module is responsible for preparing the resources needed by the application, such as directories and configurations.
//!

pub mod resource {
    use super::RupiahProperty;
    use crate::module::error::ScanError;

    /// Initialize the application resources and return a RupiahProperty instance containing paths and configurations.
    ///
    pub fn init() -> Result<RupiahProperty, ScanError> {
        // Prepare the app data directory
        let paths = crate::module::util::path::dir::create_app_sub_dir()?;
        init_in(paths)
    }

    /// Same as [`init`], rooted at an explicit data directory.
    pub fn init_at(data_dir: &str) -> Result<RupiahProperty, ScanError> {
        let paths = crate::module::util::path::dir::create_app_sub_dir_in(data_dir)?;
        init_in(paths)
    }

    fn init_in(
        paths: crate::module::util::path::RupiahPath,
    ) -> Result<RupiahProperty, ScanError> {
        // Load the app configuration file, writing defaults on first run
        let conf = crate::module::util::conf::toml::load(&paths.dir.data)?;
        Ok(RupiahProperty { path: paths, conf })
    }
}

/// This struct represents the properties of the app, such as paths and configurations.
///
#[derive(Debug, Clone)]
pub struct RupiahProperty {
    pub path: crate::module::util::path::RupiahPath, // The paths of the app resources
    pub conf: crate::module::util::conf::Config,     // The configurations of the app
}
