//! Purpose: Decide which shared library file a session opens.
//! Exports: `EngineConfig`, `default_search_dirs`, `LIB_ENV`, `LIB_DIR_ENV`, `ENGINE_NAME`.
//! Role: Keep engine discovery in one place for native callers and tests.
//! Invariants: An explicit library path is used verbatim and never searched for.
//! Invariants: Search order is `NITF_GNR_LIB_DIR`, then configured dirs, then defaults.
//! Invariants: File naming follows the platform (`libnitf_gnr.so`, `libnitf_gnr.dylib`, `nitf_gnr.dll`).
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{Error, ErrorKind};

/// Full path to the engine library; wins over every search directory.
pub const LIB_ENV: &str = "NITF_GNR_LIB";
/// Directory holding the engine library under its platform file name.
pub const LIB_DIR_ENV: &str = "NITF_GNR_LIB_DIR";
pub const ENGINE_NAME: &str = "nitf_gnr";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub library_path: Option<PathBuf>,
    pub search_dirs: Vec<PathBuf>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `NITF_GNR_LIB` and `NITF_GNR_LIB_DIR`, then appends the default search dirs.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::var_os(LIB_ENV), std::env::var_os(LIB_DIR_ENV))
    }

    fn from_vars(library: Option<OsString>, library_dir: Option<OsString>) -> Self {
        let library_path = library.filter(|value| !value.is_empty()).map(PathBuf::from);
        let search_dirs = library_dir
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .into_iter()
            .chain(default_search_dirs())
            .collect();
        Self {
            library_path,
            search_dirs,
        }
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Searched before any directory already configured.
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.insert(0, dir.into());
        self
    }

    pub fn library_file_name() -> OsString {
        libloading::library_filename(ENGINE_NAME)
    }

    /// Every path `locate` would consider, in order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        if let Some(path) = &self.library_path {
            return vec![path.clone()];
        }
        let file_name = Self::library_file_name();
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .collect()
    }

    pub fn locate(&self) -> Result<PathBuf, Error> {
        if let Some(path) = &self.library_path {
            return Ok(path.clone());
        }
        let found = self.candidates().into_iter().find(|path| path.is_file());
        match found {
            Some(path) => {
                debug!(path = %path.display(), "engine library located");
                Ok(path)
            }
            None => {
                let searched = self
                    .search_dirs
                    .iter()
                    .map(|dir| dir.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(Error::new(ErrorKind::Load).with_message(format!(
                    "{} not found; set {LIB_ENV} or {LIB_DIR_ENV} (searched: {searched})",
                    Path::new(&Self::library_file_name()).display()
                )))
            }
        }
    }
}

/// Current directory and its cargo target dirs first, then system library dirs.
pub fn default_search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.join("target").join("release"));
        dirs.push(cwd.join("target").join("debug"));
        dirs.insert(0, cwd);
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/local/lib"));
        dirs.push(PathBuf::from("/usr/lib"));
        if cfg!(target_pointer_width = "64") {
            dirs.push(PathBuf::from("/usr/lib64"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/usr/local/lib"));
        dirs.push(PathBuf::from("/opt/homebrew/lib"));
    }

    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_library_path_is_used_verbatim() {
        let config = EngineConfig::new().with_library_path("/nowhere/libnitf_gnr.so");
        assert_eq!(
            config.locate().expect("locate"),
            PathBuf::from("/nowhere/libnitf_gnr.so")
        );
        assert_eq!(config.candidates().len(), 1);
    }

    #[test]
    fn dir_variable_is_searched_first() {
        let config = EngineConfig::from_vars(None, Some(OsString::from("/opt/nitf-gnr/lib")));
        assert_eq!(
            config.search_dirs.first(),
            Some(&PathBuf::from("/opt/nitf-gnr/lib"))
        );
        assert!(config.library_path.is_none());
    }

    #[test]
    fn empty_variables_are_ignored() {
        let config = EngineConfig::from_vars(Some(OsString::new()), Some(OsString::new()));
        assert!(config.library_path.is_none());
        assert_eq!(config.search_dirs, default_search_dirs());
    }

    #[test]
    fn locate_finds_platform_file_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let lib = temp.path().join(EngineConfig::library_file_name());
        std::fs::write(&lib, b"").expect("write");
        let config = EngineConfig::new().with_search_dir(temp.path());
        assert_eq!(config.locate().expect("locate"), lib);
    }

    #[test]
    fn locate_reports_searched_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig::new().with_search_dir(temp.path());
        let err = config.locate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
        let message = err.message().expect("message");
        assert!(message.contains(LIB_ENV));
        assert!(message.contains(&temp.path().display().to_string()));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"library_path":"/opt/nitf-gnr/libnitf_gnr.so"}"#)
                .expect("config json");
        assert_eq!(
            config.library_path,
            Some(PathBuf::from("/opt/nitf-gnr/libnitf_gnr.so"))
        );
        assert!(config.search_dirs.is_empty());
    }
}
