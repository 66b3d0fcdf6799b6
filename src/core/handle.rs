// Owned handle to a dynamically loaded engine library; unloads on close or drop.
use std::ffi::CStr;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tracing::{debug, trace, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::registry::SymbolSource;

#[derive(Debug)]
pub struct EngineHandle {
    library: Library,
    path: PathBuf,
}

impl EngineHandle {
    /// Opens the shared library at `path`.
    ///
    /// Nothing about the file is checked beyond what the platform loader does; a missing
    /// file, a malformed binary, and an architecture mismatch all surface as
    /// `ErrorKind::Load` with the loader's text as the error source.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        // Loading runs the library's initializers in this process; the engine is trusted.
        let library = unsafe { Library::new(path) }.map_err(|err| {
            warn!(path = %path.display(), error = %err, "engine library failed to load");
            Error::new(ErrorKind::Load)
                .with_message("failed to open engine library")
                .with_path(path)
                .with_source(err)
        })?;
        debug!(path = %path.display(), "engine library opened");
        Ok(Self {
            library,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unloads the library and reports any loader error.
    pub fn close(self) -> Result<(), Error> {
        let Self { library, path } = self;
        library.close().map_err(|err| {
            warn!(path = %path.display(), error = %err, "engine library failed to close");
            Error::new(ErrorKind::Load)
                .with_message("failed to close engine library")
                .with_path(&path)
                .with_source(err)
        })?;
        debug!(path = %path.display(), "engine library closed");
        Ok(())
    }
}

impl SymbolSource for EngineHandle {
    fn lookup(&self, name: &CStr) -> Option<*const ()> {
        // Only the address is read here; typing happens in the registry.
        let symbol: Symbol<'_, *const ()> =
            match unsafe { self.library.get(name.to_bytes_with_nul()) } {
                Ok(symbol) => symbol,
                Err(err) => {
                    trace!(symbol = ?name, error = %err, "symbol lookup failed");
                    return None;
                }
            };
        let address = *symbol;
        if address.is_null() { None } else { Some(address) }
    }
}

#[cfg(test)]
mod tests {
    use super::EngineHandle;
    use crate::core::error::ErrorKind;
    use crate::core::registry::SymbolSource;

    #[test]
    fn open_missing_file_is_load_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("libnitf_gnr_missing.so");
        let err = EngineHandle::open(&missing).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
        assert_eq!(err.path(), Some(missing.as_path()));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn open_non_library_file_is_load_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bogus = temp.path().join("libnot_an_engine.so");
        std::fs::write(&bogus, b"NITF02.10 this is not a shared object").expect("write");
        let err = EngineHandle::open(&bogus).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn open_then_close_system_library() {
        let handle = EngineHandle::open("libc.so.6").expect("open libc");
        assert_eq!(handle.path().to_str(), Some("libc.so.6"));
        handle.close().expect("close");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn lookup_finds_exported_and_rejects_absent_names() {
        let handle = EngineHandle::open("libc.so.6").expect("open libc");
        assert!(handle.lookup(c"strlen").is_some());
        assert!(handle.lookup(c"extract_jp2").is_none());
        handle.close().expect("close");
    }
}
