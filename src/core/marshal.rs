// NUL-terminated path marshaling for native callers and guarded managed-string views.
use std::ffi::{CStr, CString};
use std::fmt;
use std::ops::Deref;
use std::os::raw::c_char;
use std::path::Path;
use std::ptr::NonNull;

use tracing::warn;

use crate::core::error::{Error, ErrorKind};

/// Owned, NUL-terminated copy of a caller-supplied path or string.
pub struct NativeStr {
    inner: CString,
}

impl NativeStr {
    pub fn new(text: &str) -> Result<Self, Error> {
        Self::from_bytes(text.as_bytes().to_vec())
    }

    /// Uses the platform's byte representation of `path` as-is.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        #[cfg(unix)]
        let bytes = {
            use std::os::unix::ffi::OsStrExt;
            path.as_os_str().as_bytes().to_vec()
        };
        #[cfg(not(unix))]
        let bytes = path
            .to_str()
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message("path is not valid UTF-8")
                    .with_path(path)
            })?
            .as_bytes()
            .to_vec();
        Self::from_bytes(bytes).map_err(|err| err.with_path(path))
    }

    fn from_bytes(bytes: Vec<u8>) -> Result<Self, Error> {
        let inner = CString::new(bytes).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("interior NUL at byte {}", err.nul_position()))
        })?;
        Ok(Self { inner })
    }

    pub fn as_c_str(&self) -> &CStr {
        &self.inner
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.inner.as_ptr()
    }
}

impl Deref for NativeStr {
    type Target = CStr;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl fmt::Debug for NativeStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeStr").field(&self.inner).finish()
    }
}

/// A managed runtime's string-access protocol.
///
/// `acquire_utf` pins (or copies) the runtime string and hands back NUL-terminated
/// chars; `release_utf` gives them back. Every successful acquire must be matched by
/// exactly one release, otherwise the leak is in the runtime's heap.
pub trait ManagedStrings {
    type Handle: ?Sized;

    fn acquire_utf(&self, handle: &Self::Handle) -> Result<NonNull<c_char>, Error>;

    /// # Safety
    ///
    /// `chars` must come from `acquire_utf` on this runtime for this `handle`, and must
    /// not have been released already.
    unsafe fn release_utf(&self, handle: &Self::Handle, chars: NonNull<c_char>);
}

/// Borrowed view of a managed string, released when dropped.
pub struct ManagedStr<'a, R: ManagedStrings + ?Sized> {
    runtime: &'a R,
    handle: &'a R::Handle,
    chars: NonNull<c_char>,
}

impl<'a, R: ManagedStrings + ?Sized> ManagedStr<'a, R> {
    pub fn acquire(runtime: &'a R, handle: &'a R::Handle) -> Result<Self, Error> {
        let chars = runtime.acquire_utf(handle).map_err(|err| {
            warn!(error = %err, "managed string could not be acquired");
            err
        })?;
        Ok(Self {
            runtime,
            handle,
            chars,
        })
    }

    pub fn as_c_str(&self) -> &CStr {
        // Valid until drop: the runtime keeps the chars alive until `release_utf`.
        unsafe { CStr::from_ptr(self.chars.as_ptr()) }
    }
}

impl<R: ManagedStrings + ?Sized> Deref for ManagedStr<'_, R> {
    type Target = CStr;

    fn deref(&self) -> &Self::Target {
        self.as_c_str()
    }
}

impl<R: ManagedStrings + ?Sized> Drop for ManagedStr<'_, R> {
    fn drop(&mut self) {
        unsafe { self.runtime.release_utf(self.handle, self.chars) };
    }
}

/// Convenience for runtimes that report acquisition failure as a null pointer.
pub fn managed_chars(chars: *const c_char) -> Result<NonNull<c_char>, Error> {
    NonNull::new(chars.cast_mut()).ok_or_else(|| {
        Error::new(ErrorKind::ManagedMarshal).with_message("runtime returned no string chars")
    })
}
