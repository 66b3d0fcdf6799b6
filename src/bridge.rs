//! Purpose: Runtime-agnostic half of the managed-runtime bridge.
//! Exports: `extract_jp2_managed`.
//! Role: Marshals two managed strings and delegates to an engine function linked into the caller.
//! Invariants: Both views are released before return, on success and on every failure path.
//! Invariants: No symbol lookup happens here; the delegate is already bound.
//! Notes: `bindings/jvm/native` supplies the JNI runtime and the exported symbol.
use std::ffi::CStr;

use tracing::{debug, warn};

use crate::core::error::Error;
use crate::core::marshal::{ManagedStr, ManagedStrings};

/// Acquires `input` then `output`, hands both to `engine`, then releases them.
///
/// If `output` cannot be acquired, the already acquired `input` view is still released
/// before the error propagates.
pub fn extract_jp2_managed<R, F>(
    runtime: &R,
    input: &R::Handle,
    output: &R::Handle,
    engine: F,
) -> Result<(), Error>
where
    R: ManagedStrings + ?Sized,
    F: FnOnce(&CStr, &CStr) -> Result<(), Error>,
{
    let input = ManagedStr::acquire(runtime, input)?;
    let output = ManagedStr::acquire(runtime, output)?;
    debug!(input = ?input.as_c_str(), output = ?output.as_c_str(), "managed extract_jp2");
    engine(input.as_c_str(), output.as_c_str()).inspect_err(|err| {
        warn!(error = %err, "managed extract_jp2 failed");
    })
}
