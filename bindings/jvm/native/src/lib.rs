/*
Purpose: Expose the engine's extract_jp2 to the JVM as NativeLib.extractJp2.
Key Exports: Java_NativeLib_extractJp2.
Role: JNI boundary adapter; string marshaling only, the engine is linked at build time.
Invariants: Every GetStringUTFChars is paired with exactly one ReleaseStringUTFChars.
Invariants: Failures become a pending java.lang.RuntimeException, never a panic across the boundary.
Notes: Release pairing is enforced by nitf_bind::core::marshal::ManagedStr guards.
*/

use jni::JNIEnv;
use jni::objects::{JObject, JString};
use jni::sys;
use nitf_bind::bridge::extract_jp2_managed;
use nitf_bind::core::error::error_kind_code;
use nitf_bind::core::marshal::{ManagedStrings, managed_chars};
use nitf_bind::{Error, ErrorKind};
use std::ffi::c_char;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

unsafe extern "C" {
    fn extract_jp2(path: *const c_char, output_path: *const c_char);
}

struct JniStrings<'local> {
    env: *mut sys::JNIEnv,
    _local: PhantomData<&'local ()>,
}

impl<'local> JniStrings<'local> {
    fn new(env: &JNIEnv<'local>) -> Self {
        Self {
            env: env.get_raw(),
            _local: PhantomData,
        }
    }
}

impl<'local> ManagedStrings for JniStrings<'local> {
    type Handle = JString<'local>;

    fn acquire_utf(&self, handle: &JString<'local>) -> Result<NonNull<c_char>, Error> {
        if handle.is_null() {
            return Err(Error::new(ErrorKind::ManagedMarshal).with_message("string argument is null"));
        }
        let get = unsafe { (**self.env).GetStringUTFChars }.ok_or_else(|| {
            Error::new(ErrorKind::ManagedMarshal).with_message("JNI GetStringUTFChars unavailable")
        })?;
        // A null return means the JVM is out of memory and has an exception pending.
        managed_chars(unsafe { get(self.env, handle.as_raw(), ptr::null_mut()) })
    }

    unsafe fn release_utf(&self, handle: &JString<'local>, chars: NonNull<c_char>) {
        if let Some(release) = unsafe { (**self.env).ReleaseStringUTFChars } {
            unsafe { release(self.env, handle.as_raw(), chars.as_ptr()) };
        }
    }
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_NativeLib_extractJp2<'local>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    path: JString<'local>,
    output_path: JString<'local>,
) {
    let runtime = JniStrings::new(&env);
    let result = extract_jp2_managed(&runtime, &path, &output_path, |input, output| {
        unsafe { extract_jp2(input.as_ptr(), output.as_ptr()) };
        Ok(())
    });
    if let Err(err) = result {
        throw_error(&mut env, &err);
    }
}

fn throw_error(env: &mut JNIEnv<'_>, err: &Error) {
    if env.exception_check().unwrap_or(false) {
        return;
    }
    let mut details = vec![
        format!("kind={:?}", err.kind()),
        format!("code={}", error_kind_code(err.kind())),
    ];
    if let Some(message) = err.message() {
        details.push(format!("message={message}"));
    }
    if let Some(operation) = err.operation() {
        details.push(format!("operation={operation}"));
    }
    let _ = env.throw_new(
        "java/lang/RuntimeException",
        format!("nitf-gnr error: {}", details.join("; ")),
    );
}
