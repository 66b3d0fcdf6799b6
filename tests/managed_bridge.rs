//! Purpose: Release accounting for the managed-runtime bridge.
//! Exports: Integration tests only.
//! Role: Verify every acquired managed string is released exactly once on every exit path.
//! Invariants: The fake runtime allocates on acquire and frees on release, so a missed or
//!             doubled release shows up in the counters.
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr::NonNull;

use nitf_bind::bridge::extract_jp2_managed;
use nitf_bind::core::marshal::ManagedStrings;
use nitf_bind::{Error, ErrorKind};

/// Stands in for a managed runtime: strings are Rust `String`s, views are fresh copies.
#[derive(Default)]
struct FakeRuntime {
    acquired: Cell<usize>,
    released: Cell<usize>,
    outstanding: RefCell<HashSet<usize>>,
    refuse: RefCell<HashSet<String>>,
}

impl FakeRuntime {
    fn refusing(value: &str) -> Self {
        let runtime = Self::default();
        runtime.refuse.borrow_mut().insert(value.to_string());
        runtime
    }

    fn assert_balanced(&self) {
        assert_eq!(self.acquired.get(), self.released.get());
        assert!(self.outstanding.borrow().is_empty());
    }
}

impl ManagedStrings for FakeRuntime {
    type Handle = str;

    fn acquire_utf(&self, handle: &str) -> Result<NonNull<c_char>, Error> {
        if self.refuse.borrow().contains(handle) {
            return Err(Error::new(ErrorKind::ManagedMarshal).with_message("out of memory"));
        }
        let raw = CString::new(handle).expect("no NUL in test strings").into_raw();
        self.acquired.set(self.acquired.get() + 1);
        self.outstanding.borrow_mut().insert(raw as usize);
        Ok(NonNull::new(raw).expect("into_raw is non-null"))
    }

    unsafe fn release_utf(&self, _handle: &str, chars: NonNull<c_char>) {
        let was_outstanding = self.outstanding.borrow_mut().remove(&(chars.as_ptr() as usize));
        assert!(was_outstanding, "released a view twice or one never acquired");
        self.released.set(self.released.get() + 1);
        drop(unsafe { CString::from_raw(chars.as_ptr()) });
    }
}

#[test]
fn success_path_releases_both_strings() {
    let runtime = FakeRuntime::default();
    let mut seen = Vec::new();

    extract_jp2_managed(
        &runtime,
        "/opt/nitf-gnr/testdata/input.nitf",
        "output",
        |input: &CStr, output: &CStr| {
            seen.push(input.to_str().unwrap().to_string());
            seen.push(output.to_str().unwrap().to_string());
            Ok(())
        },
    )
    .expect("bridge call");

    assert_eq!(seen, vec!["/opt/nitf-gnr/testdata/input.nitf", "output"]);
    assert_eq!(runtime.acquired.get(), 2);
    runtime.assert_balanced();
}

#[test]
fn engine_failure_still_releases_both_strings() {
    let runtime = FakeRuntime::default();

    let err = extract_jp2_managed(&runtime, "in.ntf", "out/", |_input, _output| {
        Err(Error::new(ErrorKind::Invocation)
            .with_operation("extract_jp2")
            .with_message("not a valid NITF file"))
    })
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Invocation);
    assert_eq!(runtime.acquired.get(), 2);
    runtime.assert_balanced();
}

#[test]
fn second_acquire_failure_releases_first_string() {
    let runtime = FakeRuntime::refusing("out/");
    let mut engine_called = false;

    let err = extract_jp2_managed(&runtime, "in.ntf", "out/", |_input, _output| {
        engine_called = true;
        Ok(())
    })
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ManagedMarshal);
    assert!(!engine_called);
    assert_eq!(runtime.acquired.get(), 1);
    runtime.assert_balanced();
}

#[test]
fn first_acquire_failure_touches_nothing() {
    let runtime = FakeRuntime::refusing("in.ntf");

    let err = extract_jp2_managed(&runtime, "in.ntf", "out/", |_input, _output| Ok(())).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ManagedMarshal);
    assert_eq!(runtime.acquired.get(), 0);
    runtime.assert_balanced();
}

#[test]
fn repeated_calls_never_reuse_views() {
    let runtime = FakeRuntime::default();
    let mut pointers = Vec::new();

    for _ in 0..3 {
        extract_jp2_managed(&runtime, "in.ntf", "out/", |input, _output| {
            pointers.push(input.as_ptr() as usize);
            Ok(())
        })
        .expect("bridge call");
        runtime.assert_balanced();
    }

    assert_eq!(pointers.len(), 3);
    assert_eq!(runtime.acquired.get(), 6);
    assert_eq!(runtime.released.get(), 6);
}
