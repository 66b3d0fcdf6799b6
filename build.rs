//! Purpose: Compile the stand-in engine shared library used by the loader tests.
//! Role: Cargo build-script; drives the `cc`-selected C compiler to emit a shared object.
//! Invariants: Unix targets only; the library lands in `OUT_DIR`.
//! Invariants: Its path is exported to the crate's targets as `NITF_GNR_STUB_ENGINE`.
//! Notes: A missing or failing C toolchain is a build warning; the loader tests then skip.
use std::env;
use std::path::PathBuf;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=tests/fixtures/stub_engine.c");

    let is_unix = env::var("CARGO_CFG_TARGET_FAMILY")
        .map(|families| families.split(',').any(|family| family == "unix"))
        .unwrap_or(false);
    if !is_unix {
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
    let target = env::var("TARGET").unwrap_or_default();
    let source = manifest_dir.join("tests").join("fixtures").join("stub_engine.c");
    let library = out_dir.join(if target.contains("apple") {
        "libnitf_gnr_stub.dylib"
    } else {
        "libnitf_gnr_stub.so"
    });

    let compiler = match cc::Build::new().warnings(false).try_get_compiler() {
        Ok(compiler) => compiler,
        Err(err) => {
            println!("cargo:warning=stand-in engine not built: no C compiler ({err})");
            return;
        }
    };

    let mut command: Command = compiler.to_command();
    command
        .arg("-shared")
        .arg("-fPIC")
        .arg("-o")
        .arg(&library)
        .arg(&source);

    match command.status() {
        Ok(status) if status.success() => {
            println!("cargo:rustc-env=NITF_GNR_STUB_ENGINE={}", library.display());
        }
        Ok(status) => {
            println!("cargo:warning=stand-in engine not built: compiler exited with {status}");
        }
        Err(err) => {
            println!("cargo:warning=stand-in engine not built: {err}");
        }
    }
}
