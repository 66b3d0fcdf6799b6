/*
Purpose: Link the JVM bridge against libnitf_gnr.
Exports: None (build script only).
Role: Resolve the engine library with the same discovery the runtime uses (EngineConfig).
Invariants: NITF_GNR_LIB wins; then NITF_GNR_LIB_DIR; then the default search dirs.
Notes: Fails fast when libnitf_gnr cannot be located.
Notes: Reruns when either variable or the located library changes.
*/

use std::path::Path;

use nitf_bind::EngineConfig;
use nitf_bind::config::{ENGINE_NAME, LIB_DIR_ENV, LIB_ENV};

fn main() {
    println!("cargo:rerun-if-env-changed={LIB_ENV}");
    println!("cargo:rerun-if-env-changed={LIB_DIR_ENV}");

    let library = EngineConfig::from_env()
        .locate()
        .unwrap_or_else(|err| panic!("cannot link the JVM bridge: {err}"));
    println!("cargo:rerun-if-changed={}", library.display());

    let platform_name = EngineConfig::library_file_name();
    if library.file_name() == Some(platform_name.as_os_str()) {
        let dir = library
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        println!("cargo:rustc-link-search=native={}", dir.display());
        println!("cargo:rustc-link-lib=dylib={ENGINE_NAME}");
    } else {
        // A renamed or versioned file cannot be found through -l; link it by path.
        println!("cargo:rustc-link-arg={}", library.display());
    }
}
