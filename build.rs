//! Build script for zet017-stream.
//!
//! When the `native` feature is enabled, adds `ZET017_LIB_DIR` (if set) to the
//! native library search path so `zet017tcp` can be linked from a build tree
//! outside the default locations.

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=ZET017_LIB_DIR");

    if env::var("CARGO_FEATURE_NATIVE").is_err() {
        return;
    }

    if let Ok(dir) = env::var("ZET017_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
    }
}
