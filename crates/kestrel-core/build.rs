//! Build script for kestrel-core
//!
//! Checks the toolchain before compilation:
//! - Minimum Rust version (let-else, `Option::is_some_and`)
//! - Target operating system (the live kernel and live process initializers
//!   read procfs, which only Linux provides)

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    // let-else needs 1.65, `Option::is_some_and` needs 1.70
    match rustc_version::version() {
        Ok(rustc_version) => {
            let min_rust_version = rustc_version::Version::new(1, 70, 0);
            assert!(
                rustc_version >= min_rust_version,
                "kestrel-core requires Rust {min_rust_version} or newer, found {rustc_version}"
            );
        }
        // Some build environments hide the compiler version; don't fail there
        Err(_) => println!("cargo:warning=could not verify Rust version"),
    }

    // Build scripts run on the host, so ask Cargo about the target
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "linux" {
        println!(
            "cargo:warning=kestrel-core targets {target_os}: core dumps and mock programs work, \
             Program::from_kernel and Program::from_pid need Linux procfs"
        );
    }
}
