//! Platform identifiers used in release artifact names.
//!
//! Release artifacts follow Go's `GOOS`/`GOARCH` naming
//! (`uppi-agent-linux-amd64`, `uppi-agent-darwin-arm64`, ...), so the Rust
//! target names are mapped onto that scheme.

/// Returns the operating system name for the running platform.
pub fn os_name() -> &'static str {
    map_os(std::env::consts::OS)
}

/// Returns the architecture name for the running platform.
pub fn arch_name() -> &'static str {
    map_arch(std::env::consts::ARCH)
}

fn map_os(os: &'static str) -> &'static str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn map_arch(arch: &'static str) -> &'static str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64",
        other => other,
    }
}
