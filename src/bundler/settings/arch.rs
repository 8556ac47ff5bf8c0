//! CPU architecture types and utilities.

use std::fmt;

/// Architecture requested for the macOS application bundle.
///
/// Mirrors the values accepted by the bundler's `target_arch` option. `None`
/// in [`MacOsSettings::target_arch`](super::MacOsSettings) means host-native.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacArch {
    /// Intel 64-bit
    X86_64,
    /// Apple Silicon
    Arm64,
    /// Fat binary carrying both `x86_64` and `arm64` slices
    Universal2,
}

impl MacArch {
    /// Value passed to the bundler spec.
    pub fn as_str(&self) -> &'static str {
        match self {
            MacArch::X86_64 => "x86_64",
            MacArch::Arm64 => "arm64",
            MacArch::Universal2 => "universal2",
        }
    }

    /// Mach-O slices every embedded binary must carry, sorted.
    pub fn slices(&self) -> Vec<MachArch> {
        match self {
            MacArch::X86_64 => vec![MachArch::X86_64],
            MacArch::Arm64 => vec![MachArch::Arm64],
            MacArch::Universal2 => vec![MachArch::X86_64, MachArch::Arm64],
        }
    }
}

/// Architecture of a single Mach-O slice.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MachArch {
    /// `CPU_TYPE_X86_64`
    X86_64,
    /// `CPU_TYPE_ARM64`
    Arm64,
    /// Any other CPU type, by raw value
    Other(u32),
}

impl MachArch {
    /// Maps a Mach-O `cputype` to an architecture.
    pub fn from_cputype(cputype: u32) -> Self {
        use goblin::mach::cputype::{CPU_TYPE_ARM64, CPU_TYPE_X86_64};
        match cputype {
            CPU_TYPE_X86_64 => MachArch::X86_64,
            CPU_TYPE_ARM64 => MachArch::Arm64,
            other => MachArch::Other(other),
        }
    }
}

impl fmt::Display for MachArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachArch::X86_64 => f.write_str("x86_64"),
            MachArch::Arm64 => f.write_str("arm64"),
            MachArch::Other(raw) => write!(f, "cputype {raw:#x}"),
        }
    }
}

/// Machine name used to pick the default `appimagetool-<arch>.AppImage`.
///
/// Follows `uname -m` naming rather than Rust's target naming.
pub fn host_machine() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "i686",
        "arm" => "armhf",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_requires_both_slices() {
        assert_eq!(
            MacArch::Universal2.slices(),
            vec![MachArch::X86_64, MachArch::Arm64]
        );
    }

    #[test]
    fn cputype_mapping() {
        assert_eq!(MachArch::from_cputype(0x0100_0007), MachArch::X86_64);
        assert_eq!(MachArch::from_cputype(0x0100_000c), MachArch::Arm64);
        assert_eq!(MachArch::from_cputype(7), MachArch::Other(7));
    }
}
