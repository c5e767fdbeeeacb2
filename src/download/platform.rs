//! Host architecture detection for asset selection

use std::fmt;

/// File extension of the disk images we know how to install
pub const DISK_IMAGE_EXTENSION: &str = ".dmg";

/// CPU architecture of the running host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    Arm64,       // Apple Silicon
    X86_64,      // Intel
    Unsupported, // Anything else
}

impl Architecture {
    /// Detect the architecture this binary was built for
    pub fn current() -> Self {
        Self::from_arch_str(std::env::consts::ARCH)
    }

    /// Map a target arch string (as in `std::env::consts::ARCH`) to an architecture
    pub fn from_arch_str(arch: &str) -> Self {
        match arch {
            "aarch64" | "arm64" => Architecture::Arm64,
            "x86_64" => Architecture::X86_64,
            _ => Architecture::Unsupported,
        }
    }

    /// Lower-case fragments that identify this architecture in release asset names
    pub fn name_patterns(&self) -> &'static [&'static str] {
        match self {
            Architecture::Arm64 => &["arm64", "aarch64", "arm"],
            Architecture::X86_64 => &["x64", "x86", "x86_64", "intel", "amd64"],
            Architecture::Unsupported => &[],
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Architecture::Unsupported)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Arm64 => f.write_str("arm64"),
            Architecture::X86_64 => f.write_str("x86_64"),
            Architecture::Unsupported => f.write_str("unsupported"),
        }
    }
}
