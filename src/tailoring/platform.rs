//! Target platform identifiers.

use std::fmt;

/// Operating system and CPU architecture a bundle is tailored for.
///
/// [`Platform::Default`] is the universal bundle: it has no platform rules
/// and no native namespaces of its own.
///
/// # Examples
///
/// ```no_run
/// use jdeploy_trust::tailoring::Platform;
///
/// let platform = Platform::from_identifier("mac-arm64").unwrap();
/// assert_eq!(platform.ignore_file_name().as_deref(), Some(".jdpignore.mac-arm64"));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Platform {
    /// Universal bundle
    Default,
    /// macOS on Intel
    MacX64,
    /// macOS on Apple Silicon
    MacArm64,
    /// Windows on x86_64
    WinX64,
    /// Windows on ARM64
    WinArm64,
    /// Linux on x86_64
    LinuxX64,
    /// Linux on ARM64
    LinuxArm64,
}

impl Platform {
    /// Every platform, universal first.
    pub const ALL: [Platform; 7] = [
        Platform::Default,
        Platform::MacX64,
        Platform::MacArm64,
        Platform::WinX64,
        Platform::WinArm64,
        Platform::LinuxX64,
        Platform::LinuxArm64,
    ];

    /// Platforms that get their own tailored bundle.
    pub fn specific() -> impl Iterator<Item = Platform> {
        Self::ALL.into_iter().filter(|p| *p != Platform::Default)
    }

    /// Identifier used in file names and `package.json` keys.
    pub fn identifier(self) -> &'static str {
        match self {
            Platform::Default => "default",
            Platform::MacX64 => "mac-x64",
            Platform::MacArm64 => "mac-arm64",
            Platform::WinX64 => "win-x64",
            Platform::WinArm64 => "win-arm64",
            Platform::LinuxX64 => "linux-x64",
            Platform::LinuxArm64 => "linux-arm64",
        }
    }

    /// `jdeploy` property naming this platform's published package.
    pub fn package_property(self) -> &'static str {
        match self {
            Platform::Default => "package",
            Platform::MacX64 => "packageMacX64",
            Platform::MacArm64 => "packageMacArm64",
            Platform::WinX64 => "packageWinX64",
            Platform::WinArm64 => "packageWinArm64",
            Platform::LinuxX64 => "packageLinuxX64",
            Platform::LinuxArm64 => "packageLinuxArm64",
        }
    }

    /// Parses an identifier such as `linux-x64`.
    pub fn from_identifier(identifier: &str) -> Option<Platform> {
        Self::ALL.into_iter().find(|p| p.identifier() == identifier)
    }

    /// Name of the platform-scoped ignore file, `None` for the universal bundle.
    pub fn ignore_file_name(self) -> Option<String> {
        match self {
            Platform::Default => None,
            other => Some(format!(".jdpignore.{}", other.identifier())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}
