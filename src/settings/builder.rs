//! Builder for constructing [`GeneratorSettings`].

use crate::tailoring::Platform;
use std::path::{Path, PathBuf};

/// Inputs of a platform bundle generation run.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    project_dir: PathBuf,
    universal_bundle_dir: PathBuf,
    output_dir: PathBuf,
    platforms: Vec<Platform>,
    signing_version: Option<String>,
}

impl GeneratorSettings {
    /// Directory holding `.jdpignore` files.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Universal bundle the platform bundles are copied from.
    pub fn universal_bundle_dir(&self) -> &Path {
        &self.universal_bundle_dir
    }

    /// Directory receiving one subdirectory per platform.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Platforms the publisher allows bundles for.
    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    /// Version string used when re-signing, if set.
    pub fn signing_version(&self) -> Option<&str> {
        self.signing_version.as_deref()
    }
}

/// Builder for constructing [`GeneratorSettings`].
///
/// # Examples
///
/// ```no_run
/// use jdeploy_trust::settings::GeneratorSettingsBuilder;
/// use jdeploy_trust::tailoring::Platform;
///
/// # fn example() -> jdeploy_trust::Result<()> {
/// let settings = GeneratorSettingsBuilder::new()
///     .project_dir("my-app")
///     .universal_bundle_dir("my-app/jdeploy/publish")
///     .output_dir("my-app/jdeploy/platform-bundles")
///     .platforms(vec![Platform::MacArm64, Platform::WinX64])
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct GeneratorSettingsBuilder {
    project_dir: Option<PathBuf>,
    universal_bundle_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    platforms: Option<Vec<Platform>>,
    signing_version: Option<String>,
}

impl GeneratorSettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the project directory.
    ///
    /// # Required
    pub fn project_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.project_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the universal bundle directory.
    ///
    /// Default: the project directory
    pub fn universal_bundle_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.universal_bundle_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the output directory.
    ///
    /// # Required
    pub fn output_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Restricts generation to these platforms.
    ///
    /// Default: every platform-specific target
    pub fn platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.platforms = Some(platforms);
        self
    }

    /// Sets the version string bundles are re-signed with.
    ///
    /// Default: the package version
    pub fn signing_version(mut self, version: impl Into<String>) -> Self {
        self.signing_version = Some(version.into());
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `project_dir` or `output_dir` is missing.
    pub fn build(self) -> crate::Result<GeneratorSettings> {
        use crate::error::Context;

        let project_dir = self.project_dir.context("project_dir is required")?;
        let universal_bundle_dir = self
            .universal_bundle_dir
            .unwrap_or_else(|| project_dir.clone());
        let platforms = self
            .platforms
            .unwrap_or_else(|| Platform::specific().collect())
            .into_iter()
            .filter(|p| *p != Platform::Default)
            .collect();

        Ok(GeneratorSettings {
            project_dir,
            universal_bundle_dir,
            output_dir: self.output_dir.context("output_dir is required")?,
            platforms,
            signing_version: self.signing_version,
        })
    }
}
