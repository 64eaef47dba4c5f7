//! Platform bundle generation.
//!
//! Each generated bundle is a copy of the universal bundle with its
//! `package.json` renamed for the platform and every jar tailored by the
//! project's ignore rules and native namespaces. Signed bundles are
//! re-signed after tailoring, because removing entries changes the file
//! hashes the bundle manifest pins.

use super::Platform;
use super::archive::{self, BatchReport};
use super::ignore::IgnoreService;
use super::namespaces::NamespaceResolution;
use crate::error::{Error, ErrorExt, Result};
use crate::settings::{GeneratorSettings, ProjectSettings};
use crate::trust::{KeyProvider, sign_directory};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directory inside a bundle that holds the signed payload.
pub const SIGNED_BUNDLE_DIR: &str = "jdeploy-bundle";

/// Generates tailored copies of a universal bundle.
pub struct PlatformBundleGenerator<'a> {
    settings: GeneratorSettings,
    project: ProjectSettings,
    ignore: IgnoreService,
    signer: Option<&'a dyn KeyProvider>,
}

impl<'a> PlatformBundleGenerator<'a> {
    /// Creates a generator that does not re-sign.
    pub fn new(settings: GeneratorSettings, project: ProjectSettings) -> Self {
        Self {
            settings,
            project,
            ignore: IgnoreService::new(),
            signer: None,
        }
    }

    /// Re-signs each generated `jdeploy-bundle/` with `signer`.
    pub fn with_signer(mut self, signer: &'a dyn KeyProvider) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Ignore service backing rule resolution.
    pub fn ignore_service(&self) -> &IgnoreService {
        &self.ignore
    }

    /// Platforms that get a bundle: enabled ones whose platform ignore file
    /// has at least one rule.
    pub fn platforms(&self) -> Vec<Platform> {
        if !self.project.platform_bundles_enabled() {
            return Vec::new();
        }
        self.settings
            .platforms()
            .iter()
            .copied()
            .filter(|p| {
                match self.ignore.platform_rules(self.settings.project_dir(), *p) {
                    Ok(rules) => !rules.is_empty(),
                    Err(e) => {
                        log::warn!("cannot read ignore file for {p}: {e}");
                        false
                    }
                }
            })
            .collect()
    }

    /// Whether any platform bundle would be generated.
    pub fn should_generate(&self) -> bool {
        !self.platforms().is_empty()
    }

    /// Whether the universal bundle has global rules to apply.
    pub fn should_filter_default_bundle(&self) -> bool {
        self.ignore.has_ignore_files(self.settings.project_dir())
    }

    /// Applies the global rules to the universal bundle in place.
    pub fn filter_default_bundle(&self) -> Result<BatchReport> {
        let rules = self
            .ignore
            .resolve(self.settings.project_dir(), Platform::Default)?;
        archive::process_archives_in(self.settings.universal_bundle_dir(), &rules)
    }

    /// Generates every qualifying platform bundle.
    pub fn generate(&self) -> Result<BTreeMap<Platform, PathBuf>> {
        let platforms = self.platforms();
        if platforms.is_empty() {
            log::debug!("no platform bundles to generate for {}", self.project.name());
            return Ok(BTreeMap::new());
        }

        let universal = self.settings.universal_bundle_dir();
        if !universal.is_dir() {
            crate::bail!("universal bundle directory must exist: {}", universal.display());
        }
        if self.settings.output_dir().starts_with(universal) {
            crate::bail!(
                "output directory {} is inside the universal bundle",
                self.settings.output_dir().display()
            );
        }
        crate::utils::fs::create_dir_all(self.settings.output_dir(), false)?;

        let mut bundles = BTreeMap::new();
        for platform in platforms {
            let dir = self.generate_platform(platform)?;
            bundles.insert(platform, dir);
        }
        log::info!("✓ generated {} platform bundles", bundles.len());
        Ok(bundles)
    }

    /// Generates the bundle for one platform, replacing any previous one.
    pub fn generate_platform(&self, platform: Platform) -> Result<PathBuf> {
        let dir = self.settings.output_dir().join(self.bundle_name(platform));
        crate::utils::fs::remove_dir_all(&dir)?;
        crate::utils::fs::copy_dir(self.settings.universal_bundle_dir(), &dir)?;

        self.rewrite_package_json(&dir, platform)?;
        self.tailor_archives(&dir, platform)?;

        if let Some(signer) = self.signer {
            let bundle = dir.join(SIGNED_BUNDLE_DIR);
            if bundle.is_dir() {
                let version = self
                    .settings
                    .signing_version()
                    .unwrap_or_else(|| self.project.version());
                sign_directory(version, &bundle, signer).map_err(|e| {
                    Error::GenericError(format!("failed to re-sign {platform} bundle: {e}"))
                })?;
            }
        }

        log::info!("✓ {platform} bundle at {}", dir.display());
        Ok(dir)
    }

    /// Package name for `platform`: the configured one, or `<name>-<platform>`.
    pub fn bundle_name(&self, platform: Platform) -> String {
        self.project
            .package_name(platform)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", self.project.name(), platform.identifier()))
    }

    fn tailor_archives(&self, dir: &Path, platform: Platform) -> Result<()> {
        let project_dir = self.settings.project_dir();
        if self.ignore.has_ignore_files(project_dir) {
            let rules = self.ignore.resolve(project_dir, platform)?;
            archive::process_archives_in(dir, &rules)?;
        }
        if self.project.has_native_namespaces() {
            let namespaces = NamespaceResolution::for_platform(&self.project, platform);
            archive::process_archives_in(dir, &namespaces)?;
        }
        Ok(())
    }

    fn rewrite_package_json(&self, dir: &Path, platform: Platform) -> Result<()> {
        let path = dir.join("package.json");
        if !path.is_file() {
            return Ok(());
        }
        let text = std::fs::read_to_string(&path).fs_context("reading package.json", &path)?;
        let mut package: Value = serde_json::from_str(&text)?;
        let Some(root) = package.as_object_mut() else {
            crate::bail!("{} is not a JSON object", path.display());
        };

        root.insert("name".into(), Value::String(self.bundle_name(platform)));
        let jdeploy = root
            .entry("jdeploy")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(jdeploy) = jdeploy.as_object_mut() {
            jdeploy.insert("platformVariant".into(), platform.identifier().into());
            jdeploy.insert("universalPackage".into(), self.project.name().into());
        }

        let bytes = crate::utils::json::to_pretty_vec(&package)?;
        std::fs::write(&path, bytes).fs_context("writing package.json", &path)?;
        Ok(())
    }
}
