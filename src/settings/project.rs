//! Project settings read from a bundle's `package.json`.
//!
//! The `jdeploy` object carries the tailoring configuration:
//!
//! ```json
//! {
//!   "name": "my-app",
//!   "version": "1.0.0",
//!   "jdeploy": {
//!     "platformBundlesEnabled": true,
//!     "packageMacArm64": "my-app-mac-arm64",
//!     "nativeNamespaces": {
//!       "ignore": ["com.example.debug"],
//!       "mac-arm64": ["ca.weblite.native.mac.arm64"],
//!       "win-x64": ["ca.weblite.native.win.x64"]
//!     }
//!   }
//! }
//! ```

use crate::error::{Context, ErrorExt, Result};
use crate::tailoring::Platform;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const IGNORE_KEY: &str = "ignore";

/// Parsed `package.json` of a bundle, loaded once.
#[derive(Debug, Clone)]
pub struct ProjectSettings {
    package_json_path: Option<PathBuf>,
    package_json: Value,
    name: String,
    version: String,
    ignored_namespaces: Vec<String>,
    native_namespaces: BTreeMap<Platform, Vec<String>>,
}

impl ProjectSettings {
    /// Loads `package.json` from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).fs_context("reading package.json", path)?;
        let value: Value = serde_json::from_str(&text)?;
        let mut settings = Self::from_value(value)?;
        settings.package_json_path = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Builds settings from an already parsed `package.json`.
    pub fn from_value(package_json: Value) -> Result<Self> {
        let name = package_json
            .get("name")
            .and_then(Value::as_str)
            .context("package.json has no name")?
            .to_string();
        let version = package_json
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut ignored_namespaces = Vec::new();
        let mut native_namespaces = BTreeMap::new();
        if let Some(map) = package_json
            .pointer("/jdeploy/nativeNamespaces")
            .and_then(Value::as_object)
        {
            for (key, list) in map {
                let entries = string_list(list);
                if key == IGNORE_KEY {
                    ignored_namespaces = entries;
                } else if let Some(platform) = Platform::from_identifier(key) {
                    native_namespaces.insert(platform, entries);
                } else {
                    log::warn!("ignoring nativeNamespaces entry for unknown platform {key}");
                }
            }
        }

        Ok(Self {
            package_json_path: None,
            package_json,
            name,
            version,
            ignored_namespaces,
            native_namespaces,
        })
    }

    /// Path the settings were loaded from.
    pub fn package_json_path(&self) -> Option<&Path> {
        self.package_json_path.as_deref()
    }

    /// Raw `package.json` value.
    pub fn package_json(&self) -> &Value {
        &self.package_json
    }

    /// Package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package version, empty if absent.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Namespaces stripped from every platform bundle.
    pub fn ignored_namespaces(&self) -> &[String] {
        &self.ignored_namespaces
    }

    /// Native namespaces declared for `platform`.
    pub fn native_namespaces(&self, platform: Platform) -> &[String] {
        self.native_namespaces
            .get(&platform)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether any namespace configuration exists.
    pub fn has_native_namespaces(&self) -> bool {
        !self.ignored_namespaces.is_empty() || self.native_namespaces.values().any(|v| !v.is_empty())
    }

    /// Ignored namespaces followed by every other platform's namespaces.
    pub fn other_platform_namespaces(&self, platform: Platform) -> Vec<String> {
        let mut out = self.ignored_namespaces.clone();
        for (other, list) in &self.native_namespaces {
            if *other != platform {
                out.extend(list.iter().cloned());
            }
        }
        out
    }

    /// Platforms with at least one declared native namespace.
    pub fn platforms_requiring_specific_bundles(&self) -> Vec<Platform> {
        self.native_namespaces
            .iter()
            .filter(|(p, list)| **p != Platform::Default && !list.is_empty())
            .map(|(p, _)| *p)
            .collect()
    }

    /// Whether platform bundle generation is switched on.
    pub fn platform_bundles_enabled(&self) -> bool {
        self.package_json
            .pointer("/jdeploy/platformBundlesEnabled")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Published package name for `platform`, if configured.
    pub fn package_name(&self, platform: Platform) -> Option<&str> {
        self.package_json
            .get("jdeploy")
            .and_then(|j| j.get(platform.package_property()))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
