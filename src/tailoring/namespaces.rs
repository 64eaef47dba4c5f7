//! Native namespace stripping for platform bundles.

use super::Platform;
use super::rules::PathPattern;
use crate::settings::ProjectSettings;

/// Namespaces to strip and keep for one platform.
///
/// An entry survives when a keep pattern selects it or no strip pattern
/// does.
#[derive(Debug, Clone, Default)]
pub struct NamespaceResolution {
    strip: Vec<PathPattern>,
    keep: Vec<PathPattern>,
}

impl NamespaceResolution {
    /// Builds a resolution from raw patterns, skipping blanks.
    pub fn new<S, K>(strip: S, keep: K) -> Self
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        Self {
            strip: strip.into_iter().filter_map(|p| PathPattern::parse(p.as_ref())).collect(),
            keep: keep.into_iter().filter_map(|p| PathPattern::parse(p.as_ref())).collect(),
        }
    }

    /// Strips the ignore list and every other platform's namespaces; keeps
    /// the platform's own.
    ///
    /// The universal bundle strips only the ignore list.
    pub fn for_platform(settings: &ProjectSettings, platform: Platform) -> Self {
        if platform == Platform::Default {
            return Self::new(settings.ignored_namespaces(), std::iter::empty::<&str>());
        }
        Self::new(
            settings.other_platform_namespaces(platform),
            settings.native_namespaces(platform),
        )
    }

    /// Whether `entry` stays in the bundle.
    pub fn should_include(&self, entry: &str) -> bool {
        self.keep.iter().any(|p| p.matches(entry)) || !self.strip.iter().any(|p| p.matches(entry))
    }

    /// Whether nothing would be stripped.
    pub fn is_noop(&self) -> bool {
        self.strip.is_empty()
    }

    /// Normalized strip patterns.
    pub fn strip_patterns(&self) -> impl Iterator<Item = &str> {
        self.strip.iter().map(PathPattern::normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> ProjectSettings {
        ProjectSettings::from_value(json!({
            "name": "demo",
            "jdeploy": {
                "nativeNamespaces": {
                    "ignore": ["com.example.debug"],
                    "mac-arm64": ["ca.weblite.native.mac.arm64"],
                    "win-x64": ["ca.weblite.native.win.x64", "/native/win/"]
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn strips_other_platforms() {
        let mac = NamespaceResolution::for_platform(&settings(), Platform::MacArm64);
        assert!(mac.should_include("ca/weblite/native/mac/arm64/Lib.class"));
        assert!(!mac.should_include("ca/weblite/native/win/x64/Lib.class"));
        assert!(!mac.should_include("native/win/lib.dll"));
        assert!(!mac.should_include("com/example/debug/Trace.class"));
        assert!(mac.should_include("com/example/App.class"));
    }

    #[test]
    fn universal_bundle_strips_only_ignore_list() {
        let universal = NamespaceResolution::for_platform(&settings(), Platform::Default);
        assert!(universal.should_include("ca/weblite/native/win/x64/Lib.class"));
        assert!(!universal.should_include("com/example/debug/Trace.class"));
    }

    #[test]
    fn keep_wins_over_overlapping_strip() {
        let r = NamespaceResolution::new(["com.example"], ["com.example.keep"]);
        assert!(r.should_include("com/example/keep/A.class"));
        assert!(!r.should_include("com/example/other/A.class"));
        assert!(NamespaceResolution::new(Vec::<String>::new(), ["a.b"]).is_noop());
    }
}
