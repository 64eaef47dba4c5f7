//! Ignore-rule resolution across global and platform scopes.

use super::Platform;
use super::rules::{self, IgnoreRule};
use crate::error::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

/// Global ignore file name.
pub const GLOBAL_IGNORE_FILE: &str = ".jdpignore";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    modified: SystemTime,
}

/// Rule counts for one project and platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleStatistics {
    /// Ignore rules in `.jdpignore`
    pub global_ignore: usize,
    /// Keep rules in `.jdpignore`
    pub global_keep: usize,
    /// Ignore rules in the platform file
    pub platform_ignore: usize,
    /// Keep rules in the platform file
    pub platform_keep: usize,
}

/// Global and platform rules resolved for one platform.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRules {
    global: Arc<Vec<IgnoreRule>>,
    platform: Arc<Vec<IgnoreRule>>,
}

impl ResolvedRules {
    /// Whether `entry` stays in the bundle.
    ///
    /// First match wins, in this order: platform keep, platform ignore,
    /// global keep, global ignore. Entries no rule selects are kept.
    pub fn should_include(&self, entry: &str) -> bool {
        for scope in [&self.platform, &self.global] {
            if scope.iter().any(|r| r.is_keep() && r.matches(entry)) {
                return true;
            }
            if scope.iter().any(|r| !r.is_keep() && r.matches(entry)) {
                return false;
            }
        }
        true
    }

    /// Whether there are no rules at all.
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.platform.is_empty()
    }

    /// Rules from `.jdpignore`.
    pub fn global(&self) -> &[IgnoreRule] {
        &self.global
    }

    /// Rules from the platform file.
    pub fn platform(&self) -> &[IgnoreRule] {
        &self.platform
    }
}

/// Loads ignore files with a cache keyed by path and modification time.
///
/// A file rewritten within the file system's timestamp granularity keeps
/// its old cache entry until [`clear_cache`](Self::clear_cache) is called.
#[derive(Debug, Default)]
pub struct IgnoreService {
    cache: RwLock<HashMap<CacheKey, Arc<Vec<IgnoreRule>>>>,
}

impl IgnoreService {
    /// Creates a service with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules from `<project>/.jdpignore`.
    pub fn global_rules(&self, project_dir: &Path) -> Result<Arc<Vec<IgnoreRule>>> {
        self.load(&project_dir.join(GLOBAL_IGNORE_FILE))
    }

    /// Rules from `<project>/.jdpignore.<platform>`; none for [`Platform::Default`].
    pub fn platform_rules(&self, project_dir: &Path, platform: Platform) -> Result<Arc<Vec<IgnoreRule>>> {
        match platform.ignore_file_name() {
            Some(name) => self.load(&project_dir.join(name)),
            None => Ok(Arc::default()),
        }
    }

    /// Both scopes for `platform`, for filtering many entries at once.
    pub fn resolve(&self, project_dir: &Path, platform: Platform) -> Result<ResolvedRules> {
        Ok(ResolvedRules {
            global: self.global_rules(project_dir)?,
            platform: self.platform_rules(project_dir, platform)?,
        })
    }

    /// Whether `entry` belongs in the bundle for `platform`.
    pub fn should_include_file(&self, project_dir: &Path, entry: &str, platform: Platform) -> Result<bool> {
        Ok(self.resolve(project_dir, platform)?.should_include(entry))
    }

    /// Whether the project has a global or any platform ignore file.
    pub fn has_ignore_files(&self, project_dir: &Path) -> bool {
        project_dir.join(GLOBAL_IGNORE_FILE).is_file()
            || Platform::specific()
                .filter_map(Platform::ignore_file_name)
                .any(|name| project_dir.join(name).is_file())
    }

    /// Counts keep and ignore rules in both scopes.
    pub fn statistics(&self, project_dir: &Path, platform: Platform) -> Result<RuleStatistics> {
        let resolved = self.resolve(project_dir, platform)?;
        let count = |rules: &[IgnoreRule], keep: bool| rules.iter().filter(|r| r.is_keep() == keep).count();
        Ok(RuleStatistics {
            global_ignore: count(resolved.global(), false),
            global_keep: count(resolved.global(), true),
            platform_ignore: count(resolved.platform(), false),
            platform_keep: count(resolved.platform(), true),
        })
    }

    /// Drops every cached rule set.
    pub fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn load(&self, path: &Path) -> Result<Arc<Vec<IgnoreRule>>> {
        let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) else {
            return Ok(Arc::default());
        };
        let key = CacheKey {
            path: path.to_path_buf(),
            modified,
        };

        if let Some(rules) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(rules));
        }

        let rules = Arc::new(rules::parse_rules_file(path)?);
        log::debug!("parsed {} rules from {}", rules.len(), path.display());
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|k, _| k.path != key.path);
        cache.insert(key, Arc::clone(&rules));
        Ok(rules)
    }
}
