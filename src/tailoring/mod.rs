//! Platform bundle tailoring.
//!
//! Decides per target platform which archive entries ship, from two
//! sources: `.jdpignore` rule files (global and per platform) and the
//! `nativeNamespaces` declared in `package.json`. Archives are then
//! rewritten in place and whole platform bundles generated from the
//! universal one.

pub mod archive;
mod generator;
mod ignore;
mod namespaces;
mod platform;
pub mod rules;

pub use archive::{ArchiveStats, BatchReport, EntryFilter};
pub use generator::{PlatformBundleGenerator, SIGNED_BUNDLE_DIR};
pub use ignore::{GLOBAL_IGNORE_FILE, IgnoreService, ResolvedRules, RuleStatistics};
pub use namespaces::NamespaceResolution;
pub use platform::Platform;
pub use rules::{IgnoreRule, PathPattern};
